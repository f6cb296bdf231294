//! PostgreSQL-backed collaborators.
use actix_web::web;
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AdminSeed, AppConfig, DbPool};
use crate::models::*;
use crate::ports::{BackendError, ProfileStore, RequestStore, RoleStore, SessionApi};

pub struct AuthService;

impl AuthService {
    pub fn hash_password(password: &str) -> Result<String, BackendError> {
        hash(password, DEFAULT_COST).map_err(|e| {
            error!("Failed to hash password: {}", e);
            BackendError::Query("Failed to hash password".to_string())
        })
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool, BackendError> {
        verify(password, hash).map_err(|e| {
            error!("Failed to verify password: {}", e);
            BackendError::Query("Failed to verify password".to_string())
        })
    }

    /// Access token for a session; returns the token and its expiry.
    pub fn generate_token(
        user_id: Uuid,
        session_id: Uuid,
        email: &str,
        config: &AppConfig,
    ) -> Result<(String, DateTime<Utc>), BackendError> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(config.jwt_expiry);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            sid: session_id.to_string(),
            email: email.to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .map_err(|e| {
            error!("Failed to generate token: {}", e);
            BackendError::Query("Failed to generate token".to_string())
        })?;

        Ok((token, expires_at))
    }

    /// Claims of a well-formed, unexpired token signed with our secret.
    pub fn decode_token(token: &str, config: &AppConfig) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| debug!("Rejected access token: {}", e))
        .ok()
    }

    pub fn generate_refresh_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Build a fresh session for a user along with its persisted rows.
    fn issue_session(
        user_id: Uuid,
        session_id: Uuid,
        email: &str,
        config: &AppConfig,
    ) -> Result<(Session, NewRefreshToken), BackendError> {
        let (access_token, expires_at) = Self::generate_token(user_id, session_id, email, config)?;
        let refresh_token = Self::generate_refresh_token();
        let refresh_row = NewRefreshToken {
            user_id,
            session_id,
            token: refresh_token.clone(),
            expires_at: Utc::now() + Duration::days(config.refresh_expiry),
        };
        let session = Session {
            user: SessionUser { id: user_id, email: email.to_string(), session_id },
            access_token,
            refresh_token,
            expires_at,
        };
        Ok((session, refresh_row))
    }
}

/// Run a diesel closure on the blocking pool with a pooled connection.
pub async fn with_conn<F, T>(pool: &DbPool, f: F) -> Result<T, BackendError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get().map_err(|e| {
            error!("Failed to get database connection: {}", e);
            BackendError::from(e)
        })?;
        f(&mut conn).map_err(BackendError::from)
    })
    .await
    .map_err(|e| {
        error!("Database operation error: {}", e);
        BackendError::Unavailable(e.to_string())
    })?
}

fn new_session_row(session: &Session, client: ClientInfo, refresh: &NewRefreshToken) -> NewAuthSession {
    NewAuthSession {
        session_id: session.user.session_id,
        user_id: session.user.id,
        ip_address: client.ip_address,
        user_agent: client.user_agent,
        expires_at: refresh.expires_at,
    }
}

pub struct PgSessionApi {
    pool: DbPool,
    config: AppConfig,
}

impl PgSessionApi {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl SessionApi for PgSessionApi {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: ProfileMetadata,
    ) -> Result<Session, BackendError> {
        let password_hash = AuthService::hash_password(password)?;
        let user_id = Uuid::new_v4();
        let (session, refresh) =
            AuthService::issue_session(user_id, Uuid::new_v4(), email, &self.config)?;

        let new_user = NewAuthUser { id: user_id, email: email.to_string(), password_hash };
        let new_profile = NewProfile {
            id: user_id,
            full_name: metadata.full_name,
            email: email.to_string(),
            phone: metadata.phone,
        };
        let new_role = NewUserRole { user_id, role: ROLE_CUSTOMER.to_string() };
        let new_session = new_session_row(&session, ClientInfo::default(), &refresh);

        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(crate::schema::auth_users::table)
                    .values(&new_user)
                    .execute(conn)?;
                diesel::insert_into(crate::schema::profiles::table)
                    .values(&new_profile)
                    .execute(conn)?;
                diesel::insert_into(crate::schema::user_roles::table)
                    .values(&new_role)
                    .execute(conn)?;
                diesel::insert_into(crate::schema::auth_sessions::table)
                    .values(&new_session)
                    .execute(conn)?;
                diesel::insert_into(crate::schema::refresh_tokens::table)
                    .values(&refresh)
                    .execute(conn)
            })
        })
        .await
        .map_err(|e| match e {
            BackendError::Conflict(_) => {
                debug!("Attempted to sign up with existing email: {}", email);
                BackendError::Conflict("User already registered".to_string())
            }
            other => other,
        })?;

        info!("Created new account with ID: {}", user_id);
        Ok(session)
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<Session, BackendError> {
        let email_copy = email.trim().to_string();
        let user = with_conn(&self.pool, move |conn| {
            use crate::schema::auth_users::dsl;
            dsl::auth_users
                .filter(dsl::email.eq(email_copy))
                .first::<AuthUserRow>(conn)
                .optional()
        })
        .await?;

        let user = match user {
            Some(user) => user,
            None => {
                debug!("Sign-in failed: no account for {}", email);
                return Err(BackendError::InvalidCredentials);
            }
        };

        if !AuthService::verify_password(password, &user.password_hash)? {
            debug!("Sign-in failed: invalid password for {}", email);
            return Err(BackendError::InvalidCredentials);
        }

        let (session, refresh) =
            AuthService::issue_session(user.id, Uuid::new_v4(), &user.email, &self.config)?;
        let new_session = new_session_row(&session, client, &refresh);
        let user_id = user.id;

        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(crate::schema::auth_sessions::table)
                    .values(&new_session)
                    .execute(conn)?;
                diesel::insert_into(crate::schema::refresh_tokens::table)
                    .values(&refresh)
                    .execute(conn)?;
                use crate::schema::auth_users::dsl;
                diesel::update(dsl::auth_users.find(user_id))
                    .set(dsl::last_sign_in_at.eq(Some(Utc::now())))
                    .execute(conn)
            })
        })
        .await?;

        info!("User {} signed in", user.email);
        Ok(session)
    }

    async fn sign_out(&self, session_id: Uuid) -> Result<(), BackendError> {
        let removed = with_conn(&self.pool, move |conn| {
            use crate::schema::auth_sessions::dsl;
            diesel::delete(dsl::auth_sessions.find(session_id)).execute(conn)
        })
        .await?;
        debug!("Signed out session {} ({} row(s))", session_id, removed);
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let claims = match AuthService::decode_token(access_token, &self.config) {
            Some(claims) => claims,
            None => return Ok(None),
        };
        let (user_id, session_id) = match (claims.sub.parse::<Uuid>(), claims.sid.parse::<Uuid>()) {
            (Ok(user_id), Ok(session_id)) => (user_id, session_id),
            _ => {
                warn!("Access token with malformed subject or session id");
                return Ok(None);
            }
        };

        let live = with_conn(&self.pool, move |conn| {
            use crate::schema::auth_sessions::dsl;
            dsl::auth_sessions
                .filter(dsl::session_id.eq(session_id))
                .filter(dsl::user_id.eq(user_id))
                .filter(dsl::expires_at.gt(Utc::now()))
                .first::<AuthSessionRow>(conn)
                .optional()
        })
        .await?;

        Ok(live.map(|row| SessionUser { id: row.user_id, email: claims.email, session_id }))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let token_str = refresh_token.to_string();
        let found = with_conn(&self.pool, move |conn| {
            use crate::schema::{auth_users, refresh_tokens};
            refresh_tokens::table
                .inner_join(
                    auth_users::table.on(auth_users::id.eq(refresh_tokens::user_id)),
                )
                .filter(refresh_tokens::token.eq(token_str))
                .filter(refresh_tokens::expires_at.gt(Utc::now()))
                .select((refresh_tokens::all_columns, auth_users::email))
                .first::<(RefreshTokenRow, String)>(conn)
                .optional()
        })
        .await?;

        let (old, email) = found
            .ok_or_else(|| BackendError::NotFound("Invalid or expired refresh token".to_string()))?;

        let (session, refresh) =
            AuthService::issue_session(old.user_id, old.session_id, &email, &self.config)?;
        let old_id = old.token_id;
        let session_id = old.session_id;
        let session_expires = refresh.expires_at;

        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                use crate::schema::{auth_sessions, refresh_tokens};
                diesel::delete(refresh_tokens::table.find(old_id)).execute(conn)?;
                diesel::insert_into(refresh_tokens::table)
                    .values(&refresh)
                    .execute(conn)?;
                diesel::update(auth_sessions::table.find(session_id))
                    .set(auth_sessions::expires_at.eq(session_expires))
                    .execute(conn)
            })
        })
        .await?;

        info!("Session refreshed for {}", email);
        Ok(session)
    }
}

pub struct PgRequestStore {
    pool: DbPool,
}

impl PgRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_request(row: ServiceRequestRow) -> Result<ServiceRequest, BackendError> {
    ServiceRequest::try_from(row).map_err(|e| {
        error!("Corrupt service request row: {}", e);
        BackendError::Query(e)
    })
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn list(&self, owner: Option<Uuid>) -> Result<Vec<ServiceRequest>, BackendError> {
        let rows = with_conn(&self.pool, move |conn| {
            use crate::schema::service_requests::dsl::*;
            let mut query = service_requests.into_boxed();
            if let Some(owner_id) = owner {
                query = query.filter(user_id.eq(owner_id));
            }
            query
                .order((created_at.desc(), id.asc()))
                .load::<ServiceRequestRow>(conn)
        })
        .await?;

        debug!("Listed {} service requests", rows.len());
        rows.into_iter().map(into_request).collect()
    }

    async fn find(&self, request_id: Uuid) -> Result<Option<ServiceRequest>, BackendError> {
        with_conn(&self.pool, move |conn| {
            use crate::schema::service_requests::dsl::*;
            service_requests
                .find(request_id)
                .first::<ServiceRequestRow>(conn)
                .optional()
        })
        .await?
        .map(into_request)
        .transpose()
    }

    async fn insert(&self, request: NewServiceRequest) -> Result<ServiceRequest, BackendError> {
        let row = request.into_row(Uuid::new_v4());
        let inserted = with_conn(&self.pool, move |conn| {
            diesel::insert_into(crate::schema::service_requests::table)
                .values(&row)
                .get_result::<ServiceRequestRow>(conn)
        })
        .await?;

        info!("Created service request {} for user {}", inserted.id, inserted.user_id);
        into_request(inserted)
    }

    async fn update_status(
        &self,
        request_id: Uuid,
        new_status: RequestStatus,
        scheduled: Option<DateTime<Utc>>,
    ) -> Result<ServiceRequest, BackendError> {
        let updated = with_conn(&self.pool, move |conn| {
            use crate::schema::service_requests::dsl::*;
            let target = service_requests.find(request_id);
            match scheduled {
                Some(at) => diesel::update(target)
                    .set((status.eq(new_status.as_str()), scheduled_date.eq(Some(at))))
                    .get_result::<ServiceRequestRow>(conn),
                None => diesel::update(target)
                    .set(status.eq(new_status.as_str()))
                    .get_result::<ServiceRequestRow>(conn),
            }
        })
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => {
                BackendError::NotFound(format!("Service request {} not found", request_id))
            }
            other => other,
        })?;

        info!("Service request {} marked as {}", request_id, new_status);
        into_request(updated)
    }

    async fn statuses(&self) -> Result<Vec<RequestStatus>, BackendError> {
        let raw = with_conn(&self.pool, |conn| {
            use crate::schema::service_requests::dsl::*;
            service_requests.select(status).load::<String>(conn)
        })
        .await?;

        raw.iter()
            .map(|s| s.parse::<RequestStatus>().map_err(BackendError::Query))
            .collect()
    }
}

pub struct PgProfileStore {
    pool: DbPool,
}

impl PgProfileStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find(&self, profile_id: Uuid) -> Result<Option<Profile>, BackendError> {
        with_conn(&self.pool, move |conn| {
            use crate::schema::profiles::dsl::*;
            profiles.find(profile_id).first::<Profile>(conn).optional()
        })
        .await
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        with_conn(&self.pool, move |conn| {
            use crate::schema::profiles::dsl::*;
            profiles.filter(id.eq_any(ids)).load::<Profile>(conn)
        })
        .await
    }
}

pub struct PgRoleStore {
    pool: DbPool,
}

impl PgRoleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn has_role(&self, account: Uuid, wanted: Role) -> Result<bool, BackendError> {
        with_conn(&self.pool, move |conn| {
            use crate::schema::user_roles::dsl::*;
            diesel::select(diesel::dsl::exists(
                user_roles
                    .filter(user_id.eq(account))
                    .filter(role.eq(wanted.as_str())),
            ))
            .get_result::<bool>(conn)
        })
        .await
    }
}

/// Make sure the configured administrator exists and holds the admin role.
pub async fn seed_admin(pool: &DbPool, seed: &AdminSeed) -> Result<(), BackendError> {
    let password_hash = AuthService::hash_password(&seed.password)?;
    let seed = seed.clone();

    let admin_id = with_conn(pool, move |conn| {
        use crate::schema::{auth_users, profiles, user_roles};
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let existing = auth_users::table
                .filter(auth_users::email.eq(seed.email.as_str()))
                .select(auth_users::id)
                .first::<Uuid>(conn)
                .optional()?;

            let admin_id = match existing {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    diesel::insert_into(auth_users::table)
                        .values(&NewAuthUser { id, email: seed.email.clone(), password_hash })
                        .execute(conn)?;
                    diesel::insert_into(profiles::table)
                        .values(&NewProfile {
                            id,
                            full_name: seed.full_name.clone(),
                            email: seed.email.clone(),
                            phone: String::new(),
                        })
                        .execute(conn)?;
                    id
                }
            };

            diesel::insert_into(user_roles::table)
                .values(&NewUserRole { user_id: admin_id, role: ROLE_ADMIN.to_string() })
                .on_conflict((user_roles::user_id, user_roles::role))
                .do_nothing()
                .execute(conn)?;

            Ok(admin_id)
        })
    })
    .await?;

    info!("Administrator account ready: {}", admin_id);
    Ok(())
}
