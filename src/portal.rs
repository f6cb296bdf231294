//! Screen-level workflows of the customer and admin portals.
//!
//! Every entry point re-verifies the caller's session (and role, for admin
//! screens) from the presented access token; nothing is cached between calls.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::events::EventPublisher;
use crate::models::{
    ClientInfo, IntakeForm, LoginRequest, NewServiceRequest, ProfileMetadata, RequestStatus, Role,
    Session, SessionUser, SignupRequest,
};
use crate::ports::{BackendError, ProfileStore, RequestStore, RoleStore, SessionApi};
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, Subscription};
use crate::scheduling::{LocalZone, StatusCounts};
use crate::storage::{image_object_name, BlobStore, IMAGE_BUCKET};
use crate::validation::{validate_intake, validate_signup, FieldErrors};
use crate::views::{
    status_options, AdminDashboard, AdminRequestView, CustomerDashboard, Listing, Navigation,
    Notice, OwnerContact, RequestView, StatusChange, Submission,
};

pub const HOME: &str = "/";
pub const CUSTOMER_LOGIN: &str = "/customer/login";
pub const CUSTOMER_DASHBOARD: &str = "/customer/dashboard";
pub const ADMIN_LOGIN: &str = "/admin/login";
pub const ADMIN_DASHBOARD: &str = "/admin/dashboard";

pub const CUSTOMER_TABS: [&str; 2] = ["requests", "new-request"];

const ADMIN_REQUIRED: &str = "Admin privileges required";

/// The backend collaborators the portal talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionApi>,
    pub requests: Arc<dyn RequestStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub roles: Arc<dyn RoleStore>,
    pub blobs: Arc<dyn BlobStore>,
}

#[derive(Debug, Clone, Copy)]
pub struct PortalSettings {
    pub zone: LocalZone,
    /// Reject status moves outside the request lifecycle.
    pub enforce_transitions: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user: SessionUser,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct Portal {
    backend: Collaborators,
    feed: ChangeFeed,
    events: EventPublisher,
    settings: PortalSettings,
}

impl Portal {
    pub fn new(
        backend: Collaborators,
        feed: ChangeFeed,
        events: EventPublisher,
        settings: PortalSettings,
    ) -> Self {
        Self { backend, feed, events, settings }
    }

    async fn session(&self, token: Option<&str>, redirect: &'static str) -> Result<SessionUser, ApiError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ApiError::SessionRequired { redirect }),
        };
        match self.backend.sessions.get_session(token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                debug!("Access token has no live session");
                Err(ApiError::SessionRequired { redirect })
            }
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                Err(ApiError::SessionRequired { redirect })
            }
        }
    }

    async fn end_session(&self, session_id: Uuid) {
        if let Err(e) = self.backend.sessions.sign_out(session_id).await {
            warn!("Failed to sign out session {}: {}", session_id, e);
        }
    }

    async fn is_admin(&self, user: &SessionUser) -> bool {
        match self.backend.roles.has_role(user.id, Role::Admin).await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Role lookup failed for {}: {}", user.id, e);
                false
            }
        }
    }

    pub async fn session_info(&self, token: Option<&str>) -> Result<SessionInfo, ApiError> {
        let user = self.session(token, HOME).await?;
        let is_admin = self.is_admin(&user).await;
        Ok(SessionInfo { user, is_admin })
    }

    /// Admin gate. A signed-in user without the admin role is signed out.
    pub async fn require_admin(&self, token: Option<&str>) -> Result<SessionUser, ApiError> {
        let user = self.session(token, ADMIN_LOGIN).await?;
        if self.is_admin(&user).await {
            return Ok(user);
        }
        info!("User {} denied admin access", user.email);
        self.end_session(user.session_id).await;
        Err(ApiError::AccessDenied { message: ADMIN_REQUIRED.to_string(), redirect: ADMIN_LOGIN })
    }

    pub async fn sign_up(&self, form: SignupRequest) -> Result<Navigation<Session>, ApiError> {
        validate_signup(&form)?;

        let metadata = ProfileMetadata {
            full_name: form.full_name.trim().to_string(),
            phone: form.phone.trim().to_string(),
        };
        let session = self
            .backend
            .sessions
            .sign_up(form.email.trim(), &form.password, metadata)
            .await
            .map_err(|e| match e {
                BackendError::Conflict(message) => ApiError::from(FieldErrors::single("email", message)),
                other => ApiError::backend("Signup failed", other),
            })?;

        info!("Customer account created for {}", session.user.email);
        self.events.account_created(&session.user);

        Ok(Navigation {
            session: Some(session),
            redirect: CUSTOMER_DASHBOARD,
            notice: Some(Notice::info(
                "Account created successfully!",
                Some("Welcome to AMP Tech. Redirecting to your dashboard...".to_string()),
            )),
        })
    }

    async fn sign_in(&self, form: &LoginRequest, client: ClientInfo) -> Result<Session, ApiError> {
        self.backend
            .sessions
            .sign_in(form.email.trim(), &form.password, client)
            .await
            .map_err(|e| match e {
                BackendError::InvalidCredentials => ApiError::Auth(e.to_string()),
                other => ApiError::backend("Login failed", other),
            })
    }

    pub async fn customer_sign_in(
        &self,
        form: LoginRequest,
        client: ClientInfo,
    ) -> Result<Navigation<Session>, ApiError> {
        let ip_address = client.ip_address.clone();
        let session = self.sign_in(&form, client).await?;
        self.events.signed_in(&session.user, Role::Customer.as_str(), ip_address);
        Ok(Navigation { session: Some(session), redirect: CUSTOMER_DASHBOARD, notice: None })
    }

    pub async fn admin_sign_in(
        &self,
        form: LoginRequest,
        client: ClientInfo,
    ) -> Result<Navigation<Session>, ApiError> {
        let ip_address = client.ip_address.clone();
        let session = self.sign_in(&form, client).await?;

        if !self.is_admin(&session.user).await {
            info!("Non-admin {} tried the admin login", session.user.email);
            self.end_session(session.user.session_id).await;
            return Err(ApiError::AccessDenied {
                message: format!("Access denied. {}.", ADMIN_REQUIRED),
                redirect: ADMIN_LOGIN,
            });
        }

        self.events.signed_in(&session.user, Role::Admin.as_str(), ip_address);
        Ok(Navigation {
            session: Some(session),
            redirect: ADMIN_DASHBOARD,
            notice: Some(Notice::info(
                "Admin access granted",
                Some("Welcome back to the dashboard".to_string()),
            )),
        })
    }

    /// Always lands on the home page, even when there was no live session.
    pub async fn sign_out(&self, token: Option<&str>) -> Navigation<Session> {
        if let Ok(user) = self.session(token, HOME).await {
            self.end_session(user.session_id).await;
            info!("User {} signed out", user.email);
        }
        Navigation {
            session: None,
            redirect: HOME,
            notice: Some(Notice::info("Logged out successfully", None)),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        self.backend
            .sessions
            .refresh(refresh_token)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(message) => ApiError::Auth(message),
                BackendError::InvalidCredentials => ApiError::Auth(e.to_string()),
                other => ApiError::backend("Session refresh failed", other),
            })
    }

    pub async fn customer_dashboard(&self, token: Option<&str>) -> Result<CustomerDashboard, ApiError> {
        let user = self.session(token, CUSTOMER_LOGIN).await?;
        let profile = match self.backend.profiles.find(user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile lookup failed for {}: {}", user.id, e);
                None
            }
        };
        Ok(CustomerDashboard { user, profile, tabs: CUSTOMER_TABS })
    }

    pub async fn customer_requests(&self, token: Option<&str>) -> Result<Listing<RequestView>, ApiError> {
        let user = self.session(token, CUSTOMER_LOGIN).await?;
        let requests = self
            .backend
            .requests
            .list(Some(user.id))
            .await
            .map_err(|e| ApiError::backend("Failed to load requests", e))?;

        let zone = self.settings.zone;
        Ok(Listing::new(requests.iter().map(|r| RequestView::render(r, &zone)).collect()))
    }

    /// Intake form submission. The form is validated before any backend call.
    pub async fn submit_request(
        &self,
        token: Option<&str>,
        form: IntakeForm,
    ) -> Result<Submission, ApiError> {
        let intake = validate_intake(form)?;
        let user = self.session(token, CUSTOMER_LOGIN).await?;

        let image_url = match intake.image {
            Some(image) => {
                let name = image_object_name(user.id, &image.extension, Utc::now());
                self.backend
                    .blobs
                    .upload(IMAGE_BUCKET, &name, image.bytes, &image.content_type)
                    .await
                    .map_err(|e| ApiError::backend("Submission failed", e))?;
                Some(self.backend.blobs.public_url(IMAGE_BUCKET, &name))
            }
            None => None,
        };

        let created = self
            .backend
            .requests
            .insert(NewServiceRequest {
                user_id: user.id,
                machine_model: intake.machine_model,
                issue_description: intake.issue_description,
                image_url,
                preferred_date: intake.preferred_date,
                preferred_time: intake.preferred_time,
            })
            .await
            .map_err(|e| ApiError::backend("Submission failed", e))?;

        info!("Service request {} submitted by {}", created.id, user.email);
        self.feed.publish(ChangeEvent::request(ChangeKind::Insert, created.clone()));
        self.events.request_submitted(&created);

        Ok(Submission {
            request: RequestView::render(&created, &self.settings.zone),
            notice: Notice::info(
                "Request submitted successfully!",
                Some("Our team will review your request and get back to you soon.".to_string()),
            ),
            reset_form: true,
        })
    }

    async fn counts(&self) -> Result<StatusCounts, BackendError> {
        Ok(StatusCounts::tally(self.backend.requests.statuses().await?))
    }

    pub async fn admin_dashboard(&self, token: Option<&str>) -> Result<AdminDashboard, ApiError> {
        let user = self.require_admin(token).await?;
        let (counts, notice) = match self.counts().await {
            Ok(counts) => (Some(counts), None),
            Err(e) => {
                warn!("Failed to load dashboard counts: {}", e);
                (None, Some(Notice::destructive("Failed to load dashboard", e.to_string())))
            }
        };
        Ok(AdminDashboard { user, counts, status_options: status_options(), notice })
    }

    /// Every request with its owner's contact details, newest first.
    pub async fn admin_requests(&self, token: Option<&str>) -> Result<Listing<AdminRequestView>, ApiError> {
        self.require_admin(token).await?;
        let requests = self
            .backend
            .requests
            .list(None)
            .await
            .map_err(|e| ApiError::backend("Failed to load requests", e))?;

        let owners: Vec<Uuid> = requests
            .iter()
            .map(|r| r.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let contacts: HashMap<Uuid, OwnerContact> = match self.backend.profiles.find_many(&owners).await {
            Ok(profiles) => profiles.iter().map(|p| (p.id, OwnerContact::from(p))).collect(),
            Err(e) => {
                warn!("Owner profile lookup failed: {}", e);
                HashMap::new()
            }
        };

        let zone = self.settings.zone;
        Ok(Listing::new(
            requests
                .iter()
                .map(|r| AdminRequestView {
                    request: RequestView::render(r, &zone),
                    owner: contacts.get(&r.user_id).cloned().unwrap_or_default(),
                })
                .collect(),
        ))
    }

    pub async fn change_status(
        &self,
        token: Option<&str>,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<StatusChange, ApiError> {
        let admin = self.require_admin(token).await?;

        let current = self
            .backend
            .requests
            .find(request_id)
            .await
            .map_err(|e| ApiError::backend("Update failed", e))?
            .ok_or_else(|| ApiError::NotFound("Service request not found".to_string()))?;

        if self.settings.enforce_transitions && !current.status.can_transition_to(status) {
            return Err(FieldErrors::single(
                "status",
                format!("Cannot move a {} request to {}", current.status, status),
            )
            .into());
        }

        let scheduled = if status == RequestStatus::Scheduled {
            let at = self
                .settings
                .zone
                .scheduled_instant(current.preferred_date, current.preferred_time)
                .ok_or_else(|| {
                    FieldErrors::single("status", "The preferred time does not exist in the local time zone")
                })?;
            Some(at)
        } else {
            None
        };

        let updated = self
            .backend
            .requests
            .update_status(request_id, status, scheduled)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(message) => ApiError::NotFound(message),
                other => ApiError::backend("Update failed", other),
            })?;

        info!("Admin {} marked request {} as {}", admin.email, request_id, status);
        self.feed.publish(ChangeEvent::request(ChangeKind::Update, updated.clone()));
        self.events.status_changed(&updated, admin.id);

        let counts = match self.counts().await {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!("Failed to refresh dashboard counts: {}", e);
                None
            }
        };

        Ok(StatusChange {
            request: RequestView::render(&updated, &self.settings.zone),
            counts,
            notice: Notice::info("Status updated", Some(format!("Request marked as {}", status))),
        })
    }

    pub async fn subscribe_customer(&self, token: Option<&str>) -> Result<Subscription, ApiError> {
        let user = self.session(token, CUSTOMER_LOGIN).await?;
        Ok(self.feed.subscribe(ChangeFilter::Owner(user.id)))
    }

    pub async fn subscribe_admin(&self, token: Option<&str>) -> Result<Subscription, ApiError> {
        self.require_admin(token).await?;
        Ok(self.feed.subscribe(ChangeFilter::All))
    }
}
