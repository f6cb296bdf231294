//! In-memory collaborators for unit and handler tests.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::events::EventPublisher;
use crate::models::{
    ClientInfo, NewServiceRequest, Profile, ProfileMetadata, RequestStatus, Role, ServiceRequest,
    Session, SessionUser,
};
use crate::portal::{Collaborators, Portal, PortalSettings};
use crate::ports::{BackendError, ProfileStore, RequestStore, RoleStore, SessionApi};
use crate::realtime::ChangeFeed;
use crate::scheduling::LocalZone;
use crate::storage::BlobStore;

struct Account {
    id: Uuid,
    email: String,
    password: String,
}

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    // access token -> live session
    sessions: HashMap<String, SessionUser>,
    // refresh token -> session id
    refresh_tokens: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, Profile>,
    roles: HashSet<(Uuid, &'static str)>,
    requests: Vec<ServiceRequest>,
    failure: Option<BackendError>,
    statuses_failure: Option<BackendError>,
}

/// Session, row and role backend in one, with a call counter so tests can
/// assert that nothing was contacted.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    calls: AtomicUsize,
    clock: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap()
    }

    fn check(&self, state: &State) -> Result<(), BackendError> {
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Strictly increasing timestamps so ordering is deterministic.
    fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        DateTime::from_timestamp(1_748_000_000 + n, 0).unwrap()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every row or session call fail with `err` from now on.
    pub fn fail_with(&self, err: BackendError) {
        self.state.lock().unwrap().failure = Some(err);
    }

    /// Fail only the dashboard aggregate query.
    pub fn fail_statuses_with(&self, err: BackendError) {
        self.state.lock().unwrap().statuses_failure = Some(err);
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn add_account(&self, email: &str, password: &str, full_name: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        let created_at = self.tick();
        let mut state = self.state.lock().unwrap();
        state.accounts.push(Account { id, email: email.into(), password: password.into() });
        state.profiles.insert(
            id,
            Profile {
                id,
                full_name: full_name.into(),
                email: email.into(),
                phone: "5550100000".into(),
                created_at,
            },
        );
        state.roles.insert((id, role.as_str()));
        id
    }

    pub fn remove_profile(&self, id: Uuid) {
        self.state.lock().unwrap().profiles.remove(&id);
    }

    /// Open a session directly and return its access token.
    pub fn sign_in_as(&self, user_id: Uuid) -> String {
        let mut state = self.state.lock().unwrap();
        let email = state
            .accounts
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| a.email.clone())
            .unwrap();
        let session = open_session(&mut state, user_id, &email);
        session.access_token
    }

    pub fn customer(&self, email: &str) -> (Uuid, String) {
        let id = self.add_account(email, "secret123", "Jane Customer", Role::Customer);
        (id, self.sign_in_as(id))
    }

    pub fn admin(&self) -> (Uuid, String) {
        let id = self.add_account("admin@amptech.test", "secret123", "Ada Admin", Role::Admin);
        (id, self.sign_in_as(id))
    }

    pub fn seed_request(&self, owner: Uuid, status: RequestStatus) -> ServiceRequest {
        let created_at = self.tick();
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            user_id: owner,
            machine_model: "XYZ-3000".into(),
            issue_description: "Motor makes a grinding noise".into(),
            image_url: None,
            status,
            preferred_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            preferred_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            scheduled_date: None,
            created_at,
        };
        self.state.lock().unwrap().requests.push(request.clone());
        request
    }

    pub fn stored_request(&self, id: Uuid) -> Option<ServiceRequest> {
        self.state.lock().unwrap().requests.iter().find(|r| r.id == id).cloned()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

fn open_session(state: &mut State, user_id: Uuid, email: &str) -> Session {
    let session_id = Uuid::new_v4();
    let access_token = format!("access-{}", session_id);
    let refresh_token = format!("refresh-{}", session_id);
    let user = SessionUser { id: user_id, email: email.to_string(), session_id };
    state.sessions.insert(access_token.clone(), user.clone());
    state.refresh_tokens.insert(refresh_token.clone(), session_id);
    Session { user, access_token, refresh_token, expires_at: Utc::now() + Duration::hours(1) }
}

#[async_trait]
impl SessionApi for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: ProfileMetadata,
    ) -> Result<Session, BackendError> {
        let created_at = self.tick();
        let mut state = self.state();
        self.check(&state)?;
        if state.accounts.iter().any(|a| a.email == email) {
            return Err(BackendError::Conflict("User already registered".into()));
        }
        let id = Uuid::new_v4();
        state.accounts.push(Account { id, email: email.into(), password: password.into() });
        state.profiles.insert(
            id,
            Profile {
                id,
                full_name: metadata.full_name,
                email: email.into(),
                phone: metadata.phone,
                created_at,
            },
        );
        state.roles.insert((id, Role::Customer.as_str()));
        Ok(open_session(&mut state, id, email))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        _client: ClientInfo,
    ) -> Result<Session, BackendError> {
        let mut state = self.state();
        self.check(&state)?;
        let id = state
            .accounts
            .iter()
            .find(|a| a.email == email && a.password == password)
            .map(|a| a.id)
            .ok_or(BackendError::InvalidCredentials)?;
        Ok(open_session(&mut state, id, email))
    }

    async fn sign_out(&self, session_id: Uuid) -> Result<(), BackendError> {
        let mut state = self.state();
        state.sessions.retain(|_, user| user.session_id != session_id);
        state.refresh_tokens.retain(|_, sid| *sid != session_id);
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        Ok(state.sessions.get(access_token).cloned())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut state = self.state();
        self.check(&state)?;
        let session_id = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| BackendError::NotFound("Invalid or expired refresh token".into()))?;
        let user = state
            .sessions
            .values()
            .find(|u| u.session_id == session_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound("Invalid or expired refresh token".into()))?;
        state.sessions.retain(|_, u| u.session_id != session_id);
        Ok(open_session(&mut state, user.id, &user.email))
    }
}

#[async_trait]
impl RequestStore for MemoryBackend {
    async fn list(&self, owner: Option<Uuid>) -> Result<Vec<ServiceRequest>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        let mut rows: Vec<ServiceRequest> = state
            .requests
            .iter()
            .filter(|r| owner.map_or(true, |o| r.user_id == o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ServiceRequest>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        Ok(state.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn insert(&self, request: NewServiceRequest) -> Result<ServiceRequest, BackendError> {
        let created_at = self.tick();
        let mut state = self.state();
        self.check(&state)?;
        let row = request.into_row(Uuid::new_v4());
        let stored = ServiceRequest {
            id: row.id,
            user_id: row.user_id,
            machine_model: row.machine_model,
            issue_description: row.issue_description,
            image_url: row.image_url,
            status: row.status.parse().map_err(BackendError::Query)?,
            preferred_date: row.preferred_date,
            preferred_time: row.preferred_time,
            scheduled_date: None,
            created_at,
        };
        state.requests.push(stored.clone());
        Ok(stored)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        scheduled_date: Option<DateTime<Utc>>,
    ) -> Result<ServiceRequest, BackendError> {
        let mut state = self.state();
        self.check(&state)?;
        let row = state
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("Service request {} not found", id)))?;
        row.status = status;
        if scheduled_date.is_some() {
            row.scheduled_date = scheduled_date;
        }
        Ok(row.clone())
    }

    async fn statuses(&self) -> Result<Vec<RequestStatus>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        if let Some(err) = &state.statuses_failure {
            return Err(err.clone());
        }
        Ok(state.requests.iter().map(|r| r.status).collect())
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        Ok(state.profiles.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError> {
        let state = self.state();
        self.check(&state)?;
        Ok(ids.iter().filter_map(|id| state.profiles.get(id).cloned()).collect())
    }
}

#[async_trait]
impl RoleStore for MemoryBackend {
    async fn has_role(&self, user_id: Uuid, role: Role) -> Result<bool, BackendError> {
        let state = self.state();
        self.check(&state)?;
        Ok(state.roles.contains(&(user_id, role.as_str())))
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failure: Mutex<Option<BackendError>>,
}

impl MemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn uploads(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_with(&self, err: BackendError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(&format!("{}/{}", bucket, name)).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), BackendError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut objects = self.objects.lock().unwrap();
        let key = format!("{}/{}", bucket, name);
        if objects.contains_key(&key) {
            return Err(BackendError::Conflict("The resource already exists".into()));
        }
        objects.insert(key, bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("http://test.local/storage/{}/{}", bucket, name)
    }
}

pub fn test_settings() -> PortalSettings {
    PortalSettings { zone: LocalZone::from_offset_minutes(Some(0)), enforce_transitions: false }
}

pub fn portal_with(
    backend: &Arc<MemoryBackend>,
    blobs: &Arc<MemoryBlobStore>,
    settings: PortalSettings,
) -> Portal {
    Portal::new(
        Collaborators {
            sessions: backend.clone(),
            requests: backend.clone(),
            profiles: backend.clone(),
            roles: backend.clone(),
            blobs: blobs.clone(),
        },
        ChangeFeed::new(16),
        EventPublisher::logging(),
        settings,
    )
}
