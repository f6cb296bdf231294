//! Collaborators the portal screens are written against.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ClientInfo, NewServiceRequest, Profile, ProfileMetadata, RequestStatus, Role, ServiceRequest,
    Session, SessionUser,
};

/// Failure reported by a backend collaborator. The message is shown to
/// the user as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Query(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Storage(String),
}

impl From<diesel::result::Error> for BackendError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => BackendError::NotFound("Record not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                BackendError::Conflict(info.message().to_string())
            }
            other => BackendError::Query(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for BackendError {
    fn from(err: r2d2::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: ProfileMetadata,
    ) -> Result<Session, BackendError>;

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<Session, BackendError>;

    async fn sign_out(&self, session_id: Uuid) -> Result<(), BackendError>;

    /// Resolve an access token to its live session, if any.
    async fn get_session(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError>;

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Newest first. `None` lists every owner's requests.
    async fn list(&self, owner: Option<Uuid>) -> Result<Vec<ServiceRequest>, BackendError>;

    async fn find(&self, id: Uuid) -> Result<Option<ServiceRequest>, BackendError>;

    /// Persists with status `pending`.
    async fn insert(&self, request: NewServiceRequest) -> Result<ServiceRequest, BackendError>;

    /// `scheduled_date` of `None` leaves the stored value untouched.
    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        scheduled_date: Option<DateTime<Utc>>,
    ) -> Result<ServiceRequest, BackendError>;

    async fn statuses(&self) -> Result<Vec<RequestStatus>, BackendError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, BackendError>;

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn has_role(&self, user_id: Uuid, role: Role) -> Result<bool, BackendError>;
}
