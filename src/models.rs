use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::schema::{
    auth_sessions, auth_users, profiles, refresh_tokens, service_requests, user_roles,
};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

/// Lifecycle of a service request.
///
/// The nominal flow is pending → accepted → scheduled → completed, with
/// rejection possible until a visit has been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Scheduled,
    Completed,
    Rejected,
}

impl RequestStatus {
    /// Options offered by the admin status selector, in display order.
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::Scheduled,
        RequestStatus::Completed,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Scheduled => "scheduled",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Scheduled => "Scheduled",
            RequestStatus::Completed => "Completed",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn badge_color(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "yellow",
            RequestStatus::Accepted => "blue",
            RequestStatus::Scheduled => "green",
            RequestStatus::Completed => "gray",
            RequestStatus::Rejected => "red",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected)
    }

    /// Moves allowed by the request lifecycle.
    pub fn next_statuses(&self) -> &'static [RequestStatus] {
        match self {
            RequestStatus::Pending => &[RequestStatus::Accepted, RequestStatus::Rejected],
            RequestStatus::Accepted => &[RequestStatus::Scheduled, RequestStatus::Rejected],
            RequestStatus::Scheduled => &[RequestStatus::Completed],
            RequestStatus::Completed | RequestStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        *self == next || self.next_statuses().contains(&next)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| format!("unknown request status '{}'", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Customer => ROLE_CUSTOMER,
        }
    }
}

// Persistence rows

#[derive(Queryable, Debug, Clone)]
pub struct AuthUserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = auth_users)]
pub struct NewAuthUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

#[derive(Queryable, Debug, Clone)]
pub struct AuthSessionRow {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = auth_sessions)]
pub struct NewAuthSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Queryable, Debug, Clone)]
pub struct RefreshTokenRow {
    pub token_id: i32,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Queryable, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = user_roles)]
pub struct NewUserRole {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Queryable, Debug, Clone)]
pub struct ServiceRequestRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub machine_model: String,
    pub issue_description: String,
    pub image_url: Option<String>,
    pub status: String,
    pub preferred_date: NaiveDate,
    pub preferred_time: NaiveTime,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = service_requests)]
pub struct NewServiceRequestRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub machine_model: String,
    pub issue_description: String,
    pub image_url: Option<String>,
    pub status: String,
    pub preferred_date: NaiveDate,
    pub preferred_time: NaiveTime,
}

/// A customer's machine-service case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub machine_model: String,
    pub issue_description: String,
    pub image_url: Option<String>,
    pub status: RequestStatus,
    pub preferred_date: NaiveDate,
    pub preferred_time: NaiveTime,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ServiceRequestRow> for ServiceRequest {
    type Error = String;

    fn try_from(row: ServiceRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            user_id: row.user_id,
            machine_model: row.machine_model,
            issue_description: row.issue_description,
            image_url: row.image_url,
            preferred_date: row.preferred_date,
            preferred_time: row.preferred_time,
            scheduled_date: row.scheduled_date,
            created_at: row.created_at,
        })
    }
}

/// Fields of a new request. The status is not part of it: inserts are
/// always pending.
#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceRequest {
    pub user_id: Uuid,
    pub machine_model: String,
    pub issue_description: String,
    pub image_url: Option<String>,
    pub preferred_date: NaiveDate,
    pub preferred_time: NaiveTime,
}

impl NewServiceRequest {
    pub fn into_row(self, id: Uuid) -> NewServiceRequestRow {
        NewServiceRequestRow {
            id,
            user_id: self.user_id,
            machine_model: self.machine_model,
            issue_description: self.issue_description,
            image_url: self.image_url,
            status: RequestStatus::Pending.as_str().to_string(),
            preferred_date: self.preferred_date,
            preferred_time: self.preferred_time,
        }
    }
}

// Session types

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub session_id: Uuid,
}

#[derive(Serialize, Debug, Clone)]
pub struct Session {
    pub user: SessionUser,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileMetadata {
    pub full_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,      // Subject (user id)
    pub exp: usize,
    pub iat: usize,
    pub sid: String,      // Session id
    pub email: String,
}

// DTOs
#[derive(Deserialize, Debug, Default, Validate)]
#[serde(default)]
pub struct SignupRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 10, message = "Phone must be at least 10 digits"))]
    pub phone: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords don't match"))]
    pub confirm_password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Customer intake form as submitted. Any status sent by the client is
/// not part of the form and is dropped during deserialization.
#[derive(Deserialize, Debug, Default, Clone, Validate)]
#[serde(default)]
pub struct IntakeForm {
    #[validate(length(min = 2, message = "Machine model is required"))]
    pub machine_model: String,
    #[validate(length(min = 10, message = "Please provide more details about the issue"))]
    pub issue_description: String,
    #[validate(length(min = 1, message = "Please select a preferred date"))]
    pub preferred_date: String,
    #[validate(length(min = 1, message = "Please select a preferred time"))]
    pub preferred_time: String,
    pub image: Option<ImageUpload>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64 payload, optionally prefixed with a `data:` URL header.
    pub data: String,
}

#[derive(Deserialize, Debug)]
pub struct StatusChangeRequest {
    pub status: RequestStatus,
}
