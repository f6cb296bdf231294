//! Response shapes for the portal screens.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Profile, RequestStatus, ServiceRequest, SessionUser};
use crate::scheduling::{preferred_display, LocalZone, StatusCounts};

pub const NO_REQUESTS: &str = "No service requests yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// Transient notification for the client to toast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn info(title: &str, description: Option<String>) -> Self {
        Self { title: title.to_string(), description, variant: NoticeVariant::Default }
    }

    pub fn destructive(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: Some(description.into()),
            variant: NoticeVariant::Destructive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    pub id: Uuid,
    pub machine_model: String,
    pub issue_description: String,
    pub image_url: Option<String>,
    pub status: RequestStatus,
    pub status_label: &'static str,
    pub badge_color: &'static str,
    pub preferred_date: NaiveDate,
    pub preferred_time: String,
    pub preferred_display: String,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub scheduled_display: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_display: String,
}

impl RequestView {
    pub fn render(request: &ServiceRequest, zone: &LocalZone) -> Self {
        Self {
            id: request.id,
            machine_model: request.machine_model.clone(),
            issue_description: request.issue_description.clone(),
            image_url: request.image_url.clone(),
            status: request.status,
            status_label: request.status.label(),
            badge_color: request.status.badge_color(),
            preferred_date: request.preferred_date,
            preferred_time: short_time(request.preferred_time),
            preferred_display: preferred_display(request.preferred_date, request.preferred_time),
            scheduled_date: request.scheduled_date,
            scheduled_display: request.scheduled_date.map(|at| zone.display(at)),
            created_at: request.created_at,
            created_display: request.created_at.format("%b %d, %Y").to_string(),
        }
    }
}

fn short_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Owner contact details shown next to each request on the admin list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OwnerContact {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

impl From<&Profile> for OwnerContact {
    fn from(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminRequestView {
    #[serde(flatten)]
    pub request: RequestView,
    pub owner: OwnerContact,
}

/// A full (unpaginated) list with its empty-state message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        let empty_message = items.is_empty().then_some(NO_REQUESTS);
        Self { items, empty_message }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOption {
    pub value: RequestStatus,
    pub label: &'static str,
}

pub fn status_options() -> Vec<StatusOption> {
    RequestStatus::ALL
        .into_iter()
        .map(|value| StatusOption { value, label: value.label() })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub user: SessionUser,
    /// Absent when the totals could not be loaded; the screen still renders.
    pub counts: Option<StatusCounts>,
    pub status_options: Vec<StatusOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDashboard {
    pub user: SessionUser,
    pub profile: Option<Profile>,
    pub tabs: [&'static str; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub request: RequestView,
    pub notice: Notice,
    pub reset_form: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub request: RequestView,
    /// Fresh dashboard totals, absent when they could not be recomputed.
    pub counts: Option<StatusCounts>,
    pub notice: Notice,
}

/// Outcome of an auth screen: where the client should go next.
#[derive(Debug, Clone, Serialize)]
pub struct Navigation<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<T>,
    pub redirect: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}
