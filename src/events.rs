//! Outbound integration events, fire-and-forget.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kafka::{
    Event, EventType, KafkaProducer, LoggingProducer, TOPIC_AUTH_EVENTS,
    TOPIC_SERVICE_REQUEST_EVENTS,
};
use crate::models::{RequestStatus, ServiceRequest, SessionUser};

// Event payloads
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestSubmittedEvent {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub machine_model: String,
    pub has_image: bool,
    pub preferred_date: chrono::NaiveDate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub status: RequestStatus,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub changed_by: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountCreatedEvent {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedInEvent {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub ip_address: Option<String>,
    pub login_timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<KafkaProducer>,
}

impl EventPublisher {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }

    pub fn logging() -> Self {
        Self::new(Arc::new(KafkaProducer::Logging(LoggingProducer)))
    }

    /// Publish on a background task so the response is never held up.
    fn spawn<T>(&self, topic: &'static str, key: Uuid, event: Event<T>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let producer = self.producer.clone();
        tokio::spawn(async move {
            if let Err(e) = producer.send(topic, Some(&key.to_string()), &event).await {
                warn!("Failed to publish {:?} event: {}", event.event_type, e);
            }
        });
    }

    pub fn request_submitted(&self, request: &ServiceRequest) {
        self.spawn(
            TOPIC_SERVICE_REQUEST_EVENTS,
            request.id,
            Event::new(
                EventType::ServiceRequestSubmitted,
                RequestSubmittedEvent {
                    request_id: request.id,
                    user_id: request.user_id,
                    machine_model: request.machine_model.clone(),
                    has_image: request.image_url.is_some(),
                    preferred_date: request.preferred_date,
                },
            ),
        );
    }

    pub fn status_changed(&self, request: &ServiceRequest, changed_by: Uuid) {
        self.spawn(
            TOPIC_SERVICE_REQUEST_EVENTS,
            request.id,
            Event::new(
                EventType::ServiceRequestStatusChanged,
                StatusChangedEvent {
                    request_id: request.id,
                    user_id: request.user_id,
                    status: request.status,
                    scheduled_date: request.scheduled_date,
                    changed_by,
                },
            ),
        );
    }

    pub fn account_created(&self, user: &SessionUser) {
        self.spawn(
            TOPIC_AUTH_EVENTS,
            user.id,
            Event::new(
                EventType::AccountCreated,
                AccountCreatedEvent { user_id: user.id, email: user.email.clone() },
            ),
        );
    }

    pub fn signed_in(&self, user: &SessionUser, role: &str, ip_address: Option<String>) {
        self.spawn(
            TOPIC_AUTH_EVENTS,
            user.id,
            Event::new(
                EventType::UserSignedIn,
                SignedInEvent {
                    user_id: user.id,
                    email: user.email.clone(),
                    role: role.to_string(),
                    ip_address,
                    login_timestamp: Utc::now(),
                },
            ),
        );
    }
}
