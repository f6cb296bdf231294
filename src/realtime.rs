//! In-process change feed for service requests.
//!
//! Every insert or status change is published once; each open stream holds a
//! [`Subscription`] that drops events outside its filter. Dropping the
//! subscription (for SSE: the client disconnecting) releases the receiver.
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::models::ServiceRequest;

pub const SERVICE_REQUESTS_TABLE: &str = "service_requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: &'static str,
    pub kind: ChangeKind,
    pub record_id: Uuid,
    pub owner_id: Uuid,
    pub record: ServiceRequest,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn request(kind: ChangeKind, record: ServiceRequest) -> Self {
        Self {
            table: SERVICE_REQUESTS_TABLE,
            kind,
            record_id: record.id,
            owner_id: record.user_id,
            record,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    All,
    Owner(Uuid),
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::Owner(owner) => event.owner_id == *owner,
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!("Publishing {:?} for request {}", event.kind, event.record_id);
        // No subscribers is not an error for a change feed.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription { receiver: self.sender.subscribe(), filter }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Next matching event, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Change subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent> {
        let filter = self.filter;
        BroadcastStream::new(self.receiver).filter_map(move |result| match result {
            Ok(event) if filter.matches(&event) => Some(event),
            Ok(_) => None,
            Err(err) => {
                warn!("Change subscriber lagged: {}", err);
                None
            }
        })
    }
}

pub fn sse_frame(event: &ChangeEvent) -> Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("event: change\ndata: {}\n\n", payload))
}
