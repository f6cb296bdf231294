use std::time::Duration;

use log::{debug, error, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};

// Kafka configuration
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub bootstrap_servers: String,
    pub client_id: String,
}

impl KafkaConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let enabled = std::env::var("KAFKA_ENABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let bootstrap_servers = std::env::var("KAFKA_BOOTSTRAP_SERVERS")
            .unwrap_or_else(|_| "localhost:9092".to_string());

        let client_id = std::env::var("KAFKA_CLIENT_ID")
            .unwrap_or_else(|_| "amptech-portal".to_string());

        Self { enabled, bootstrap_servers, client_id }
    }
}

#[derive(Clone)]
pub enum KafkaProducer {
    Real(RdKafkaProducer),
    Logging(LoggingProducer),
}

impl KafkaProducer {
    pub async fn send<T: Serialize>(&self, topic: &str, key: Option<&str>, payload: &T) -> Result<(), String> {
        match self {
            KafkaProducer::Real(producer) => producer.send(topic, key, payload).await,
            KafkaProducer::Logging(producer) => producer.send(topic, key, payload).await,
        }
    }
}

#[derive(Clone)]
pub struct RdKafkaProducer {
    producer: FutureProducer,
}

impl RdKafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "snappy")
            .set("acks", "all")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn send<T: Serialize>(&self, topic: &str, key: Option<&str>, payload: &T) -> Result<(), String> {
        let json_payload = serde_json::to_string(payload).map_err(|e| format!("Serialization error: {}", e))?;

        let record = match key {
            Some(k) => FutureRecord::to(topic).key(k).payload(&json_payload),
            None => FutureRecord::to(topic).payload(&json_payload),
        };

        debug!("Sending message to topic {}: {}", topic, json_payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(5))).await {
            Ok((partition, offset)) => {
                info!("Message sent to topic {}, partition {}, offset {}", topic, partition, offset);
                Ok(())
            }
            Err((err, _)) => {
                error!("Failed to send message to Kafka: {}", err);
                Err(format!("Failed to send message: {}", err))
            }
        }
    }
}

/// Choose the real producer when Kafka is enabled and reachable, else log only.
pub fn create_producer(config: &KafkaConfig) -> KafkaProducer {
    if !config.enabled {
        info!("Kafka disabled, outbound events will only be logged");
        return KafkaProducer::Logging(LoggingProducer::default());
    }
    match RdKafkaProducer::new(config) {
        Ok(producer) => {
            info!("Kafka producer connected to {}", config.bootstrap_servers);
            KafkaProducer::Real(producer)
        }
        Err(e) => {
            error!("Failed to create Kafka producer: {}", e);
            warn!("Will use a producer that logs but doesn't send messages");
            KafkaProducer::Logging(LoggingProducer::default())
        }
    }
}

// Fallback when Kafka is unavailable
#[derive(Clone, Default)]
pub struct LoggingProducer;

impl LoggingProducer {
    pub async fn send<T: Serialize>(&self, topic: &str, key: Option<&str>, payload: &T) -> Result<(), String> {
        // Never fail the caller, the event is only informational here.
        if let Ok(json) = serde_json::to_string(payload) {
            debug!("Event for topic '{}' not sent: key={:?}, payload={}", topic, key, json);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    ServiceRequestSubmitted,
    ServiceRequestStatusChanged,
    AccountCreated,
    UserSignedIn,
}

// Generic event envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Event<T> {
    pub event_type: EventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: T,
}

impl<T> Event<T> {
    pub fn new(event_type: EventType, payload: T) -> Self {
        Self {
            event_type,
            timestamp: chrono::Utc::now(),
            payload,
        }
    }
}

pub const TOPIC_SERVICE_REQUEST_EVENTS: &str = "service-request-events";
pub const TOPIC_AUTH_EVENTS: &str = "auth-events";
