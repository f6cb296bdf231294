// Library half of the AMP Tech service portal; `main.rs` wires it to Postgres,
// Kafka and the HTTP server.

pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod kafka;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod portal;
pub mod ports;
pub mod realtime;
pub mod scheduling;
pub mod schema;
pub mod services;
pub mod storage;
pub mod validation;
pub mod views;

#[cfg(test)]
mod testing;

// Re-export common types
pub use crate::config::AppConfig;
pub use crate::config::DbPool;
pub use crate::errors::ApiError;
pub use crate::kafka::KafkaProducer;
pub use crate::portal::Portal;
