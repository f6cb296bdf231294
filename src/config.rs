use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::env;
use std::path::PathBuf;

use crate::scheduling::{fixed_offset, LocalZone};

// Type aliases
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

// Database initialization SQL, idempotent so it can run on every start
pub const DB_INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS auth_users (
    id UUID PRIMARY KEY,
    email VARCHAR(255) UNIQUE NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_sign_in_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS auth_sessions (
    session_id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES auth_users(id) ON DELETE CASCADE,
    ip_address VARCHAR(64),
    user_agent VARCHAR(255),
    expires_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    token_id SERIAL PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES auth_users(id) ON DELETE CASCADE,
    session_id UUID NOT NULL REFERENCES auth_sessions(session_id) ON DELETE CASCADE,
    token VARCHAR(255) UNIQUE NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS profiles (
    id UUID PRIMARY KEY REFERENCES auth_users(id) ON DELETE CASCADE,
    full_name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    phone VARCHAR(50) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS user_roles (
    id SERIAL PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES auth_users(id) ON DELETE CASCADE,
    role VARCHAR(20) NOT NULL CHECK (role IN ('admin', 'customer')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (user_id, role)
);

CREATE TABLE IF NOT EXISTS service_requests (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    machine_model VARCHAR(255) NOT NULL,
    issue_description TEXT NOT NULL,
    image_url VARCHAR(1024),
    status VARCHAR(20) NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'accepted', 'scheduled', 'completed', 'rejected')),
    preferred_date DATE NOT NULL,
    preferred_time TIME NOT NULL,
    scheduled_date TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_service_requests_user_created
    ON service_requests (user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_service_requests_created
    ON service_requests (created_at DESC);
"#;

/// Credentials for the administrator account created at start-up.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

// Config
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry: i64,     // In hours
    pub refresh_expiry: i64, // In days
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub enforce_status_transitions: bool,
    pub change_feed_capacity: usize,
    pub schedule_offset_minutes: Option<i32>,
    pub admin_seed: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(val) if !val.trim().is_empty() => val,
            _ => {
                warn!("JWT_SECRET is not set, generating a random secret");
                warn!("Sessions will not survive a restart. Set JWT_SECRET in production!");
                Self::generate_secure_secret()
            }
        };

        let admin_seed = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                email,
                password,
                full_name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
            }),
            _ => None,
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT").unwrap_or(8080),
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            jwt_secret,
            jwt_expiry: parse_var("JWT_EXPIRY_HOURS").unwrap_or(24),
            refresh_expiry: parse_var("REFRESH_EXPIRY_DAYS").unwrap_or(30),
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./storage")),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            enforce_status_transitions: flag("ENFORCE_STATUS_TRANSITIONS"),
            change_feed_capacity: parse_var("CHANGE_FEED_CAPACITY").unwrap_or(256),
            schedule_offset_minutes: parse_var("SCHEDULE_UTC_OFFSET_MINUTES"),
            admin_seed,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("DATABASE_URL must be set".to_string());
        }

        if self.jwt_secret.len() < 16 {
            warn!("JWT_SECRET is shorter than 16 characters, this is not secure for production!");
        }

        if self.jwt_expiry <= 0 {
            return Err("JWT_EXPIRY_HOURS must be positive".to_string());
        }

        if self.refresh_expiry <= 0 {
            return Err("REFRESH_EXPIRY_DAYS must be positive".to_string());
        }

        if self.change_feed_capacity == 0 {
            return Err("CHANGE_FEED_CAPACITY must be positive".to_string());
        }

        if let Some(minutes) = self.schedule_offset_minutes {
            if fixed_offset(minutes).is_none() {
                return Err(format!(
                    "SCHEDULE_UTC_OFFSET_MINUTES must be between -1439 and 1439, got {}",
                    minutes
                ));
            }
        }

        if let Some(seed) = &self.admin_seed {
            if seed.password.len() < 6 {
                return Err("ADMIN_PASSWORD must be at least 6 characters".to_string());
            }
        }

        Ok(())
    }

    pub fn local_zone(&self) -> LocalZone {
        LocalZone::from_offset_minutes(self.schedule_offset_minutes)
    }

    pub fn generate_secure_secret() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    /// Settings for tests that never touch the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "postgres://localhost/amptech_test".to_string(),
            jwt_secret: "test-secret-for-unit-tests".to_string(),
            jwt_expiry: 24,
            refresh_expiry: 30,
            storage_dir: PathBuf::from("./storage"),
            public_base_url: "http://localhost:8080".to_string(),
            enforce_status_transitions: false,
            change_feed_capacity: 16,
            schedule_offset_minutes: Some(0),
            admin_seed: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
