use actix_files::Files;
use actix_web::{web, App, HttpServer};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel::Connection;
use log::{error, info, warn};
use std::io;
use std::sync::Arc;

use amptech::config::{AppConfig, DB_INIT_SQL};
use amptech::events::EventPublisher;
use amptech::handlers;
use amptech::kafka::{create_producer, KafkaConfig};
use amptech::logger::setup_logger;
use amptech::middleware::RequestLogger;
use amptech::portal::{Collaborators, Portal, PortalSettings};
use amptech::realtime::ChangeFeed;
use amptech::services::{seed_admin, PgProfileStore, PgRequestStore, PgRoleStore, PgSessionApi};
use amptech::storage::LocalBlobStore;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables and initialize logger
    dotenvy::dotenv().ok();
    setup_logger();

    let config = AppConfig::from_env();
    config
        .validate()
        .map_err(|e| startup_error("Invalid configuration", e))?;

    info!("Connecting to database");

    // Initialize database schema
    let mut conn = PgConnection::establish(&config.database_url)
        .map_err(|e| startup_error("Failed to establish connection for schema setup", e))?;
    conn.batch_execute(DB_INIT_SQL)
        .map_err(|e| startup_error("Failed to execute database initialization script", e))?;
    info!("Database initialization complete.");

    // Set up database connection pool
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.clone());
    let pool = r2d2::Pool::builder()
        .build(manager)
        .map_err(|e| startup_error("Failed to create database connection pool", e))?;

    if let Some(seed) = &config.admin_seed {
        match seed_admin(&pool, seed).await {
            Ok(()) => info!("Admin account ensured for {}", seed.email),
            Err(e) => warn!("Failed to seed admin account {}: {}", seed.email, e),
        }
    }

    std::fs::create_dir_all(&config.storage_dir)
        .map_err(|e| startup_error("Failed to create storage directory", e))?;

    let producer = create_producer(&KafkaConfig::from_env());
    let events = EventPublisher::new(Arc::new(producer));
    let feed = ChangeFeed::new(config.change_feed_capacity);

    let collaborators = Collaborators {
        sessions: Arc::new(PgSessionApi::new(pool.clone(), config.clone())),
        requests: Arc::new(PgRequestStore::new(pool.clone())),
        profiles: Arc::new(PgProfileStore::new(pool.clone())),
        roles: Arc::new(PgRoleStore::new(pool.clone())),
        blobs: Arc::new(LocalBlobStore::new(
            config.storage_dir.clone(),
            &config.public_base_url,
        )),
    };
    let settings = PortalSettings {
        zone: config.local_zone(),
        enforce_transitions: config.enforce_status_transitions,
    };
    let portal = web::Data::new(Portal::new(collaborators, feed, events, settings));

    let storage_dir = config.storage_dir.clone();
    let (host, port) = (config.host.clone(), config.port);
    info!("Starting HTTP server at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(portal.clone())
            .configure(handlers::configure)
            .service(Files::new("/storage", storage_dir.clone()))
    })
    .workers(2)
    .keep_alive(std::time::Duration::from_secs(75))
    .shutdown_timeout(30)
    .on_connect(|_conn, addr| {
        log::debug!("New connection from: {:?}", addr);
    })
    .bind((host, port))?
    .run()
    .await
}
