//! HTTP surface of the portal.
pub mod admin;
pub mod auth;
pub mod customer;

use actix_web::http::header;
use actix_web::{error, get, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;

use crate::errors::ApiError;
use crate::models::ClientInfo;
use crate::realtime::{sse_frame, Subscription};
use crate::validation::{FieldErrors, MAX_IMAGE_BYTES};

/// Large enough for a base64-encoded image just under the upload ceiling.
pub const JSON_LIMIT: usize = MAX_IMAGE_BYTES / 3 * 4 + 64 * 1024;

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Bearer token from the `Authorization` header. Event streams opened by a
/// browser `EventSource` cannot set headers, so `?access_token=` is accepted too.
pub fn access_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().access_token)
            .filter(|token| !token.is_empty())
    })
}

pub fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        ip_address: req.connection_info().realip_remote_addr().map(|s| s.to_owned()),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_owned()),
    }
}

/// Server-sent events for a change subscription. The subscription is dropped
/// when the client disconnects.
pub fn event_stream(subscription: Subscription) -> HttpResponse {
    let stream = subscription
        .into_stream()
        .map(|event| Ok::<web::Bytes, actix_web::Error>(sse_frame(&event)));

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            let message = match &err {
                error::JsonPayloadError::Overflow { .. }
                | error::JsonPayloadError::OverflowKnownLength { .. } => {
                    "Image must be less than 10MB".to_string()
                }
                other => other.to_string(),
            };
            ApiError::Validation(FieldErrors::single("body", message)).into()
        })
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Mount every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/api")
            .service(health_check)
            .configure(auth::configure)
            .configure(customer::configure)
            .configure(admin::configure),
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use actix_web::{test as actix_test, web, App};
    use serde_json::Value;

    use crate::portal::Portal;
    use crate::testing::{portal_with, test_settings, MemoryBackend, MemoryBlobStore};

    pub fn fixtures() -> (Arc<MemoryBackend>, Arc<MemoryBlobStore>, Portal) {
        let backend = MemoryBackend::new();
        let blobs = MemoryBlobStore::new();
        let portal = portal_with(&backend, &blobs, test_settings());
        (backend, blobs, portal)
    }

    pub fn app(
        portal: Portal,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(web::Data::new(portal))
            .configure(super::configure)
    }

    pub async fn json_body(response: actix_web::dev::ServiceResponse) -> Value {
        let body = actix_test::read_body(response).await;
        serde_json::from_slice(&body).expect("json body")
    }
}
