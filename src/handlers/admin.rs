use actix_web::{get, patch, web, HttpRequest, HttpResponse};
use log::debug;
use uuid::Uuid;

use super::{access_token, event_stream};
use crate::errors::ApiError;
use crate::models::StatusChangeRequest;
use crate::portal::Portal;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard)
        .service(request_events)
        .service(list_requests)
        .service(change_status);
}

#[get("/admin/dashboard")]
async fn dashboard(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    Ok(HttpResponse::Ok().json(portal.admin_dashboard(token.as_deref()).await?))
}

#[get("/admin/requests")]
async fn list_requests(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    Ok(HttpResponse::Ok().json(portal.admin_requests(token.as_deref()).await?))
}

#[patch("/admin/requests/{id}/status")]
async fn change_status(
    portal: web::Data<Portal>,
    path: web::Path<Uuid>,
    body: web::Json<StatusChangeRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let request_id = path.into_inner();
    debug!("Status change for {} to {}", request_id, body.status);
    let token = access_token(&req);
    let change = portal.change_status(token.as_deref(), request_id, body.status).await?;
    Ok(HttpResponse::Ok().json(change))
}

#[get("/admin/requests/events")]
async fn request_events(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    let subscription = portal.subscribe_admin(token.as_deref()).await?;
    Ok(event_stream(subscription))
}
