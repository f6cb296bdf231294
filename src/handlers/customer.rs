use actix_web::{get, post, web, HttpRequest, HttpResponse};

use super::{access_token, event_stream};
use crate::errors::ApiError;
use crate::models::IntakeForm;
use crate::portal::Portal;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard)
        .service(request_events)
        .service(list_requests)
        .service(submit_request);
}

#[get("/customer/dashboard")]
async fn dashboard(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    Ok(HttpResponse::Ok().json(portal.customer_dashboard(token.as_deref()).await?))
}

#[get("/customer/requests")]
async fn list_requests(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    Ok(HttpResponse::Ok().json(portal.customer_requests(token.as_deref()).await?))
}

#[post("/customer/requests")]
async fn submit_request(
    portal: web::Data<Portal>,
    form: web::Json<IntakeForm>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    let submission = portal.submit_request(token.as_deref(), form.into_inner()).await?;
    Ok(HttpResponse::Created().json(submission))
}

#[get("/customer/requests/events")]
async fn request_events(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    let subscription = portal.subscribe_customer(token.as_deref()).await?;
    Ok(event_stream(subscription))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::test as actix_test;
    use serde_json::json;

    use crate::handlers::test_support::*;

    fn xyz() -> serde_json::Value {
        json!({
            "machine_model": "XYZ-3000",
            "issue_description": "Motor makes a grinding noise when started",
            "preferred_date": "2025-06-01",
            "preferred_time": "10:00",
            "status": "completed"
        })
    }

    #[actix_web::test]
    async fn submit_then_list() {
        let (backend, _, portal) = fixtures();
        let (_, token) = backend.customer("jane@example.com");
        let app = actix_test::init_service(app(portal)).await;
        let bearer = format!("Bearer {}", token);

        let request = actix_test::TestRequest::post()
            .uri("/api/customer/requests")
            .insert_header((header::AUTHORIZATION, bearer.clone()))
            .set_json(xyz())
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["request"]["status"], "pending");
        assert_eq!(body["reset_form"], true);

        let request = actix_test::TestRequest::get()
            .uri("/api/customer/requests")
            .insert_header((header::AUTHORIZATION, bearer))
            .to_request();
        let body = json_body(actix_test::call_service(&app, request).await).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["machine_model"], "XYZ-3000");
        assert_eq!(items[0]["badge_color"], "yellow");
        assert!(body.get("empty_message").is_none());
    }

    #[actix_web::test]
    async fn invalid_form_is_rejected_without_a_session() {
        let (backend, _, portal) = fixtures();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/customer/requests")
            .set_json(json!({
                "machine_model": "X",
                "issue_description": "broken",
                "preferred_date": "2025-06-01",
                "preferred_time": "10:00"
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["fields"]["machine_model"], "Machine model is required");
        assert_eq!(
            body["fields"]["issue_description"],
            "Please provide more details about the issue"
        );
        assert_eq!(backend.calls(), 0);
    }

    #[actix_web::test]
    async fn dashboard_without_session_redirects_to_login() {
        let (_, _, portal) = fixtures();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::get().uri("/api/customer/dashboard").to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["redirect"], "/customer/login");
    }

    #[actix_web::test]
    async fn event_stream_is_served_as_sse() {
        let (backend, _, portal) = fixtures();
        let (_, token) = backend.customer("jane@example.com");
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::get()
            .uri(&format!("/api/customer/requests/events?access_token={}", token))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
