use actix_web::{get, post, web, HttpRequest, HttpResponse};
use log::debug;

use super::{access_token, client_info};
use crate::errors::ApiError;
use crate::models::{LoginRequest, RefreshRequest, SignupRequest};
use crate::portal::Portal;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(signup)
        .service(login)
        .service(admin_login)
        .service(logout)
        .service(refresh)
        .service(current_session);
}

#[post("/auth/signup")]
async fn signup(
    portal: web::Data<Portal>,
    form: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    debug!("Signup attempt for: {}", form.email);
    let nav = portal.sign_up(form.into_inner()).await?;
    Ok(HttpResponse::Created().json(nav))
}

#[post("/auth/login")]
async fn login(
    portal: web::Data<Portal>,
    form: web::Json<LoginRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    debug!("Login attempt for: {}", form.email);
    let nav = portal.customer_sign_in(form.into_inner(), client_info(&req)).await?;
    Ok(HttpResponse::Ok().json(nav))
}

#[post("/admin/login")]
async fn admin_login(
    portal: web::Data<Portal>,
    form: web::Json<LoginRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    debug!("Admin login attempt for: {}", form.email);
    let nav = portal.admin_sign_in(form.into_inner(), client_info(&req)).await?;
    Ok(HttpResponse::Ok().json(nav))
}

#[post("/auth/logout")]
async fn logout(portal: web::Data<Portal>, req: HttpRequest) -> HttpResponse {
    let token = access_token(&req);
    HttpResponse::Ok().json(portal.sign_out(token.as_deref()).await)
}

#[post("/auth/refresh")]
async fn refresh(
    portal: web::Data<Portal>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = portal.refresh(&body.refresh_token).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[get("/auth/session")]
async fn current_session(portal: web::Data<Portal>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req);
    Ok(HttpResponse::Ok().json(portal.session_info(token.as_deref()).await?))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::test as actix_test;
    use serde_json::json;

    use crate::handlers::test_support::*;
    use crate::models::Role;

    #[actix_web::test]
    async fn signup_returns_session_and_redirect() {
        let (_, _, portal) = fixtures();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/auth/signup")
            .set_json(json!({
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": "5551234567",
                "password": "abc123",
                "confirm_password": "abc123"
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/customer/dashboard");
        assert_eq!(body["notice"]["title"], "Account created successfully!");
        assert!(body["session"]["access_token"].is_string());
        assert!(body["session"]["user"].get("session_id").is_none());
    }

    #[actix_web::test]
    async fn signup_password_mismatch_names_the_field() {
        let (backend, _, portal) = fixtures();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/auth/signup")
            .set_json(json!({
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": "5551234567",
                "password": "abc123",
                "confirm_password": "abc124"
            }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["fields"]["confirm_password"], "Passwords don't match");
        assert_eq!(backend.calls(), 0);
    }

    #[actix_web::test]
    async fn admin_login_denies_customers() {
        let (backend, _, portal) = fixtures();
        backend.add_account("jane@example.com", "secret123", "Jane", Role::Customer);
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/admin/login")
            .set_json(json!({ "email": "jane@example.com", "password": "secret123" }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/admin/login");
        assert_eq!(body["notice"]["variant"], "destructive");
    }

    #[actix_web::test]
    async fn customer_login_with_bad_password_is_unauthorized() {
        let (backend, _, portal) = fixtures();
        backend.add_account("jane@example.com", "secret123", "Jane", Role::Customer);
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "jane@example.com", "password": "wrong" }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Invalid login credentials");
    }

    #[actix_web::test]
    async fn logout_redirects_home() {
        let (backend, _, portal) = fixtures();
        let (_, token) = backend.customer("jane@example.com");
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/");
        assert_eq!(body["notice"]["title"], "Logged out successfully");
        assert_eq!(backend.live_sessions(), 0);
    }

    #[actix_web::test]
    async fn session_endpoint_reports_role() {
        let (backend, _, portal) = fixtures();
        let (_, token) = backend.admin();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::get()
            .uri("/api/auth/session")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["is_admin"], true);
        assert_eq!(body["user"]["email"], "admin@amptech.test");
    }

    #[actix_web::test]
    async fn refresh_with_unknown_token_is_unauthorized() {
        let (_, _, portal) = fixtures();
        let app = actix_test::init_service(app(portal)).await;
        let request = actix_test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh_token": "nope" }))
            .to_request();
        let response = actix_test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
