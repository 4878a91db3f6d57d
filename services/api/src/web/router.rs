//! services/api/src/web/router.rs
//!
//! Assembles the HTTP surface: public auth routes, the identity-guarded study
//! routes, and the Swagger UI.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use study_assistant_core::MAX_UPLOAD_BYTES;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::error::ApiError;
use crate::web::{
    auth::{
        guest_login_handler, login_handler, reset_password_handler, send_reset_otp_handler,
        signup_handler,
    },
    identity::{require_identity, GUEST_HEADER},
    rest::{
        create_session_handler, delete_session_handler, health_handler, list_sessions_handler,
        session_data_handler, session_questions_handler, session_summary_handler,
        update_session_handler, upload_handler, ApiDoc,
    },
    state::AppState,
};

/// Builds the API router. Uploads above the 5 MB ceiling are refused by the
/// upload handler itself; the body limit only stops runaway requests.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/api/signup", post(signup_handler))
        .route("/api/login", post(login_handler))
        .route("/api/guest/login", post(guest_login_handler))
        .route("/api/send-reset-otp", post(send_reset_otp_handler))
        .route("/api/reset-password", post(reset_password_handler))
        .route("/api/health", get(health_handler));

    // Session-scoped routes (user or guest identity required)
    let protected_routes = Router::new()
        .route(
            "/api/study/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route(
            "/api/study/sessions/{id}",
            put(update_session_handler).delete(delete_session_handler),
        )
        .route("/api/study/sessions/{id}/upload", post(upload_handler))
        .route("/api/study/sessions/{id}/data", get(session_data_handler))
        .route("/api/study/sessions/{id}/summary", get(session_summary_handler))
        .route(
            "/api/study/sessions/{id}/questions",
            get(session_questions_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(2 * MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// The API router plus Swagger UI at `/swagger-ui`.
pub fn app(state: Arc<AppState>) -> Router {
    router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// CORS for the configured front end; credentials are allowed so the guest cookie flows.
pub fn cors_layer(config: &Config) -> Result<CorsLayer, ApiError> {
    let origin = config.frontend_url.parse::<HeaderValue>().map_err(|_| {
        ApiError::Internal(format!("Invalid FRONTEND_URL '{}'", config.frontend_url))
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(GUEST_HEADER),
        ]))
}
