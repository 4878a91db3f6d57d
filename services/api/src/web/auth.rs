//! services/api/src/web/auth.rs
//!
//! Identity endpoints: user signup and login, guest login, and the one-time-code
//! password reset flow.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_assistant_core::domain::{GuestId, PasswordReset, User, UserCredentials};
use study_assistant_core::ports::PortError;
use tracing::{error, info};
use uuid::Uuid;
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorResponse};
use crate::web::extract::ApiJson;
use crate::web::identity::GUEST_COOKIE;
use crate::web::state::AppState;

/// Guest cookies live for one day.
const GUEST_COOKIE_MAX_AGE_SECS: i64 = 24 * 60 * 60;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestLoginResponse {
    pub message: String,
    pub guest_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SendResetOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct SendResetOtpResponse {
    pub message: String,
    pub otp: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    pub new_password: String,
}

/// A body carrying only a human-readable message.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/api/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = MessageResponse),
        (status = 400, description = "Missing field or duplicate username/email", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Username, email and password are required".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let user = state
        .users
        .create_user(username, email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                ApiError::Validation("Username or email already exists".to_string())
            }
            other => ApiError::Port(other),
        })?;

    info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, MessageResponse::new("User created successfully")))
}

/// POST /api/login - Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Unknown user or wrong password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let credentials = state
        .users
        .find_by_identifier(req.identifier.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::Unauthorized("User not found".to_string()),
            other => ApiError::Port(other),
        })?;

    if !verify_password(&req.password, &credentials)? {
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    let token = state.tokens.issue(credentials.user.id).map_err(|e| {
        error!("Failed to sign token: {:?}", e);
        ApiError::Internal("Failed to sign token".to_string())
    })?;

    info!(user_id = %credentials.user.id, "User logged in");
    Ok(Json(LoginResponse {
        token,
        user: credentials.user.into(),
    }))
}

/// POST /api/guest/login - Start an anonymous guest session
#[utoipa::path(
    post,
    path = "/api/guest/login",
    tag = "auth",
    responses(
        (status = 200, description = "Guest session started; also sets the guestId cookie", body = GuestLoginResponse)
    )
)]
pub async fn guest_login_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guest_id = GuestId::generate();

    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        GUEST_COOKIE, guest_id, GUEST_COOKIE_MAX_AGE_SECS
    );
    if state.config.cookie_secure {
        cookie.push_str("; Secure");
    }

    info!(%guest_id, "Guest session started");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(GuestLoginResponse {
            message: "Guest session started".to_string(),
            guest_id: guest_id.to_string(),
        }),
    )
}

/// POST /api/send-reset-otp - Issue a one-time password-reset code
#[utoipa::path(
    post,
    path = "/api/send-reset-otp",
    tag = "auth",
    request_body = SendResetOtpRequest,
    responses(
        (status = 200, description = "OTP sent successfully", body = SendResetOtpResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn send_reset_otp_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SendResetOtpRequest>,
) -> Result<Json<SendResetOtpResponse>, ApiError> {
    let credentials = find_user_by_email(&state, &req.email).await?;

    let reset = PasswordReset {
        code: generate_reset_code(),
        expires_at: Utc::now() + PasswordReset::ttl(),
    };
    state
        .users
        .set_password_reset(credentials.user.id, &reset)
        .await?;
    state
        .notifier
        .send_reset_code(&credentials.user.email, &reset.code, reset.expires_at)
        .await?;

    Ok(Json(SendResetOtpResponse {
        message: "OTP sent successfully".to_string(),
        otp: reset.code,
    }))
}

/// POST /api/reset-password - Set a new password using a one-time code
#[utoipa::path(
    post,
    path = "/api/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successfully", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.new_password.is_empty() {
        return Err(ApiError::Validation("New password is required".to_string()));
    }

    let credentials = find_user_by_email(&state, &req.email).await?;

    let accepted = credentials
        .reset
        .as_ref()
        .is_some_and(|reset| reset.accepts(&req.otp, Utc::now()));
    if !accepted {
        return Err(ApiError::Validation("Invalid or expired OTP".to_string()));
    }

    let password_hash = hash_password(&req.new_password)?;
    state
        .users
        .update_password(credentials.user.id, &password_hash)
        .await?;

    info!(user_id = %credentials.user.id, "Password reset");
    Ok(MessageResponse::new("Password reset successfully"))
}

//=========================================================================================
// Helpers
//=========================================================================================

async fn find_user_by_email(state: &AppState, email: &str) -> Result<UserCredentials, ApiError> {
    state
        .users
        .find_by_email(email.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::NotFound("User not found".to_string()),
            other => ApiError::Port(other),
        })
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn verify_password(password: &str, credentials: &UserCredentials) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(&credentials.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Six random digits.
fn generate_reset_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}
