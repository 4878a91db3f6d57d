//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the study-session endpoints and the master
//! definition for the OpenAPI specification. Every handler here runs behind
//! `require_identity` and receives the resolved [`Owner`] as an extension.

use crate::adapters::StoreLifecycle;
use crate::error::{ApiError, ErrorResponse};
use crate::web::auth::{self, MessageResponse};
use crate::web::extract::ApiJson;
use crate::web::state::AppState;
use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_assistant_core::domain::{Owner, Question, SessionDetails, SessionUpload, StudySession};
use study_assistant_core::ports::PortError;
use study_assistant_core::{IncomingFile, UploadError};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Name of the multipart part carrying the document.
const FILE_FIELD: &str = "file";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::guest_login_handler,
        auth::send_reset_otp_handler,
        auth::reset_password_handler,
        health_handler,
        list_sessions_handler,
        create_session_handler,
        update_session_handler,
        delete_session_handler,
        upload_handler,
        session_data_handler,
        session_summary_handler,
        session_questions_handler,
    ),
    components(
        schemas(
            auth::SignupRequest, auth::LoginRequest, auth::LoginResponse, auth::UserResponse,
            auth::GuestLoginResponse, auth::SendResetOtpRequest, auth::SendResetOtpResponse,
            auth::ResetPasswordRequest, MessageResponse, ErrorResponse, HealthResponse,
            SessionRequest, SessionResponse, QuestionResponse, UploadResponse,
            SessionDataResponse, SummaryResponse, QuestionsResponse
        )
    ),
    tags(
        (name = "auth", description = "User accounts, guest sessions and password reset."),
        (name = "study", description = "Study sessions, document upload and generated study material.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SessionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
}

/// One multiple-choice question; `answer` is the letter of the correct option.
#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl From<&Question> for QuestionResponse {
    fn from(q: &Question) -> Self {
        Self {
            question: q.text().to_string(),
            options: q.options().to_vec(),
            answer: q.answer().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    pub name: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub questions: Vec<QuestionResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudySession> for SessionResponse {
    fn from(session: StudySession) -> Self {
        let questions = session.questions().iter().map(QuestionResponse::from).collect();
        let (file_id, file_name, summary) = match session.upload {
            Some(upload) => (
                Some(upload.file_ref.to_string()),
                Some(upload.file_name),
                Some(upload.summary),
            ),
            None => (None, None, None),
        };
        Self {
            id: session.id,
            user_id: session.owner.user_id(),
            guest_id: session.owner.guest_id().map(|g| g.to_string()),
            name: session.name,
            subject: session.subject,
            file_id,
            file_name,
            summary,
            questions,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub session: SessionResponse,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDataResponse {
    pub file_name: String,
    pub summary: String,
    pub questions: Vec<QuestionResponse>,
    pub extracted_text: String,
}

impl From<SessionUpload> for SessionDataResponse {
    fn from(upload: SessionUpload) -> Self {
        Self {
            questions: upload.questions.iter().map(QuestionResponse::from).collect(),
            file_name: upload.file_name,
            summary: upload.summary,
            extracted_text: upload.extracted_text,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionsResponse {
    pub questions: Vec<QuestionResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Malformed ids are indistinguishable from unknown ones.
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::session_not_found())
}

fn session_details(req: &SessionRequest) -> Result<SessionDetails, ApiError> {
    SessionDetails::new(&req.name, &req.subject).map_err(|e| ApiError::Validation(e.to_string()))
}

fn not_found_as_session(e: PortError) -> ApiError {
    match e {
        PortError::NotFound(_) => ApiError::session_not_found(),
        other => ApiError::Port(other),
    }
}

async fn load_session(state: &AppState, owner: &Owner, raw_id: &str) -> Result<StudySession, ApiError> {
    let session_id = parse_session_id(raw_id)?;
    state
        .sessions
        .get_session(owner, session_id)
        .await
        .map_err(not_found_as_session)
}

/// Reads the `file` part into memory, giving up as soon as it exceeds `limit`.
async fn read_file_field(mut field: Field<'_>, limit: usize) -> Result<IncomingFile, ApiError> {
    let file_name = field.file_name().unwrap_or("upload.txt").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > limit {
            return Err(UploadError::TooLarge { limit }.into());
        }
        data.extend_from_slice(&chunk);
    }

    Ok(IncomingFile {
        file_name,
        content_type,
        data: data.freeze(),
    })
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return UploadError::TooLarge {
            limit: study_assistant_core::MAX_UPLOAD_BYTES,
        }
        .into();
    }
    warn!("Malformed multipart request: {}", e.body_text());
    ApiError::Validation("Malformed multipart request".to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness plus the state of the store connection.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "study",
    responses(
        (status = 200, description = "Store is ready", body = HealthResponse),
        (status = 503, description = "Store is not ready", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = *state.store_status.borrow();
    let (status, label) = match store {
        StoreLifecycle::Ready => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            store: store.to_string(),
        }),
    )
}

/// List the caller's study sessions, oldest first.
#[utoipa::path(
    get,
    path = "/api/study/sessions",
    tag = "study",
    responses(
        (status = 200, description = "The caller's sessions", body = [SessionResponse]),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Invalid token", body = ErrorResponse)
    )
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state.sessions.list_sessions(&owner).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/study/sessions",
    tag = "study",
    request_body = SessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 400, description = "Name and subject are required", body = ErrorResponse),
        (status = 401, description = "No identity", body = ErrorResponse)
    )
)]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    ApiJson(req): ApiJson<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let details = session_details(&req)?;
    let session = state.sessions.create_session(&owner, &details).await?;
    info!(session_id = %session.id, %owner, "Study session created");
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// Rename a session or change its subject.
#[utoipa::path(
    put,
    path = "/api/study/sessions/{id}",
    tag = "study",
    request_body = SessionRequest,
    params(("id" = String, Path, description = "Study session id")),
    responses(
        (status = 200, description = "Session updated", body = SessionResponse),
        (status = 400, description = "Name and subject are required", body = ErrorResponse),
        (status = 404, description = "Study session not found", body = ErrorResponse)
    )
)]
pub async fn update_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let details = session_details(&req)?;
    let session = state
        .sessions
        .rename_session(&owner, session_id, &details)
        .await
        .map_err(not_found_as_session)?;
    Ok(Json(session.into()))
}

/// Delete a session together with its uploaded file.
#[utoipa::path(
    delete,
    path = "/api/study/sessions/{id}",
    tag = "study",
    params(("id" = String, Path, description = "Study session id")),
    responses(
        (status = 200, description = "Session and file deleted", body = MessageResponse),
        (status = 404, description = "Study session not found", body = ErrorResponse)
    )
)]
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .sessions
        .delete_session(&owner, session_id)
        .await
        .map_err(not_found_as_session)?;

    // The record is gone either way; a leaked blob is only worth a log line.
    if let Some(upload) = &session.upload {
        if let Err(e) = state.blobs.delete_blob(&upload.file_ref).await {
            error!(%session_id, blob = %upload.file_ref, "Failed to release blob: {}", e);
        }
    }

    info!(%session_id, %owner, "Study session deleted");
    Ok(MessageResponse::new(
        "Study session and associated data deleted successfully",
    ))
}

/// Upload a document and generate its summary and questions.
///
/// Accepts a multipart/form-data request whose `file` part holds the document
/// (PDF, DOCX or plain text, at most 5 MB). Any previous upload is replaced.
#[utoipa::path(
    post,
    path = "/api/study/sessions/{id}/upload",
    tag = "study",
    params(("id" = String, Path, description = "Study session id")),
    request_body(content_type = "multipart/form-data", description = "The document to upload in the `file` part."),
    responses(
        (status = 200, description = "File processed successfully", body = UploadResponse),
        (status = 400, description = "No file, file too large, unsupported or empty", body = ErrorResponse),
        (status = 404, description = "Study session not found", body = ErrorResponse),
        (status = 500, description = "Error reading or processing file", body = ErrorResponse)
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let mut multipart = multipart?;
    let limit = state.pipeline.max_upload_bytes();

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            file = Some(read_file_field(field, limit).await?);
            break;
        }
    }

    let session = state.pipeline.run(&owner, session_id, file).await?;
    Ok(Json(UploadResponse {
        message: "File processed successfully".to_string(),
        session: session.into(),
    }))
}

/// Everything derived from the uploaded file.
#[utoipa::path(
    get,
    path = "/api/study/sessions/{id}/data",
    tag = "study",
    params(("id" = String, Path, description = "Study session id")),
    responses(
        (status = 200, description = "Upload-derived data", body = SessionDataResponse),
        (status = 404, description = "Session not found or no file uploaded", body = ErrorResponse)
    )
)]
pub async fn session_data_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<SessionDataResponse>, ApiError> {
    let upload = load_session(&state, &owner, &id)
        .await?
        .upload
        .ok_or_else(|| ApiError::NotFound("No file uploaded for this session".to_string()))?;
    Ok(Json(upload.into()))
}

#[utoipa::path(
    get,
    path = "/api/study/sessions/{id}/summary",
    tag = "study",
    params(("id" = String, Path, description = "Study session id")),
    responses(
        (status = 200, description = "The generated summary", body = SummaryResponse),
        (status = 404, description = "Session not found or no file uploaded", body = ErrorResponse)
    )
)]
pub async fn session_summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let session = load_session(&state, &owner, &id).await?;
    let summary = session.summary().ok_or_else(|| {
        ApiError::NotFound("Summary not found. Please upload a file first.".to_string())
    })?;
    Ok(Json(SummaryResponse {
        summary: summary.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/study/sessions/{id}/questions",
    tag = "study",
    params(("id" = String, Path, description = "Study session id")),
    responses(
        (status = 200, description = "The generated questions", body = QuestionsResponse),
        (status = 404, description = "Session not found or no file uploaded", body = ErrorResponse)
    )
)]
pub async fn session_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<QuestionsResponse>, ApiError> {
    let session = load_session(&state, &owner, &id).await?;
    // An upload whose model output yielded no usable question reads as "nothing yet".
    let questions = session.questions();
    if questions.is_empty() {
        return Err(ApiError::NotFound(
            "Questions not found. Please upload a file first.".to_string(),
        ));
    }
    Ok(Json(QuestionsResponse {
        questions: questions.iter().map(QuestionResponse::from).collect(),
    }))
}
