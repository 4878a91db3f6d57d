//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    BlobRef, Owner, PasswordReset, SessionDetails, SessionUpload, StudySession, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Why a document could not be turned into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The format is recognised but deliberately not supported.
    #[error("{0}")]
    UnsupportedFormat(String),
    /// The format-specific parser failed on the input.
    #[error("failed to extract text: {0}")]
    Malformed(String),
}

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// The result of attaching a processed upload to a session.
#[derive(Debug, Clone)]
pub struct AttachedUpload {
    pub session: StudySession,
    /// The blob of the upload this one replaced, which is no longer referenced.
    pub replaced: Option<BlobRef>,
}

/// Study-session records. Every method is scoped by owner: a session that exists
/// but belongs to someone else is reported exactly like a missing one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn list_sessions(&self, owner: &Owner) -> PortResult<Vec<StudySession>>;

    async fn create_session(
        &self,
        owner: &Owner,
        details: &SessionDetails,
    ) -> PortResult<StudySession>;

    async fn get_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession>;

    async fn rename_session(
        &self,
        owner: &Owner,
        session_id: Uuid,
        details: &SessionDetails,
    ) -> PortResult<StudySession>;

    /// Removes the record and returns it, so the caller can release its blob.
    async fn delete_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession>;

    /// Replaces all upload-derived fields in one conditional write matched on
    /// id AND owner. Last writer wins.
    async fn attach_upload(
        &self,
        owner: &Owner,
        session_id: Uuid,
        upload: SessionUpload,
    ) -> PortResult<AttachedUpload>;
}

/// Raw bytes of uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(
        &self,
        blob_ref: &BlobRef,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> PortResult<()>;

    /// Deleting a blob that does not exist is reported as `NotFound`.
    async fn delete_blob(&self, blob_ref: &BlobRef) -> PortResult<()>;

    async fn blob_exists(&self, blob_ref: &BlobRef) -> PortResult<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` if the username or email is already taken.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User>;

    /// Looks a user up by username or email.
    async fn find_by_identifier(&self, identifier: &str) -> PortResult<UserCredentials>;

    async fn find_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn set_password_reset(&self, user_id: Uuid, reset: &PasswordReset) -> PortResult<()>;

    /// Stores the new hash and clears any pending reset.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()>;
}

//=========================================================================================
// Processing Ports
//=========================================================================================

/// One prompt for a generative-text backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Returns the model's textual completion for the request.
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String>;
}

#[async_trait]
pub trait TextExtractionService: Send + Sync {
    /// Converts an uploaded file into plain text, dispatching on the file name's extension.
    async fn extract_text(&self, data: Bytes, file_name: &str) -> Result<String, ExtractionError>;
}

/// Delivers password-reset codes (e.g. by email).
#[async_trait]
pub trait ResetCodeNotifier: Send + Sync {
    async fn send_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;
}
