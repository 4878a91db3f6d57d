//! crates/study_assistant_core/src/pipeline.rs
//!
//! The upload pipeline: a strictly sequential state machine
//! `Received -> Stored -> Extracted -> Processed -> Persisted`, where each step
//! consumes the previous step's typed result. Any failure ends the upload and
//! leaves no trace: the blob written in `Stored` is released again.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assistant::{StudyAssistant, StudyMaterial};
use crate::domain::{BlobRef, Owner, SessionUpload, StudySession};
use crate::ports::{BlobStore, ExtractionError, PortError, SessionStore, TextExtractionService};

/// Upload size ceiling, enforced before anything is written.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file uploaded")]
    NoFile,
    #[error("File is too large. The maximum size is {} MB", .limit / (1024 * 1024))]
    TooLarge { limit: usize },
    #[error("{0}")]
    UnsupportedFormat(String),
    #[error("Error reading file: {0}")]
    ExtractionFailure(String),
    #[error("The uploaded file contains no readable text")]
    EmptyDocument,
    #[error("Study session not found")]
    SessionNotFound,
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

//=========================================================================================
// Intermediate States
//=========================================================================================

struct Received {
    file: IncomingFile,
}

struct Stored {
    file_name: String,
    data: Bytes,
    blob: BlobRef,
}

struct Extracted {
    stored: Stored,
    text: String,
}

struct Processed {
    extracted: Extracted,
    material: StudyMaterial,
}

//=========================================================================================
// The Pipeline
//=========================================================================================

pub struct UploadPipeline {
    sessions: Arc<dyn SessionStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractionService>,
    assistant: Arc<StudyAssistant>,
    max_upload_bytes: usize,
}

impl UploadPipeline {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractionService>,
        assistant: Arc<StudyAssistant>,
    ) -> Self {
        Self {
            sessions,
            blobs,
            extractor,
            assistant,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Runs one upload for `session_id` on behalf of `owner` and returns the updated session.
    pub async fn run(
        &self,
        owner: &Owner,
        session_id: Uuid,
        file: Option<IncomingFile>,
    ) -> Result<StudySession, UploadError> {
        let received = self.receive(file)?;
        info!(%session_id, %owner, file_name = %received.file.file_name, "Upload received");

        let stored = self.store(received).await?;
        debug!(%session_id, blob = %stored.blob, "Upload stored");

        let extracted = self.extract(stored).await?;
        debug!(%session_id, chars = extracted.text.chars().count(), "Text extracted");

        let processed = self.process(extracted).await;
        let session = self.persist(owner, session_id, processed).await?;
        info!(%session_id, "Upload processed and persisted");
        Ok(session)
    }

    fn receive(&self, file: Option<IncomingFile>) -> Result<Received, UploadError> {
        let file = file.ok_or(UploadError::NoFile)?;
        if file.data.len() > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_upload_bytes,
            });
        }
        Ok(Received { file })
    }

    async fn store(&self, received: Received) -> Result<Stored, UploadError> {
        let IncomingFile {
            file_name,
            content_type,
            data,
        } = received.file;
        let blob = BlobRef::generate(&file_name);

        self.blobs
            .put_blob(&blob, &file_name, &content_type, data.clone())
            .await
            .map_err(UploadError::Storage)?;

        Ok(Stored {
            file_name,
            data,
            blob,
        })
    }

    async fn extract(&self, stored: Stored) -> Result<Extracted, UploadError> {
        let outcome = self
            .extractor
            .extract_text(stored.data.clone(), &stored.file_name)
            .await;

        let failure = match outcome {
            Ok(text) if !text.trim().is_empty() => return Ok(Extracted { stored, text }),
            Ok(_) => UploadError::EmptyDocument,
            Err(ExtractionError::UnsupportedFormat(message)) => {
                UploadError::UnsupportedFormat(message)
            }
            Err(ExtractionError::Malformed(message)) => UploadError::ExtractionFailure(message),
        };

        self.release(&stored.blob).await;
        Err(failure)
    }

    async fn process(&self, extracted: Extracted) -> Processed {
        let material = self.assistant.process(&extracted.text).await;
        if material.degraded {
            warn!(blob = %extracted.stored.blob, "Persisting degraded study material");
        }
        Processed {
            extracted,
            material,
        }
    }

    async fn persist(
        &self,
        owner: &Owner,
        session_id: Uuid,
        processed: Processed,
    ) -> Result<StudySession, UploadError> {
        let Processed {
            extracted,
            material,
        } = processed;
        let blob = extracted.stored.blob.clone();

        let upload = SessionUpload {
            file_ref: extracted.stored.blob,
            file_name: extracted.stored.file_name,
            extracted_text: extracted.text,
            summary: material.summary,
            questions: material.questions,
        };

        match self.sessions.attach_upload(owner, session_id, upload).await {
            Ok(attached) => {
                if let Some(previous) = attached.replaced.filter(|p| *p != blob) {
                    self.release(&previous).await;
                }
                Ok(attached.session)
            }
            Err(e) => {
                self.release(&blob).await;
                match e {
                    PortError::NotFound(_) => Err(UploadError::SessionNotFound),
                    other => Err(UploadError::Storage(other)),
                }
            }
        }
    }

    async fn release(&self, blob: &BlobRef) {
        if let Err(e) = self.blobs.delete_blob(blob).await {
            warn!(%blob, error = %e, "Failed to release blob");
        }
    }
}
