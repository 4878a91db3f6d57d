pub mod assistant;
pub mod domain;
pub mod pipeline;
pub mod ports;
pub mod question_parser;

pub use assistant::{AssistantSettings, StudyAssistant, StudyMaterial};
pub use domain::{
    AnswerKey, BlobRef, DocumentFormat, GuestId, Owner, PasswordReset, Question, SessionDetails,
    SessionUpload, StudySession, User, UserCredentials,
};
pub use pipeline::{IncomingFile, UploadError, UploadPipeline, MAX_UPLOAD_BYTES};
pub use ports::{
    AttachedUpload, BlobStore, ExtractionError, GenerationRequest, PortError, PortResult,
    ResetCodeNotifier, SessionStore, TextExtractionService, TextGenerationService, UserStore,
};
