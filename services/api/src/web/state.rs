//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::StoreLifecycle;
use crate::config::Config;
use crate::web::token::TokenIssuer;
use std::sync::Arc;
use study_assistant_core::ports::{BlobStore, ResetCodeNotifier, SessionStore, UserStore};
use study_assistant_core::UploadPipeline;
use tokio::sync::watch;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub users: Arc<dyn UserStore>,
    pub notifier: Arc<dyn ResetCodeNotifier>,
    pub pipeline: Arc<UploadPipeline>,
    pub tokens: TokenIssuer,
    pub config: Arc<Config>,
    /// Current lifecycle of the store handle, reported by the health endpoint.
    pub store_status: watch::Receiver<StoreLifecycle>,
}
