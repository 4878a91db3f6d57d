pub mod auth;
pub mod extract;
pub mod identity;
pub mod rest;
pub mod router;
pub mod state;
pub mod token;

// Re-export what the binaries and integration tests need to build the server.
pub use identity::require_identity;
pub use router::{app, cors_layer, router};
pub use state::AppState;
pub use token::TokenIssuer;
