pub mod connection;
pub mod db;
pub mod extractor;
pub mod memory;
pub mod notifier;
pub mod openai_llm;

pub use connection::{StoreLifecycle, StoreMonitor};
pub use db::DbAdapter;
pub use extractor::DocumentExtractor;
pub use memory::InMemoryStore;
pub use notifier::LoggingResetNotifier;
pub use openai_llm::OpenAiTextAdapter;
