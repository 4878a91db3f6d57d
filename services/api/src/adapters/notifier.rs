//! services/api/src/adapters/notifier.rs
//!
//! Delivery of password-reset codes. No mail transport is wired in; the code is
//! written to the log so operators can relay it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use study_assistant_core::ports::{PortResult, ResetCodeNotifier};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LoggingResetNotifier;

#[async_trait]
impl ResetCodeNotifier for LoggingResetNotifier {
    async fn send_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        info!(email, code, %expires_at, "Password reset code issued");
        Ok(())
    }
}
