//! Error reporting
//!
//! Failures that do not abort an operation (cache overflow, I/O errors that
//! survived retries) are logged here and forwarded to the user's callback.

use crate::config::ErrorHook;
use crate::error::TreeError;

/// Logs non-fatal failures and forwards them to an optional callback
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    hook: Option<ErrorHook>,
}

impl Reporter {
    pub fn new(hook: Option<ErrorHook>) -> Self {
        Self { hook }
    }

    /// Report a persistent failure
    pub fn error(&self, err: &TreeError) {
        tracing::error!(error = %err, "storage failure");
        if let Some(hook) = &self.hook {
            hook.call(err);
        }
    }

    /// Report a recoverable condition
    pub fn warn(&self, err: &TreeError) {
        tracing::warn!(error = %err, "storage warning");
        if let Some(hook) = &self.hook {
            hook.call(err);
        }
    }
}
