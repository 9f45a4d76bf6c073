use serde::Serialize;
use tracing::{error, info, warn};

use super::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Missing,
    FormatDrift,
    Transient,
    Rejected,
    Internal,
    Input,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Missing => "missing",
            ErrorCategory::FormatDrift => "format_drift",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Rejected => "rejected",
            ErrorCategory::Internal => "internal",
            ErrorCategory::Input => "input",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ErrorCategorizer;

impl ErrorCategorizer {
    pub fn categorize(error: &HarvestError) -> ErrorCategory {
        match error {
            HarvestError::NotFound(_) => ErrorCategory::Missing,
            HarvestError::Parse(_) => ErrorCategory::FormatDrift,
            HarvestError::Network(_) | HarvestError::Timeout(_) | HarvestError::RateLimited(_) => {
                ErrorCategory::Transient
            }
            HarvestError::HttpStatus { .. } | HarvestError::Upstream(_) => ErrorCategory::Rejected,
            HarvestError::TokenReused { .. } | HarvestError::Unexpected(_) => {
                ErrorCategory::Internal
            }
            HarvestError::InvalidTarget(_) | HarvestError::Config(_) => ErrorCategory::Input,
        }
    }
}

impl HarvestError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategorizer::categorize(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RemediationAction {
    RetryScheduled { delay_ms: u64 },
    Abort,
}

/// Logs one failed attempt. Format drift is always logged at error level so it
/// stands apart from missing content and flaky networks.
pub fn report_failure(
    operation: &str,
    error: &HarvestError,
    attempt: usize,
    action: &RemediationAction,
) {
    let category = error.category();
    match (category, action) {
        (ErrorCategory::FormatDrift, _) => error!(
            operation,
            attempt,
            category = %category,
            error = %error,
            "upstream format drift detected"
        ),
        (_, RemediationAction::RetryScheduled { delay_ms }) => warn!(
            operation,
            attempt,
            delay_ms = *delay_ms,
            category = %category,
            error = %error,
            "transient failure, retry scheduled"
        ),
        (ErrorCategory::Missing, RemediationAction::Abort) => info!(
            operation,
            attempt,
            category = %category,
            error = %error,
            "content unavailable"
        ),
        (_, RemediationAction::Abort) => error!(
            operation,
            attempt,
            category = %category,
            error = %error,
            "operation aborted"
        ),
    }
}
