//! Error types for the automation core.

use thiserror::Error;

/// Failures reported by a [`Page`](crate::Page) backend.
#[derive(Debug, Error)]
pub enum PageError {
    /// The page or its connection went away.
    #[error("Page detached")]
    Detached,

    /// An element handle no longer refers to a live node.
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// A script evaluated in the page threw.
    #[error("Script error: {0}")]
    Script(String),

    /// Transport or protocol failure in the backend.
    #[error("Browser error: {0}")]
    Backend(String),
}

/// Errors surfaced by the automation state machine.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Selector never matched within the observation window.
    #[error("Element not found: {selector}")]
    NotFound { selector: String },

    /// A required control was missing or disabled.
    #[error("Submission failed: {reason}")]
    Submission { reason: String },

    /// A run was requested while another one is active.
    #[error("Automation already running")]
    AlreadyRunning,

    /// The run configuration cannot be executed.
    #[error("Invalid run config: {0}")]
    InvalidConfig(String),

    /// The page backend failed.
    #[error(transparent)]
    Page(#[from] PageError),
}

impl AutomationError {
    pub(crate) fn not_found(selector: &str) -> Self {
        Self::NotFound {
            selector: selector.to_string(),
        }
    }

    pub(crate) fn submission(reason: impl Into<String>) -> Self {
        Self::Submission {
            reason: reason.into(),
        }
    }
}

/// Result type for automation operations.
pub type AutomationResult<T> = Result<T, AutomationError>;
