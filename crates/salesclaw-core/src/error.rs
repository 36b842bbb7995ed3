//! Error types for SalesClaw.

use thiserror::Error;

/// Errors raised across the SalesClaw crates.
///
/// Evaluation never produces one of these: a trigger that cannot evaluate
/// reports it through its result context instead.
#[derive(Debug, Error)]
pub enum SalesClawError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("Action error: {0}")]
    Action(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl SalesClawError {
    /// Shorthand for an invalid rule definition.
    pub fn invalid_rule(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SalesClawError>;
