//! # AppError
//!
//! Centralized error handling for learnhub.
//! Maps domain-specific failures to actionable error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Comment, Post, Session)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Input failed one or more declared rules
    #[error("validation error: {0}")]
    Validation(ValidationErrors),

    /// The action needs an authenticated (or sufficiently privileged) actor
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g., duplicate username)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many failed attempts for an identifier
    #[error("too many requests: {0}")]
    RateLimitExceeded(String),

    /// A best-effort collaborator (geo lookup, event dispatch) failed.
    /// Services log and swallow this; it never unwinds a committed write.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, rule: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::default();
        errors.push(field, rule, message);
        Self::Validation(errors)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// A single rule violation on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub rule: String,
    pub message: String,
}

/// Field-level detail surfaced to the caller on validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: &str, rule: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            rule: rule.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing was recorded, so validators can end with `errors.into_result()`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// A specialized Result type for learnhub logic.
pub type Result<T> = std::result::Result<T, AppError>;
