//! Error taxonomy shared by the services.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("model provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{vendor} returned {status}: {message}")]
    Api {
        vendor: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// True for inserts/updates rejected by a UNIQUE constraint.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Rejects `None` and blank strings, returning the trimmed value.
pub fn required(value: Option<String>, field: &str) -> ServiceResult<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::validation(format!(
            "'{field}' is required and must not be empty."
        ))),
    }
}

/// Trims the value, treating blank strings as absent.
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_accepts_values() {
        assert_eq!(required(Some("  bot ".into()), "bot_name").unwrap(), "bot");
    }

    #[test]
    fn test_required_rejects_missing_and_blank() {
        for value in [None, Some(String::new()), Some("   ".into())] {
            let error = required(value, "message").unwrap_err();
            assert!(matches!(error, ServiceError::Validation(ref m) if m.contains("'message'")));
        }
    }

    #[test]
    fn test_optional_drops_blank_values() {
        assert_eq!(optional(Some(" x ".into())), Some("x".to_owned()));
        assert_eq!(optional(Some("  ".into())), None);
        assert_eq!(optional(None), None);
    }
}
