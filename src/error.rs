use serde::Serialize;

use crate::backend::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotAuthenticated,
    InvalidInput,
    NotFound,
    Conflict,
    RemoteFailure,
    Storage,
}

/// Error surfaced to the embedding UI. Serializable so a shell can
/// render the code and message next to the action that failed.
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            trace_id: Some(crate::observability::trace_id().to_string()),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_authenticated() -> Self {
        Self::new(ErrorCode::NotAuthenticated, "Not signed in")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteFailure, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl From<BackendError> for AppError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::NotAuthenticated => Self::not_authenticated(),
            BackendError::InvalidCredentials => {
                Self::new(ErrorCode::NotAuthenticated, "Invalid email or password")
            }
            BackendError::NotFound(what) => Self::not_found(what),
            BackendError::Conflict(what) => Self::conflict(what),
            other => Self::remote("Backend call failed").with_details(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        Self::storage("Local cache operation failed").with_details(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::remote("Invalid JSON payload").with_details(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_error_payload_shape() {
        let err = AppError::conflict("A pending friend request already exists")
            .with_details("sender u1, receiver u2");
        let json = serde_json::to_value(err).expect("serialize app error");

        assert_eq!(json["code"], "conflict");
        assert_eq!(json["message"], "A pending friend request already exists");
        assert_eq!(json["details"], "sender u1, receiver u2");
        assert!(json.get("trace_id").is_some());
    }

    #[test]
    fn backend_errors_map_onto_the_taxonomy() {
        let auth: AppError = BackendError::NotAuthenticated.into();
        assert_eq!(auth.code, ErrorCode::NotAuthenticated);

        let missing: AppError = BackendError::NotFound("users/u9".into()).into();
        assert_eq!(missing.code, ErrorCode::NotFound);

        let remote: AppError = BackendError::ChannelClosed.into();
        assert_eq!(remote.code, ErrorCode::RemoteFailure);
        assert!(remote.details.is_some());
    }
}
