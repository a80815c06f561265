//! Error types shared by the API client and the managers.

use crate::models::{ProcessingStatus, SourceType};

/// Longest conversation title the backend accepts from this client.
pub const MAX_TITLE_LEN: usize = 50;

/// Largest file accepted for a datasource upload (5 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Client-side validation failures, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("Title must contain at least 1 character")]
    TitleEmpty,

    #[error("Title cannot exceed 50 characters (current: {len})")]
    TitleTooLong { len: usize },

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Password fields didn't match.")]
    PasswordMismatch,

    #[error("Please select a file type.")]
    SourceTypeMissing,

    #[error("Please select a file.")]
    FileMissing,

    #[error("Please select a PDF, DOC, or TXT file.")]
    UnsupportedFile { mime: String },

    #[error("File size must be less than 5MB.")]
    FileTooLarge { size: u64 },

    #[error(
        "Selected file type doesn't match the chosen type. Please select a {} file or change the file type.",
        .chosen.label()
    )]
    TypeMismatch { chosen: SourceType, detected: SourceType },

    #[error("Source can only be processed if unprocessed or previously failed (currently {status})")]
    NotProcessable { status: ProcessingStatus },
}

impl ValidationError {
    /// Form field the error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Required { field } => *field,
            ValidationError::TitleEmpty | ValidationError::TitleTooLong { .. } => "title",
            ValidationError::EmptyMessage => "content",
            ValidationError::PasswordMismatch => "password2",
            ValidationError::SourceTypeMissing => "source_type",
            ValidationError::FileMissing
            | ValidationError::UnsupportedFile { .. }
            | ValidationError::FileTooLarge { .. }
            | ValidationError::TypeMismatch { .. } => "file",
            ValidationError::NotProcessable { .. } => "processing_status",
        }
    }
}

/// Every failure a manager or the API client can report.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No conversation selected")]
    NoConversationSelected,

    #[error("Authentication required")]
    Unauthorized { message: Option<String> },

    #[error("Request failed with status {status}")]
    Http { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// The one-line message a manager stores for display.
    ///
    /// Local errors speak for themselves; server errors use the body's error
    /// text when the backend sent one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Validation(err) => err.to_string(),
            ApiError::NoConversationSelected | ApiError::Io(_) => self.to_string(),
            ApiError::Unauthorized { message } | ApiError::Http { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_string())
            }
            ApiError::Network(_) | ApiError::Decode(_) | ApiError::InvalidUrl { .. } => {
                fallback.to_string()
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_too_long_cites_length() {
        let err = ValidationError::TitleTooLong { len: 51 };
        assert_eq!(
            err.to_string(),
            "Title cannot exceed 50 characters (current: 51)"
        );
        assert_eq!(err.field(), "title");
    }

    #[test]
    fn test_type_mismatch_names_chosen_type() {
        let err = ValidationError::TypeMismatch {
            chosen: SourceType::Doc,
            detected: SourceType::Pdf,
        };
        assert!(err.to_string().contains("Please select a DOC file"));
        assert_eq!(err.field(), "file");
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ApiError::Http {
            status: 400,
            message: Some("Invalid credentials".to_string()),
        };
        assert_eq!(err.user_message("Login failed"), "Invalid credentials");

        let err = ApiError::Http { status: 500, message: None };
        assert_eq!(err.user_message("Login failed"), "Login failed");
    }

    #[test]
    fn test_user_message_for_local_errors() {
        let err = ApiError::from(ValidationError::FileMissing);
        assert_eq!(err.user_message("ignored"), "Please select a file.");
        assert_eq!(
            ApiError::NoConversationSelected.user_message("ignored"),
            "No conversation selected"
        );
    }
}
