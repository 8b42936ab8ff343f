use pitch_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("document contains no extractable text")]
    EmptyContent,

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// `true` when the caller sent something unusable and retrying the same request
    /// cannot succeed. Everything else is a service-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedFormat(_)
                | AppError::Extraction(_)
                | AppError::EmptyContent
                | AppError::NotFound(_)
                | AppError::Forbidden(_)
                | AppError::Unauthorized(_)
                | AppError::InvalidInput(_)
        )
    }

    /// Message safe to show an end user. Service-side failures are reported generically
    /// so driver and filesystem detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::UnsupportedFormat(_) => {
                "unsupported file format, only PDF and PPTX are accepted".to_string()
            }
            AppError::Extraction(_) | AppError::EmptyContent => {
                "document unreadable or empty".to_string()
            }
            AppError::Classification(_) | AppError::Common(CommonError::ModelUnavailable(_)) => {
                "scoring service unavailable, try again later".to_string()
            }
            AppError::Storage(_) | AppError::Database(_) => {
                "storage unavailable, try again later".to_string()
            }
            e if e.is_client_error() => e.to_string(),
            _ => "internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_client_errors() {
        assert!(AppError::UnsupportedFormat("csv".into()).is_client_error());
        assert!(AppError::EmptyContent.is_client_error());
        assert!(AppError::Extraction("bad xref".into()).is_client_error());
        assert!(!AppError::Storage("disk full".into()).is_client_error());
        assert!(!AppError::Classification("model down".into()).is_client_error());
    }

    #[test]
    fn public_message_hides_internal_detail() {
        let err = AppError::Storage("/var/uploads/abc.partial: No space left on device".into());
        assert!(!err.public_message().contains("/var/uploads"));

        let err = AppError::Extraction("xref table broken at offset 991".into());
        assert_eq!(err.public_message(), "document unreadable or empty");

        let err = AppError::NotFound("startup for founder".into());
        assert_eq!(err.public_message(), "not found: startup for founder");
    }
}
