use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid enrollment data: {message}")]
    ValidationError { message: String },

    #[error("Fee schedule error: {message}")]
    FeeScheduleError { message: String },

    #[error("Email error: {message}")]
    EmailError { message: String },

    #[error("Gmail authorization failed: {message}")]
    AuthError { message: String },

    #[error("PDF generation failed: {message}")]
    PdfError { message: String },

    #[error("Operation cancelled after {completed} of {total} families")]
    Cancelled {
        completed: usize,
        total: usize,
        /// Family ids already drafted, sent or written.
        processed: Vec<String>,
    },

    #[error("{source} (already handled families: {})", .processed.join(", "))]
    Interrupted {
        processed: Vec<String>,
        source: Box<InvoiceError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Configuration,
    Network,
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl InvoiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn fee_schedule(message: impl Into<String>) -> Self {
        Self::FeeScheduleError {
            message: message.into(),
        }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::EmailError {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    /// Wraps an error hit partway through a run. Nothing handled yet means a
    /// plain rerun is safe, so the error passes through unchanged.
    pub fn interrupted(processed: Vec<String>, source: InvoiceError) -> Self {
        if processed.is_empty() {
            source
        } else {
            Self::Interrupted {
                processed,
                source: Box::new(source),
            }
        }
    }

    /// Family ids a rerun should pass to `--skip-families`.
    pub fn processed_families(&self) -> &[String] {
        match self {
            Self::Cancelled { processed, .. } | Self::Interrupted { processed, .. } => processed.as_slice(),
            _ => &[],
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Interrupted { source, .. } => source.category(),
            Self::CsvError(_) | Self::ValidationError { .. } | Self::FeeScheduleError { .. } => {
                ErrorCategory::Input
            }
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ApiError(_) | Self::EmailError { .. } | Self::AuthError { .. } => {
                ErrorCategory::Network
            }
            Self::ZipError(_)
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::PdfError { .. } => ErrorCategory::System,
            Self::Cancelled { .. } => ErrorCategory::User,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Interrupted { source, .. } => source.severity(),
            Self::Cancelled { .. } => ErrorSeverity::Low,
            // 網路錯誤通常可以重試
            Self::ApiError(_) | Self::EmailError { .. } | Self::AuthError { .. } => {
                ErrorSeverity::Medium
            }
            Self::IoError(_) | Self::ZipError(_) | Self::PdfError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::CsvError(e) => format!("Could not read the CSV file: {}", e),
            Self::ValidationError { message } => format!("Error while loading enrollment file: {}", message),
            Self::FeeScheduleError { message } => format!("Error while reading fee schedule: {}", message),
            Self::EmailError { message } => format!("Error while sending email: {}", message),
            Self::AuthError { .. } => "Failed to authenticate to Google for sending mail.".to_string(),
            Self::ApiError(e) => format!("Could not reach the Gmail API: {}", e),
            Self::Cancelled {
                completed, total, ..
            } => format!("Stopped after {} of {} families.", completed, total),
            Self::Interrupted { processed, source } => format!(
                "{} Families already handled: {}.",
                source.user_friendly_message(),
                processed.join(", ")
            ),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        if !self.processed_families().is_empty() {
            return "Rerun with --skip-families and the ids listed above so those families are not sent a second invoice";
        }
        match self.category() {
            ErrorCategory::Input => "Check the CSV file for the row and column named in the message",
            ErrorCategory::Configuration => "Review class-invoices.toml or the command-line flags",
            ErrorCategory::Network => "Check the network connection, then run `class-invoices auth --force`",
            ErrorCategory::System => "Check that the output directory exists and is writable",
            ErrorCategory::User => "Nothing was handled yet; run the command again",
        }
    }
}

pub type Result<T> = std::result::Result<T, InvoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_maps_network_errors_to_medium() {
        let err = InvoiceError::email("quota exceeded");
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_cancelled_is_low_severity() {
        let err = InvoiceError::Cancelled {
            completed: 2,
            total: 5,
            processed: vec!["17".to_string(), "21".to_string()],
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.user_friendly_message(), "Stopped after 2 of 5 families.");
        assert_eq!(err.processed_families(), ["17", "21"]);
        assert!(err.recovery_suggestion().contains("--skip-families"));
    }

    #[test]
    fn test_interrupted_keeps_source_severity() {
        let err = InvoiceError::interrupted(vec!["17".to_string()], InvoiceError::email("quota exceeded"));
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(
            err.to_string(),
            "Email error: quota exceeded (already handled families: 17)"
        );
        assert!(err.user_friendly_message().ends_with("Families already handled: 17."));

        let err = InvoiceError::interrupted(Vec::new(), InvoiceError::email("quota exceeded"));
        assert!(matches!(err, InvoiceError::EmailError { .. }));
        assert!(err.processed_families().is_empty());
    }

    #[test]
    fn test_validation_message_wraps_detail() {
        let err = InvoiceError::validation("Missing required columns: classes");
        assert_eq!(
            err.user_friendly_message(),
            "Error while loading enrollment file: Missing required columns: classes"
        );
    }
}
