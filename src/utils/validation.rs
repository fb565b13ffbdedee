use crate::utils::error::{InvoiceError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(InvoiceError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    match std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(extension) if allowed_extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)) => {
            Ok(())
        }
        Some(extension) => Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        }),
        None => Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| InvoiceError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(InvoiceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("gmail.api_base", "https://gmail.googleapis.com").is_ok());
        assert!(validate_url("gmail.api_base", "http://127.0.0.1:8080").is_ok());
        assert!(validate_url("gmail.api_base", "").is_err());
        assert!(validate_url("gmail.api_base", "invalid-url").is_err());
        assert!(validate_url("gmail.api_base", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("enrollment", "roster.csv", &["csv"]).is_ok());
        assert!(validate_file_extension("enrollment", "roster.CSV", &["csv"]).is_ok());
        assert!(validate_file_extension("enrollment", "roster.xlsx", &["csv"]).is_err());
        assert!(validate_file_extension("enrollment", "roster", &["csv"]).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("id".to_string());
        let missing: Option<String> = None;
        assert_eq!(validate_required_field("gmail.client_id", &present).unwrap(), "id");
        assert!(matches!(
            validate_required_field("gmail.client_id", &missing),
            Err(InvoiceError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("email.subject", "Fall invoices").is_ok());
        assert!(validate_non_empty_string("email.subject", "   ").is_err());
    }
}
