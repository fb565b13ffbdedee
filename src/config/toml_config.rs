use crate::domain::model::{CcMode, DispatchMode, EmailSettings};
use crate::utils::error::{InvoiceError, Result};
use crate::utils::validation::{validate_file_extension, validate_path, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "class-invoices";
pub const CONFIG_FILE_NAME: &str = "class-invoices.toml";
pub const TOKEN_FILE_NAME: &str = "gmail_token.json";

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub invoice: InvoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    pub enrollment: Option<String>,
    pub fee_schedule: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            enrollment: None,
            fee_schedule: None,
        }
    }
}

fn default_output_dir() -> String {
    "./invoices".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub subject: String,
    pub body: Option<String>,
    /// Read the body from this file instead of `body`.
    pub body_file: Option<String>,
    #[serde(default)]
    pub cc_mode: CcMode,
    #[serde(default)]
    pub mode: DispatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_file: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_file: None,
            api_base: default_api_base(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_GMAIL_API_BASE.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InvoiceConfig {
    #[serde(default)]
    pub write_text: bool,
    #[serde(default)]
    pub zip_bundle: bool,
}

/// Per-user config directory, e.g. `~/.config/class-invoices`.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(InvoiceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| InvoiceError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Explicit path must exist; the default path falls back to defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = config_dir().join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    tracing::debug!("Using config {}", default_path.display());
                    Self::from_file(default_path)
                } else {
                    tracing::debug!("No config file at {}, using defaults", default_path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// 替換環境變數 (例如 ${GMAIL_CLIENT_SECRET})
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;
        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_path("paths.output_dir", &self.paths.output_dir)?;
        if let Some(enrollment) = &self.paths.enrollment {
            validate_file_extension("paths.enrollment", enrollment, &["csv"])?;
        }
        if let Some(fee_schedule) = &self.paths.fee_schedule {
            validate_file_extension("paths.fee_schedule", fee_schedule, &["csv"])?;
        }
        validate_url("gmail.api_base", &self.gmail.api_base)?;
        validate_url("gmail.auth_uri", &self.gmail.auth_uri)?;
        validate_url("gmail.token_uri", &self.gmail.token_uri)?;
        if let Some(token_file) = &self.gmail.token_file {
            validate_path("gmail.token_file", token_file)?;
        }
        Ok(())
    }

    pub fn token_file(&self) -> PathBuf {
        self.gmail
            .token_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join(TOKEN_FILE_NAME))
    }

    /// Subject, body (inline or from `body_file`), and Cc/Bcc choice.
    pub fn email_settings(&self) -> Result<EmailSettings> {
        let body = match (&self.email.body_file, &self.email.body) {
            (Some(file), _) => std::fs::read_to_string(file)?,
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        };
        Ok(EmailSettings {
            subject: self.email.subject.clone(),
            body,
            cc_mode: self.email.cc_mode,
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[paths]
output_dir = "./fall-2019"
enrollment = "roster.csv"

[email]
subject = "Fall class invoice"
body = "Invoice attached."
cc_mode = "bcc"
mode = "send"

[gmail]
client_id = "abc.apps.googleusercontent.com"
client_secret = "shh"

[invoice]
write_text = true
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.paths.output_dir, "./fall-2019");
        assert_eq!(config.paths.enrollment.as_deref(), Some("roster.csv"));
        assert_eq!(config.email.cc_mode, CcMode::Bcc);
        assert_eq!(config.email.mode, DispatchMode::Send);
        assert_eq!(config.gmail.api_base, DEFAULT_GMAIL_API_BASE);
        assert!(config.invoice.write_text);
        assert!(!config.invoice.zip_bundle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.paths.output_dir, "./invoices");
        assert_eq!(config.email.mode, DispatchMode::Draft);
        assert_eq!(config.email.cc_mode, CcMode::None);
        assert_eq!(config.gmail.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CLASS_INVOICES_TEST_SECRET", "from-env");

        let toml_content = r#"
[gmail]
client_secret = "${CLASS_INVOICES_TEST_SECRET}"
client_id = "${CLASS_INVOICES_TEST_UNSET}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.gmail.client_secret.as_deref(), Some("from-env"));
        assert_eq!(
            config.gmail.client_id.as_deref(),
            Some("${CLASS_INVOICES_TEST_UNSET}")
        );

        std::env::remove_var("CLASS_INVOICES_TEST_SECRET");
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::from_toml_str("[gmail]\napi_base = \"not a url\"\n").unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str("[paths]\nenrollment = \"roster.xlsx\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_body_from_file() {
        let mut body_file = NamedTempFile::new().unwrap();
        body_file.write_all(b"Dear families,\nInvoices attached.").unwrap();

        let toml_content = format!(
            "[email]\nsubject = \"Invoices\"\nbody = \"ignored\"\nbody_file = \"{}\"\ncc_mode = \"cc\"\n",
            body_file.path().display().to_string().replace('\\', "/")
        );
        let config = AppConfig::from_toml_str(&toml_content).unwrap();
        let settings = config.email_settings().unwrap();
        assert_eq!(settings.body, "Dear families,\nInvoices attached.");
        assert_eq!(settings.cc_mode, CcMode::Cc);
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[paths]\noutput_dir = \"./out\"\n")
            .unwrap();

        let config = AppConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.paths.output_dir, "./out");
    }
}
