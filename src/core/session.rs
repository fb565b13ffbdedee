use crate::core::fee_schedule::FeeSchedule;
use crate::domain::model::{EmailSettings, Families};
use crate::utils::error::{InvoiceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SESSION_FORMAT_VERSION: u32 = 1;
pub const SESSION_EXTENSION: &str = "classinvoice";

/// Everything needed to resume work: roster, fee schedule, and email text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub version: u32,
    #[serde(default)]
    pub families: Families,
    #[serde(default)]
    pub fee_schedule: FeeSchedule,
    #[serde(default)]
    pub email: EmailSettings,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            families: Families::new(),
            fee_schedule: FeeSchedule::default(),
            email: EmailSettings::default(),
        }
    }
}

impl Session {
    pub fn new(families: Families, fee_schedule: FeeSchedule, email: EmailSettings) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            families,
            fee_schedule,
            email,
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let session: Session = serde_json::from_str(content)?;
        if session.version > SESSION_FORMAT_VERSION {
            return Err(InvoiceError::ConfigError {
                message: format!(
                    "session file format {} is newer than supported format {}",
                    session.version, SESSION_FORMAT_VERSION
                ),
            });
        }
        Ok(session)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let session = Self::from_json_str(&content)?;
        tracing::info!(
            "📂 Opened {} ({} families)",
            path.as_ref().display(),
            session.families.len()
        );
        Ok(session)
    }

    /// Writes pretty JSON; adds the `.classinvoice` extension when missing.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<std::path::PathBuf> {
        let mut path = path.as_ref().to_path_buf();
        if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(format!(".{}", SESSION_EXTENSION));
            path.set_file_name(name);
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!("💾 Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrollment::parse_families;
    use crate::domain::model::CcMode;
    use tempfile::TempDir;

    fn session() -> Session {
        let csv = "\
family_id,last_name,first_name,classes,member_type,registered_at
1,Smith,Jane,,parent,08/14/2019 09:30
1,Smith,Tom,Art,student,not sure
";
        let families = parse_families(csv.as_bytes()).unwrap();
        let fee_schedule = FeeSchedule::populate(&families);
        Session::new(
            families,
            fee_schedule,
            EmailSettings {
                subject: "Invoice".to_string(),
                body: "Attached.".to_string(),
                cc_mode: CcMode::Bcc,
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let saved = session().save(dir.path().join("fall")).unwrap();
        assert_eq!(saved.file_name().unwrap(), "fall.classinvoice");

        let loaded = Session::load(&saved).unwrap();
        assert_eq!(loaded, session());
    }

    #[test]
    fn test_rejects_newer_format() {
        let json = r#"{"version": 99}"#;
        assert!(matches!(
            Session::from_json_str(json),
            Err(InvoiceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_missing_sections_default() {
        let session = Session::from_json_str(r#"{"version": 1}"#).unwrap();
        assert!(session.families.is_empty());
        assert_eq!(session.email.cc_mode, CcMode::None);
    }
}
