use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cas::types::SignatureAlgorithm;
use crate::error::Error;
use crate::types::Result;
use crate::x509::{Name, Subject};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Prefix of environment overrides, e.g. `CAS__CAS__BACKEND=softcas`
pub const ENV_PREFIX: &str = "CAS";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Certificate authority configuration
    #[serde(default)]
    pub cas: CasConfig,

    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "cas-core".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How authority signing keys are handed back to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMaterialMode {
    /// PKCS#8 private key bytes
    #[default]
    Raw,
    /// Opaque signing handle
    Signer,
}

/// Certificate authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// Backend type (softcas)
    pub backend: String,

    /// Create the root and intermediate authorities at startup
    pub bootstrap: bool,

    /// Key material returned for new authorities
    pub key_material: KeyMaterialMode,

    /// Algorithm for keys created without an explicit one
    pub default_key_algorithm: SignatureAlgorithm,

    /// Leaf certificate lifetime (hours)
    pub default_lifetime_hours: i64,

    /// Backdate applied to new certificates (seconds)
    pub default_backdate_seconds: i64,

    /// Root authority created by bootstrap
    pub root: AuthorityConfig,

    /// Intermediate authority created by bootstrap
    pub intermediate: AuthorityConfig,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            backend: "softcas".to_string(),
            bootstrap: true,
            key_material: KeyMaterialMode::Raw,
            default_key_algorithm: SignatureAlgorithm::ECDSAWithSHA256,
            default_lifetime_hours: 24,
            default_backdate_seconds: 60,
            root: AuthorityConfig {
                name: "root".to_string(),
                subject: "Root CA".to_string(),
                lifetime_hours: 87600, // 10 years
            },
            intermediate: AuthorityConfig {
                name: "intermediate".to_string(),
                subject: "Intermediate CA".to_string(),
                lifetime_hours: 43800, // 5 years
            },
        }
    }
}

impl CasConfig {
    pub fn default_lifetime(&self) -> Duration {
        Duration::hours(self.default_lifetime_hours)
    }

    pub fn default_backdate(&self) -> Duration {
        Duration::seconds(self.default_backdate_seconds)
    }
}

/// Authority created at bootstrap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Name the authority is registered under
    pub name: String,

    /// Subject as a bare common name or a JSON/YAML name object
    pub subject: String,

    /// Certificate lifetime (hours)
    pub lifetime_hours: i64,
}

impl AuthorityConfig {
    /// Decode the configured subject
    pub fn subject(&self) -> Result<Subject> {
        Name::from_yaml(&self.subject).map(Subject::from)
    }

    pub fn lifetime(&self) -> Duration {
        Duration::hours(self.lifetime_hours)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Enable structured (JSON) logging
    pub structured_logging: bool,
}

impl Settings {
    /// Load configuration from `$CONFIG_FILE` (or `config/default`) and environment variables
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::load_from(Some(Path::new(&path))),
            Err(_) => Self::load_from(None),
        }
    }

    /// Load configuration from an explicit file, falling back to `config/default`
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // Add default values
        builder = builder.add_source(Config::try_from(&Self::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("config/default").required(false)),
        };

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Check if configuration is valid
    pub fn validate(&self) -> Result<()> {
        let cas = &self.cas;

        if cas.backend.is_empty() {
            return Err(Error::Config("CAS backend cannot be empty".into()));
        }

        if cas.default_lifetime_hours <= 0 {
            return Err(Error::Config("Default lifetime must be positive".into()));
        }

        if cas.default_backdate_seconds < 0 {
            return Err(Error::Config("Default backdate cannot be negative".into()));
        }

        if cas.default_backdate() >= cas.default_lifetime() {
            return Err(Error::Config(
                "Default backdate must be shorter than the default lifetime".into(),
            ));
        }

        if cas.bootstrap {
            for (role, authority) in [("root", &cas.root), ("intermediate", &cas.intermediate)] {
                if authority.name.is_empty() {
                    return Err(Error::Config(format!("The {} authority needs a name", role)));
                }
                if authority.lifetime_hours <= 0 {
                    return Err(Error::Config(format!(
                        "The {} authority lifetime must be positive",
                        role
                    )));
                }
                authority.subject().map_err(|e| {
                    Error::Config(format!("Invalid {} authority subject: {}", role, e))
                })?;
            }

            if cas.root.name == cas.intermediate.name {
                return Err(Error::Config(
                    "Root and intermediate authorities need distinct names".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.cas.backend, "softcas");
        assert_eq!(settings.cas.default_backdate(), Duration::minutes(1));
        assert_eq!(settings.cas.root.subject().unwrap().common_name, "Root CA");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("cas.yaml");

        let config_content = r#"
general:
  log_level: "debug"
cas:
  key_material: "signer"
  default_key_algorithm: "ECDSAWithSHA384"
  default_lifetime_hours: 72
  root:
    name: "acme-root"
    subject: '{"commonName": "Acme Root CA", "organization": ["Acme"], "country": "US"}'
    lifetime_hours: 1000
telemetry:
  structured_logging: true
"#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = Settings::load_from(Some(&config_path)).unwrap();
        assert!(settings.validate().is_ok());

        assert_eq!(settings.general.log_level, "debug");
        assert_eq!(settings.cas.key_material, KeyMaterialMode::Signer);
        assert_eq!(settings.cas.default_key_algorithm, SignatureAlgorithm::ECDSAWithSHA384);
        assert_eq!(settings.cas.default_lifetime(), Duration::hours(72));
        assert!(settings.telemetry.structured_logging);

        let root = settings.cas.root.subject().unwrap();
        assert_eq!(root.common_name, "Acme Root CA");
        assert_eq!(root.organization.as_slice(), ["Acme"]);
        assert_eq!(root.country.as_slice(), ["US"]);

        // Untouched sections keep their defaults
        assert_eq!(settings.cas.backend, "softcas");
        assert_eq!(settings.cas.intermediate.name, "intermediate");
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("CAS__GENERAL__APP_NAME", "issuer-from-env");
        let settings = Settings::load_from(None);
        std::env::remove_var("CAS__GENERAL__APP_NAME");

        assert_eq!(settings.unwrap().general.app_name, "issuer-from-env");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.cas.default_backdate_seconds = 3600 * 48;
        assert_eq!(settings.validate().unwrap_err().kind(), ErrorKind::Config);

        let mut settings = Settings::default();
        settings.cas.default_backdate_seconds = 3600 * settings.cas.default_lifetime_hours;
        assert_eq!(settings.validate().unwrap_err().kind(), ErrorKind::Config);

        let mut settings = Settings::default();
        settings.cas.root.subject = "[not, a, name]".into();
        assert_eq!(settings.validate().unwrap_err().kind(), ErrorKind::Config);

        let mut settings = Settings::default();
        settings.cas.intermediate.name = "root".into();
        assert_eq!(settings.validate().unwrap_err().kind(), ErrorKind::Config);
    }
}
