//! Application configuration management.
//!
//! Handles loading, saving, and validating zonewatch configuration including:
//! - Resolver tunables (accuracy floor, entry gate, integration tolerance)
//! - Poll scheduling bounds
//! - Wi-Fi leave protection rules
//! - Tracked users
//! - HTTP server settings
//!
//! Values come from an optional TOML file layered under `ZONEWATCH__`
//! environment variables, e.g. `ZONEWATCH__RESOLVER__ENTRY_ACCURACY_GATE_METERS=150`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::geometry::{DEFAULT_TOLERANCE, MAX_TOLERANCE, MIN_TOLERANCE};
use crate::leave_protection::LeaveProtectionConfig;
use crate::resolver::{Resolver, DEFAULT_ENTRY_ACCURACY_GATE_M};
use crate::scoring::{ScoringParams, DEFAULT_MIN_ACCURACY_M};
use crate::tracker::Scheduler;

/// Default configuration file on Linux hosts.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/zonewatch/config.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "ZONEWATCH";

static BSSID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("BSSID pattern is valid")
});

/// Errors raised while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the requested path.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Layered sources could not be merged or deserialized.
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// No platform configuration directory could be determined.
    #[error("cannot determine configuration directory")]
    NoConfigDirectory,

    /// A single invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Every invalid value found in one pass.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ZonewatchConfig {
    /// Zone resolution tunables.
    pub resolver: ResolverConfig,

    /// Poll scheduling bounds.
    pub scheduler: SchedulerConfig,

    /// Wi-Fi leave protection.
    pub leave_protection: LeaveProtectionConfig,

    /// Tracked users.
    pub users: Vec<UserConfig>,

    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Zone resolution tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ResolverConfig {
    /// Sigma used for fixes with no usable accuracy, in meters.
    #[schema(example = 1.0)]
    pub min_accuracy_meters: f64,

    /// Fixes coarser than this cannot change the reported zone, in meters.
    #[schema(example = 200.0)]
    pub entry_accuracy_gate_meters: f64,

    /// Absolute tolerance of the overlap integral.
    #[schema(example = 1e-9)]
    pub integration_tolerance: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_accuracy_meters: DEFAULT_MIN_ACCURACY_M,
            entry_accuracy_gate_meters: DEFAULT_ENTRY_ACCURACY_GATE_M,
            integration_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ResolverConfig {
    /// Build the resolver these values describe.
    #[must_use]
    pub const fn resolver(&self) -> Resolver {
        Resolver::new(
            ScoringParams {
                min_accuracy_meters: self.min_accuracy_meters,
                tolerance: self.integration_tolerance,
            },
            self.entry_accuracy_gate_meters,
        )
    }
}

/// Poll scheduling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum seconds between now and the next poll.
    #[schema(example = 30)]
    pub min_lead_secs: u64,

    /// Seconds to wait before retrying a failed report.
    #[schema(example = 60)]
    pub error_retry_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_lead_secs: 30,
            error_retry_secs: 60,
        }
    }
}

impl SchedulerConfig {
    /// Build the scheduler these values describe.
    #[must_use]
    pub const fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Duration::from_secs(self.min_lead_secs),
            Duration::from_secs(self.error_retry_secs),
        )
    }
}

/// A tracked identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserConfig {
    /// Backend user id.
    #[schema(example = "8d2f0b8e")]
    pub user_id: String,

    /// Display name.
    #[schema(example = "Alex")]
    pub user_name: String,

    /// Whether this user gets location updates.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl UserConfig {
    /// An enabled user.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            enabled: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[schema(example = "0.0.0.0:8080")]
    pub bind_address: String,

    /// Production logging (JSON file plus compact stdout).
    pub production: bool,

    /// Resolve against the last uploaded zone list when a request has none.
    pub allow_zone_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            production: false,
            allow_zone_cache: true,
        }
    }
}

impl ZonewatchConfig {
    /// Default configuration file location for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDirectory`] off Linux when no user
    /// configuration directory exists.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from(DEFAULT_CONFIG_PATH))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "zonewatch")
                .ok_or(ConfigError::NoConfigDirectory)?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }

    /// Load from `path`, which must exist, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or the
    /// merged result fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_layered(Some(path))
    }

    /// Load from `path` if it exists, otherwise from defaults. Environment
    /// overrides apply either way.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed or the merged
    /// result fails validation.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_layered(Some(path))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::load_layered(None)
        }
    }

    fn load_layered(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            let content =
                std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source,
                })?;
            builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        info!(
            path = ?path,
            users = config.users.len(),
            rules = config.leave_protection.rules.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check every value, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MultipleValidationErrors`] listing every
    /// invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let resolver = &self.resolver;
        for (field, value) in [
            ("resolver.min_accuracy_meters", resolver.min_accuracy_meters),
            (
                "resolver.entry_accuracy_gate_meters",
                resolver.entry_accuracy_gate_meters,
            ),
            ("resolver.integration_tolerance", resolver.integration_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                errors.push(ConfigError::invalid(field, "must be a positive number"));
            }
        }
        let tolerance = resolver.integration_tolerance;
        if tolerance.is_finite()
            && tolerance > 0.0
            && !(MIN_TOLERANCE..=MAX_TOLERANCE).contains(&tolerance)
        {
            errors.push(ConfigError::invalid(
                "resolver.integration_tolerance",
                format!("must be between {MIN_TOLERANCE:e} and {MAX_TOLERANCE:e}"),
            ));
        }

        if self.scheduler.min_lead_secs == 0 {
            errors.push(ConfigError::invalid(
                "scheduler.min_lead_secs",
                "must be at least 1",
            ));
        }

        for (index, rule) in self.leave_protection.rules.iter().enumerate() {
            if rule.zone_id.trim().is_empty() {
                errors.push(ConfigError::invalid(
                    format!("leave_protection.rules[{index}].zone_id"),
                    "must not be empty",
                ));
            }
            for bssid in &rule.bssids {
                if !BSSID_PATTERN.is_match(bssid) {
                    errors.push(ConfigError::invalid(
                        format!("leave_protection.rules[{index}].bssids"),
                        format!("'{bssid}' is not a BSSID (expected XX:XX:XX:XX:XX:XX)"),
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for (index, user) in self.users.iter().enumerate() {
            if user.user_id.trim().is_empty() {
                errors.push(ConfigError::invalid(
                    format!("users[{index}].user_id"),
                    "must not be empty",
                ));
            } else if !seen.insert(user.user_id.as_str()) {
                errors.push(ConfigError::invalid(
                    format!("users[{index}].user_id"),
                    format!("duplicate user id '{}'", user.user_id),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MultipleValidationErrors(errors))
        }
    }

    /// Validate, then write as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Users that receive location updates.
    pub fn enabled_users(&self) -> impl Iterator<Item = &UserConfig> {
        self.users.iter().filter(|user| user.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave_protection::LeaveProtectionRule;
    use tempfile::TempDir;

    fn validation_fields(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::MultipleValidationErrors(errors) => errors
                .into_iter()
                .map(|e| match e {
                    ConfigError::ValidationError { field, .. } => field,
                    other => panic!("unexpected error {other:?}"),
                })
                .collect(),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ZonewatchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.resolver.entry_accuracy_gate_meters, 200.0);
        assert_eq!(config.scheduler.min_lead_secs, 30);
        assert_eq!(config.scheduler.error_retry_secs, 60);
        assert!(!config.leave_protection.enabled);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ZonewatchConfig::default();
        config.users.push(UserConfig::new("u1", "Alex"));
        config.leave_protection.enabled = true;
        config.leave_protection.rules.push(
            LeaveProtectionRule::new("Home Wi-Fi", "zone.home")
                .with_ssid("HomeNet")
                .with_bssid("AA:BB:CC:DD:EE:FF"),
        );
        config.resolver.entry_accuracy_gate_meters = 150.0;
        config.save(&path).unwrap();

        let loaded = ZonewatchConfig::load(&path).unwrap();
        assert_eq!(loaded.users, config.users);
        assert_eq!(loaded.leave_protection, config.leave_protection);
        assert_eq!(loaded.resolver.entry_accuracy_gate_meters, 150.0);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[resolver]
entry_accuracy_gate_meters = 120.0

[[users]]
user_id = "u1"
user_name = "Alex"
"#,
        )
        .unwrap();

        let config = ZonewatchConfig::load(&path).unwrap();
        assert_eq!(config.resolver.entry_accuracy_gate_meters, 120.0);
        assert_eq!(config.resolver.min_accuracy_meters, 1.0);
        assert!(config.users[0].enabled);
        assert_eq!(config.scheduler.min_lead_secs, 30);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ZonewatchConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        let config = ZonewatchConfig::load_or_default(&path).unwrap();
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler]\nerror_retry_secs = 90\n").unwrap();

        std::env::set_var("ZONEWATCH__SCHEDULER__ERROR_RETRY_SECS", "45");
        let config = ZonewatchConfig::load(&path);
        std::env::remove_var("ZONEWATCH__SCHEDULER__ERROR_RETRY_SECS");

        assert_eq!(config.unwrap().scheduler.error_retry_secs, 45);
    }

    #[test]
    fn test_unparseable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "resolver = [not toml").unwrap();
        assert!(matches!(
            ZonewatchConfig::load(&path),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = ZonewatchConfig::default();
        config.resolver.min_accuracy_meters = 0.0;
        config.resolver.integration_tolerance = f64::NAN;
        config.scheduler.min_lead_secs = 0;
        config.leave_protection.rules.push(
            LeaveProtectionRule::new("broken", " ").with_bssid("not-a-bssid"),
        );
        config.users.push(UserConfig::new("u1", "Alex"));
        config.users.push(UserConfig::new("u1", "Sam"));

        let fields = validation_fields(config.validate().unwrap_err());
        assert_eq!(
            fields,
            vec![
                "resolver.min_accuracy_meters",
                "resolver.integration_tolerance",
                "scheduler.min_lead_secs",
                "leave_protection.rules[0].zone_id",
                "leave_protection.rules[0].bssids",
                "users[1].user_id",
            ]
        );
    }

    #[test]
    fn test_integration_tolerance_bounds() {
        let mut config = ZonewatchConfig::default();
        for tolerance in [MIN_TOLERANCE, 1e-6, MAX_TOLERANCE] {
            config.resolver.integration_tolerance = tolerance;
            assert!(config.validate().is_ok(), "{tolerance} rejected");
        }
        for tolerance in [1e-18, 1e-16, 0.01, 1.0] {
            config.resolver.integration_tolerance = tolerance;
            let fields = validation_fields(config.validate().unwrap_err());
            assert_eq!(fields, vec!["resolver.integration_tolerance"]);
        }
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ZonewatchConfig::default();
        config.scheduler.min_lead_secs = 0;

        assert!(config.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_bssid_pattern() {
        assert!(BSSID_PATTERN.is_match("aa:bb:cc:dd:ee:ff"));
        assert!(BSSID_PATTERN.is_match("00:1A:2B:3C:4D:5E"));
        assert!(!BSSID_PATTERN.is_match("00-1A-2B-3C-4D-5E"));
        assert!(!BSSID_PATTERN.is_match("00:1A:2B:3C:4D"));
    }

    #[test]
    fn test_built_components_follow_config() {
        let mut config = ZonewatchConfig::default();
        config.scheduler.min_lead_secs = 10;
        config.scheduler.error_retry_secs = 120;
        let scheduler = config.scheduler.scheduler();
        assert_eq!(scheduler.min_lead, Duration::from_secs(10));
        assert_eq!(
            scheduler.retry_instant(Duration::from_secs(5)),
            Duration::from_secs(125)
        );
        assert_eq!(config.resolver.resolver(), Resolver::default());
    }

    #[test]
    fn test_enabled_users() {
        let mut config = ZonewatchConfig::default();
        config.users.push(UserConfig::new("u1", "Alex"));
        config.users.push(UserConfig {
            enabled: false,
            ..UserConfig::new("u2", "Sam")
        });
        let ids: Vec<_> = config.enabled_users().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1"]);
    }
}
