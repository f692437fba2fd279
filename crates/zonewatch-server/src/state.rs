//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use zonewatch_core::{ConfigError, FixTracker, UserSession, ZoneCache, ZonewatchConfig};

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Active configuration.
    pub config: ZonewatchConfig,

    /// Where configuration changes are persisted; `None` keeps them in memory.
    pub config_path: Option<PathBuf>,

    /// Process-wide fix tracker.
    pub tracker: FixTracker,

    /// Last reported location per enabled user.
    pub sessions: Vec<UserSession>,

    /// Last zone list a client uploaded.
    pub zones: ZoneCache,

    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build state for `config`, with a tracker using its scheduling bounds.
    #[must_use]
    pub fn new(config: ZonewatchConfig, config_path: Option<PathBuf>) -> Self {
        let tracker = FixTracker::new(config.scheduler.scheduler());
        let sessions = config.enabled_users().map(UserSession::from).collect();
        let zones = ZoneCache::new(config.server.allow_zone_cache);
        Self {
            config,
            config_path,
            tracker,
            sessions,
            zones,
            started_at: Utc::now(),
        }
    }

    /// Wrap into a [`SharedState`].
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Persist the configuration if a path is set.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the file cannot be written.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        match &self.config_path {
            Some(path) => self.config.save(path),
            None => Ok(()),
        }
    }

    /// Seconds since start.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0)
    }
}
