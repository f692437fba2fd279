//! Unified error types for the zonewatch core library.
//!
//! This module provides a unified error type [`ZonewatchError`] that covers all
//! recoverable failure modes of the library. Each module also has its own
//! specific error type ([`ConfigError`](crate::config::ConfigError),
//! [`ZoneSourceError`](crate::zones::ZoneSourceError)) for internal use.
//!
//! # What is *not* an error
//!
//! Noisy input is never an error here. A non-finite or non-positive accuracy
//! is clamped, an empty zone list resolves to `"not_home"`, and degenerate
//! geometry is handled by explicit branches. Contract violations such as
//! passing `sigma <= 0` straight into the probability kernel are caller bugs
//! and panic instead of being reported through this type.
//!
//! # Example
//!
//! ```rust
//! use zonewatch_core::error::{Result, ZonewatchError};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(ZonewatchError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all zonewatch operations.
#[derive(Debug, Error)]
pub enum ZonewatchError {
    // =========================================================================
    // ZONE SOURCE ERRORS
    // =========================================================================
    /// The zone backend could not be reached and no cached list was available.
    #[error("Zone list unavailable: {0}. Check backend connectivity and credentials.")]
    ZoneSourceUnavailable(String),

    /// The zone backend answered with a payload that could not be decoded.
    #[error("Malformed zone payload: {0}")]
    MalformedZonePayload(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for zonewatch operations.
pub type Result<T> = std::result::Result<T, ZonewatchError>;

impl ZonewatchError {
    /// Returns `true` if this error is related to fetching zones.
    #[inline]
    #[must_use]
    pub const fn is_zone_source_error(&self) -> bool {
        matches!(
            self,
            Self::ZoneSourceUnavailable(_) | Self::MalformedZonePayload(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if retrying later is likely to succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ZoneSourceUnavailable(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ConfigNotFound(_) => 404,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,
            Self::PersistenceError(_) | Self::IoError(_) => 500,
            Self::MalformedZonePayload(_) => 502,
            Self::ZoneSourceUnavailable(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ZoneSourceUnavailable(_) => "ZONE_SOURCE_UNAVAILABLE",
            Self::MalformedZonePayload(_) => "MALFORMED_ZONE_PAYLOAD",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for ZonewatchError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::NoConfigDirectory => {
                Self::PersistenceError("Cannot determine configuration directory".into())
            }
            e @ ConfigError::ValidationError { .. } => Self::ConfigValidationError(e.to_string()),
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::zones::ZoneSourceError> for ZonewatchError {
    fn from(err: crate::zones::ZoneSourceError) -> Self {
        use crate::zones::ZoneSourceError;
        match err {
            ZoneSourceError::Unavailable { message } => Self::ZoneSourceUnavailable(message),
            ZoneSourceError::Decode(e) => Self::MalformedZonePayload(e.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
