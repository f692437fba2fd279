//! Zone lists from the backend.
//!
//! The backend is abstracted by [`ZoneSource`]. [`CachedZoneSource`] keeps the
//! last good list so a flaky backend does not drop every user to `not_home`.

use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::Zone;

/// Errors raised while fetching zones.
#[derive(Debug, Error)]
pub enum ZoneSourceError {
    /// The backend could not be reached.
    #[error("zone backend unavailable: {message}")]
    Unavailable {
        /// What went wrong.
        message: String,
    },

    /// The backend answered with something that is not a zone list.
    #[error("failed to decode zone list: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ZoneSourceError {
    /// Shorthand for [`ZoneSourceError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Something that can list the configured zones.
pub trait ZoneSource: Send + Sync {
    /// Fetch the current zone list.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or its answer
    /// cannot be decoded.
    fn fetch_zones(&self) -> Result<Vec<Zone>, ZoneSourceError>;
}

/// A fixed zone list.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneSource {
    zones: Vec<Zone>,
}

impl StaticZoneSource {
    /// Serve `zones` on every fetch.
    #[must_use]
    pub const fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }
}

impl ZoneSource for StaticZoneSource {
    fn fetch_zones(&self) -> Result<Vec<Zone>, ZoneSourceError> {
        Ok(self.zones.clone())
    }
}

/// Last good zone list, served when a fetch fails.
#[derive(Debug)]
pub struct ZoneCache {
    allow_cache: bool,
    cached: Mutex<Option<Vec<Zone>>>,
}

impl ZoneCache {
    /// An empty cache. With `allow_cache` off, failures always propagate.
    #[must_use]
    pub const fn new(allow_cache: bool) -> Self {
        Self {
            allow_cache,
            cached: Mutex::new(None),
        }
    }

    /// Record the outcome of a fetch: a fresh list replaces the cache, a
    /// failure falls back to it.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when caching is disabled or nothing has been
    /// cached yet.
    pub fn settle(
        &self,
        fetched: Result<Vec<Zone>, ZoneSourceError>,
    ) -> Result<Vec<Zone>, ZoneSourceError> {
        match fetched {
            Ok(zones) => {
                debug!(count = zones.len(), "Fetched zones");
                *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(zones.clone());
                Ok(zones)
            }
            Err(err) => {
                if !self.allow_cache {
                    return Err(err);
                }
                let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
                match cached.as_ref() {
                    Some(zones) => {
                        warn!(error = %err, count = zones.len(), "Zone fetch failed, using cached list");
                        Ok(zones.clone())
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Last successfully fetched list, if any.
    pub fn cached(&self) -> Option<Vec<Zone>> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Wraps a source and falls back to the last good list on failure.
#[derive(Debug)]
pub struct CachedZoneSource<S> {
    inner: S,
    cache: ZoneCache,
}

impl<S: ZoneSource> CachedZoneSource<S> {
    /// Wrap `inner`. With `allow_cache` off, failures always propagate.
    pub const fn new(inner: S, allow_cache: bool) -> Self {
        Self {
            inner,
            cache: ZoneCache::new(allow_cache),
        }
    }

    /// Fetch zones, serving the cached list if the backend fails.
    ///
    /// # Errors
    ///
    /// Returns the backend error when caching is disabled or nothing has
    /// been cached yet.
    pub fn zones(&self) -> Result<Vec<Zone>, ZoneSourceError> {
        self.cache.settle(self.inner.fetch_zones())
    }

    /// Like [`zones`](Self::zones), but an error yields an empty list.
    pub fn zones_or_empty(&self) -> Vec<Zone> {
        self.zones().unwrap_or_else(|err| {
            warn!(error = %err, "No zones available");
            Vec::new()
        })
    }

    /// Last successfully fetched list, if any.
    pub fn cached(&self) -> Option<Vec<Zone>> {
        self.cache.cached()
    }
}

impl<S: ZoneSource> ZoneSource for CachedZoneSource<S> {
    fn fetch_zones(&self) -> Result<Vec<Zone>, ZoneSourceError> {
        self.zones()
    }
}

#[derive(Debug, Deserialize)]
struct ZoneEntity {
    entity_id: String,
    attributes: ZoneAttributes,
}

#[derive(Debug, Deserialize)]
struct ZoneAttributes {
    #[serde(default)]
    friendly_name: Option<String>,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    radius: f64,
}

impl From<ZoneEntity> for Zone {
    fn from(entity: ZoneEntity) -> Self {
        let name = entity
            .attributes
            .friendly_name
            .unwrap_or_else(|| entity.entity_id.trim_start_matches("zone.").to_string());
        Self::new(
            entity.entity_id,
            name,
            entity.attributes.latitude,
            entity.attributes.longitude,
            entity.attributes.radius,
        )
    }
}

/// Decode a Home Assistant zone entity.
///
/// # Errors
///
/// Returns [`ZoneSourceError::Decode`] if the payload is not a zone entity.
pub fn decode_zone_entity(json: &str) -> Result<Zone, ZoneSourceError> {
    let entity: ZoneEntity = serde_json::from_str(json)?;
    Ok(entity.into())
}

/// Decode a Home Assistant zone entity list.
///
/// # Errors
///
/// Returns [`ZoneSourceError::Decode`] if the payload is not a list of zone
/// entities.
pub fn decode_zone_entities(json: &str) -> Result<Vec<Zone>, ZoneSourceError> {
    let entities: Vec<ZoneEntity> = serde_json::from_str(json)?;
    Ok(entities.into_iter().map(Zone::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySource {
        zones: Vec<Zone>,
        failing: AtomicBool,
    }

    impl ZoneSource for FlakySource {
        fn fetch_zones(&self) -> Result<Vec<Zone>, ZoneSourceError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(ZoneSourceError::unavailable("connection refused"))
            } else {
                Ok(self.zones.clone())
            }
        }
    }

    fn flaky(failing: bool) -> FlakySource {
        FlakySource {
            zones: vec![Zone::new("zone.home", "Home", 1.0, 2.0, 50.0)],
            failing: AtomicBool::new(failing),
        }
    }

    #[test]
    fn test_cache_serves_last_good_list() {
        let source = CachedZoneSource::new(flaky(false), true);
        assert_eq!(source.zones().unwrap().len(), 1);

        source.inner.failing.store(true, Ordering::SeqCst);
        let zones = source.zones().unwrap();
        assert_eq!(zones[0].id, "zone.home");
    }

    #[test]
    fn test_cache_disabled_propagates_error() {
        let source = CachedZoneSource::new(flaky(false), false);
        source.zones().unwrap();

        source.inner.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            source.zones(),
            Err(ZoneSourceError::Unavailable { .. })
        ));
        assert!(source.cached().is_some());
    }

    #[test]
    fn test_empty_cache_propagates_error() {
        let source = CachedZoneSource::new(flaky(true), true);
        assert!(source.zones().is_err());
        assert!(source.zones_or_empty().is_empty());
    }

    #[test]
    fn test_zone_cache_settles_uploaded_lists() {
        let cache = ZoneCache::new(true);
        let missing = || Err(ZoneSourceError::unavailable("no list"));
        assert!(cache.settle(missing()).is_err());

        let zones = vec![Zone::new("zone.home", "Home", 1.0, 2.0, 50.0)];
        assert_eq!(cache.settle(Ok(zones.clone())).unwrap(), zones);
        assert_eq!(cache.settle(missing()).unwrap(), zones);

        // An empty upload is a real answer, not a failure.
        assert!(cache.settle(Ok(Vec::new())).unwrap().is_empty());
        assert!(cache.settle(missing()).unwrap().is_empty());
    }

    #[test]
    fn test_static_source() {
        let source = StaticZoneSource::new(vec![Zone::new("zone.a", "a", 0.0, 0.0, 1.0)]);
        assert_eq!(source.fetch_zones().unwrap().len(), 1);
    }

    #[test]
    fn test_decode_entity_list() {
        let json = r#"[
            {
                "entity_id": "zone.home",
                "state": "1",
                "attributes": {
                    "friendly_name": "Home",
                    "latitude": 52.3731,
                    "longitude": 4.8922,
                    "radius": 100,
                    "passive": false
                }
            },
            {
                "entity_id": "zone.gym",
                "attributes": { "latitude": 52.38, "longitude": 4.9, "radius": 40.5 }
            }
        ]"#;
        let zones = decode_zone_entities(json).unwrap();
        assert_eq!(zones.len(), 2);
        assert!(zones[0].is_home());
        assert_eq!(zones[0].radius_meters, 100.0);
        assert_eq!(zones[1].name, "gym");
        assert_eq!(zones[1].radius_meters, 40.5);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_zone_entity(r#"{"entity_id": "zone.x"}"#),
            Err(ZoneSourceError::Decode(_))
        ));
    }
}
