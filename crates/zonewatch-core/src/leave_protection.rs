//! Leave protection ("stickiness").
//!
//! A zone exit is suppressed while the device can still see a Wi-Fi network
//! anchored to the zone it is nominally leaving. Anchors come from
//! user-configured rules; the live scan comes from the platform.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::types::{WifiSighting, Zone, NOT_HOME, UNKNOWN};

/// Leave protection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LeaveProtectionConfig {
    /// Master switch.
    pub enabled: bool,

    /// Wi-Fi geofence rules.
    pub rules: Vec<LeaveProtectionRule>,
}

/// Features a rule takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GeofenceFunctions {
    /// Seeing an anchor network while outside may fast-track entry.
    pub fast_enter: bool,

    /// Seeing an anchor network blocks leaving the zone.
    pub leave_protection: bool,
}

impl Default for GeofenceFunctions {
    fn default() -> Self {
        Self {
            fast_enter: true,
            leave_protection: true,
        }
    }
}

/// A Wi-Fi geofence anchoring networks to one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
#[schema(example = json!({
    "id": "0190f3c1-7b6e-7c2a-9d43-2f1e6a0b5c11",
    "name": "Home Wi-Fi",
    "zone_id": "zone.home",
    "enabled": true,
    "user_ids": [],
    "functions": { "fast_enter": true, "leave_protection": true },
    "ssids": ["HomeNet"],
    "bssids": ["a4:2b:b0:11:22:33"]
}))]
pub struct LeaveProtectionRule {
    /// Stable rule id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Backend id of the protected zone.
    pub zone_id: String,

    /// Whether the rule is active.
    pub enabled: bool,

    /// Users the rule applies to; empty means everyone.
    pub user_ids: BTreeSet<String>,

    /// Features this rule takes part in.
    pub functions: GeofenceFunctions,

    /// Anchor SSIDs.
    pub ssids: BTreeSet<String>,

    /// Anchor BSSIDs.
    pub bssids: BTreeSet<String>,
}

impl Default for LeaveProtectionRule {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: String::new(),
            zone_id: String::new(),
            enabled: true,
            user_ids: BTreeSet::new(),
            functions: GeofenceFunctions::default(),
            ssids: BTreeSet::new(),
            bssids: BTreeSet::new(),
        }
    }
}

impl LeaveProtectionRule {
    /// Create an enabled rule for `zone_id` with leave protection on.
    pub fn new(name: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone_id: zone_id.into(),
            ..Self::default()
        }
    }

    /// Add an anchor SSID.
    #[must_use]
    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssids.insert(ssid.into());
        self
    }

    /// Add an anchor BSSID.
    #[must_use]
    pub fn with_bssid(mut self, bssid: impl Into<String>) -> Self {
        self.bssids.insert(bssid.into());
        self
    }

    /// Restrict the rule to one more user.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_ids.insert(user_id.into());
        self
    }

    fn applies_to(&self, user_id: &str) -> bool {
        self.user_ids.is_empty() || self.user_ids.contains(user_id)
    }

    /// Every network listed on this rule, BSSIDs lowercased.
    #[must_use]
    pub fn networks(&self) -> WifiAnchors {
        WifiAnchors {
            ssids: self.ssids.iter().cloned().collect(),
            bssids: self
                .bssids
                .iter()
                .map(|bssid| bssid.to_ascii_lowercase())
                .collect(),
        }
    }

    /// This rule's non-blank networks.
    #[must_use]
    pub fn anchors(&self) -> WifiAnchors {
        let mut anchors = self.networks();
        anchors.ssids.retain(|ssid| !ssid.trim().is_empty());
        anchors.bssids.retain(|bssid| !bssid.trim().is_empty());
        anchors
    }
}

/// Networks that keep a user attached to a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiAnchors {
    /// Anchor SSIDs.
    pub ssids: BTreeSet<String>,
    /// Anchor BSSIDs, lowercased.
    pub bssids: BTreeSet<String>,
}

impl WifiAnchors {
    /// Whether there is nothing to look for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ssids.is_empty() && self.bssids.is_empty()
    }

    /// Whether any sighting matches an anchor.
    #[must_use]
    pub fn seen_in(&self, scan: &[WifiSighting]) -> bool {
        scan.iter().any(|sighting| {
            self.ssids.contains(sighting.normalized_ssid())
                || self.bssids.contains(&sighting.bssid.to_ascii_lowercase())
        })
    }
}

impl LeaveProtectionConfig {
    /// Anchors that protect `user_id` from leaving the zone reported as `zone_name`.
    #[must_use]
    pub fn anchors_for(&self, zone_name: &str, user_id: &str, zones: &[Zone]) -> WifiAnchors {
        let mut anchors = WifiAnchors::default();

        for rule in &self.rules {
            if !rule.enabled {
                debug!(rule = %rule.name, "Rule disabled, skipping");
                continue;
            }
            if !rule.functions.leave_protection {
                debug!(rule = %rule.name, "Leave protection off for rule, skipping");
                continue;
            }
            if !rule.applies_to(user_id) {
                debug!(rule = %rule.name, user_id, "Rule does not cover user");
                continue;
            }
            let Some(zone) = zones.iter().find(|zone| zone.id == rule.zone_id) else {
                continue;
            };
            // Blank entries stay: a hidden network reports an empty SSID.
            if zone.matches_name(zone_name) {
                let rule_anchors = rule.networks();
                anchors.ssids.extend(rule_anchors.ssids);
                anchors.bssids.extend(rule_anchors.bssids);
            }
        }

        anchors
    }

    /// Whether the change from `previous` to `resolved` should be suppressed.
    ///
    /// Only a real departure from a tracked zone can be protected: no previous
    /// name, an unchanged name, or a previous `not_home`/`unknown` never sticks.
    #[must_use]
    pub fn is_sticky(
        &self,
        previous: Option<&str>,
        resolved: &str,
        user_id: &str,
        zones: &[Zone],
        scan: &[WifiSighting],
    ) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        if !self.enabled || previous == resolved || previous == NOT_HOME || previous == UNKNOWN {
            debug!(
                enabled = self.enabled,
                previous,
                resolved,
                "Leave protection not applicable"
            );
            return false;
        }

        let anchors = self.anchors_for(previous, user_id, zones);
        if anchors.is_empty() {
            debug!(previous, "No anchor networks for zone");
            return false;
        }

        let sticky = anchors.seen_in(scan);
        debug!(
            previous,
            resolved,
            sticky,
            anchor_ssids = ?anchors.ssids,
            anchor_bssids = ?anchors.bssids,
            "Leave protection evaluated"
        );
        sticky
    }
}

impl LeaveProtectionConfig {
    /// First fast-enter rule whose networks are visible and whose zone is not
    /// the one `user_id` is already reported in.
    #[must_use]
    pub fn fast_enter_rule(
        &self,
        user_id: &str,
        current_zone_id: Option<&str>,
        scan: &[WifiSighting],
    ) -> Option<&LeaveProtectionRule> {
        if !self.enabled {
            return None;
        }

        self.rules
            .iter()
            .filter(|rule| rule.enabled && rule.functions.fast_enter && rule.applies_to(user_id))
            .find(|rule| {
                let anchors = rule.anchors();
                if anchors.is_empty() || !anchors.seen_in(scan) {
                    return false;
                }
                if current_zone_id == Some(rule.zone_id.as_str()) {
                    debug!(rule = %rule.name, user_id, "Already in fast-enter zone");
                    return false;
                }
                debug!(rule = %rule.name, user_id, zone_id = %rule.zone_id, "Fast-enter rule matched");
                true
            })
    }
}

/// Free-function form of [`LeaveProtectionConfig::is_sticky`].
#[must_use]
pub fn is_sticky(
    previous: Option<&str>,
    resolved: &str,
    user_id: &str,
    zones: &[Zone],
    config: &LeaveProtectionConfig,
    scan: &[WifiSighting],
) -> bool {
    config.is_sticky(previous, resolved, user_id, zones, scan)
}
