//! Core types for the location acquisition flow.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::LocationError;

/// A single (latitude, longitude) reading. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFix")]
pub struct LocationFix {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawFix {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawFix> for LocationFix {
    type Error = LocationError;

    fn try_from(raw: RawFix) -> Result<Self, Self::Error> {
        LocationFix::new(raw.latitude, raw.longitude)
    }
}

impl LocationFix {
    /// Build a fix, rejecting coordinates outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidCoordinates {
                lat: latitude,
                lon: longitude,
            });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for LocationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Answer to a permission query. Never cached beyond the current check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Denied,
    Granted,
}

/// Location permission granularity. Either grant is enough for a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Fine,
    Coarse,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 2] = [PermissionKind::Fine, PermissionKind::Coarse];
}

/// OS-level location source identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Gps,
}

/// Where the flow currently is in its gate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    #[default]
    Idle,
    AwaitingPermission,
    AwaitingProviderEnable,
    AwaitingSettingsResolution,
    FetchingLocation,
    Ready,
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingPermission => write!(f, "AwaitingPermission"),
            Self::AwaitingProviderEnable => write!(f, "AwaitingProviderEnable"),
            Self::AwaitingSettingsResolution => write!(f, "AwaitingSettingsResolution"),
            Self::FetchingLocation => write!(f, "FetchingLocation"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// How a fix is fetched once every gate has passed.
///
/// `OneShot` asks for the last known location and skips the settings gate.
/// `Continuous` verifies settings first and subscribes to updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    OneShot,
    #[default]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    HighAccuracy,
    BalancedPowerAccuracy,
    LowPower,
    Passive,
}

/// Parameters submitted to the settings resolver and the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRequest {
    pub priority: Priority,
    pub interval_ms: u64,
    pub fastest_interval_ms: u64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            priority: Priority::HighAccuracy,
            interval_ms: 4000,
            fastest_interval_ms: 2000,
        }
    }
}

/// Result of a settings-adequacy check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettingsOutcome {
    #[default]
    Satisfied,
    /// The platform can offer an interactive fix.
    Resolvable,
    Fatal { reason: String },
}

/// Opaque id of an active location update subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionHandle(pub u64);

/// Action attached to a persistent notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeAction {
    OpenLocationSettings,
}

/// A persistent, dismiss-free notice with an optional action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub action_label: Option<String>,
    pub action: Option<NoticeAction>,
}

impl Notice {
    pub fn enable_gps() -> Self {
        Self {
            message: "Please Enable GPS".into(),
            action_label: Some("Enable".into()),
            action: Some(NoticeAction::OpenLocationSettings),
        }
    }
}

/// Explanatory dialog shown before re-requesting a denied permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationaleDialog {
    pub title: String,
    pub message: String,
    pub positive_label: String,
}

impl RationaleDialog {
    pub fn location() -> Self {
        Self {
            title: "Location Permission Required!".into(),
            message: "It is necessary to enable location permission to get location details. \
                      Do you want to allow ?"
                .into(),
            positive_label: "Enable".into(),
        }
    }
}

/// Read-only snapshot of the flow for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowView {
    pub phase: FlowPhase,
    pub fix: Option<LocationFix>,
    pub fix_text: Option<String>,
    pub map_enabled: bool,
    pub map_uri: Option<String>,
    pub subscribed: bool,
    pub backgrounded: bool,
    pub last_error: Option<String>,
}
