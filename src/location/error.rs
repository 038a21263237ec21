//! Error types for the location subsystem.

use thiserror::Error;

/// Why a flow attempt ended without a fix. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location provider is disabled")]
    ProviderDisabled,

    #[error("Location settings cannot be satisfied: {0}")]
    SettingsUnresolvable(String),

    #[error("Error getting location details: {0}")]
    FetchFailed(String),

    #[error("Timed out waiting for a location fix")]
    TimedOut,

    #[error("No application can open {0}")]
    NoMapHandler(String),
}

/// Errors raised by platform adapters and providers.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Invalid coordinates: latitude {lat}, longitude {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("No handler installed for {0}")]
    NoHandler(String),

    #[error("Settings resolution unavailable: {0}")]
    ResolutionUnavailable(String),
}
