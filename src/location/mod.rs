//! Location acquisition subsystem.
//!
//! A gate-chain state machine (permission, provider, settings, fetch) over
//! pluggable platform services, plus a simulated host and a desktop host.

pub mod cache;
pub mod desktop;
pub mod error;
pub mod flow;
pub mod geo_uri;
pub mod platform;
pub mod providers;
pub mod sim;
pub mod types;

pub use error::{FlowError, LocationError};
pub use flow::{FlowEvent, LocationAcquisitionFlow};
pub use geo_uri::geo_uri;
pub use platform::Platform;
pub use types::{
    FetchMode, FlowPhase, FlowView, LocationFix, LocationRequest, PermissionKind, PermissionState,
    Priority, SettingsOutcome, SubscriptionHandle,
};
