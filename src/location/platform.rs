//! Platform collaborators of the acquisition flow.
//!
//! Requests return immediately. Their completions come back later as
//! [`FlowEvent`]s through [`Looper::poll_event`], on the same thread.

use std::time::Duration;

use super::error::LocationError;
use super::flow::FlowEvent;
use super::types::{
    LocationRequest, Notice, PermissionKind, PermissionState, ProviderId, RationaleDialog,
    SubscriptionHandle,
};

pub trait PermissionService {
    fn check(&self, kind: PermissionKind) -> PermissionState;

    /// Whether the OS recommends explaining the permission before asking again.
    fn should_show_rationale(&self, kind: PermissionKind) -> bool;

    /// Answer arrives as [`FlowEvent::PermissionResult`] carrying `request_code`.
    fn request(&mut self, kinds: &[PermissionKind], request_code: i32);
}

pub trait ProviderRegistry {
    fn is_provider_enabled(&self, provider: ProviderId) -> bool;
}

pub trait SettingsResolver {
    /// Answer arrives as [`FlowEvent::SettingsChecked`].
    fn check_settings(&mut self, request: &LocationRequest);

    /// Launch the interactive fix. Its outcome arrives as
    /// [`FlowEvent::ResolutionResult`] carrying `request_code`.
    fn start_resolution(&mut self, request_code: i32) -> Result<(), LocationError>;
}

pub trait LocationSource {
    /// Answer arrives as [`FlowEvent::LastLocation`] or [`FlowEvent::FetchFailed`].
    fn request_last_location(&mut self);

    /// Fixes arrive as [`FlowEvent::LocationUpdate`] tagged with the handle.
    fn subscribe(&mut self, request: &LocationRequest) -> SubscriptionHandle;

    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

pub trait Navigator {
    fn open_location_settings(&mut self);

    /// Hand a URI to whatever application handles its scheme.
    fn view_uri(&mut self, uri: &str) -> Result<(), LocationError>;
}

pub trait UiSurface {
    fn show_transient(&mut self, message: &str);
    fn show_persistent(&mut self, notice: &Notice);
    fn show_rationale(&mut self, dialog: &RationaleDialog);
    fn set_map_enabled(&mut self, enabled: bool);
    fn render_fix(&mut self, text: &str);
}

/// The event queue that carries asynchronous completions back to the flow.
pub trait Looper {
    fn poll_event(&mut self) -> Option<FlowEvent>;
    fn post_delayed(&mut self, event: FlowEvent, delay: Duration);
}

/// Everything the flow needs from its host.
pub trait Platform:
    PermissionService + ProviderRegistry + SettingsResolver + LocationSource + Navigator + UiSurface + Looper
{
}

impl<T> Platform for T where
    T: PermissionService
        + ProviderRegistry
        + SettingsResolver
        + LocationSource
        + Navigator
        + UiSurface
        + Looper
{
}
