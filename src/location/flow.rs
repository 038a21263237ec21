//! The location acquisition flow.
//!
//! Gate chain:  permission → provider → settings → fetch → publish
//!
//! Every gate failure drops back to `Idle` and leaves a remediation on
//! screen. Nothing is retried automatically except the full restart after
//! returning from the background.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FlowConfig;

use super::error::FlowError;
use super::geo_uri;
use super::platform::Platform;
use super::types::{
    FetchMode, FlowPhase, FlowView, LocationFix, Notice, PermissionKind, PermissionState,
    ProviderId, RationaleDialog, SettingsOutcome, SubscriptionHandle,
};

pub const PERMISSION_DENIED_TEXT: &str = "Permission Denied";
pub const FETCH_ERROR_TEXT: &str = "Error getting location details";
pub const SETTINGS_DECLINED_TEXT: &str = "Location settings were not changed";
pub const TIMEOUT_TEXT: &str = "Timed out waiting for location";

/// Everything that can happen to the flow: user actions, OS callbacks,
/// lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    Created,
    GetLocationPressed,
    OpenMapPressed,
    RationaleAccepted,
    RationaleDismissed,
    EnableProviderPressed,
    PermissionResult { request_code: i32, granted: bool },
    SettingsChecked { outcome: SettingsOutcome },
    ResolutionResult { request_code: i32, resolved: bool },
    LastLocation { fix: Option<LocationFix> },
    LocationUpdate { handle: SubscriptionHandle, fixes: Vec<LocationFix> },
    FetchFailed { reason: String },
    FetchTimedOut { attempt: u64 },
    Paused,
    Resumed,
    Stopped,
}

#[derive(Debug, Default)]
struct FlowState {
    phase: FlowPhase,
    fix: Option<LocationFix>,
    fix_text: Option<String>,
    map_enabled: bool,
    backgrounded: bool,
    /// Set once the user (or creation) has kicked off the chain.
    engaged: bool,
    permission_pending: bool,
    resolution_pending: bool,
    subscription: Option<SubscriptionHandle>,
    attempt: u64,
    last_error: Option<FlowError>,
}

/// Owns the flow state and its platform. The UI reads [`view`](Self::view)
/// and feeds [`dispatch`](Self::dispatch).
pub struct LocationAcquisitionFlow<P> {
    platform: P,
    config: FlowConfig,
    state: FlowState,
}

impl<P: Platform> LocationAcquisitionFlow<P> {
    pub fn new(platform: P, config: FlowConfig) -> Self {
        Self {
            platform,
            config,
            state: FlowState::default(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn phase(&self) -> FlowPhase {
        self.state.phase
    }

    pub fn fix(&self) -> Option<LocationFix> {
        self.state.fix
    }

    pub fn last_error(&self) -> Option<&FlowError> {
        self.state.last_error.as_ref()
    }

    pub fn view(&self) -> FlowView {
        FlowView {
            phase: self.state.phase,
            fix: self.state.fix,
            fix_text: self.state.fix_text.clone(),
            map_enabled: self.state.map_enabled,
            map_uri: self.state.fix.as_ref().map(geo_uri::geo_uri),
            subscribed: self.state.subscription.is_some(),
            backgrounded: self.state.backgrounded,
            last_error: self.state.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn dispatch(&mut self, event: FlowEvent) {
        debug!(?event, phase = %self.state.phase, "dispatch");
        match event {
            FlowEvent::Created => self.on_create(),
            FlowEvent::GetLocationPressed => self.start(),
            FlowEvent::OpenMapPressed => self.goto_map(),
            FlowEvent::RationaleAccepted => self.on_rationale_accepted(),
            FlowEvent::RationaleDismissed => self.on_rationale_dismissed(),
            FlowEvent::EnableProviderPressed => self.platform.open_location_settings(),
            FlowEvent::PermissionResult { request_code, granted } => {
                self.on_permission_result(request_code, granted)
            }
            FlowEvent::SettingsChecked { outcome } => self.on_settings_checked(outcome),
            FlowEvent::ResolutionResult { request_code, resolved } => {
                self.on_resolution_result(request_code, resolved)
            }
            FlowEvent::LastLocation { fix } => self.on_last_location(fix),
            FlowEvent::LocationUpdate { handle, fixes } => self.on_location_update(handle, &fixes),
            FlowEvent::FetchFailed { reason } => self.on_fetch_failed(reason),
            FlowEvent::FetchTimedOut { attempt } => self.on_fetch_timeout(attempt),
            FlowEvent::Paused => self.on_pause(),
            FlowEvent::Resumed => self.on_resume(),
            FlowEvent::Stopped => self.on_stop(),
        }
    }

    /// Drain every completion the platform has ready. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.platform.poll_event() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    // ── Gates ──────────────────────────────────────────────────

    pub fn start(&mut self) {
        self.state.engaged = true;
        self.state.last_error = None;
        self.stop_location_updates();
        self.check_permission();
    }

    pub fn check_permission(&mut self) {
        if self.has_location_permission() {
            // A request may still be in flight from before a restart.
            self.state.permission_pending = false;
            self.check_provider();
            return;
        }

        self.state.phase = FlowPhase::AwaitingPermission;
        if self.state.permission_pending {
            debug!("permission request already in flight");
            return;
        }

        if self.platform.should_show_rationale(PermissionKind::Fine) {
            self.platform.show_rationale(&RationaleDialog::location());
        } else {
            self.request_permission();
        }
    }

    pub fn check_provider(&mut self) {
        self.state.phase = FlowPhase::AwaitingProviderEnable;
        if !self.platform.is_provider_enabled(ProviderId::Gps) {
            info!("GPS provider disabled");
            self.platform.show_persistent(&Notice::enable_gps());
            self.halt(FlowError::ProviderDisabled);
            return;
        }

        match self.config.fetch_mode {
            FetchMode::Continuous => self.check_location_settings(),
            FetchMode::OneShot => self.fetch_location(),
        }
    }

    pub fn check_location_settings(&mut self) {
        self.state.phase = FlowPhase::AwaitingSettingsResolution;
        if self.state.resolution_pending {
            debug!("settings resolution already in flight");
            return;
        }
        let request = self.config.request;
        self.platform.check_settings(&request);
    }

    pub fn fetch_location(&mut self) {
        if !self.has_location_permission() {
            warn!("fetch attempted without location permission");
            self.halt(FlowError::PermissionDenied);
            return;
        }

        self.state.phase = FlowPhase::FetchingLocation;
        self.state.attempt += 1;
        if let Some(timeout) = self.config.fetch_timeout() {
            self.platform.post_delayed(
                FlowEvent::FetchTimedOut { attempt: self.state.attempt },
                timeout,
            );
        }

        match self.config.fetch_mode {
            FetchMode::OneShot => self.platform.request_last_location(),
            FetchMode::Continuous => self.start_location_updates(),
        }
    }

    pub fn goto_map(&mut self) {
        let Some(fix) = self.state.fix else {
            debug!("map requested before any fix");
            return;
        };
        let uri = geo_uri::geo_uri(&fix);
        if let Err(e) = self.platform.view_uri(&uri) {
            debug!(error = %e, %uri, "no handler for geo uri");
            self.state.last_error = Some(FlowError::NoMapHandler(uri));
        }
    }

    // ── Callbacks ──────────────────────────────────────────────

    pub fn on_permission_result(&mut self, request_code: i32, granted: bool) {
        if request_code != self.config.permission_request_code {
            debug!(request_code, "ignoring foreign permission result");
            return;
        }
        if !self.state.permission_pending {
            debug!("ignoring permission result with no request in flight");
            return;
        }
        self.state.permission_pending = false;

        if granted {
            info!("location permission granted");
            self.check_provider();
        } else {
            info!("location permission denied");
            self.platform.show_transient(PERMISSION_DENIED_TEXT);
            self.halt(FlowError::PermissionDenied);
        }
    }

    fn on_rationale_accepted(&mut self) {
        if self.state.phase == FlowPhase::AwaitingPermission && !self.state.permission_pending {
            self.request_permission();
        }
    }

    fn on_rationale_dismissed(&mut self) {
        if self.state.phase == FlowPhase::AwaitingPermission && !self.state.permission_pending {
            self.halt(FlowError::PermissionDenied);
        }
    }

    fn on_settings_checked(&mut self, outcome: SettingsOutcome) {
        if self.state.phase != FlowPhase::AwaitingSettingsResolution || self.state.resolution_pending {
            debug!(?outcome, "ignoring stale settings result");
            return;
        }

        match outcome {
            SettingsOutcome::Satisfied => {
                debug!("location settings satisfied");
                self.fetch_location();
            }
            SettingsOutcome::Resolvable => {
                match self.platform.start_resolution(self.config.resolution_request_code) {
                    Ok(()) => self.state.resolution_pending = true,
                    Err(e) => {
                        warn!(error = %e, "cannot launch settings resolution");
                        self.halt(FlowError::SettingsUnresolvable(e.to_string()));
                    }
                }
            }
            SettingsOutcome::Fatal { reason } => {
                warn!(%reason, "location settings unresolvable");
                self.halt(FlowError::SettingsUnresolvable(reason));
            }
        }
    }

    fn on_resolution_result(&mut self, request_code: i32, resolved: bool) {
        if request_code != self.config.resolution_request_code || !self.state.resolution_pending {
            debug!(request_code, "ignoring unexpected resolution result");
            return;
        }
        self.state.resolution_pending = false;

        if resolved {
            self.fetch_location();
        } else {
            self.platform.show_transient(SETTINGS_DECLINED_TEXT);
            self.halt(FlowError::SettingsUnresolvable("declined by user".into()));
        }
    }

    fn on_last_location(&mut self, fix: Option<LocationFix>) {
        if self.state.phase != FlowPhase::FetchingLocation {
            debug!("ignoring stale last location");
            return;
        }
        match fix {
            Some(fix) => self.publish(fix),
            None => self.on_fetch_failed("no last known location".into()),
        }
    }

    fn on_location_update(&mut self, handle: SubscriptionHandle, fixes: &[LocationFix]) {
        if self.state.subscription != Some(handle) {
            debug!(?handle, "ignoring update from inactive subscription");
            return;
        }
        if let Some(fix) = fixes.last().copied() {
            self.publish(fix);
        }
    }

    fn on_fetch_failed(&mut self, reason: String) {
        if self.state.phase != FlowPhase::FetchingLocation {
            debug!(%reason, "ignoring stale fetch failure");
            return;
        }
        warn!(%reason, "location fetch failed");
        self.stop_location_updates();
        self.platform.show_transient(FETCH_ERROR_TEXT);
        self.halt(FlowError::FetchFailed(reason));
    }

    fn on_fetch_timeout(&mut self, attempt: u64) {
        if attempt != self.state.attempt || self.state.phase != FlowPhase::FetchingLocation {
            return;
        }
        warn!(attempt, "location fetch timed out");
        self.stop_location_updates();
        self.platform.show_transient(TIMEOUT_TEXT);
        self.halt(FlowError::TimedOut);
    }

    // ── Lifecycle ──────────────────────────────────────────────

    pub fn on_create(&mut self) {
        if !self.has_location_permission() {
            self.state.engaged = true;
            self.check_permission();
        }
    }

    pub fn on_pause(&mut self) {
        self.state.backgrounded = true;
    }

    /// The user may have changed permission, GPS or settings while away and
    /// cannot know which gate failed, so the whole chain runs again.
    pub fn on_resume(&mut self) {
        if !std::mem::take(&mut self.state.backgrounded) {
            return;
        }
        if !self.config.restart_on_resume || !self.state.engaged {
            return;
        }
        debug!(phase = %self.state.phase, "restarting flow after background");
        self.state.phase = FlowPhase::Idle;
        self.start();
    }

    pub fn on_stop(&mut self) {
        if self.stop_location_updates() && self.state.phase == FlowPhase::FetchingLocation {
            self.state.phase = FlowPhase::Idle;
        }
    }

    // ── Helpers ────────────────────────────────────────────────

    fn has_location_permission(&self) -> bool {
        PermissionKind::ALL
            .iter()
            .any(|kind| self.platform.check(*kind) == PermissionState::Granted)
    }

    fn request_permission(&mut self) {
        self.state.permission_pending = true;
        self.platform
            .request(&PermissionKind::ALL, self.config.permission_request_code);
    }

    fn start_location_updates(&mut self) {
        self.stop_location_updates();
        let request = self.config.request;
        let handle = self.platform.subscribe(&request);
        debug!(?handle, "location updates started");
        self.state.subscription = Some(handle);
    }

    fn stop_location_updates(&mut self) -> bool {
        match self.state.subscription.take() {
            Some(handle) => {
                self.platform.unsubscribe(handle);
                debug!(?handle, "location updates stopped");
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, fix: LocationFix) {
        self.state.fix = Some(fix);
        let text = geo_uri::fix_text(&fix);
        self.platform.render_fix(&text);
        self.state.fix_text = Some(text);
        if !self.state.map_enabled {
            self.platform.set_map_enabled(true);
            self.state.map_enabled = true;
        }
        self.state.phase = FlowPhase::Ready;
        self.state.last_error = None;
        info!(latitude = fix.latitude(), longitude = fix.longitude(), "location fix published");
    }

    fn halt(&mut self, error: FlowError) {
        self.state.phase = FlowPhase::Idle;
        self.state.last_error = Some(error);
    }
}
