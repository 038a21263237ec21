//! Scriptable in-memory platform.
//!
//! Answers every request from a [`Scenario`], records each call and UI
//! change in order, and runs delayed events on a virtual clock. Backs the
//! tests, the `--scenario` CLI mode and the HTTP control surface.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use super::error::LocationError;
use super::flow::{FlowEvent, LocationAcquisitionFlow};
use super::platform::{
    Looper, LocationSource, Navigator, PermissionService, ProviderRegistry, SettingsResolver,
    UiSurface,
};
use super::types::{
    FlowView, LocationFix, LocationRequest, Notice, PermissionKind, PermissionState, ProviderId,
    RationaleDialog, SettingsOutcome, SubscriptionHandle,
};

/// How the simulated device and user behave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub fine: PermissionState,
    pub coarse: PermissionState,
    /// OS recommends showing a rationale. Becomes true after a plain denial.
    pub show_rationale: bool,
    /// The user ticked "don't ask again": requests are denied without a prompt.
    pub dont_ask_again: bool,
    /// How the user answers the permission prompt.
    pub user_grants: bool,
    pub provider_enabled: bool,
    /// Opening location settings switches the provider on.
    pub settings_enable_provider: bool,
    pub settings: SettingsOutcome,
    pub resolution_available: bool,
    pub resolution_succeeds: bool,
    pub last_location: Option<LocationFix>,
    pub fetch_error: Option<String>,
    /// Fixes delivered, one event each, after a subscription starts.
    pub updates: Vec<LocationFix>,
    pub map_handler_installed: bool,
    /// When false, requests are only recorded and the caller injects answers.
    pub auto_respond: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            fine: PermissionState::Unknown,
            coarse: PermissionState::Unknown,
            show_rationale: false,
            dont_ask_again: false,
            user_grants: true,
            provider_enabled: true,
            settings_enable_provider: true,
            settings: SettingsOutcome::Satisfied,
            resolution_available: true,
            resolution_succeeds: true,
            last_location: None,
            fetch_error: None,
            updates: Vec::new(),
            map_handler_installed: true,
            auto_respond: true,
        }
    }
}

/// A platform request as seen by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PlatformCall {
    RequestPermission { kinds: Vec<PermissionKind>, request_code: i32 },
    CheckSettings { request: LocationRequest },
    StartResolution { request_code: i32 },
    RequestLastLocation,
    Subscribe { handle: SubscriptionHandle, request: LocationRequest },
    Unsubscribe { handle: SubscriptionHandle },
    OpenLocationSettings,
    ViewUri { uri: String },
}

/// A UI change as seen by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "ui", rename_all = "snake_case")]
pub enum UiEntry {
    Transient { message: String },
    Persistent { notice: Notice },
    Rationale { dialog: RationaleDialog },
    MapEnabled { enabled: bool },
    FixRendered { text: String },
}

impl UiEntry {
    pub fn is_fix_rendered(&self) -> bool {
        matches!(self, UiEntry::FixRendered { .. })
    }

    pub fn is_map_enabled(&self) -> bool {
        matches!(self, UiEntry::MapEnabled { enabled: true })
    }
}

pub struct SimulatedPlatform {
    scenario: Scenario,
    calls: Vec<PlatformCall>,
    ui: Vec<UiEntry>,
    queue: VecDeque<FlowEvent>,
    delayed: Vec<(Duration, FlowEvent)>,
    clock: Duration,
    active: BTreeSet<SubscriptionHandle>,
    peak_active: usize,
    next_handle: u64,
}

impl SimulatedPlatform {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            calls: Vec::new(),
            ui: Vec::new(),
            queue: VecDeque::new(),
            delayed: Vec::new(),
            clock: Duration::ZERO,
            active: BTreeSet::new(),
            peak_active: 0,
            next_handle: 1,
        }
    }

    pub fn scenario_mut(&mut self) -> &mut Scenario {
        &mut self.scenario
    }

    pub fn set_scenario(&mut self, scenario: Scenario) {
        self.scenario = scenario;
    }

    pub fn set_permission(&mut self, kind: PermissionKind, state: PermissionState) {
        match kind {
            PermissionKind::Fine => self.scenario.fine = state,
            PermissionKind::Coarse => self.scenario.coarse = state,
        }
    }

    /// Inject an OS callback by hand.
    pub fn push_event(&mut self, event: FlowEvent) {
        self.queue.push_back(event);
    }

    /// Move the virtual clock forward and release due delayed events.
    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
        let now = self.clock;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        due.sort_by_key(|(at, _)| *at);
        self.delayed = pending;
        self.queue.extend(due.into_iter().map(|(_, event)| event));
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn calls(&self) -> &[PlatformCall] {
        &self.calls
    }

    pub fn call_position(&self, pred: impl Fn(&PlatformCall) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn ui(&self) -> &[UiEntry] {
        &self.ui
    }

    pub fn ui_position(&self, pred: impl Fn(&UiEntry) -> bool) -> Option<usize> {
        self.ui.iter().position(pred)
    }

    pub fn transient_notices(&self) -> Vec<&str> {
        self.ui
            .iter()
            .filter_map(|e| match e {
                UiEntry::Transient { message } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn persistent_notices(&self) -> Vec<&Notice> {
        self.ui
            .iter()
            .filter_map(|e| match e {
                UiEntry::Persistent { notice } => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn rationale_count(&self) -> usize {
        self.ui
            .iter()
            .filter(|e| matches!(e, UiEntry::Rationale { .. }))
            .count()
    }

    /// Current state of the "open in map" control.
    pub fn map_enabled(&self) -> bool {
        self.ui
            .iter()
            .rev()
            .find_map(|e| match e {
                UiEntry::MapEnabled { enabled } => Some(*enabled),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn opened_uris(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PlatformCall::ViewUri { uri } => Some(uri.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn active_handles(&self) -> Vec<SubscriptionHandle> {
        self.active.iter().copied().collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.len()
    }

    /// Most subscriptions ever alive at once.
    pub fn peak_subscriptions(&self) -> usize {
        self.peak_active
    }
}

impl PermissionService for SimulatedPlatform {
    fn check(&self, kind: PermissionKind) -> PermissionState {
        match kind {
            PermissionKind::Fine => self.scenario.fine,
            PermissionKind::Coarse => self.scenario.coarse,
        }
    }

    fn should_show_rationale(&self, _kind: PermissionKind) -> bool {
        self.scenario.show_rationale && !self.scenario.dont_ask_again
    }

    fn request(&mut self, kinds: &[PermissionKind], request_code: i32) {
        self.calls.push(PlatformCall::RequestPermission {
            kinds: kinds.to_vec(),
            request_code,
        });
        if !self.scenario.auto_respond {
            return;
        }

        let granted = self.scenario.user_grants && !self.scenario.dont_ask_again;
        let state = if granted { PermissionState::Granted } else { PermissionState::Denied };
        for kind in kinds {
            self.set_permission(*kind, state);
        }
        if !granted && !self.scenario.dont_ask_again {
            self.scenario.show_rationale = true;
        }
        self.queue.push_back(FlowEvent::PermissionResult { request_code, granted });
    }
}

impl ProviderRegistry for SimulatedPlatform {
    fn is_provider_enabled(&self, _provider: ProviderId) -> bool {
        self.scenario.provider_enabled
    }
}

impl SettingsResolver for SimulatedPlatform {
    fn check_settings(&mut self, request: &LocationRequest) {
        self.calls.push(PlatformCall::CheckSettings { request: *request });
        if self.scenario.auto_respond {
            self.queue.push_back(FlowEvent::SettingsChecked {
                outcome: self.scenario.settings.clone(),
            });
        }
    }

    fn start_resolution(&mut self, request_code: i32) -> Result<(), LocationError> {
        self.calls.push(PlatformCall::StartResolution { request_code });
        if !self.scenario.resolution_available {
            return Err(LocationError::ResolutionUnavailable("no resolution intent".into()));
        }
        if self.scenario.auto_respond {
            let resolved = self.scenario.resolution_succeeds;
            if resolved {
                self.scenario.settings = SettingsOutcome::Satisfied;
            }
            self.queue.push_back(FlowEvent::ResolutionResult { request_code, resolved });
        }
        Ok(())
    }
}

impl LocationSource for SimulatedPlatform {
    fn request_last_location(&mut self) {
        self.calls.push(PlatformCall::RequestLastLocation);
        if !self.scenario.auto_respond {
            return;
        }
        let event = match &self.scenario.fetch_error {
            Some(reason) => FlowEvent::FetchFailed { reason: reason.clone() },
            None => FlowEvent::LastLocation { fix: self.scenario.last_location },
        };
        self.queue.push_back(event);
    }

    fn subscribe(&mut self, request: &LocationRequest) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.calls.push(PlatformCall::Subscribe { handle, request: *request });
        self.active.insert(handle);
        self.peak_active = self.peak_active.max(self.active.len());

        if self.scenario.auto_respond {
            if let Some(reason) = &self.scenario.fetch_error {
                self.queue.push_back(FlowEvent::FetchFailed { reason: reason.clone() });
            }
            for fix in &self.scenario.updates {
                self.queue.push_back(FlowEvent::LocationUpdate {
                    handle,
                    fixes: vec![*fix],
                });
            }
        }
        handle
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.calls.push(PlatformCall::Unsubscribe { handle });
        self.active.remove(&handle);
        self.queue.retain(|e| {
            !matches!(e, FlowEvent::LocationUpdate { handle: h, .. } if *h == handle)
        });
    }
}

impl Navigator for SimulatedPlatform {
    fn open_location_settings(&mut self) {
        self.calls.push(PlatformCall::OpenLocationSettings);
        if self.scenario.settings_enable_provider {
            self.scenario.provider_enabled = true;
        }
    }

    fn view_uri(&mut self, uri: &str) -> Result<(), LocationError> {
        self.calls.push(PlatformCall::ViewUri { uri: uri.to_string() });
        if self.scenario.map_handler_installed {
            Ok(())
        } else {
            Err(LocationError::NoHandler(uri.to_string()))
        }
    }
}

impl UiSurface for SimulatedPlatform {
    fn show_transient(&mut self, message: &str) {
        self.ui.push(UiEntry::Transient { message: message.to_string() });
    }

    fn show_persistent(&mut self, notice: &Notice) {
        self.ui.push(UiEntry::Persistent { notice: notice.clone() });
    }

    fn show_rationale(&mut self, dialog: &RationaleDialog) {
        self.ui.push(UiEntry::Rationale { dialog: dialog.clone() });
    }

    fn set_map_enabled(&mut self, enabled: bool) {
        self.ui.push(UiEntry::MapEnabled { enabled });
    }

    fn render_fix(&mut self, text: &str) {
        self.ui.push(UiEntry::FixRendered { text: text.to_string() });
    }
}

impl Looper for SimulatedPlatform {
    fn poll_event(&mut self) -> Option<FlowEvent> {
        self.queue.pop_front()
    }

    fn post_delayed(&mut self, event: FlowEvent, delay: Duration) {
        self.delayed.push((self.clock + delay, event));
    }
}

/// Everything a client of the simulator wants to see at once.
#[derive(Debug, Clone, Serialize)]
pub struct SimSnapshot {
    pub view: FlowView,
    pub ui: Vec<UiEntry>,
    pub calls: Vec<PlatformCall>,
    pub clock_ms: u64,
}

pub fn snapshot(flow: &LocationAcquisitionFlow<SimulatedPlatform>) -> SimSnapshot {
    let sim = flow.platform();
    SimSnapshot {
        view: flow.view(),
        ui: sim.ui().to_vec(),
        calls: sim.calls().to_vec(),
        clock_ms: sim.clock().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_denial_turns_on_rationale() {
        let mut sim = SimulatedPlatform::new(Scenario {
            user_grants: false,
            ..Scenario::default()
        });
        assert!(!sim.should_show_rationale(PermissionKind::Fine));
        sim.request(&PermissionKind::ALL, 1052);

        assert!(sim.should_show_rationale(PermissionKind::Fine));
        assert_eq!(sim.check(PermissionKind::Fine), PermissionState::Denied);
        assert_eq!(
            sim.poll_event(),
            Some(FlowEvent::PermissionResult { request_code: 1052, granted: false })
        );
    }

    #[test]
    fn test_unsubscribe_drops_queued_updates() {
        let fix = LocationFix::new(1.0, 2.0).unwrap();
        let mut sim = SimulatedPlatform::new(Scenario {
            updates: vec![fix, fix],
            ..Scenario::default()
        });
        let handle = sim.subscribe(&LocationRequest::default());
        sim.unsubscribe(handle);

        assert_eq!(sim.poll_event(), None);
        assert_eq!(sim.active_subscriptions(), 0);
        assert_eq!(sim.peak_subscriptions(), 1);
    }

    #[test]
    fn test_delayed_events_release_in_due_order() {
        let mut sim = SimulatedPlatform::new(Scenario::default());
        sim.post_delayed(FlowEvent::FetchTimedOut { attempt: 2 }, Duration::from_secs(2));
        sim.post_delayed(FlowEvent::FetchTimedOut { attempt: 1 }, Duration::from_secs(1));

        sim.advance(Duration::from_millis(500));
        assert_eq!(sim.poll_event(), None);

        sim.advance(Duration::from_secs(2));
        assert_eq!(sim.poll_event(), Some(FlowEvent::FetchTimedOut { attempt: 1 }));
        assert_eq!(sim.poll_event(), Some(FlowEvent::FetchTimedOut { attempt: 2 }));
    }

    #[test]
    fn test_scenario_json_defaults() {
        let scenario: Scenario =
            serde_json::from_str(r#"{ "fine": "granted", "provider_enabled": false }"#).unwrap();
        assert_eq!(scenario.fine, PermissionState::Granted);
        assert!(!scenario.provider_enabled);
        assert!(scenario.auto_respond);
        assert_eq!(scenario.settings, SettingsOutcome::Satisfied);
    }

    #[test]
    fn test_bundled_scenarios_parse() {
        let files = [
            include_str!("../../scenarios/happy_path.json"),
            include_str!("../../scenarios/permission_denied.json"),
            include_str!("../../scenarios/gps_off.json"),
            include_str!("../../scenarios/settings_resolution.json"),
        ];
        for body in files {
            serde_json::from_str::<Scenario>(body).unwrap();
        }
    }
}
