//! Desktop host for the acquisition flow.
//!
//! No runtime permission model and no settings resolver: those gates always
//! pass. The "GPS provider" is IP geolocation, backed by the last stored fix
//! when the network is unavailable. The UI is the terminal.
//!
//! Lookups run on a worker thread; their results surface through
//! `poll_event`, so a stalled request never holds up the caller.

use std::collections::{BTreeMap, VecDeque};
use std::process::Command;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cache::FixStore;
use super::error::LocationError;
use super::flow::FlowEvent;
use super::platform::{
    Looper, LocationSource, Navigator, PermissionService, ProviderRegistry, SettingsResolver,
    UiSurface,
};
use super::providers;
use super::types::{
    LocationFix, LocationRequest, Notice, PermissionKind, PermissionState, ProviderId,
    RationaleDialog, SettingsOutcome, SubscriptionHandle,
};

/// ipapi.co rate limits free clients.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub type Fetcher = fn() -> Result<LocationFix, LocationError>;
pub type Opener = fn(&str) -> Result<(), LocationError>;

struct Subscription {
    interval: Duration,
    next_due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lookup {
    Last,
    Update(SubscriptionHandle),
}

struct InFlight {
    lookup: Lookup,
    rx: Receiver<Result<LocationFix, LocationError>>,
}

pub struct DesktopPlatform {
    offline: bool,
    store: FixStore,
    fetch: Fetcher,
    open: Opener,
    queue: VecDeque<FlowEvent>,
    delayed: Vec<(Instant, FlowEvent)>,
    subscriptions: BTreeMap<SubscriptionHandle, Subscription>,
    in_flight: Vec<InFlight>,
    next_handle: u64,
}

impl DesktopPlatform {
    pub fn new(offline: bool) -> Self {
        Self::with_parts(offline, FixStore::load(), providers::ip_geolocate, open_with_system)
    }

    /// Build with an explicit store, network fetcher and URI opener.
    pub fn with_parts(offline: bool, store: FixStore, fetch: Fetcher, open: Opener) -> Self {
        Self {
            offline,
            store,
            fetch,
            open,
            queue: VecDeque::new(),
            delayed: Vec::new(),
            subscriptions: BTreeMap::new(),
            in_flight: Vec::new(),
            next_handle: 1,
        }
    }

    fn begin_lookup(&mut self, lookup: Lookup) {
        if self.offline {
            let event = self.resolve(
                lookup,
                Err(LocationError::Network("offline and no stored fix".into())),
            );
            self.queue.push_back(event);
            return;
        }

        let (tx, rx) = mpsc::channel();
        let fetch = self.fetch;
        let spawned = thread::Builder::new()
            .name("ip-geolocate".into())
            .spawn(move || {
                // The receiver is gone if the lookup was cancelled.
                let _ = tx.send(fetch());
            });
        match spawned {
            Ok(_) => self.in_flight.push(InFlight { lookup, rx }),
            Err(e) => {
                let event = self.resolve(lookup, Err(LocationError::Network(e.to_string())));
                self.queue.push_back(event);
            }
        }
    }

    /// Turn a lookup result into the flow event for it, falling back to the
    /// stored fix when the network failed.
    fn resolve(&mut self, lookup: Lookup, result: Result<LocationFix, LocationError>) -> FlowEvent {
        let outcome = match result {
            Ok(fix) => {
                self.store.put(&fix, "ip");
                Ok(fix)
            }
            Err(e) if self.offline => self.store.get().ok_or(e),
            Err(e) => match self.store.get() {
                Some(fix) => {
                    warn!(
                        error = %e,
                        source = self.store.source().unwrap_or("unknown"),
                        "IP geolocation failed, using last stored fix"
                    );
                    Ok(fix)
                }
                None => Err(e),
            },
        };

        match (lookup, outcome) {
            (Lookup::Last, Ok(fix)) => FlowEvent::LastLocation { fix: Some(fix) },
            (Lookup::Update(handle), Ok(fix)) => FlowEvent::LocationUpdate { handle, fixes: vec![fix] },
            (Lookup::Last, Err(LocationError::Network(reason))) if self.offline => {
                debug!(%reason, "no fix available offline");
                FlowEvent::LastLocation { fix: None }
            }
            (_, Err(e)) => FlowEvent::FetchFailed { reason: e.to_string() },
        }
    }

    fn start_due_polls(&mut self, now: Instant) {
        let due: Vec<SubscriptionHandle> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.next_due <= now)
            .map(|(handle, _)| *handle)
            .filter(|handle| !self.in_flight.iter().any(|f| f.lookup == Lookup::Update(*handle)))
            .collect();

        for handle in due {
            if let Some(sub) = self.subscriptions.get_mut(&handle) {
                sub.next_due = now + sub.interval;
            }
            self.begin_lookup(Lookup::Update(handle));
        }
    }

    fn poll_in_flight(&mut self) -> Option<FlowEvent> {
        for i in 0..self.in_flight.len() {
            let result = match self.in_flight[i].rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => {
                    Err(LocationError::Network("lookup thread exited without a result".into()))
                }
            };
            let done = self.in_flight.remove(i);
            return Some(self.resolve(done.lookup, result));
        }
        None
    }
}

impl PermissionService for DesktopPlatform {
    fn check(&self, _kind: PermissionKind) -> PermissionState {
        PermissionState::Granted
    }

    fn should_show_rationale(&self, _kind: PermissionKind) -> bool {
        false
    }

    fn request(&mut self, _kinds: &[PermissionKind], request_code: i32) {
        self.queue.push_back(FlowEvent::PermissionResult { request_code, granted: true });
    }
}

impl ProviderRegistry for DesktopPlatform {
    fn is_provider_enabled(&self, _provider: ProviderId) -> bool {
        !self.offline || self.store.get().is_some()
    }
}

impl SettingsResolver for DesktopPlatform {
    fn check_settings(&mut self, _request: &LocationRequest) {
        self.queue.push_back(FlowEvent::SettingsChecked { outcome: SettingsOutcome::Satisfied });
    }

    fn start_resolution(&mut self, _request_code: i32) -> Result<(), LocationError> {
        Err(LocationError::ResolutionUnavailable("desktop has no settings resolver".into()))
    }
}

impl LocationSource for DesktopPlatform {
    fn request_last_location(&mut self) {
        self.begin_lookup(Lookup::Last);
    }

    fn subscribe(&mut self, request: &LocationRequest) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        let interval = Duration::from_millis(request.interval_ms.max(request.fastest_interval_ms))
            .max(MIN_POLL_INTERVAL);
        self.subscriptions.insert(
            handle,
            Subscription {
                interval,
                next_due: Instant::now(),
            },
        );
        handle
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.subscriptions.remove(&handle);
        self.in_flight.retain(|f| f.lookup != Lookup::Update(handle));
    }
}

impl Navigator for DesktopPlatform {
    fn open_location_settings(&mut self) {
        eprintln!("  Location comes from IP geolocation here; re-run without --offline.");
    }

    fn view_uri(&mut self, uri: &str) -> Result<(), LocationError> {
        (self.open)(uri)
    }
}

impl UiSurface for DesktopPlatform {
    fn show_transient(&mut self, message: &str) {
        eprintln!("  {}", message);
    }

    fn show_persistent(&mut self, notice: &Notice) {
        match &notice.action_label {
            Some(label) => eprintln!("  \u{26A0}\u{FE0F}  {} [{}]", notice.message, label),
            None => eprintln!("  \u{26A0}\u{FE0F}  {}", notice.message),
        }
    }

    fn show_rationale(&mut self, dialog: &RationaleDialog) {
        eprintln!("  {}\n  {}", dialog.title, dialog.message);
    }

    fn set_map_enabled(&mut self, enabled: bool) {
        debug!(enabled, "map control");
    }

    fn render_fix(&mut self, text: &str) {
        eprintln!("  \u{1F4CD} {}", text);
    }
}

impl Looper for DesktopPlatform {
    fn poll_event(&mut self) -> Option<FlowEvent> {
        let now = Instant::now();
        self.start_due_polls(now);
        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }
        if let Some(i) = self.delayed.iter().position(|(at, _)| *at <= now) {
            return Some(self.delayed.remove(i).1);
        }
        self.poll_in_flight()
    }

    fn post_delayed(&mut self, event: FlowEvent, delay: Duration) {
        self.delayed.push((Instant::now() + delay, event));
    }
}

/// Hand a URI to the desktop's default handler for its scheme.
pub fn open_with_system(uri: &str) -> Result<(), LocationError> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };

    let status = command
        .arg(uri)
        .status()
        .map_err(|e| LocationError::NoHandler(format!("{}: {}", uri, e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(LocationError::NoHandler(format!("{}: opener exited with {}", uri, status)))
    }
}
