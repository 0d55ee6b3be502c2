//! Simulated hardware
//!
//! In-memory [`Radio`], [`EventSource`] and [`PersistentStorage`]
//! implementations. A [`SimController`] shares state with the simulated radio
//! so a caller can script access points, inject events and inspect the calls
//! the station manager made after the radio has been moved into it.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{RadioError, StorageError};
use crate::events::{DisconnectReason, EventSink, StationEvent};
use crate::radio::{ClientSettings, EventChannel, EventSource, PersistentStorage, Radio, RadioMode};
use crate::record::{Bssid, RawApRecord};

/// A call made on the simulated radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Init,
    SetMode(RadioMode),
    Start,
    Stop,
    Scan { max_results: u16 },
    Configure(ClientSettings),
    Connect,
    Disconnect,
}

#[derive(Default)]
struct SimState {
    access_points: Vec<RawApRecord>,
    ignore_scan_limit: bool,
    calls: Vec<RadioCall>,
    sinks: Vec<(EventChannel, EventSink)>,
    auto_associate: Option<Ipv4Addr>,
    fail_init: Option<RadioError>,
    fail_start: Option<RadioError>,
    fail_next_scan: Option<RadioError>,
    fail_connects: usize,
}

impl SimState {
    fn emit(&self, event: StationEvent) {
        let channel = event.channel();
        for (_, sink) in self.sinks.iter().filter(|(c, _)| *c == channel) {
            let _ = sink.post(event.clone());
        }
    }
}

struct Shared {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: RadioCall) -> MutexGuard<'_, SimState> {
        trace!("sim radio: {:?}", call);
        let mut state = self.lock();
        state.calls.push(call);
        self.changed.notify_all();
        state
    }
}

/// Build a simulated radio, its event source and a controller sharing their state
pub fn simulated() -> (SimRadio, SimEvents, SimController) {
    let shared = Arc::new(Shared {
        state: Mutex::new(SimState::default()),
        changed: Condvar::new(),
    });
    (
        SimRadio { shared: Arc::clone(&shared) },
        SimEvents { shared: Arc::clone(&shared) },
        SimController { shared },
    )
}

/// Raw record for a scripted access point with BSSID `02:00:00:00:00:<id>`
pub fn access_point(id: u8, ssid: &str, channel: u8, rssi: i8, authmode: u32) -> RawApRecord {
    let mut raw = RawApRecord {
        bssid: [0x02, 0, 0, 0, 0, id],
        primary: channel,
        rssi,
        authmode,
        pairwise_cipher: 4,
        group_cipher: 4,
        ..RawApRecord::default()
    };
    let len = ssid.len().min(raw.ssid.len() - 1);
    raw.ssid[..len].copy_from_slice(&ssid.as_bytes()[..len]);
    raw
}

/// Simulated radio peripheral
pub struct SimRadio {
    shared: Arc<Shared>,
}

impl Radio for SimRadio {
    fn init(&mut self) -> Result<(), RadioError> {
        let mut state = self.shared.record(RadioCall::Init);
        match state.fail_init.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        drop(self.shared.record(RadioCall::SetMode(mode)));
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        let mut state = self.shared.record(RadioCall::Start);
        if let Some(e) = state.fail_start.take() {
            return Err(e);
        }
        state.emit(StationEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.shared.record(RadioCall::Stop).emit(StationEvent::Stopped);
        Ok(())
    }

    fn scan_blocking(&mut self, max_results: u16) -> Result<Vec<RawApRecord>, RadioError> {
        let mut state = self.shared.record(RadioCall::Scan { max_results });
        if let Some(e) = state.fail_next_scan.take() {
            return Err(e);
        }
        let limit = if state.ignore_scan_limit {
            usize::MAX
        } else {
            usize::from(max_results)
        };
        let found: Vec<_> = state.access_points.iter().take(limit).copied().collect();
        state.emit(StationEvent::ScanDone {
            count: u16::try_from(found.len()).unwrap_or(u16::MAX),
        });
        Ok(found)
    }

    fn configure(&mut self, settings: &ClientSettings) -> Result<(), RadioError> {
        drop(self.shared.record(RadioCall::Configure(settings.clone())));
        Ok(())
    }

    fn connect(&mut self) -> Result<(), RadioError> {
        let mut state = self.shared.record(RadioCall::Connect);
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(RadioError::Driver { op: "esp_wifi_connect", code: 0x3006 });
        }
        if let Some(ip) = state.auto_associate {
            state.emit(StationEvent::Connected {
                bssid: Bssid([0x02, 0, 0, 0, 0, 1]),
                channel: 6,
            });
            state.emit(StationEvent::IpAcquired {
                ip,
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(ip.octets()[0], ip.octets()[1], ip.octets()[2], 1),
            });
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.shared.record(RadioCall::Disconnect).emit(StationEvent::Disconnected {
            reason: DisconnectReason::ASSOC_LEAVE,
        });
        Ok(())
    }
}

/// Simulated system event loop
pub struct SimEvents {
    shared: Arc<Shared>,
}

impl EventSource for SimEvents {
    fn subscribe(&mut self, channel: EventChannel, sink: EventSink) -> Result<(), RadioError> {
        self.shared.lock().sinks.push((channel, sink));
        Ok(())
    }

    fn unsubscribe_all(&mut self) {
        self.shared.lock().sinks.clear();
    }
}

/// Test-side handle on the simulated hardware
#[derive(Clone)]
pub struct SimController {
    shared: Arc<Shared>,
}

impl SimController {
    /// Records returned by subsequent scans, in this order
    pub fn set_access_points(&self, access_points: Vec<RawApRecord>) {
        self.shared.lock().access_points = access_points;
    }

    /// Return every scripted record regardless of the requested maximum
    pub fn ignore_scan_limit(&self, ignore: bool) {
        self.shared.lock().ignore_scan_limit = ignore;
    }

    /// Answer each connect with link-up and `ip` acquisition events
    pub fn set_auto_associate(&self, ip: Option<Ipv4Addr>) {
        self.shared.lock().auto_associate = ip;
    }

    pub fn fail_init(&self, error: RadioError) {
        self.shared.lock().fail_init = Some(error);
    }

    pub fn fail_start(&self, error: RadioError) {
        self.shared.lock().fail_start = Some(error);
    }

    pub fn fail_next_scan(&self, error: RadioError) {
        self.shared.lock().fail_next_scan = Some(error);
    }

    /// Make the next `count` connect calls fail synchronously
    pub fn fail_connects(&self, count: usize) {
        self.shared.lock().fail_connects = count;
    }

    /// Publish `event` to the subscribers of its channel
    pub fn emit(&self, event: StationEvent) {
        self.shared.lock().emit(event);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.shared.lock().calls.clone()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.shared.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn connect_count(&self) -> usize {
        self.count(&RadioCall::Connect)
    }

    pub fn scan_count(&self) -> usize {
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RadioCall::Scan { .. }))
            .count()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.lock().sinks.len()
    }

    /// Settings passed to the most recent configure call
    pub fn last_settings(&self) -> Option<ClientSettings> {
        self.shared.lock().calls.iter().rev().find_map(|c| match c {
            RadioCall::Configure(settings) => Some(settings.clone()),
            _ => None,
        })
    }

    /// Block until at least `count` connect calls were made, or `timeout` passes
    pub fn wait_for_connects(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.lock();
        loop {
            let seen = state.calls.iter().filter(|c| **c == RadioCall::Connect).count();
            if seen >= count {
                return true;
            }
            state = match deadline {
                None => self.shared.changed.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.shared
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// Simulated NVS partition with scripted init failures
#[derive(Debug, Default)]
pub struct SimStorage {
    init_failures: VecDeque<StorageError>,
    erase_failure: Option<StorageError>,
    init_calls: usize,
    erase_calls: usize,
}

impl SimStorage {
    pub fn healthy() -> Self {
        Self::default()
    }

    /// The first inits fail with `errors`, in order; later ones succeed
    pub fn failing_with(errors: impl IntoIterator<Item = StorageError>) -> Self {
        Self {
            init_failures: errors.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn fail_erase(&mut self, error: StorageError) {
        self.erase_failure = Some(error);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    pub fn erase_calls(&self) -> usize {
        self.erase_calls
    }
}

impl PersistentStorage for SimStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        self.init_calls += 1;
        match self.init_failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.erase_calls += 1;
        match self.erase_failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
