//! WiFi station manager
//!
//! [`StationManager`] owns the radio for the lifetime of the process. It
//! offers a blocking one-shot scan and an event-driven connect mode in which a
//! [`Reconnector`] re-issues connects when the link drops.
//!
//! Hardware notifications are handled on a single named dispatch thread.
//! Handlers only update state and, when the policy says so, issue a
//! non-blocking connect; delayed reconnects are timed on the dispatch queue
//! itself rather than by sleeping.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::error::{Error, InitStage, RadioError, Result};
use crate::events::{DisconnectReason, EventSink, Message, StationEvent};
use crate::radio::{ClientSettings, EventChannel, EventSource, PersistentStorage, Radio, RadioMode};
use crate::reconnect::{Decision, ReconnectPolicy, Reconnector};
use crate::scan::ScanResults;
use crate::storage::init_persistent_storage;

/// Stack size of the event dispatch thread
const DISPATCH_STACK_SIZE: usize = 6144;

/// Minimum delay before retrying after the driver rejected a connect call
const DRIVER_RETRY_FLOOR: Duration = Duration::from_secs(1);

/// Set while a [`StationManager`] owns the radio
static RADIO_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Lifecycle of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    Uninitialized,
    /// Radio started in station mode, idle
    RadioReady,
    Scanning,
    Connecting,
    Connected { ip: Ipv4Addr },
    Disconnected,
    /// Terminal
    Stopped,
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationState::Uninitialized => f.write_str("uninitialized"),
            StationState::RadioReady => f.write_str("ready"),
            StationState::Scanning => f.write_str("scanning"),
            StationState::Connecting => f.write_str("connecting"),
            StationState::Connected { ip } => write!(f, "connected ({ip})"),
            StationState::Disconnected => f.write_str("disconnected"),
            StationState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Exclusive ownership of the radio peripheral
struct RadioClaim(());

impl RadioClaim {
    fn acquire() -> Result<Self> {
        RADIO_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RadioClaim(()))
            .map_err(|_| Error::RadioBusy)
    }
}

impl Drop for RadioClaim {
    fn drop(&mut self) {
        RADIO_CLAIMED.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Link {
    state: StationState,
    reconnector: Reconnector,
    observers: Vec<Sender<StationState>>,
    /// A requested disconnect whose link-down notification has not arrived yet
    leaving: bool,
}

/// State shared between the manager and its dispatch thread
struct Shared<R> {
    radio: Mutex<R>,
    link: Mutex<Link>,
    changed: Condvar,
}

impl<R: Radio> Shared<R> {
    fn set_state(&self, link: &mut Link, state: StationState) {
        if link.state == state {
            return;
        }
        debug!("Station state: {} -> {}", link.state, state);
        link.state = state;
        link.observers.retain(|tx| tx.send(state).is_ok());
        self.changed.notify_all();
    }

    /// Apply one notification and ask the reconnect policy what to do
    fn handle_event(&self, event: &StationEvent) -> Decision {
        let mut link = lock(&self.link);
        let current = link.state;
        match event {
            StationEvent::Started => {
                info!("Station started");
                match current {
                    StationState::Connecting | StationState::Connected { .. } => Decision::Ignore,
                    _ => link.reconnector.on_event(event),
                }
            }
            StationEvent::Stopped => {
                info!("Station stopped");
                Decision::Ignore
            }
            StationEvent::Connected { bssid, channel } => {
                info!("Link up: {} on channel {}", bssid, channel);
                Decision::Ignore
            }
            StationEvent::Disconnected { reason }
                if link.leaving && *reason == DisconnectReason::ASSOC_LEAVE =>
            {
                debug!("Requested disconnect confirmed while {}", current);
                link.leaving = false;
                Decision::Ignore
            }
            StationEvent::Disconnected { reason } => match current {
                StationState::Connecting | StationState::Connected { .. } => {
                    warn!("Link down: {}", reason);
                    self.set_state(&mut link, StationState::Disconnected);
                    link.reconnector.on_event(event)
                }
                state => {
                    debug!("Ignoring disconnect ({}) while {}", reason, state);
                    Decision::Ignore
                }
            },
            StationEvent::IpAcquired { ip, netmask, gateway } => match current {
                StationState::Connecting | StationState::Connected { .. } => {
                    info!("Got IP {} netmask {} gateway {}", ip, netmask, gateway);
                    let _ = link.reconnector.on_event(event);
                    self.set_state(&mut link, StationState::Connected { ip: *ip });
                    Decision::Ignore
                }
                state => {
                    debug!("Ignoring address {} while {}", ip, state);
                    Decision::Ignore
                }
            },
            StationEvent::ScanDone { count } => {
                debug!("Scan done, {} access point(s) seen", count);
                Decision::Ignore
            }
        }
    }

    /// Issue a connect on behalf of the reconnect policy
    fn reconnect(&self) -> std::result::Result<(), RadioError> {
        {
            let mut link = lock(&self.link);
            if !link.reconnector.is_armed() {
                return Ok(());
            }
            let current = link.state;
            match current {
                StationState::Disconnected | StationState::RadioReady => {}
                state => {
                    debug!("Skipping reconnect while {}", state);
                    return Ok(());
                }
            }
            info!("Reconnecting (attempt {})", link.reconnector.attempts());
            self.set_state(&mut link, StationState::Connecting);
        }
        lock(&self.radio).connect()
    }

    /// Carry out a decision; returns when a delayed reconnect is due
    fn apply(&self, mut decision: Decision) -> Option<Instant> {
        loop {
            match decision {
                Decision::Ignore => return None,
                Decision::GiveUp => {
                    warn!("Reconnect abandoned, staying disconnected");
                    return None;
                }
                Decision::ConnectAfter(delay) => match Instant::now().checked_add(delay) {
                    Some(at) => {
                        info!("Reconnecting in {:?}", delay);
                        return Some(at);
                    }
                    None => {
                        warn!("Reconnect delay {:?} out of range, staying disconnected", delay);
                        return None;
                    }
                },
                Decision::Connect => match self.reconnect() {
                    Ok(()) => return None,
                    Err(e) => {
                        warn!("Reconnect rejected by driver: {}", e);
                        let mut link = lock(&self.link);
                        self.set_state(&mut link, StationState::Disconnected);
                        decision = match link.reconnector.on_disconnect() {
                            Decision::Connect => Decision::ConnectAfter(DRIVER_RETRY_FLOOR),
                            other => other,
                        };
                    }
                },
            }
        }
    }
}

/// Dispatch loop: drains notifications in arrival order
fn dispatch<R: Radio>(shared: Arc<Shared<R>>, rx: Receiver<Message>) {
    let mut retry_at: Option<Instant> = None;
    loop {
        let message = match retry_at {
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    retry_at = shared.apply(Decision::Connect);
                    continue;
                }
                match rx.recv_timeout(at - now) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        };

        match message {
            Message::Shutdown => break,
            Message::Event(event) => {
                trace!("Dispatching {:?}", event);
                match shared.handle_event(&event) {
                    Decision::Ignore => {}
                    decision => retry_at = shared.apply(decision),
                }
            }
        }
    }
    debug!("Event dispatcher exiting");
}

struct Dispatcher {
    tx: Sender<Message>,
    handle: JoinHandle<()>,
}

/// WiFi station manager
///
/// Only one manager can exist at a time; a second [`StationManager::new`]
/// fails with [`Error::RadioBusy`] until the first one is dropped.
pub struct StationManager<R: Radio + 'static, E: EventSource> {
    shared: Arc<Shared<R>>,
    events: E,
    dispatcher: Option<Dispatcher>,
    results: ScanResults,
    _claim: RadioClaim,
}

impl<R: Radio + 'static, E: EventSource> StationManager<R, E> {
    /// Take ownership of the radio and its event source
    pub fn new(radio: R, events: E) -> Result<Self> {
        let claim = RadioClaim::acquire()?;
        Ok(Self {
            shared: Arc::new(Shared {
                radio: Mutex::new(radio),
                link: Mutex::new(Link {
                    state: StationState::Uninitialized,
                    reconnector: Reconnector::disarmed(),
                    observers: Vec::new(),
                    leaving: false,
                }),
                changed: Condvar::new(),
            }),
            events,
            dispatcher: None,
            results: ScanResults::default(),
            _claim: claim,
        })
    }

    /// Bring up persistent storage, the network stack and the radio.
    ///
    /// Every error returned here is fatal, see [`Error::is_fatal`]. A failed
    /// bring-up releases the dispatcher and subscriptions it created, so the
    /// manager stays `Uninitialized` and can be initialized again.
    pub fn initialize<S: PersistentStorage + ?Sized>(&mut self, storage: &mut S) -> Result<()> {
        self.require("initialize", |s| s == StationState::Uninitialized)?;

        init_persistent_storage(storage)?;

        if let Err(e) = self.bring_up() {
            self.release_events();
            return Err(e);
        }

        let mut link = lock(&self.shared.link);
        self.shared.set_state(&mut link, StationState::RadioReady);
        info!("Radio ready in station mode");
        Ok(())
    }

    fn bring_up(&mut self) -> Result<()> {
        {
            let mut radio = lock(&self.shared.radio);
            radio
                .init()
                .map_err(|source| Error::Init { stage: InitStage::Radio, source })?;
            radio
                .set_mode(RadioMode::Station)
                .map_err(|source| Error::Init { stage: InitStage::StationMode, source })?;
        }

        let sink = EventSink::new(self.spawn_dispatcher()?);
        for channel in [EventChannel::Wifi, EventChannel::Ip] {
            self.events
                .subscribe(channel, sink.clone())
                .map_err(|source| Error::Init { stage: InitStage::Events, source })?;
        }

        lock(&self.shared.radio)
            .start()
            .map_err(|source| Error::Init { stage: InitStage::Start, source })
    }

    /// Drop the event subscriptions and join the dispatch thread
    fn release_events(&mut self) {
        self.events.unsubscribe_all();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.tx.send(Message::Shutdown);
            if dispatcher.handle.join().is_err() {
                error!("Event dispatcher panicked");
            }
        }
    }

    fn spawn_dispatcher(&mut self) -> Result<Sender<Message>> {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("wifi_events".into())
            .stack_size(DISPATCH_STACK_SIZE)
            .spawn(move || dispatch(shared, rx))?;
        self.dispatcher = Some(Dispatcher { tx: tx.clone(), handle });
        Ok(tx)
    }

    fn require(&self, op: &'static str, allowed: impl Fn(StationState) -> bool) -> Result<()> {
        let state = self.state();
        if allowed(state) {
            Ok(())
        } else {
            Err(Error::InvalidState { op, state })
        }
    }

    /// Scan for access points, keeping at most `max_access_points` records.
    ///
    /// Blocks the caller until the hardware finishes the scan. The previous
    /// results are discarded.
    pub fn scan(&mut self, max_access_points: u16) -> Result<&ScanResults> {
        {
            let mut link = lock(&self.shared.link);
            if link.state != StationState::RadioReady {
                return Err(Error::InvalidState { op: "scan", state: link.state });
            }
            self.shared.set_state(&mut link, StationState::Scanning);
        }

        info!("Scanning for up to {} access point(s)...", max_access_points);
        let outcome = {
            let mut radio = lock(&self.shared.radio);
            self.results.recapture(&mut *radio, max_access_points)
        };

        {
            let mut link = lock(&self.shared.link);
            if link.state == StationState::Scanning {
                self.shared.set_state(&mut link, StationState::RadioReady);
            }
        }

        if let Err(e) = outcome {
            error!("Scan failed: {}", e);
            return Err(e);
        }
        self.results.log_summary();
        Ok(&self.results)
    }

    /// Results of the last completed scan
    pub fn last_scan(&self) -> &ScanResults {
        &self.results
    }

    /// Configure the radio for `settings` and start connecting.
    ///
    /// Returns once the connect is issued; the outcome arrives as events.
    /// From now on link loss is handled according to `policy`.
    pub fn connect(&mut self, settings: ClientSettings, policy: ReconnectPolicy) -> Result<()> {
        self.require("connect", |s| {
            matches!(s, StationState::RadioReady | StationState::Disconnected)
        })?;

        let ssid = settings.credentials.ssid();
        if ssid.was_truncated() {
            warn!("SSID truncated to {} bytes", ssid.len());
        }
        if settings.credentials.password().was_truncated() {
            warn!("Password truncated to {} bytes", settings.credentials.password().len());
        }
        info!("Connecting to '{}' with {:?} reconnect policy", ssid.as_str(), policy);

        lock(&self.shared.radio).configure(&settings)?;

        {
            let mut link = lock(&self.shared.link);
            link.reconnector = Reconnector::armed(policy);
            self.shared.set_state(&mut link, StationState::Connecting);
        }

        let issued = lock(&self.shared.radio).connect();
        if let Err(e) = issued {
            error!("Failed to start connecting: {}", e);
            let mut link = lock(&self.shared.link);
            link.reconnector.disarm();
            self.shared.set_state(&mut link, StationState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Leave the network and stop reconnecting
    pub fn disconnect(&mut self) -> Result<()> {
        {
            let mut link = lock(&self.shared.link);
            link.reconnector.disarm();
            if !matches!(link.state, StationState::Connecting | StationState::Connected { .. }) {
                return Err(Error::InvalidState { op: "disconnect", state: link.state });
            }
            // The radio answers with its own link-down notification
            link.leaving = true;
        }

        let left = lock(&self.shared.radio).disconnect();
        if let Err(e) = left {
            lock(&self.shared.link).leaving = false;
            return Err(e.into());
        }
        let mut link = lock(&self.shared.link);
        self.shared.set_state(&mut link, StationState::Disconnected);
        info!("Disconnected on request");
        Ok(())
    }

    pub fn state(&self) -> StationState {
        lock(&self.shared.link).state
    }

    /// Consecutive reconnects since the last acquired address
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.shared.link).reconnector.attempts()
    }

    /// Receive every state change from now on, starting with the current state
    pub fn watch(&self) -> Receiver<StationState> {
        let (tx, rx) = mpsc::channel();
        let mut link = lock(&self.shared.link);
        if tx.send(link.state).is_ok() {
            link.observers.push(tx);
        }
        rx
    }

    /// Wait until an address is acquired.
    ///
    /// A timeout too large to represent waits without a deadline.
    pub fn wait_for_ip(&self, timeout: Duration) -> Result<Ipv4Addr> {
        let deadline = Instant::now().checked_add(timeout);
        let mut link = lock(&self.shared.link);
        loop {
            match link.state {
                StationState::Connected { ip } => return Ok(ip),
                StationState::Stopped => {
                    return Err(Error::InvalidState { op: "wait for an address", state: link.state })
                }
                _ => {}
            }
            link = match deadline {
                None => self.shared.changed.wait(link).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::ConnectTimeout(timeout));
                    }
                    self.shared
                        .changed
                        .wait_timeout(link, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Stop the radio and release it
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let previous = {
            let mut link = lock(&self.shared.link);
            if link.state == StationState::Stopped {
                return Ok(());
            }
            link.reconnector.disarm();
            link.state
        };

        self.release_events();

        let mut result = Ok(());
        if previous != StationState::Uninitialized {
            let mut radio = lock(&self.shared.radio);
            if matches!(previous, StationState::Connecting | StationState::Connected { .. }) {
                if let Err(e) = radio.disconnect() {
                    warn!("Failed to disconnect during shutdown: {}", e);
                }
            }
            result = radio.stop().map_err(Error::from);
        }

        let mut link = lock(&self.shared.link);
        self.shared.set_state(&mut link, StationState::Stopped);
        info!("Station manager stopped");
        result
    }
}

impl<R: Radio + 'static, E: EventSource> Drop for StationManager<R, E> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Error stopping station manager: {}", e);
        }
    }
}
