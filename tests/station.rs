use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use espc3_station::config::ConnectOptions;
use espc3_station::credentials::{Credentials, OverflowPolicy};
use espc3_station::error::{Error, StorageError};
use espc3_station::events::{DisconnectReason, StationEvent};
use espc3_station::radio::ClientSettings;
use espc3_station::reconnect::ReconnectPolicy;
use espc3_station::sim::{access_point, simulated, RadioCall, SimController, SimEvents, SimRadio, SimStorage};
use espc3_station::{StationManager, StationState};

// One radio per process: managers must not overlap.
static SERIAL: Mutex<()> = Mutex::new(());

const WAIT: Duration = Duration::from_secs(3);
const SETTLE: Duration = Duration::from_millis(200);

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ready() -> (StationManager<SimRadio, SimEvents>, SimController) {
    let (radio, events, control) = simulated();
    let mut manager = StationManager::new(radio, events).unwrap();
    manager.initialize(&mut SimStorage::healthy()).unwrap();
    (manager, control)
}

fn settings(ssid: &str, password: &str) -> ClientSettings {
    ClientSettings::new(
        Credentials::new(ssid, password, OverflowPolicy::Truncate).unwrap(),
        ConnectOptions::default(),
    )
}

fn link_lost() -> StationEvent {
    StationEvent::Disconnected {
        reason: DisconnectReason::BEACON_TIMEOUT,
    }
}

fn address(ip: Ipv4Addr) -> StationEvent {
    StationEvent::IpAcquired {
        ip,
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(10, 0, 0, 1),
    }
}

#[test]
fn storage_without_free_pages_is_erased_once() {
    let _guard = serial();
    let (radio, events, _) = simulated();
    let mut manager = StationManager::new(radio, events).unwrap();
    let mut storage = SimStorage::failing_with([StorageError::NoFreePages]);

    manager.initialize(&mut storage).unwrap();
    assert_eq!(storage.erase_calls(), 1);
    assert_eq!(storage.init_calls(), 2);
    assert_eq!(manager.state(), StationState::RadioReady);
}

#[test]
fn storage_failing_twice_is_fatal() {
    let _guard = serial();
    let (radio, events, control) = simulated();
    let mut manager = StationManager::new(radio, events).unwrap();
    let mut storage = SimStorage::failing_with([StorageError::NewVersionFound, StorageError::NoFreePages]);

    let err = manager.initialize(&mut storage).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::StorageFatal(StorageError::NoFreePages)));
    assert_eq!(storage.erase_calls(), 1);
    assert_eq!(storage.init_calls(), 2);
    assert!(control.calls().is_empty());
    assert_eq!(manager.state(), StationState::Uninitialized);
}

#[test]
fn scan_returns_capped_results_and_goes_back_to_ready() {
    let _guard = serial();
    let (mut manager, control) = ready();
    control.set_access_points(vec![
        access_point(1, "alpha", 1, -70, 3),
        access_point(2, "bravo", 6, -40, 3),
        access_point(3, "charlie", 11, -55, 0),
        access_point(4, "delta", 1, -80, 4),
        access_point(5, "echo", 6, -65, 3),
    ]);

    let results = manager.scan(3).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results.strongest().unwrap().ssid.to_string_lossy(), "bravo");
    assert_eq!(manager.state(), StationState::RadioReady);
    assert_eq!(control.count(&RadioCall::Scan { max_results: 3 }), 1);

    // A second scan replaces the first one's results
    control.set_access_points(vec![access_point(9, "zulu", 3, -50, 0)]);
    assert_eq!(manager.scan(3).unwrap().len(), 1);
    assert_eq!(manager.last_scan().len(), 1);
}

#[test]
fn connect_passes_truncated_credentials_to_the_radio() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let long_ssid = "s".repeat(40);

    manager
        .connect(settings(&long_ssid, "secret"), ReconnectPolicy::Disabled)
        .unwrap();
    let configured = control.last_settings().unwrap();
    assert_eq!(configured.credentials.ssid().len(), 32);
    assert!(configured.credentials.ssid().was_truncated());
    assert_eq!(configured.credentials.password().as_bytes(), b"secret");
    assert_eq!(manager.state(), StationState::Connecting);
}

#[test]
fn connect_is_rejected_before_initialization() {
    let _guard = serial();
    let (radio, events, control) = simulated();
    let mut manager = StationManager::new(radio, events).unwrap();

    let err = manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState { op: "connect", state: StationState::Uninitialized }
    ));
    assert_eq!(control.connect_count(), 0);
}

#[test]
fn address_acquisition_marks_station_connected() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let ip = Ipv4Addr::new(192, 168, 4, 20);
    control.set_auto_associate(Some(ip));

    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    assert_eq!(manager.wait_for_ip(WAIT).unwrap(), ip);
    assert_eq!(manager.state(), StationState::Connected { ip });
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[test]
fn wait_for_ip_times_out_without_an_address() {
    let _guard = serial();
    let (mut manager, _control) = ready();
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Disabled)
        .unwrap();

    let err = manager.wait_for_ip(Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout(_)));
}

#[test]
fn link_loss_triggers_exactly_one_reconnect() {
    let _guard = serial();
    let (mut manager, control) = ready();
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    assert_eq!(control.connect_count(), 1);

    control.emit(link_lost());
    assert!(control.wait_for_connects(2, WAIT));
    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 2);
    assert_eq!(manager.state(), StationState::Connecting);
    assert_eq!(manager.reconnect_attempts(), 1);
}

#[test]
fn disabled_policy_stays_disconnected() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let states = manager.watch();
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Disabled)
        .unwrap();

    control.emit(link_lost());
    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 1);
    assert_eq!(manager.state(), StationState::Disconnected);
    let seen: Vec<_> = states.try_iter().collect();
    assert_eq!(
        seen,
        vec![StationState::RadioReady, StationState::Connecting, StationState::Disconnected]
    );
}

#[test]
fn backoff_gives_up_after_the_attempt_ceiling() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let policy = ReconnectPolicy::Backoff {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(40),
        max_attempts: Some(2),
    };
    manager.connect(settings("office", "secret"), policy).unwrap();

    control.emit(link_lost());
    assert!(control.wait_for_connects(2, WAIT));
    control.emit(link_lost());
    assert!(control.wait_for_connects(3, WAIT));
    control.emit(link_lost());

    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 3);
    assert_eq!(manager.state(), StationState::Disconnected);
}

#[test]
fn rejected_reconnect_is_retried_after_a_pause() {
    let _guard = serial();
    let (mut manager, control) = ready();
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    control.fail_connects(1);

    let lost_at = Instant::now();
    control.emit(link_lost());
    assert!(control.wait_for_connects(2, WAIT));
    assert!(control.wait_for_connects(3, WAIT));
    assert!(lost_at.elapsed() >= Duration::from_secs(1));
}

#[test]
fn requested_disconnect_does_not_reconnect() {
    let _guard = serial();
    let (mut manager, control) = ready();
    control.set_auto_associate(Some(Ipv4Addr::new(10, 0, 0, 7)));
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    manager.wait_for_ip(WAIT).unwrap();

    manager.disconnect().unwrap();
    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 1);
    assert_eq!(manager.state(), StationState::Disconnected);

    // Connecting again is allowed from here
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    assert_eq!(control.connect_count(), 2);
}

#[test]
fn disconnect_then_immediate_connect_issues_a_single_connect() {
    let _guard = serial();
    let (mut manager, control) = ready();
    control.set_auto_associate(Some(Ipv4Addr::new(10, 0, 0, 9)));

    for _ in 0..20 {
        manager
            .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
            .unwrap();
        manager.wait_for_ip(WAIT).unwrap();
        manager.disconnect().unwrap();
    }
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    manager.wait_for_ip(WAIT).unwrap();

    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 21);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert!(matches!(manager.state(), StationState::Connected { .. }));
}

#[test]
fn unbounded_wait_for_ip_returns_the_address() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let ip = Ipv4Addr::new(172, 16, 0, 5);
    control.set_auto_associate(Some(ip));
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();

    assert_eq!(manager.wait_for_ip(Duration::MAX).unwrap(), ip);
}

#[test]
fn unrepresentable_backoff_delay_keeps_events_flowing() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let policy = ReconnectPolicy::Backoff {
        initial: Duration::MAX,
        max: Duration::MAX,
        max_attempts: None,
    };
    manager.connect(settings("office", "secret"), policy).unwrap();

    control.emit(link_lost());
    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 1);
    assert_eq!(manager.state(), StationState::Disconnected);

    // The dispatch thread is still alive and applies new events
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    control.emit(address(Ipv4Addr::new(10, 0, 0, 30)));
    assert_eq!(manager.wait_for_ip(WAIT).unwrap(), Ipv4Addr::new(10, 0, 0, 30));
}

#[test]
fn station_restart_while_disconnected_reconnects() {
    let _guard = serial();
    let (mut manager, control) = ready();
    let policy = ReconnectPolicy::Backoff {
        initial: Duration::from_secs(60),
        max: Duration::from_secs(60),
        max_attempts: None,
    };
    manager.connect(settings("office", "secret"), policy).unwrap();

    control.emit(link_lost());
    thread::sleep(SETTLE);
    assert_eq!(manager.state(), StationState::Disconnected);
    assert_eq!(control.connect_count(), 1);

    control.emit(StationEvent::Started);
    assert!(control.wait_for_connects(2, WAIT));
    assert_eq!(manager.state(), StationState::Connecting);
}

#[test]
fn acquired_address_resets_reconnect_attempts() {
    let _guard = serial();
    let (mut manager, control) = ready();
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();

    control.emit(link_lost());
    assert!(control.wait_for_connects(2, WAIT));
    control.emit(link_lost());
    assert!(control.wait_for_connects(3, WAIT));
    assert_eq!(manager.reconnect_attempts(), 2);

    let ip = Ipv4Addr::new(10, 0, 0, 40);
    control.emit(address(ip));
    assert_eq!(manager.wait_for_ip(WAIT).unwrap(), ip);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[test]
fn shutdown_ignores_the_disconnect_it_causes() {
    let _guard = serial();
    let (mut manager, control) = ready();
    control.set_auto_associate(Some(Ipv4Addr::new(10, 0, 0, 8)));
    manager
        .connect(settings("office", "secret"), ReconnectPolicy::Immediate)
        .unwrap();
    manager.wait_for_ip(WAIT).unwrap();

    manager.shutdown().unwrap();
    thread::sleep(SETTLE);
    assert_eq!(control.connect_count(), 1);
    assert_eq!(control.count(&RadioCall::Disconnect), 1);
    assert_eq!(control.count(&RadioCall::Stop), 1);
    assert_eq!(control.subscription_count(), 0);
}
