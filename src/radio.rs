//! Hardware boundary
//!
//! The station manager only talks to the radio, the event loop and the
//! persistent storage through these traits. The `esp` module implements them
//! on top of ESP-IDF; the `sim` module implements them in memory.

use crate::config::ConnectOptions;
use crate::credentials::Credentials;
use crate::error::{RadioError, StorageError};
use crate::events::EventSink;
use crate::record::RawApRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Client of an access point
    Station,
}

/// Everything the radio needs to join a network
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientSettings {
    pub credentials: Credentials,
    pub options: ConnectOptions,
}

impl ClientSettings {
    pub fn new(credentials: Credentials, options: ConnectOptions) -> Self {
        Self { credentials, options }
    }
}

/// The radio peripheral
pub trait Radio: Send {
    /// Bring up the network stack and the radio driver
    fn init(&mut self) -> Result<(), RadioError>;
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;
    fn start(&mut self) -> Result<(), RadioError>;
    fn stop(&mut self) -> Result<(), RadioError>;
    /// Scan all channels and return at most `max_results` records in the
    /// order the hardware reported them. Blocks until the scan completes.
    fn scan_blocking(&mut self, max_results: u16) -> Result<Vec<RawApRecord>, RadioError>;
    fn configure(&mut self, settings: &ClientSettings) -> Result<(), RadioError>;
    /// Start associating. Completion is reported through events.
    fn connect(&mut self) -> Result<(), RadioError>;
    fn disconnect(&mut self) -> Result<(), RadioError>;
}

/// Notification channels of the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    /// Station start/stop and link up/down
    Wifi,
    /// Address acquisition
    Ip,
}

/// The system event loop
pub trait EventSource: Send {
    /// Forward every event of `channel` to `sink`
    fn subscribe(&mut self, channel: EventChannel, sink: EventSink) -> Result<(), RadioError>;
    /// Drop all subscriptions made through this source
    fn unsubscribe_all(&mut self);
}

/// Non-volatile key-value storage used by the radio driver
pub trait PersistentStorage {
    fn init(&mut self) -> Result<(), StorageError>;
    fn erase(&mut self) -> Result<(), StorageError>;
}
