//! Typed station notifications
//!
//! The radio and network stack report link and address changes through
//! [`StationEvent`]s posted to an [`EventSink`]. All events land on one FIFO
//! channel drained by the station manager's dispatch thread, so delivery order
//! matches posting order.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;

use crate::radio::EventChannel;
use crate::record::Bssid;

/// Reason code attached to a station disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectReason(pub u16);

impl DisconnectReason {
    pub const UNSPECIFIED: Self = Self(1);
    pub const AUTH_EXPIRE: Self = Self(2);
    pub const ASSOC_LEAVE: Self = Self(8);
    pub const FOUR_WAY_HANDSHAKE_TIMEOUT: Self = Self(15);
    pub const BEACON_TIMEOUT: Self = Self(200);
    pub const NO_AP_FOUND: Self = Self(201);
    pub const AUTH_FAIL: Self = Self(202);
    pub const ASSOC_FAIL: Self = Self(203);
    pub const HANDSHAKE_TIMEOUT: Self = Self(204);
    pub const CONNECTION_FAIL: Self = Self(205);

    pub fn describe(self) -> &'static str {
        match self {
            Self::UNSPECIFIED => "unspecified",
            Self::AUTH_EXPIRE => "authentication expired",
            Self::ASSOC_LEAVE => "left the network",
            Self::FOUR_WAY_HANDSHAKE_TIMEOUT | Self::HANDSHAKE_TIMEOUT => "handshake timeout",
            Self::BEACON_TIMEOUT => "beacon timeout",
            Self::NO_AP_FOUND => "no access point found",
            Self::AUTH_FAIL => "authentication failed",
            Self::ASSOC_FAIL => "association failed",
            Self::CONNECTION_FAIL => "connection failed",
            _ => "other",
        }
    }
}

impl From<u16> for DisconnectReason {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.0)
    }
}

/// Notification from the radio or the network stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    /// The radio entered station mode and is running
    Started,
    /// The radio stopped
    Stopped,
    /// Link up: associated with an access point
    Connected { bssid: Bssid, channel: u8 },
    /// Link down, or a connect attempt failed
    Disconnected { reason: DisconnectReason },
    /// DHCP assigned an address
    IpAcquired {
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
    },
    /// A scan finished
    ScanDone { count: u16 },
}

impl StationEvent {
    /// Channel the event is published on
    pub fn channel(&self) -> EventChannel {
        match self {
            StationEvent::IpAcquired { .. } => EventChannel::Ip,
            _ => EventChannel::Wifi,
        }
    }
}

pub(crate) enum Message {
    Event(StationEvent),
    Shutdown,
}

/// Posting end of the dispatch queue
///
/// Posting never blocks, so it is safe from driver callbacks.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<Message>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<Message>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns false once the dispatcher has gone away.
    pub fn post(&self, event: StationEvent) -> bool {
        self.tx.send(Message::Event(event)).is_ok()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn events_map_to_channels() {
        let ip = StationEvent::IpAcquired {
            ip: Ipv4Addr::new(192, 168, 1, 20),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        };
        assert_eq!(ip.channel(), EventChannel::Ip);
        assert_eq!(StationEvent::Started.channel(), EventChannel::Wifi);
        assert_eq!(
            StationEvent::Disconnected { reason: DisconnectReason::BEACON_TIMEOUT }.channel(),
            EventChannel::Wifi
        );
    }

    #[test]
    fn sink_preserves_order_and_reports_closed_queue() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        assert!(sink.post(StationEvent::Started));
        assert!(sink.post(StationEvent::ScanDone { count: 3 }));

        let received: Vec<_> = rx
            .try_iter()
            .filter_map(|m| match m {
                Message::Event(e) => Some(e),
                Message::Shutdown => None,
            })
            .collect();
        assert_eq!(received, vec![StationEvent::Started, StationEvent::ScanDone { count: 3 }]);

        drop(rx);
        assert!(!sink.post(StationEvent::Stopped));
    }

    #[test]
    fn reasons_have_names() {
        assert_eq!(DisconnectReason::NO_AP_FOUND.to_string(), "no access point found (201)");
        assert_eq!(DisconnectReason(77).describe(), "other");
    }

    #[test]
    fn driver_codes_keep_their_meaning() {
        assert_eq!(DisconnectReason::from(8), DisconnectReason::ASSOC_LEAVE);
        assert_eq!(DisconnectReason::from(8).describe(), "left the network");
        assert_eq!(DisconnectReason::from(200).to_string(), "beacon timeout (200)");
    }
}
