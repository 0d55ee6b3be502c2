//! Reconnect policy
//!
//! Decides, per station event, whether the manager should issue another
//! connect. Decisions are pure values; the dispatch thread carries them out,
//! so nothing here blocks or sleeps.

use std::time::Duration;

use log::{debug, info, warn};

use crate::events::StationEvent;

/// How link loss is handled in auto-reconnect mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Stay disconnected
    Disabled,
    /// Reconnect at once, every time, forever
    #[default]
    Immediate,
    /// Exponential backoff: `initial * 2^n`, capped at `max`
    Backoff {
        initial: Duration,
        max: Duration,
        /// Give up after this many consecutive attempts
        max_attempts: Option<u32>,
    },
}

/// What the dispatcher should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ignore,
    Connect,
    ConnectAfter(Duration),
    GiveUp,
}

/// Per-connection reconnect state
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempts: u32,
    armed: bool,
}

impl Reconnector {
    /// A disarmed reconnector ignores every event
    pub fn disarmed() -> Self {
        Self {
            policy: ReconnectPolicy::Disabled,
            attempts: 0,
            armed: false,
        }
    }

    /// Enter auto-reconnect mode with `policy`
    pub fn armed(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consecutive reconnects since the last acquired address
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_event(&mut self, event: &StationEvent) -> Decision {
        if !self.armed {
            return Decision::Ignore;
        }
        match event {
            StationEvent::Started => Decision::Connect,
            StationEvent::Disconnected { .. } => self.on_disconnect(),
            StationEvent::IpAcquired { .. } => {
                if self.attempts > 0 {
                    debug!("Link restored after {} reconnect attempt(s)", self.attempts);
                }
                self.attempts = 0;
                Decision::Ignore
            }
            _ => Decision::Ignore,
        }
    }

    /// Link loss or a failed attempt
    pub fn on_disconnect(&mut self) -> Decision {
        if !self.armed {
            return Decision::Ignore;
        }
        match self.policy {
            ReconnectPolicy::Disabled => {
                info!("Reconnect disabled, staying disconnected");
                self.armed = false;
                Decision::GiveUp
            }
            ReconnectPolicy::Immediate => {
                self.attempts = self.attempts.saturating_add(1);
                Decision::Connect
            }
            ReconnectPolicy::Backoff {
                initial,
                max,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|limit| self.attempts >= limit) {
                    warn!("Giving up after {} reconnect attempt(s)", self.attempts);
                    self.armed = false;
                    return Decision::GiveUp;
                }
                let delay = backoff_delay(initial, max, self.attempts);
                self.attempts = self.attempts.saturating_add(1);
                Decision::ConnectAfter(delay)
            }
        }
    }
}

fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::events::DisconnectReason;

    fn link_down() -> StationEvent {
        StationEvent::Disconnected { reason: DisconnectReason::BEACON_TIMEOUT }
    }

    fn got_ip() -> StationEvent {
        StationEvent::IpAcquired {
            ip: Ipv4Addr::new(10, 0, 0, 2),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
        }
    }

    #[test]
    fn disarmed_ignores_everything() {
        let mut r = Reconnector::disarmed();
        assert_eq!(r.on_event(&StationEvent::Started), Decision::Ignore);
        assert_eq!(r.on_event(&link_down()), Decision::Ignore);
    }

    #[test]
    fn immediate_reconnects_without_delay_or_limit() {
        let mut r = Reconnector::armed(ReconnectPolicy::Immediate);
        for _ in 0..1000 {
            assert_eq!(r.on_event(&link_down()), Decision::Connect);
        }
        assert_eq!(r.attempts(), 1000);
        assert_eq!(r.on_event(&got_ip()), Decision::Ignore);
        assert_eq!(r.attempts(), 0);
    }

    #[test]
    fn started_triggers_connect_when_armed() {
        let mut r = Reconnector::armed(ReconnectPolicy::Disabled);
        assert_eq!(r.on_event(&StationEvent::Started), Decision::Connect);
    }

    #[test]
    fn disabled_gives_up_once() {
        let mut r = Reconnector::armed(ReconnectPolicy::Disabled);
        assert_eq!(r.on_event(&link_down()), Decision::GiveUp);
        assert!(!r.is_armed());
        assert_eq!(r.on_event(&link_down()), Decision::Ignore);
    }

    #[test]
    fn backoff_doubles_up_to_cap_then_gives_up() {
        let mut r = Reconnector::armed(ReconnectPolicy::Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            max_attempts: Some(4),
        });
        let delays: Vec<_> = (0..4).map(|_| r.on_event(&link_down())).collect();
        assert_eq!(
            delays,
            vec![
                Decision::ConnectAfter(Duration::from_millis(100)),
                Decision::ConnectAfter(Duration::from_millis(200)),
                Decision::ConnectAfter(Duration::from_millis(400)),
                Decision::ConnectAfter(Duration::from_millis(500)),
            ]
        );
        assert_eq!(r.on_event(&link_down()), Decision::GiveUp);
        assert!(!r.is_armed());
    }

    #[test]
    fn backoff_resets_after_address() {
        let mut r = Reconnector::armed(ReconnectPolicy::Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: None,
        });
        let _ = r.on_event(&link_down());
        let _ = r.on_event(&link_down());
        let _ = r.on_event(&got_ip());
        assert_eq!(r.on_event(&link_down()), Decision::ConnectAfter(Duration::from_secs(1)));
    }

    #[test]
    fn large_attempt_counts_saturate() {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), Duration::from_secs(30), 40),
            Duration::from_secs(30)
        );
    }
}
