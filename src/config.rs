use std::time::Duration;

use crate::credentials::{Credentials, OverflowPolicy};
use crate::error::Result;
use crate::reconnect::ReconnectPolicy;
use crate::record::AuthMode;

/// How the radio looks for the configured network before associating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMethod {
    /// Stop at the first matching access point
    #[default]
    Fast,
    /// Sweep every channel, then pick per [`SortMethod`]
    AllChannel,
}

/// Ordering used to choose between matches in an all-channel scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMethod {
    #[default]
    BySignal,
    BySecurity,
}

/// Weakest access point the radio may associate with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectThreshold {
    /// Minimum RSSI in dBm
    pub rssi: i8,
    /// Minimum security scheme
    pub auth_mode: AuthMode,
}

impl Default for ConnectThreshold {
    fn default() -> Self {
        Self {
            rssi: -127,
            auth_mode: AuthMode::Open,
        }
    }
}

/// Fast-scan options applied together with the credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    pub scan_method: ScanMethod,
    pub sort_method: SortMethod,
    pub threshold: ConnectThreshold,
}

/// WiFi configuration
#[derive(Debug, Clone)]
pub struct WiFiConfig {
    /// SSID for client mode; empty selects scan mode
    pub ssid: &'static str,
    /// Password for client mode
    pub password: &'static str,
    /// Behaviour for credentials longer than the driver buffers
    pub overflow: OverflowPolicy,
    /// Fast-scan options
    pub options: ConnectOptions,
}

impl Default for WiFiConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("WIFI_SSID").unwrap_or(""),
            password: option_env!("WIFI_PASS").unwrap_or(""),
            overflow: OverflowPolicy::default(),
            options: ConnectOptions::default(),
        }
    }
}

impl WiFiConfig {
    /// Build the driver credentials from the configured strings
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::new(self.ssid, self.password, self.overflow)
    }
}

/// Scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum number of access points kept per scan
    pub max_access_points: u16,
    /// Pause between scans in scan mode
    pub interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_access_points: 20,
            interval: Duration::from_secs(10),
        }
    }
}

/// What the firmware does after bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Periodic one-shot scans
    Scan,
    /// Connect and keep the link up
    Station,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WiFi configuration
    pub wifi: WiFiConfig,
    /// Scan configuration
    pub scan: ScanConfig,
    /// Reaction to link loss in station mode
    pub reconnect: ReconnectPolicy,
    /// How long the firmware waits for the first IP address before logging a warning
    pub connect_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wifi: WiFiConfig::default(),
            scan: ScanConfig::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Station mode when an SSID is configured
    pub fn mode(&self) -> AppMode {
        if self.wifi.ssid.is_empty() {
            AppMode::Scan
        } else {
            AppMode::Station
        }
    }
}

/// Create a new application configuration with default values
pub fn create_config() -> AppConfig {
    AppConfig::default()
}
