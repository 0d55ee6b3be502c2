//! ESP-IDF backends
//!
//! Lifecycle goes through `EspWifi`; the scan and the station configuration
//! go straight to the C API so the fixed-layout records and buffers reach the
//! decoder and the credential types unchanged.

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::{self as sys, esp, EspError};
use log::{debug, info};

use crate::config::{ScanMethod, SortMethod};
use crate::error::{RadioError, StorageError};
use crate::events::{DisconnectReason, EventSink, StationEvent};
use crate::radio::{ClientSettings, EventChannel, EventSource, PersistentStorage, Radio, RadioMode};
use crate::record::{Bssid, PhyCapabilities, RawApExtension, RawApRecord};

fn driver(op: &'static str) -> impl FnOnce(EspError) -> RadioError {
    move |e| RadioError::Driver { op, code: e.code() }
}

/// The on-chip radio
pub struct EspRadio {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    wifi: Option<EspWifi<'static>>,
}

impl EspRadio {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            wifi: None,
        }
    }

    fn wifi(&mut self) -> Result<&mut EspWifi<'static>, RadioError> {
        self.wifi.as_mut().ok_or(RadioError::NotInitialized)
    }
}

impl Radio for EspRadio {
    fn init(&mut self) -> Result<(), RadioError> {
        if self.wifi.is_some() {
            return Ok(());
        }
        let modem = self.modem.take().ok_or(RadioError::NotInitialized)?;
        let nvs = EspDefaultNvsPartition::take().map_err(driver("nvs_partition_take"))?;
        let wifi = EspWifi::new(modem, self.sysloop.clone(), Some(nvs)).map_err(driver("esp_wifi_init"))?;
        info!("WiFi driver created");
        self.wifi = Some(wifi);
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        let configuration = match mode {
            RadioMode::Station => Configuration::Client(ClientConfiguration::default()),
        };
        self.wifi()?
            .set_configuration(&configuration)
            .map_err(driver("esp_wifi_set_mode"))
    }

    fn start(&mut self) -> Result<(), RadioError> {
        self.wifi()?.start().map_err(driver("esp_wifi_start"))
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.wifi()?.stop().map_err(driver("esp_wifi_stop"))
    }

    fn scan_blocking(&mut self, max_results: u16) -> Result<Vec<RawApRecord>, RadioError> {
        self.wifi()?;

        let config = sys::wifi_scan_config_t {
            show_hidden: true,
            ..Default::default()
        };
        esp!(unsafe { sys::esp_wifi_scan_start(&config, true) }).map_err(driver("esp_wifi_scan_start"))?;

        let mut count = max_results;
        let mut records = vec![sys::wifi_ap_record_t::default(); usize::from(max_results)];
        esp!(unsafe { sys::esp_wifi_scan_get_ap_records(&mut count, records.as_mut_ptr()) })
            .map_err(driver("esp_wifi_scan_get_ap_records"))?;
        records.truncate(usize::from(count));
        debug!("Driver returned {} record(s)", count);

        Ok(records.iter().map(raw_record).collect())
    }

    fn configure(&mut self, settings: &ClientSettings) -> Result<(), RadioError> {
        self.wifi()?;

        let mut config = sys::wifi_config_t::default();
        esp!(unsafe { sys::esp_wifi_get_config(sys::wifi_interface_t_WIFI_IF_STA, &mut config) })
            .map_err(driver("esp_wifi_get_config"))?;

        let creds = &settings.credentials;
        let options = &settings.options;
        // SAFETY: the station interface's config is the `sta` member
        let sta = unsafe { &mut config.sta };
        // The driver's SSID field has no room for the terminator
        let ssid = creds.ssid_buffer();
        let ssid_len = sta.ssid.len();
        sta.ssid.copy_from_slice(&ssid[..ssid_len]);
        let password = creds.password_buffer();
        let password_len = sta.password.len();
        sta.password.copy_from_slice(&password[..password_len]);
        sta.scan_method = match options.scan_method {
            ScanMethod::Fast => sys::wifi_scan_method_t_WIFI_FAST_SCAN,
            ScanMethod::AllChannel => sys::wifi_scan_method_t_WIFI_ALL_CHANNEL_SCAN,
        };
        sta.sort_method = match options.sort_method {
            SortMethod::BySignal => sys::wifi_sort_method_t_WIFI_CONNECT_AP_BY_SIGNAL,
            SortMethod::BySecurity => sys::wifi_sort_method_t_WIFI_CONNECT_AP_BY_SECURITY,
        };
        sta.threshold.rssi = options.threshold.rssi;
        sta.threshold.authmode = options.threshold.auth_mode.as_raw();

        esp!(unsafe { sys::esp_wifi_set_config(sys::wifi_interface_t_WIFI_IF_STA, &mut config) })
            .map_err(driver("esp_wifi_set_config"))
    }

    fn connect(&mut self) -> Result<(), RadioError> {
        self.wifi()?.connect().map_err(driver("esp_wifi_connect"))
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.wifi()?.disconnect().map_err(driver("esp_wifi_disconnect"))
    }
}

fn raw_record(ap: &sys::wifi_ap_record_t) -> RawApRecord {
    let mut phy_flags = 0;
    for (present, bit) in [
        (ap.phy_11b(), PhyCapabilities::B),
        (ap.phy_11g(), PhyCapabilities::G),
        (ap.phy_11n(), PhyCapabilities::N),
        (ap.phy_lr(), PhyCapabilities::LONG_RANGE),
        (ap.phy_11a(), PhyCapabilities::A),
        (ap.phy_11ac(), PhyCapabilities::AC),
        (ap.phy_11ax(), PhyCapabilities::AX),
        (ap.wps(), PhyCapabilities::WPS),
        (ap.ftm_responder(), PhyCapabilities::FTM_RESPONDER),
        (ap.ftm_initiator(), PhyCapabilities::FTM_INITIATOR),
    ] {
        if present != 0 {
            phy_flags |= bit;
        }
    }

    let he_ap = (ap.he_ap.bss_color() as u8 & 0x3f)
        | ((ap.he_ap.partial_bss_color() as u8 & 1) << 6)
        | ((ap.he_ap.bss_color_disabled() as u8 & 1) << 7);

    RawApRecord {
        bssid: ap.bssid,
        ssid: ap.ssid,
        primary: ap.primary,
        second: ap.second as u32,
        rssi: ap.rssi,
        authmode: ap.authmode as u32,
        pairwise_cipher: ap.pairwise_cipher as u32,
        group_cipher: ap.group_cipher as u32,
        ext: Some(RawApExtension {
            ant: ap.ant as u32,
            phy_flags,
            country_code: ap.country.cc.map(|c| c as u8),
            country_schan: ap.country.schan,
            country_nchan: ap.country.nchan,
            country_max_tx_power: ap.country.max_tx_power,
            country_policy: ap.country.policy as u32,
            he_ap,
            bssid_index: ap.he_ap.bssid_index,
            bandwidth: ap.bandwidth as u32,
            vht_ch_freq1: ap.vht_ch_freq1,
            vht_ch_freq2: ap.vht_ch_freq2,
        }),
    }
}

fn wifi_event(event: &WifiEvent<'_>) -> Option<StationEvent> {
    match event {
        WifiEvent::StaStarted => Some(StationEvent::Started),
        WifiEvent::StaStopped => Some(StationEvent::Stopped),
        WifiEvent::StaConnected(connected) => Some(StationEvent::Connected {
            bssid: Bssid(*connected.bssid()),
            channel: connected.channel(),
        }),
        WifiEvent::StaDisconnected(disconnected) => Some(StationEvent::Disconnected {
            reason: DisconnectReason::from(disconnected.reason() as u16),
        }),
        _ => None,
    }
}

/// The system event loop
pub struct EspEvents {
    sysloop: EspSystemEventLoop,
    subscriptions: Vec<EspSubscription<'static, System>>,
}

impl EspEvents {
    pub fn new(sysloop: EspSystemEventLoop) -> Self {
        Self {
            sysloop,
            subscriptions: Vec::new(),
        }
    }
}

impl EventSource for EspEvents {
    fn subscribe(&mut self, channel: EventChannel, sink: EventSink) -> Result<(), RadioError> {
        let subscription = match channel {
            EventChannel::Wifi => self.sysloop.subscribe::<WifiEvent, _>(move |event| {
                if let Some(event) = wifi_event(&event) {
                    let _ = sink.post(event);
                }
            }),
            EventChannel::Ip => self.sysloop.subscribe::<IpEvent, _>(move |event| {
                if let IpEvent::DhcpIpAssigned(assignment) = event {
                    let info = assignment.ip_info();
                    let _ = sink.post(StationEvent::IpAcquired {
                        ip: info.ip,
                        netmask: info.subnet.mask.into(),
                        gateway: info.subnet.gateway,
                    });
                }
            }),
        }
        .map_err(|e| RadioError::Subscription(e.to_string()))?;
        self.subscriptions.push(subscription);
        Ok(())
    }

    fn unsubscribe_all(&mut self) {
        self.subscriptions.clear();
    }
}

/// The default NVS partition
#[derive(Debug, Default)]
pub struct EspNvsFlash;

fn storage_error(e: EspError) -> StorageError {
    match e.code() {
        code if code == sys::ESP_ERR_NVS_NO_FREE_PAGES as i32 => StorageError::NoFreePages,
        code if code == sys::ESP_ERR_NVS_NEW_VERSION_FOUND as i32 => StorageError::NewVersionFound,
        code => StorageError::Driver(code),
    }
}

impl PersistentStorage for EspNvsFlash {
    fn init(&mut self) -> Result<(), StorageError> {
        esp!(unsafe { sys::nvs_flash_init() }).map_err(storage_error)
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        esp!(unsafe { sys::nvs_flash_erase() }).map_err(storage_error)
    }
}
