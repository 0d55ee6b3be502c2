//! Access point records
//!
//! Decoding of the radio firmware's fixed-layout scan record into a typed
//! [`AccessPointRecord`]. Decoding is total: enumerated fields the decoder
//! does not recognize fall back to a documented default, since newer radio
//! firmware may report values this crate does not know yet.

use std::borrow::Cow;
use std::fmt;

use heapless::Vec as BoundedVec;

use crate::error::{Error, Result};

/// Length of a basic raw record, up to and including the group cipher
pub const RAW_RECORD_LEN: usize = 60;
/// Length of a raw record carrying the extended fields
pub const RAW_RECORD_EXT_LEN: usize = 92;
/// Size of the raw SSID field, terminator included
pub const RAW_SSID_LEN: usize = 33;
/// Longest SSID the standard allows
pub const MAX_SSID_LEN: usize = 32;

/// Extended fields only reported by richer radio firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawApExtension {
    pub ant: u32,
    pub phy_flags: u32,
    pub country_code: [u8; 3],
    pub country_schan: u8,
    pub country_nchan: u8,
    pub country_max_tx_power: i8,
    pub country_policy: u32,
    /// bss_color:6, partial_bss_color:1, bss_color_disabled:1
    pub he_ap: u8,
    pub bssid_index: u8,
    pub bandwidth: u32,
    pub vht_ch_freq1: u8,
    pub vht_ch_freq2: u8,
}

/// One access point record as the radio firmware reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawApRecord {
    pub bssid: [u8; 6],
    pub ssid: [u8; RAW_SSID_LEN],
    pub primary: u8,
    pub second: u32,
    pub rssi: i8,
    pub authmode: u32,
    pub pairwise_cipher: u32,
    pub group_cipher: u32,
    pub ext: Option<RawApExtension>,
}

impl Default for RawApRecord {
    fn default() -> Self {
        Self {
            bssid: [0; 6],
            ssid: [0; RAW_SSID_LEN],
            primary: 0,
            second: 0,
            rssi: 0,
            authmode: 0,
            pairwise_cipher: 0,
            group_cipher: 0,
            ext: None,
        }
    }
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl RawApRecord {
    /// Parse the fixed little-endian layout produced by the radio firmware.
    ///
    /// Inputs of at least [`RAW_RECORD_EXT_LEN`] bytes carry the extended
    /// section; shorter inputs down to [`RAW_RECORD_LEN`] decode as basic
    /// records.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RAW_RECORD_LEN {
            return Err(Error::InvalidRecord {
                len: bytes.len(),
                expected: RAW_RECORD_LEN,
            });
        }

        let mut bssid = [0u8; 6];
        bssid.copy_from_slice(&bytes[0..6]);
        let mut ssid = [0u8; RAW_SSID_LEN];
        ssid.copy_from_slice(&bytes[6..6 + RAW_SSID_LEN]);

        let ext = (bytes.len() >= RAW_RECORD_EXT_LEN).then(|| RawApExtension {
            ant: le_u32(bytes, 60),
            phy_flags: le_u32(bytes, 64),
            country_code: [bytes[68], bytes[69], bytes[70]],
            country_schan: bytes[71],
            country_nchan: bytes[72],
            country_max_tx_power: bytes[73] as i8,
            country_policy: le_u32(bytes, 76),
            he_ap: bytes[80],
            bssid_index: bytes[81],
            bandwidth: le_u32(bytes, 84),
            vht_ch_freq1: bytes[88],
            vht_ch_freq2: bytes[89],
        });

        Ok(Self {
            bssid,
            ssid,
            primary: bytes[39],
            second: le_u32(bytes, 40),
            rssi: bytes[44] as i8,
            authmode: le_u32(bytes, 48),
            pairwise_cipher: le_u32(bytes, 52),
            group_cipher: le_u32(bytes, 56),
            ext,
        })
    }
}

/// 6-byte hardware address of an access point radio
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Bssid(pub [u8; 6]);

impl Bssid {
    /// The 12-character uppercase hex form, without separators
    pub fn to_hex(&self) -> heapless::String<12> {
        let mut out = heapless::String::new();
        // 12 characters always fit
        let _ = fmt::write(&mut out, format_args!("{self}"));
        out
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bssid({self})")
    }
}

/// Network name as broadcast; not guaranteed to be UTF-8
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Ssid(BoundedVec<u8, MAX_SSID_LEN>);

impl Ssid {
    /// Bytes up to the first zero, at most [`MAX_SSID_LEN`] of them
    pub fn from_raw(raw: &[u8]) -> Self {
        let end = raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(raw.len())
            .min(MAX_SSID_LEN);
        let mut bytes = BoundedVec::new();
        // end <= MAX_SSID_LEN, so this cannot overflow
        let _ = bytes.extend_from_slice(&raw[..end]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hidden networks broadcast an empty name
    pub fn is_hidden(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssid({:?})", self.to_string_lossy())
    }
}

/// Channel bonding position relative to the primary channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondaryChannel {
    #[default]
    None,
    Above,
    Below,
}

impl SecondaryChannel {
    /// Unknown values map to [`SecondaryChannel::None`]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => SecondaryChannel::Above,
            2 => SecondaryChannel::Below,
            _ => SecondaryChannel::None,
        }
    }
}

/// Security scheme, ordered from weakest to strongest as the radio numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AuthMode {
    #[default]
    Open,
    Wep,
    WpaPersonal,
    Wpa2Personal,
    WpaWpa2Personal,
    Wpa2Enterprise,
    Wpa3Personal,
    Wpa2Wpa3Personal,
    WapiPersonal,
    Owe,
    Wpa3Enterprise192,
    Wpa3ExtPsk,
    Wpa3ExtPskMixed,
    Dpp,
    Wpa3Enterprise,
    Wpa2Wpa3Enterprise,
}

impl AuthMode {
    /// Unknown values map to [`AuthMode::Open`]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => AuthMode::Wep,
            2 => AuthMode::WpaPersonal,
            3 => AuthMode::Wpa2Personal,
            4 => AuthMode::WpaWpa2Personal,
            5 => AuthMode::Wpa2Enterprise,
            6 => AuthMode::Wpa3Personal,
            7 => AuthMode::Wpa2Wpa3Personal,
            8 => AuthMode::WapiPersonal,
            9 => AuthMode::Owe,
            10 => AuthMode::Wpa3Enterprise192,
            11 => AuthMode::Wpa3ExtPsk,
            12 => AuthMode::Wpa3ExtPskMixed,
            13 => AuthMode::Dpp,
            14 => AuthMode::Wpa3Enterprise,
            15 => AuthMode::Wpa2Wpa3Enterprise,
            _ => AuthMode::Open,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn is_enterprise(self) -> bool {
        matches!(
            self,
            AuthMode::Wpa2Enterprise
                | AuthMode::Wpa3Enterprise192
                | AuthMode::Wpa3Enterprise
                | AuthMode::Wpa2Wpa3Enterprise
        )
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMode::Open => "open",
            AuthMode::Wep => "WEP",
            AuthMode::WpaPersonal => "WPA-PSK",
            AuthMode::Wpa2Personal => "WPA2-PSK",
            AuthMode::WpaWpa2Personal => "WPA/WPA2-PSK",
            AuthMode::Wpa2Enterprise => "WPA2-Enterprise",
            AuthMode::Wpa3Personal => "WPA3-PSK",
            AuthMode::Wpa2Wpa3Personal => "WPA2/WPA3-PSK",
            AuthMode::WapiPersonal => "WAPI-PSK",
            AuthMode::Owe => "OWE",
            AuthMode::Wpa3Enterprise192 => "WPA3-Enterprise-192",
            AuthMode::Wpa3ExtPsk => "WPA3-EXT-PSK",
            AuthMode::Wpa3ExtPskMixed => "WPA3-EXT-PSK-mixed",
            AuthMode::Dpp => "DPP",
            AuthMode::Wpa3Enterprise => "WPA3-Enterprise",
            AuthMode::Wpa2Wpa3Enterprise => "WPA2/WPA3-Enterprise",
        };
        f.write_str(name)
    }
}

/// Pairwise or group cipher suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherType {
    None,
    Wep40,
    Wep104,
    Tkip,
    Ccmp,
    TkipCcmp,
    AesCmac128,
    Sms4,
    Gcmp,
    Gcmp256,
    AesGmac128,
    AesGmac256,
    #[default]
    Unknown,
}

impl CipherType {
    /// Unknown values, including the radio's own "unknown", map to [`CipherType::Unknown`]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CipherType::None,
            1 => CipherType::Wep40,
            2 => CipherType::Wep104,
            3 => CipherType::Tkip,
            4 => CipherType::Ccmp,
            5 => CipherType::TkipCcmp,
            6 => CipherType::AesCmac128,
            7 => CipherType::Sms4,
            8 => CipherType::Gcmp,
            9 => CipherType::Gcmp256,
            10 => CipherType::AesGmac128,
            11 => CipherType::AesGmac256,
            _ => CipherType::Unknown,
        }
    }
}

/// Channel width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Bandwidth {
    #[default]
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
    Mhz80Plus80,
}

impl Bandwidth {
    /// Unknown values map to [`Bandwidth::Mhz20`]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            2 => Bandwidth::Mhz40,
            3 => Bandwidth::Mhz80,
            4 => Bandwidth::Mhz160,
            5 => Bandwidth::Mhz80Plus80,
            _ => Bandwidth::Mhz20,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bandwidth::Mhz20 => "20MHz",
            Bandwidth::Mhz40 => "40MHz",
            Bandwidth::Mhz80 => "80MHz",
            Bandwidth::Mhz160 => "160MHz",
            Bandwidth::Mhz80Plus80 => "80+80MHz",
        };
        f.write_str(name)
    }
}

/// Antenna the record was received on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antenna {
    #[default]
    Ant0,
    Ant1,
}

impl Antenna {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Antenna::Ant1,
            _ => Antenna::Ant0,
        }
    }
}

/// PHY modes and features advertised by the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhyCapabilities {
    pub b: bool,
    pub g: bool,
    pub n: bool,
    pub long_range: bool,
    pub a: bool,
    pub ac: bool,
    pub ax: bool,
    pub wps: bool,
    pub ftm_responder: bool,
    pub ftm_initiator: bool,
}

impl PhyCapabilities {
    pub const B: u32 = 1 << 0;
    pub const G: u32 = 1 << 1;
    pub const N: u32 = 1 << 2;
    pub const LONG_RANGE: u32 = 1 << 3;
    pub const A: u32 = 1 << 4;
    pub const AC: u32 = 1 << 5;
    pub const AX: u32 = 1 << 6;
    pub const WPS: u32 = 1 << 7;
    pub const FTM_RESPONDER: u32 = 1 << 8;
    pub const FTM_INITIATOR: u32 = 1 << 9;

    /// Reserved bits are ignored
    pub fn from_bits(bits: u32) -> Self {
        Self {
            b: bits & Self::B != 0,
            g: bits & Self::G != 0,
            n: bits & Self::N != 0,
            long_range: bits & Self::LONG_RANGE != 0,
            a: bits & Self::A != 0,
            ac: bits & Self::AC != 0,
            ax: bits & Self::AX != 0,
            wps: bits & Self::WPS != 0,
            ftm_responder: bits & Self::FTM_RESPONDER != 0,
            ftm_initiator: bits & Self::FTM_INITIATOR != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountryPolicy {
    #[default]
    Auto,
    Manual,
}

/// Regulatory domain advertised by the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryInfo {
    /// Two letters plus an environment byte (' ', 'O' or 'I')
    pub code: [u8; 3],
    pub start_channel: u8,
    pub channel_count: u8,
    pub max_tx_power: i8,
    pub policy: CountryPolicy,
}

impl CountryInfo {
    /// The two-letter country code, if printable
    pub fn alpha2(&self) -> Option<&str> {
        std::str::from_utf8(&self.code[..2]).ok()
    }
}

/// Wi-Fi 6 BSS colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeApInfo {
    pub bss_color: u8,
    pub partial_bss_color: bool,
    pub bss_color_disabled: bool,
    pub bssid_index: u8,
}

/// VHT channel centre frequency indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VhtCenter {
    pub freq1: u8,
    pub freq2: u8,
}

/// One decoded scan hit
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPointRecord {
    pub bssid: Bssid,
    pub ssid: Ssid,
    pub primary_channel: u8,
    pub secondary_channel: SecondaryChannel,
    /// dBm, more negative is weaker
    pub rssi: i8,
    pub auth_mode: AuthMode,
    pub pairwise_cipher: CipherType,
    pub group_cipher: CipherType,
    pub bandwidth: Bandwidth,
    pub antenna: Antenna,
    pub phy: PhyCapabilities,
    pub country: Option<CountryInfo>,
    pub he: HeApInfo,
    pub vht_center: VhtCenter,
}

impl AccessPointRecord {
    /// Decode a raw record. Never fails.
    pub fn decode(raw: &RawApRecord) -> Self {
        let secondary_channel = SecondaryChannel::from_raw(raw.second);

        let mut record = Self {
            bssid: Bssid(raw.bssid),
            ssid: Ssid::from_raw(&raw.ssid),
            primary_channel: raw.primary,
            secondary_channel,
            rssi: raw.rssi,
            auth_mode: AuthMode::from_raw(raw.authmode),
            pairwise_cipher: CipherType::from_raw(raw.pairwise_cipher),
            group_cipher: CipherType::from_raw(raw.group_cipher),
            bandwidth: match secondary_channel {
                SecondaryChannel::None => Bandwidth::Mhz20,
                _ => Bandwidth::Mhz40,
            },
            antenna: Antenna::default(),
            phy: PhyCapabilities::default(),
            country: None,
            he: HeApInfo::default(),
            vht_center: VhtCenter::default(),
        };

        if let Some(ext) = &raw.ext {
            record.bandwidth = Bandwidth::from_raw(ext.bandwidth);
            record.antenna = Antenna::from_raw(ext.ant);
            record.phy = PhyCapabilities::from_bits(ext.phy_flags);
            record.country = (ext.country_code[0] != 0).then(|| CountryInfo {
                code: ext.country_code,
                start_channel: ext.country_schan,
                channel_count: ext.country_nchan,
                max_tx_power: ext.country_max_tx_power,
                policy: match ext.country_policy {
                    1 => CountryPolicy::Manual,
                    _ => CountryPolicy::Auto,
                },
            });
            record.he = HeApInfo {
                bss_color: ext.he_ap & 0x3f,
                partial_bss_color: ext.he_ap & 0x40 != 0,
                bss_color_disabled: ext.he_ap & 0x80 != 0,
                bssid_index: ext.bssid_index,
            };
            record.vht_center = VhtCenter {
                freq1: ext.vht_ch_freq1,
                freq2: ext.vht_ch_freq2,
            };
        }

        record
    }
}

impl From<&RawApRecord> for AccessPointRecord {
    fn from(raw: &RawApRecord) -> Self {
        Self::decode(raw)
    }
}
