//! Scan results
//!
//! Holds the decoded records of one scan pass, in the order the hardware
//! reported them.

use std::slice;

use log::{debug, info};

use crate::error::Result;
use crate::radio::Radio;
use crate::record::AccessPointRecord;

/// Decoded records of a single scan pass, at most `max_count` of them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResults {
    records: Vec<AccessPointRecord>,
    max_count: usize,
}

impl ScanResults {
    /// Run a blocking scan and keep up to `max_count` records.
    ///
    /// The radio may report fewer records than requested; that is not an error.
    pub fn capture<R: Radio + ?Sized>(radio: &mut R, max_count: u16) -> Result<Self> {
        let mut results = Self::default();
        results.recapture(radio, max_count)?;
        Ok(results)
    }

    /// Replace the contents with a fresh scan. The previous records are
    /// discarded before the scan starts, even if it fails.
    pub fn recapture<R: Radio + ?Sized>(&mut self, radio: &mut R, max_count: u16) -> Result<()> {
        self.records.clear();
        self.max_count = usize::from(max_count);
        if max_count == 0 {
            return Ok(());
        }

        let raw = radio.scan_blocking(max_count)?;
        if raw.len() > self.max_count {
            debug!("Driver returned {} records, keeping {}", raw.len(), self.max_count);
        }
        self.records.reserve(raw.len().min(self.max_count));
        self.records
            .extend(raw.iter().take(self.max_count).map(AccessPointRecord::decode));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Capacity requested for this pass
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn as_slice(&self) -> &[AccessPointRecord] {
        &self.records
    }

    pub fn iter(&self) -> slice::Iter<'_, AccessPointRecord> {
        self.records.iter()
    }

    /// Record with the highest RSSI; the earliest one wins ties
    pub fn strongest(&self) -> Option<&AccessPointRecord> {
        self.records
            .iter()
            .reduce(|best, ap| if ap.rssi > best.rssi { ap } else { best })
    }

    /// All records advertising `ssid`, in scan order
    pub fn find_ssid<'a>(&'a self, ssid: &'a [u8]) -> impl Iterator<Item = &'a AccessPointRecord> + 'a {
        self.records.iter().filter(move |ap| ap.ssid.as_bytes() == ssid)
    }

    /// Log one line per record
    pub fn log_summary(&self) {
        info!("Found {} access point(s):", self.records.len());
        for (i, ap) in self.records.iter().enumerate() {
            info!(
                "  [{:>2}] {:<32} {} ch {:>3} {:>4} dBm {} {}",
                i,
                ap.ssid,
                ap.bssid,
                ap.primary_channel,
                ap.rssi,
                ap.auth_mode,
                ap.bandwidth
            );
        }
    }
}

impl<'a> IntoIterator for &'a ScanResults {
    type Item = &'a AccessPointRecord;
    type IntoIter = slice::Iter<'a, AccessPointRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
