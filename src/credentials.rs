//! Station credentials
//!
//! The radio takes credentials as fixed, zero-terminated byte buffers. These
//! types make the overflow behaviour an explicit choice instead of an implicit
//! conversion.

use std::fmt;

use heapless::Vec as BoundedVec;

use crate::error::{Error, Result};

/// SSID buffer capacity, terminator excluded
pub const SSID_CAPACITY: usize = 32;
/// Password buffer capacity, terminator excluded
pub const PASSWORD_CAPACITY: usize = 63;

/// What to do with input longer than its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep the leading bytes that fit
    #[default]
    Truncate,
    /// Fail with [`Error::CredentialTooLong`]
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Ssid,
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Ssid => f.write_str("SSID"),
            CredentialField::Password => f.write_str("password"),
        }
    }
}

/// Byte buffer holding at most `N` bytes plus an implicit terminator
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BoundedBytes<const N: usize> {
    bytes: BoundedVec<u8, N>,
    truncated: bool,
}

impl<const N: usize> BoundedBytes<N> {
    /// Store `input`, applying `policy` when it exceeds `N` bytes
    pub fn new(input: &[u8], policy: OverflowPolicy, field: CredentialField) -> Result<Self> {
        if input.len() > N && policy == OverflowPolicy::Reject {
            return Err(Error::CredentialTooLong {
                field,
                len: input.len(),
                capacity: N,
            });
        }
        Ok(Self::truncating(input))
    }

    /// Store the first `N` bytes of `input`
    pub fn truncating(input: &[u8]) -> Self {
        let kept = &input[..input.len().min(N)];
        let mut bytes = BoundedVec::new();
        // kept.len() <= N
        let _ = bytes.extend_from_slice(kept);
        Self {
            bytes,
            truncated: kept.len() < input.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Longest UTF-8 prefix; truncation may have split a character
    pub fn as_str(&self) -> &str {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&self.bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    /// Copy into a driver buffer, zero-filling the rest.
    ///
    /// `out` must be longer than the content so a terminator fits; excess
    /// content is cut to leave room for it.
    pub fn write_terminated(&self, out: &mut [u8]) -> usize {
        out.fill(0);
        let len = self.bytes.len().min(out.len().saturating_sub(1));
        out[..len].copy_from_slice(&self.bytes[..len]);
        len
    }
}

/// SSID and password for station mode
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    ssid: BoundedBytes<SSID_CAPACITY>,
    password: BoundedBytes<PASSWORD_CAPACITY>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str, policy: OverflowPolicy) -> Result<Self> {
        Self::from_bytes(ssid.as_bytes(), password.as_bytes(), policy)
    }

    pub fn from_bytes(ssid: &[u8], password: &[u8], policy: OverflowPolicy) -> Result<Self> {
        let ssid = BoundedBytes::new(ssid, policy, CredentialField::Ssid)?;
        let password = BoundedBytes::new(password, policy, CredentialField::Password)?;
        Ok(Self { ssid, password })
    }

    pub fn ssid(&self) -> &BoundedBytes<SSID_CAPACITY> {
        &self.ssid
    }

    pub fn password(&self) -> &BoundedBytes<PASSWORD_CAPACITY> {
        &self.password
    }

    /// An empty password means an open network
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// The driver's SSID field: 32 bytes plus terminator
    pub fn ssid_buffer(&self) -> [u8; SSID_CAPACITY + 1] {
        let mut out = [0u8; SSID_CAPACITY + 1];
        self.ssid.write_terminated(&mut out);
        out
    }

    /// The driver's password field: 63 bytes plus terminator
    pub fn password_buffer(&self) -> [u8; PASSWORD_CAPACITY + 1] {
        let mut out = [0u8; PASSWORD_CAPACITY + 1];
        self.password.write_terminated(&mut out);
        out
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid.as_str())
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORTY: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCD";

    #[test]
    fn long_ssid_is_truncated_to_capacity_plus_terminator() {
        assert_eq!(FORTY.len(), 40);
        let creds = Credentials::new(FORTY, "secret", OverflowPolicy::Truncate).unwrap();

        let buffer = creds.ssid_buffer();
        assert_eq!(&buffer[..SSID_CAPACITY], &FORTY.as_bytes()[..SSID_CAPACITY]);
        assert_eq!(buffer[SSID_CAPACITY], 0);
        assert!(creds.ssid().was_truncated());
        assert!(!creds.password().was_truncated());
    }

    #[test]
    fn reject_policy_reports_overflow() {
        let err = Credentials::new(FORTY, "", OverflowPolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            Error::CredentialTooLong {
                field: CredentialField::Ssid,
                len: 40,
                capacity: SSID_CAPACITY,
            }
        ));

        let long_password = "p".repeat(64);
        let err = Credentials::new("home", &long_password, OverflowPolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            Error::CredentialTooLong { field: CredentialField::Password, capacity: PASSWORD_CAPACITY, .. }
        ));
    }

    #[test]
    fn password_fills_exactly_to_capacity() {
        let password = "p".repeat(PASSWORD_CAPACITY);
        let creds = Credentials::new("home", &password, OverflowPolicy::Reject).unwrap();
        let buffer = creds.password_buffer();
        assert!(buffer[..PASSWORD_CAPACITY].iter().all(|&b| b == b'p'));
        assert_eq!(buffer[PASSWORD_CAPACITY], 0);
    }

    #[test]
    fn split_character_is_dropped_from_str_view() {
        // 31 ASCII bytes then a 2-byte character straddling the limit
        let ssid = format!("{}é", "a".repeat(31));
        let creds = Credentials::new(&ssid, "", OverflowPolicy::Truncate).unwrap();
        assert_eq!(creds.ssid().len(), SSID_CAPACITY);
        assert_eq!(creds.ssid().as_str(), "a".repeat(31));
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials::new("home", "hunter2", OverflowPolicy::Truncate).unwrap();
        let shown = format!("{creds:?}");
        assert!(shown.contains("home"));
        assert!(!shown.contains("hunter2"));
        assert!(!creds.is_open());
    }
}
