use std::fmt;
use std::io;

use thiserror::Error;

use crate::credentials::CredentialField;
use crate::wifi::StationState;

/// Errors reported by the radio driver boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// A driver call returned a non-zero status code
    #[error("radio driver call `{op}` failed with code {code}")]
    Driver {
        /// Name of the failing driver call
        op: &'static str,
        /// Raw status code
        code: i32,
    },
    /// The radio has not been brought up yet
    #[error("radio not initialized")]
    NotInitialized,
    /// Event subscription could not be registered
    #[error("event subscription failed: {0}")]
    Subscription(String),
}

/// Errors reported by the persistent storage boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The storage partition has no free pages left
    #[error("no free pages in persistent storage")]
    NoFreePages,
    /// The storage partition was written by a newer format version
    #[error("persistent storage contains a newer format version")]
    NewVersionFound,
    /// Any other driver status code
    #[error("persistent storage driver failed with code {0}")]
    Driver(i32),
}

impl StorageError {
    /// Whether this condition is resolved by erasing the partition
    pub fn needs_erase(&self) -> bool {
        matches!(self, StorageError::NoFreePages | StorageError::NewVersionFound)
    }
}

/// Bring-up stage that failed during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Network stack and radio driver creation
    Radio,
    /// Switching the radio to station mode
    StationMode,
    /// Registering the event handlers
    Events,
    /// Starting the radio
    Start,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Radio => "radio bring-up",
            InitStage::StationMode => "station mode",
            InitStage::Events => "event subscription",
            InitStage::Start => "radio start",
        };
        f.write_str(name)
    }
}

/// Custom error type for the station manager
#[derive(Debug, Error)]
pub enum Error {
    /// Persistent storage could not be brought up, even after erasing it
    #[error("persistent storage unusable: {0}")]
    StorageFatal(StorageError),
    /// Radio or network stack bring-up failed
    #[error("initialization failed during {stage}: {source}")]
    Init {
        /// Stage that failed
        stage: InitStage,
        /// Driver error
        source: RadioError,
    },
    /// Radio driver errors outside initialization
    #[error(transparent)]
    Radio(#[from] RadioError),
    /// Another manager already owns the radio
    #[error("the radio is already owned by another station manager")]
    RadioBusy,
    /// Operation not allowed in the current state
    #[error("cannot {op} while {state}")]
    InvalidState {
        /// Rejected operation
        op: &'static str,
        /// State at the time of the call
        state: StationState,
    },
    /// A credential exceeded its buffer and the policy rejects overflow
    #[error("{field} is {len} bytes, capacity is {capacity}")]
    CredentialTooLong {
        /// Offending field
        field: CredentialField,
        /// Input length in bytes
        len: usize,
        /// Buffer capacity in bytes, terminator excluded
        capacity: usize,
    },
    /// Raw access point record is shorter than the fixed layout
    #[error("raw access point record is {len} bytes, expected at least {expected}")]
    InvalidRecord {
        /// Provided length
        len: usize,
        /// Minimum length
        expected: usize,
    },
    /// No IP address was acquired within the caller's deadline
    #[error("no IP address acquired within {0:?}")]
    ConnectTimeout(std::time::Duration),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageFatal(_) | Error::Init { .. })
    }
}

/// Result type for the station manager
pub type Result<T> = std::result::Result<T, Error>;
