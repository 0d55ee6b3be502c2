//! Storage module
//!
//! Bring-up of the non-volatile storage (NVS) partition the radio driver keeps
//! its calibration and configuration in.

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::radio::PersistentStorage;

/// Initialize persistent storage.
///
/// A partition that is full or was written by a newer format is erased and
/// initialized once more. Any failure after that single retry, and any other
/// initialization error, is fatal.
pub fn init_persistent_storage<S: PersistentStorage + ?Sized>(storage: &mut S) -> Result<()> {
    match storage.init() {
        Ok(()) => {
            info!("Persistent storage initialized");
            Ok(())
        }
        Err(e) if e.needs_erase() => {
            warn!("Persistent storage reports {}, erasing partition", e);
            storage.erase().map_err(|e| {
                error!("Failed to erase persistent storage: {}", e);
                Error::StorageFatal(e)
            })?;
            storage.init().map_err(|e| {
                error!("Persistent storage still unusable after erase: {}", e);
                Error::StorageFatal(e)
            })?;
            info!("Persistent storage initialized after erase");
            Ok(())
        }
        Err(e) => {
            error!("Failed to initialize persistent storage: {}", e);
            Err(Error::StorageFatal(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::sim::SimStorage;

    #[test]
    fn healthy_partition_is_not_erased() {
        let mut storage = SimStorage::healthy();
        init_persistent_storage(&mut storage).unwrap();
        assert_eq!(storage.init_calls(), 1);
        assert_eq!(storage.erase_calls(), 0);
    }

    #[test]
    fn no_free_pages_erases_once_and_retries() {
        let mut storage = SimStorage::failing_with([StorageError::NoFreePages]);
        init_persistent_storage(&mut storage).unwrap();
        assert_eq!(storage.init_calls(), 2);
        assert_eq!(storage.erase_calls(), 1);
    }

    #[test]
    fn new_version_erases_once_and_retries() {
        let mut storage = SimStorage::failing_with([StorageError::NewVersionFound]);
        init_persistent_storage(&mut storage).unwrap();
        assert_eq!(storage.erase_calls(), 1);
    }

    #[test]
    fn second_failure_is_fatal_without_more_retries() {
        let mut storage =
            SimStorage::failing_with([StorageError::NoFreePages, StorageError::NoFreePages]);
        let err = init_persistent_storage(&mut storage).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::StorageFatal(StorageError::NoFreePages)));
        assert_eq!(storage.init_calls(), 2);
        assert_eq!(storage.erase_calls(), 1);
    }

    #[test]
    fn other_errors_are_fatal_without_erase() {
        let mut storage = SimStorage::failing_with([StorageError::Driver(0x1102)]);
        let err = init_persistent_storage(&mut storage).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(storage.init_calls(), 1);
        assert_eq!(storage.erase_calls(), 0);
    }

    #[test]
    fn erase_failure_is_fatal() {
        let mut storage = SimStorage::failing_with([StorageError::NewVersionFound]);
        storage.fail_erase(StorageError::Driver(-1));
        let err = init_persistent_storage(&mut storage).unwrap_err();
        assert!(matches!(err, Error::StorageFatal(StorageError::Driver(-1))));
        assert_eq!(storage.init_calls(), 1);
    }
}
