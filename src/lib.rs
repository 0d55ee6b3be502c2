// 导出模块
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod radio;
pub mod reconnect;
pub mod record;
pub mod scan;
pub mod sim;
pub mod storage;
pub mod wifi;

#[cfg(target_os = "espidf")]
pub mod esp;

// 重新导出一些公共接口，使它们可以直接从 crate 根访问
pub use error::{Error, Result};
pub use record::AccessPointRecord;
pub use scan::ScanResults;
pub use wifi::{StationManager, StationState};
