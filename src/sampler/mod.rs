pub mod device;
pub mod error;
pub mod process;
pub mod snapshot;

pub use device::{DeviceMemoryStats, DeviceStatsReader};
pub use error::SampleError;
pub use process::{ProcessMemoryRecord, ProcessScanner};
pub use snapshot::{Sampler, Snapshot};
