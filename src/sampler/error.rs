use thiserror::Error;

/// Failures a sampling cycle can surface.
///
/// Only `HostMemory` aborts a cycle; the other variants degrade to
/// zeroed or empty fields at the snapshot builder.
#[derive(Debug, Error)]
pub enum SampleError {
    /// No amdgpu device exposes memory counters in sysfs.
    #[error("no AMD GPU found in sysfs")]
    NoDevice,

    /// The process table itself could not be enumerated.
    #[error("process table enumeration failed")]
    Enumeration(#[from] procfs::ProcError),

    /// The host-wide memory query failed; without it no meaningful
    /// snapshot exists.
    #[error("host memory query failed")]
    HostMemory,
}
