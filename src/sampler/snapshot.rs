use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

use super::device::{DeviceMemoryStats, DeviceStatsReader};
use super::error::SampleError;
use super::process::{ProcessMemoryRecord, ProcessScanner};

/// One sampling cycle's complete view of the machine. Immutable once
/// built; the next cycle produces a fresh one.
///
/// `device` and `processes` are read from different kernel interfaces at
/// slightly different instants and may disagree momentarily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub host_ram_total: u64,
    pub host_ram_used: u64,
    pub device: DeviceMemoryStats,
    /// Unsorted; ordering is applied by the presentation layer.
    pub processes: Vec<ProcessMemoryRecord>,
}

impl Snapshot {
    /// Physical capacity: OS-visible RAM plus the fixed VRAM carve-out.
    pub fn physical_total(&self) -> u64 {
        self.host_ram_total + self.device.vram_total
    }

    /// Host RAM in use net of GPU-shared (GTT) pages.
    pub fn system_used(&self) -> u64 {
        self.host_ram_used.saturating_sub(self.device.gtt_used)
    }
}

/// Produces one immutable snapshot per invocation.
pub struct Sampler {
    system: System,
    device: DeviceStatsReader,
    scanner: ProcessScanner,
}

impl Sampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system,
            device: DeviceStatsReader::new(),
            scanner: ProcessScanner::new(),
        }
    }

    /// Device and process failures degrade to zeroed/empty fields; only
    /// the host-wide memory query is fatal to the cycle.
    pub fn sample(&mut self) -> Result<Snapshot, SampleError> {
        self.system.refresh_memory();
        let host_ram_total = self.system.total_memory();
        let host_ram_used = self.system.used_memory();
        if host_ram_total == 0 {
            return Err(SampleError::HostMemory);
        }

        let device = self.device.read().unwrap_or_else(|err| {
            debug!(error = %err, "device stats unavailable this cycle");
            DeviceMemoryStats::default()
        });

        let processes = self.scanner.scan().unwrap_or_else(|err| {
            debug!(error = %err, "process scan unavailable this cycle");
            Vec::new()
        });

        Ok(Snapshot {
            host_ram_total,
            host_ram_used,
            device,
            processes,
        })
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
