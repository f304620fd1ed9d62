use procfs::process::{Process, Stat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::trace;

use super::error::SampleError;

/// Noise floor: processes holding no GPU memory and at most this much
/// resident memory are not reported.
const MIN_RSS_BYTES: u64 = 1024 * 1024;

/// Per-process memory attribution for one sampling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemoryRecord {
    pub pid: i32,
    /// Full command line, falling back to the short process name.
    pub name: String,
    /// Bytes held in dedicated GPU memory via DRM handles.
    pub vram: u64,
    /// Bytes held in GPU-shared host memory via DRM handles.
    pub gtt: u64,
    /// Resident memory net of GPU-shared pages: `rss - gtt`, clamped at
    /// zero. An estimate; GTT and RSS are sampled at different instants.
    pub ram: u64,
}

/// Walks the process table attributing DRM memory per process.
pub struct ProcessScanner;

impl ProcessScanner {
    pub fn new() -> Self {
        Self
    }

    /// Processes that cannot be inspected (permission denied under
    /// non-elevated execution, exited mid-scan) are skipped silently;
    /// only a failure to enumerate the table itself is an error.
    pub fn scan(&self) -> Result<Vec<ProcessMemoryRecord>, SampleError> {
        let procs = procfs::process::all_processes()?;
        let page_size = procfs::page_size();

        Ok(procs
            .filter_map(Result::ok)
            .filter_map(|proc| attribute(&proc, page_size))
            .filter(Attributed::retained)
            .map(Attributed::into_record)
            .collect())
    }
}

impl Default for ProcessScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory summed over one process's DRM handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HandleUsage {
    vram: u64,
    gtt: u64,
    /// Whether any handle identified itself as amdgpu. Tracked for
    /// diagnostics only; inclusion is decided by the memory predicate.
    amdgpu: bool,
}

impl HandleUsage {
    fn merge(&mut self, other: HandleUsage) {
        self.vram += other.vram;
        self.gtt += other.gtt;
        self.amdgpu |= other.amdgpu;
    }
}

/// A process after handle attribution, before the retention filter.
#[derive(Debug)]
struct Attributed {
    pid: i32,
    name: String,
    usage: HandleUsage,
    rss: u64,
}

impl Attributed {
    fn retained(&self) -> bool {
        self.usage.vram > 0 || self.usage.gtt > 0 || self.rss > MIN_RSS_BYTES
    }

    fn into_record(self) -> ProcessMemoryRecord {
        let ram = reconcile_ram(self.rss, self.usage.gtt);
        ProcessMemoryRecord {
            pid: self.pid,
            name: self.name,
            vram: self.usage.vram,
            gtt: self.usage.gtt,
            ram,
        }
    }
}

/// Collects handle usage, resident set, and display name for one process.
/// Returns None when the fdinfo directory cannot be listed; such a process
/// is invisible to attribution, never an error.
fn attribute(proc: &Process, page_size: u64) -> Option<Attributed> {
    let pid = proc.pid;
    let usage = sum_handles(Path::new(&format!("/proc/{pid}/fdinfo")))?;

    // RSS degrades to zero on failure; the record may still qualify
    // through its GPU counters.
    let stat = proc.stat().ok();
    let rss = stat
        .as_ref()
        .map(|s| s.rss as u64 * page_size)
        .unwrap_or(0);

    let name = display_name(proc, stat.as_ref());
    trace!(pid, vram = usage.vram, gtt = usage.gtt, amdgpu = usage.amdgpu, "attributed");

    Some(Attributed {
        pid,
        name,
        usage,
        rss,
    })
}

/// Sums the recognized DRM counters over every fdinfo entry in the
/// directory. None means the directory itself could not be listed.
fn sum_handles(fdinfo_dir: &Path) -> Option<HandleUsage> {
    let entries = fs::read_dir(fdinfo_dir).ok()?;

    let mut usage = HandleUsage::default();
    for entry in entries.flatten() {
        let Ok(text) = fs::read_to_string(entry.path()) else {
            // Handle closed between listing and read.
            continue;
        };
        usage.merge(parse_fdinfo(&text));
    }
    Some(usage)
}

/// Accumulates the recognized line prefixes from one fdinfo blob.
/// Unrecognized or malformed lines are ignored.
fn parse_fdinfo(text: &str) -> HandleUsage {
    let mut usage = HandleUsage::default();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("drm-driver:") {
            if value.trim() == "amdgpu" {
                usage.amdgpu = true;
            }
        } else if let Some(rest) = line.strip_prefix("drm-memory-vram:") {
            usage.vram += parse_memory_value(rest);
        } else if let Some(rest) = line.strip_prefix("drm-memory-gtt:") {
            usage.gtt += parse_memory_value(rest);
        }
    }
    usage
}

/// Parses `<number> [unit]`. Values are KiB-denominated unless the unit
/// token says otherwise; a missing or unrecognized unit means KiB.
/// Malformed numbers count as zero.
fn parse_memory_value(rest: &str) -> u64 {
    let mut fields = rest.split_whitespace();
    let Some(number) = fields.next().and_then(|n| n.parse::<u64>().ok()) else {
        return 0;
    };
    let multiplier = match fields.next() {
        Some("MiB") => 1024 * 1024,
        Some("GiB") => 1024 * 1024 * 1024,
        _ => 1024,
    };
    number * multiplier
}

/// GTT pages are already counted in RSS by the kernel; subtracting them
/// keeps GPU-shared memory from showing up twice in RAM-focused views.
fn reconcile_ram(rss: u64, gtt: u64) -> u64 {
    rss.saturating_sub(gtt)
}

/// Full command line, falling back to the short process name. An empty
/// name is acceptable and never aborts the scan.
fn display_name(proc: &Process, stat: Option<&Stat>) -> String {
    let cmdline = proc
        .cmdline()
        .map(|args| args.join(" "))
        .unwrap_or_default();
    if !cmdline.is_empty() {
        return cmdline;
    }
    stat.map(|s| s.comm.clone()).unwrap_or_default()
}
