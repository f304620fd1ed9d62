use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::error::SampleError;

/// Memory counters for one amdgpu device, in bytes.
///
/// The kernel does not guarantee `used <= total`; values are passed
/// through as read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMemoryStats {
    pub vram_total: u64,
    pub vram_used: u64,
    pub gtt_total: u64,
    pub gtt_used: u64,
}

/// Reads amdgpu memory counters from sysfs.
pub struct DeviceStatsReader {
    drm_root: PathBuf,
}

impl DeviceStatsReader {
    pub fn new() -> Self {
        Self {
            drm_root: PathBuf::from("/sys/class/drm"),
        }
    }

    #[cfg(test)]
    fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: root.into(),
        }
    }

    /// One read attempt per counter file, no retries; a failed read
    /// degrades that counter to zero rather than failing the device.
    pub fn read(&self) -> Result<DeviceMemoryStats, SampleError> {
        let device_dir = self.find_device()?;

        Ok(DeviceMemoryStats {
            vram_used: read_counter(&device_dir.join("mem_info_vram_used")),
            vram_total: read_counter(&device_dir.join("mem_info_vram_total")),
            gtt_used: read_counter(&device_dir.join("mem_info_gtt_used")),
            gtt_total: read_counter(&device_dir.join("mem_info_gtt_total")),
        })
    }

    /// First `card*` entry whose device exposes the vram-used counter.
    fn find_device(&self) -> Result<PathBuf, SampleError> {
        let entries = fs::read_dir(&self.drm_root).map_err(|_| SampleError::NoDevice)?;

        let mut cards: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("card"))
            .map(|entry| entry.path().join("device"))
            .filter(|device| device.join("mem_info_vram_used").exists())
            .collect();
        cards.sort();

        cards.into_iter().next().ok_or(SampleError::NoDevice)
    }
}

impl Default for DeviceStatsReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Single point where a counter read failure becomes a zero.
fn read_counter(path: &Path) -> u64 {
    match parse_counter(path) {
        Ok(value) => value,
        Err(err) => {
            trace!(path = %path.display(), error = %err, "counter unreadable, defaulting to 0");
            0
        }
    }
}

fn parse_counter(path: &Path) -> Result<u64> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    contents
        .trim()
        .parse()
        .with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_card(root: &Path, name: &str) -> PathBuf {
        let device = root.join(name).join("device");
        fs::create_dir_all(&device).unwrap();
        device
    }

    fn write_counter(device: &Path, name: &str, contents: &str) {
        fs::write(device.join(name), contents).unwrap();
    }

    #[test]
    fn reads_all_four_counters_exactly() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "card0");
        write_counter(&device, "mem_info_vram_used", "104857600\n");
        write_counter(&device, "mem_info_vram_total", "536870912\n");
        write_counter(&device, "mem_info_gtt_used", "524288000\n");
        write_counter(&device, "mem_info_gtt_total", "2147483648\n");

        let stats = DeviceStatsReader::with_root(root.path()).read().unwrap();
        assert_eq!(
            stats,
            DeviceMemoryStats {
                vram_total: 536870912,
                vram_used: 104857600,
                gtt_total: 2147483648,
                gtt_used: 524288000,
            }
        );
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "card0");
        write_counter(&device, "mem_info_vram_used", "  42  \n\n");

        let stats = DeviceStatsReader::with_root(root.path()).read().unwrap();
        assert_eq!(stats.vram_used, 42);
    }

    #[test]
    fn missing_counter_degrades_to_zero() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "card0");
        write_counter(&device, "mem_info_vram_used", "1024");

        let stats = DeviceStatsReader::with_root(root.path()).read().unwrap();
        assert_eq!(stats.vram_used, 1024);
        assert_eq!(stats.vram_total, 0);
        assert_eq!(stats.gtt_used, 0);
        assert_eq!(stats.gtt_total, 0);
    }

    #[test]
    fn malformed_counter_degrades_to_zero() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "card0");
        write_counter(&device, "mem_info_vram_used", "1024");
        write_counter(&device, "mem_info_gtt_used", "not-a-number");

        let stats = DeviceStatsReader::with_root(root.path()).read().unwrap();
        assert_eq!(stats.gtt_used, 0);
        assert_eq!(stats.vram_used, 1024);
    }

    #[test]
    fn empty_drm_root_is_no_device() {
        let root = TempDir::new().unwrap();
        let err = DeviceStatsReader::with_root(root.path()).read().unwrap_err();
        assert!(matches!(err, SampleError::NoDevice));
    }

    #[test]
    fn missing_drm_root_is_no_device() {
        let root = TempDir::new().unwrap();
        let reader = DeviceStatsReader::with_root(root.path().join("gone"));
        assert!(matches!(reader.read().unwrap_err(), SampleError::NoDevice));
    }

    #[test]
    fn card_without_memory_counters_is_not_a_device() {
        let root = TempDir::new().unwrap();
        fake_card(root.path(), "card0");
        let err = DeviceStatsReader::with_root(root.path()).read().unwrap_err();
        assert!(matches!(err, SampleError::NoDevice));
    }

    #[test]
    fn non_card_entries_are_ignored() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "renderD128");
        write_counter(&device, "mem_info_vram_used", "9999");

        let err = DeviceStatsReader::with_root(root.path()).read().unwrap_err();
        assert!(matches!(err, SampleError::NoDevice));
    }

    #[test]
    fn picks_first_card_in_sorted_order() {
        let root = TempDir::new().unwrap();
        let card1 = fake_card(root.path(), "card1");
        write_counter(&card1, "mem_info_vram_used", "2");
        let card0 = fake_card(root.path(), "card0");
        write_counter(&card0, "mem_info_vram_used", "1");

        let stats = DeviceStatsReader::with_root(root.path()).read().unwrap();
        assert_eq!(stats.vram_used, 1);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let root = TempDir::new().unwrap();
        let device = fake_card(root.path(), "card0");
        write_counter(&device, "mem_info_vram_used", "100");
        write_counter(&device, "mem_info_vram_total", "200");

        let reader = DeviceStatsReader::with_root(root.path());
        assert_eq!(reader.read().unwrap(), reader.read().unwrap());
    }
}
