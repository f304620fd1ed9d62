use crate::config::SortKey;
use crate::sampler::{ProcessMemoryRecord, Snapshot};

const NAME_WIDTH: usize = 40;

/// Orders a snapshot's processes by the given key, descending.
///
/// The engine leaves `Snapshot::processes` unsorted; ordering comes from
/// explicit configuration on every call. Keys other than RAM and VRAM
/// fall through to the GTT ordering.
pub fn rank(snapshot: &Snapshot, sort: SortKey) -> Vec<ProcessMemoryRecord> {
    let mut rows = snapshot.processes.clone();
    rows.sort_by(|a, b| match sort {
        SortKey::Ram => b.ram.cmp(&a.ram),
        SortKey::Vram => b.vram.cmp(&a.vram),
        _ => b.gtt.cmp(&a.gtt),
    });
    rows
}

/// Binary-unit byte formatting: "0 B", "1.5 KiB", "1.0 GiB", ...
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}iB", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

/// Truncates long command lines, keeping both ends visible.
pub fn format_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        return name.to_string();
    }
    if max_len <= 3 {
        return chars[..max_len].iter().collect();
    }
    let side = (max_len - 3) / 2;
    let head: String = chars[..side].iter().collect();
    let tail: String = chars[chars.len() - side..].iter().collect();
    format!("{head}...{tail}")
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Renders the full terminal report for one snapshot.
pub fn render_report(
    snapshot: &Snapshot,
    sort: SortKey,
    limit: usize,
    is_privileged: bool,
) -> String {
    let mut s = String::from("Memory Monitor\n\n");

    let physical_total = snapshot.physical_total();
    let system_used = snapshot.system_used();
    let gtt_used = snapshot.device.gtt_used;

    s += "Physical Memory Breakdown\n";
    s += &format!(
        "Total Physical RAM: {}\n",
        format_bytes(physical_total)
    );
    s += &format!(
        "  ├─ OS Visible:     {} ({:.1}%)\n",
        format_bytes(snapshot.host_ram_total),
        percent(snapshot.host_ram_total, physical_total)
    );
    s += &format!(
        "  │   ├─ System:     {} ({:.1}%)\n",
        format_bytes(system_used),
        percent(system_used, snapshot.host_ram_total)
    );
    s += &format!(
        "  │   └─ GPU GTT:    {} ({:.1}%)\n",
        format_bytes(gtt_used),
        percent(gtt_used, snapshot.host_ram_total)
    );
    s += &format!(
        "  └─ Hardware Res:   {} (Fixed VRAM)\n",
        format_bytes(snapshot.device.vram_total)
    );

    s += "\nAMD GPU Memory Status\n";
    s += &format!(
        "VRAM (Dedicated): {} / {}\n",
        format_bytes(snapshot.device.vram_used),
        format_bytes(snapshot.device.vram_total)
    );
    s += &format!(
        "GTT  (Shared):    {} / {}\n",
        format_bytes(snapshot.device.gtt_used),
        format_bytes(snapshot.device.gtt_total)
    );

    if !is_privileged {
        s += "\n[!] Run with sudo for the full process breakdown.\n";
    }

    let rows = rank(snapshot, sort);
    if !rows.is_empty() {
        s += &format!("\nTop Processes (Sorted by {})\n", sort.label());

        let mark = |key: SortKey| -> String {
            if key == sort {
                format!("[{}]", key.label())
            } else {
                key.label().to_string()
            }
        };
        s += &format!(
            "{:<6} {:<NAME_WIDTH$} {:<12} {:<12} {:<12}\n",
            "PID",
            "COMMAND",
            mark(SortKey::Vram),
            mark(SortKey::Gtt),
            mark(SortKey::Ram),
        );

        for row in rows.iter().take(limit) {
            s += &format!(
                "{:<6} {:<NAME_WIDTH$} {:<12} {:<12} {:<12}\n",
                row.pid,
                format_name(&row.name, NAME_WIDTH),
                format_bytes(row.vram),
                format_bytes(row.gtt),
                format_bytes(row.ram),
            );
        }
    }

    s += "\nSort keys: ram, gtt, vram (--sort)\n";
    s
}
