use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings for the watch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub interval: Duration,
    pub sort: SortKey,
    pub limit: usize,
}

/// Column the process table is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    Ram,
    Gtt,
    Vram,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Ram => "RAM",
            SortKey::Gtt => "GTT",
            SortKey::Vram => "VRAM",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ram" => Ok(SortKey::Ram),
            "gtt" => Ok(SortKey::Gtt),
            "vram" => Ok(SortKey::Vram),
            _ => Err(anyhow::anyhow!(
                "Invalid sort key: {}. Valid options: ram, gtt, vram",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_sort_keys() {
        assert_eq!("ram".parse::<SortKey>().unwrap(), SortKey::Ram);
        assert_eq!("GTT".parse::<SortKey>().unwrap(), SortKey::Gtt);
        assert_eq!("Vram".parse::<SortKey>().unwrap(), SortKey::Vram);
    }

    #[test]
    fn rejects_unknown_sort_keys() {
        assert!("cpu".parse::<SortKey>().is_err());
        assert!("".parse::<SortKey>().is_err());
    }

    #[test]
    fn labels_match_display_columns() {
        assert_eq!(SortKey::Ram.label(), "RAM");
        assert_eq!(SortKey::Gtt.label(), "GTT");
        assert_eq!(SortKey::Vram.label(), "VRAM");
    }
}
