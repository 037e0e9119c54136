use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::engine::slots::parse_opening_hours;
use crate::limits::{MAX_SLOT_MINUTES, MIN_SLOT_MINUTES};
use crate::model::{TimeOfDay, TimeRange};

pub const DEFAULT_SLOT_MINUTES: u16 = 60;

/// Process-level configuration, read from `AMENITY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub slot_minutes: u16,
    /// Window used when a facility's opening hours cannot be parsed.
    pub default_window: TimeRange,
    /// Log appends since last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    /// JSON facility catalog to seed the in-memory catalog from.
    pub catalog_path: Option<PathBuf>,
}

/// The subset of configuration a single engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub slot_minutes: u16,
    pub default_window: TimeRange,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            slot_minutes: DEFAULT_SLOT_MINUTES,
            default_window: default_window(),
        }
    }
}

const DEFAULT_OPEN: TimeOfDay = TimeOfDay::hm(7, 0);
const DEFAULT_CLOSE: TimeOfDay = TimeOfDay::hm(21, 0);

fn default_window() -> TimeRange {
    TimeRange::new(DEFAULT_OPEN, DEFAULT_CLOSE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            slot_minutes: DEFAULT_SLOT_MINUTES,
            default_window: default_window(),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let slot_minutes = match lookup("AMENITY_SLOT_MINUTES").and_then(|s| s.parse::<u16>().ok()) {
            Some(m) if (MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&m) => m,
            Some(m) => {
                warn!("AMENITY_SLOT_MINUTES={m} out of range, using {DEFAULT_SLOT_MINUTES}");
                DEFAULT_SLOT_MINUTES
            }
            None => DEFAULT_SLOT_MINUTES,
        };

        let default_window = lookup("AMENITY_DEFAULT_HOURS")
            .and_then(|s| parse_opening_hours(&s))
            .unwrap_or(defaults.default_window);

        Self {
            data_dir: lookup("AMENITY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            slot_minutes,
            default_window,
            compact_threshold: lookup("AMENITY_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("AMENITY_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: lookup("AMENITY_METRICS_PORT").and_then(|s| s.parse().ok()),
            catalog_path: lookup("AMENITY_CATALOG_PATH").map(PathBuf::from),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            slot_minutes: self.slot_minutes,
            default_window: self.default_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg.slot_minutes, 60);
        assert_eq!(cfg.default_window.to_string(), "07:00 - 21:00");
        assert_eq!(cfg.compact_threshold, 1000);
        assert!(cfg.metrics_port.is_none());
        assert!(cfg.catalog_path.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("AMENITY_DATA_DIR", "/var/lib/amenity"),
            ("AMENITY_SLOT_MINUTES", "30"),
            ("AMENITY_DEFAULT_HOURS", "08:00 - 20:00"),
            ("AMENITY_COMPACT_THRESHOLD", "50"),
            ("AMENITY_COMPACT_INTERVAL_SECS", "5"),
            ("AMENITY_METRICS_PORT", "9100"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/amenity"));
        assert_eq!(cfg.engine_settings().slot_minutes, 30);
        assert_eq!(cfg.default_window.to_string(), "08:00 - 20:00");
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.compact_interval, Duration::from_secs(5));
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("AMENITY_SLOT_MINUTES", "1"),
            ("AMENITY_DEFAULT_HOURS", "all day"),
            ("AMENITY_COMPACT_THRESHOLD", "lots"),
            ("AMENITY_COMPACT_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(cfg.slot_minutes, DEFAULT_SLOT_MINUTES);
        assert_eq!(cfg.default_window.to_string(), "07:00 - 21:00");
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.compact_interval, Duration::from_secs(30));
    }
}
