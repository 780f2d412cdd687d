//! Runtime configuration loaded from the process environment.
//!
//! The snapshot is taken once, the first time any part of the crate asks for
//! it; later changes to the environment are not observed.

use std::env;

use once_cell::sync::Lazy;

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    /// 0 = off, 1 = errors, 2 = info, 3 = debug.
    pub log_level: u8,
    /// Allow objects that opt in to hand out a free-threaded marshaller.
    pub free_threaded: bool,
    /// Buffer size in bytes for file-backed write streams.
    pub write_buffer: usize,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            log_level: 1,
            free_threaded: true,
            write_buffer: 8 * 1024,
        }
    }
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let log_level = lookup("COMLIGHT_LOG_LEVEL")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.log_level);
        let free_threaded = lookup("COMLIGHT_FREE_THREADED")
            .map(|v| !matches!(v.trim(), "0" | "false" | "off" | "no"))
            .unwrap_or(defaults.free_threaded);
        let write_buffer = lookup("COMLIGHT_WRITE_BUFFER")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.write_buffer);

        Self {
            log_level,
            free_threaded,
            write_buffer,
        }
    }
}

static CFG: Lazy<AppCfg> = Lazy::new(AppCfg::load);

/// Process-wide configuration snapshot.
pub fn cfg() -> &'static AppCfg {
    &CFG
}
