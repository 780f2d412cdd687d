//! Lightweight logging utilities emitting JSON lines on stderr.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::common::config;
use crate::common::error::HResult;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Level {
    Error = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

/// True when entries at `level` would be written.
pub fn enabled(level: Level) -> bool {
    level as u8 <= config::cfg().log_level
}

/// Emit one JSON line if `level` passes the configured filter.
pub fn log_json(level: Level, module: &str, event: &str, code: HResult, detail: Option<&str>) {
    if !enabled(level) {
        return;
    }
    eprintln!("{}", entry(level, module, event, code, detail));
}

fn entry(level: Level, module: &str, event: &str, code: HResult, detail: Option<&str>) -> Value {
    let mut line = json!({
        "ts": now_ms() as u64,
        "level": level.as_str(),
        "mod": module,
        "ev": event,
        "code": format!("0x{:08X}", code.bits()),
    });
    if let Some(detail) = detail {
        line["detail"] = Value::from(detail);
    }
    line
}

/// Current timestamp in milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
