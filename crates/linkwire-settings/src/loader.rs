//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LinkwireSettings::default()`]
//! 2. If `~/.linkwire/settings.json` exists, deep-merge it over the defaults
//! 3. Apply `LINKWIRE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use linkwire_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::LinkwireSettings;

/// Data directory (`~/.linkwire`).
pub fn linkwire_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".linkwire")
}

/// Path to the settings file (`~/.linkwire/settings.json`).
pub fn settings_path() -> PathBuf {
    linkwire_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LinkwireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LinkwireSettings> {
    let defaults = serde_json::to_value(LinkwireSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LinkwireSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LINKWIRE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut LinkwireSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Out-of-range or unparseable values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut LinkwireSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("LINKWIRE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("LINKWIRE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("LINKWIRE_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("LINKWIRE_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("LINKWIRE_HEARTBEAT_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("LINKWIRE_DB_PATH") {
        settings.store.db_path = v;
    }

    // ── Service ─────────────────────────────────────────────────────
    if let Some(v) = env.u64("LINKWIRE_PUSH_TIMEOUT_MS", 10, 60_000) {
        settings.service.push_timeout_ms = v;
    }
    if let Some(v) = env.u64("LINKWIRE_MAX_ATTEMPTS", 1, 100) {
        // range-checked above
        settings.service.max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LINKWIRE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = env.string("LINKWIRE_LOG_FORMAT") {
        match LogFormat::parse(&raw) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "LINKWIRE_LOG_FORMAT", value = %raw, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
