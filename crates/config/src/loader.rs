//! YAML parsing and validation.
//!
//! Parsing is tolerant: a bad entry is dropped with a [`ConfigWarning`] and
//! the rest of the file still loads. Only an unreadable file or malformed
//! YAML fails the whole load.

use popguard_common::EntityKind;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::snapshot::{
    ConfigSnapshot, DYNAMIC_SCAN_RADIUS, NamePattern, PLACEHOLDER_NAME, ScanRadius,
};

const DEFAULT_SPAWN_RADIUS: i64 = 512;
const DEFAULT_SCAN_RADIUS: i64 = 64;
const DEFAULT_SCAN_INTERVAL: i64 = 5;
const MIN_SCAN_INTERVAL: i64 = 1;
/// One day.
const MAX_SCAN_INTERVAL: i64 = 86_400;

/// Errors that abort a load. The previously active snapshot stays in place.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write default config to {}: {source}", path.display())]
    WriteDefault {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A single entry that was skipped or adjusted during loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigWarning {
    #[error("{section}: unknown entity type '{name}', entry skipped")]
    UnknownEntityType { section: &'static str, name: String },
    #[error("entity_limits: limit for '{name}' must be a non-negative integer (got {value}), entry skipped")]
    InvalidLimit { name: String, value: String },
    #[error("display_name_blacklist: invalid pattern '{pattern}' ({reason}), pattern skipped")]
    InvalidPattern { pattern: String, reason: String },
    #[error("display_name_blacklist: pattern '{pattern}' matches the placeholder name, pattern skipped")]
    PatternMatchesPlaceholder { pattern: String },
    #[error("{section}: entry {value} is not a string, entry skipped")]
    NotAString { section: &'static str, value: String },
    #[error("{key}: expected an integer (got {value}), using default {default}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        default: i64,
    },
    #[error("scan_interval: {value}s is below the minimum, using {}s", MIN_SCAN_INTERVAL)]
    IntervalTooShort { value: i64 },
    #[error("scan_interval: {value}s is above the maximum, using {}s", MAX_SCAN_INTERVAL)]
    IntervalTooLong { value: i64 },
    #[error("scan_radius: {value} is negative, using dynamic radius")]
    NegativeScanRadius { value: i64 },
    #[error("{section}: expected {expected}, section ignored")]
    InvalidSection {
        section: &'static str,
        expected: &'static str,
    },
    #[error("{section}: '{name}' repeats an earlier entry for {kind}, entry skipped")]
    DuplicateEntry {
        section: &'static str,
        name: String,
        kind: EntityKind,
    },
}

/// Everything noteworthy that happened while building a snapshot.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub warnings: Vec<ConfigWarning>,
}

impl LoadReport {
    fn warn(&mut self, warning: ConfigWarning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// File shape. Every field stays untyped so one bad value or one wrongly
/// shaped section can be reported and replaced by its default instead of
/// failing the whole document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    spawn_radius: Option<Value>,
    scan_radius: Option<Value>,
    scan_interval: Option<Value>,
    entity_limits: Option<Value>,
    display_name_blacklist: Option<Value>,
    spawn_whitelist: Option<Value>,
}

/// Parse and validate a YAML document into a snapshot.
pub fn parse_config(yaml: &str) -> Result<(ConfigSnapshot, LoadReport), ConfigError> {
    // An empty or comment-only file is a null document: all defaults.
    let raw: RawConfig = if yaml.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str::<Option<RawConfig>>(yaml)?.unwrap_or_default()
    };
    let mut report = LoadReport::default();

    let spawn_radius = int_field(
        raw.spawn_radius.as_ref(),
        "spawn_radius",
        DEFAULT_SPAWN_RADIUS,
        &mut report,
    );

    let scan_radius = match int_field(
        raw.scan_radius.as_ref(),
        "scan_radius",
        DEFAULT_SCAN_RADIUS,
        &mut report,
    ) {
        DYNAMIC_SCAN_RADIUS => ScanRadius::Dynamic,
        r if r < 0 => {
            report.warn(ConfigWarning::NegativeScanRadius { value: r });
            ScanRadius::Dynamic
        }
        r => ScanRadius::Fixed(r as f64),
    };

    let mut interval = int_field(
        raw.scan_interval.as_ref(),
        "scan_interval",
        DEFAULT_SCAN_INTERVAL,
        &mut report,
    );
    if interval < MIN_SCAN_INTERVAL {
        report.warn(ConfigWarning::IntervalTooShort { value: interval });
        interval = MIN_SCAN_INTERVAL;
    } else if interval > MAX_SCAN_INTERVAL {
        report.warn(ConfigWarning::IntervalTooLong { value: interval });
        interval = MAX_SCAN_INTERVAL;
    }

    let limits = section_map(raw.entity_limits, "entity_limits", &mut report);
    let entity_limits = parse_limits(limits, &mut report);
    let patterns = section_list(raw.display_name_blacklist, "display_name_blacklist", &mut report);
    let blacklist = parse_blacklist(patterns, &mut report);
    let whitelist = section_list(raw.spawn_whitelist, "spawn_whitelist", &mut report);
    let spawn_whitelist = parse_whitelist(whitelist, &mut report);

    let snapshot = ConfigSnapshot {
        spawn_radius: spawn_radius as f64,
        scan_radius,
        scan_interval: Duration::from_secs(interval as u64),
        entity_limits,
        blacklist,
        spawn_whitelist,
    };
    Ok((snapshot, report))
}

/// Read and parse the file at `path`.
pub fn load_file(path: &Path) -> Result<(ConfigSnapshot, LoadReport), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

fn int_field(value: Option<&Value>, key: &'static str, default: i64, report: &mut LoadReport) -> i64 {
    match value {
        None | Some(Value::Null) => default,
        Some(v) => match v.as_i64() {
            Some(n) => n,
            None => {
                report.warn(ConfigWarning::InvalidNumber {
                    key,
                    value: render(v),
                    default,
                });
                default
            }
        },
    }
}

/// A mapping section, in document order. Absent or null is empty.
fn section_map(
    value: Option<Value>,
    section: &'static str,
    report: &mut LoadReport,
) -> Vec<(Value, Value)> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(map)) => map.into_iter().collect(),
        Some(_) => {
            report.warn(ConfigWarning::InvalidSection {
                section,
                expected: "a mapping of entity type to limit",
            });
            Vec::new()
        }
    }
}

/// A list section. Absent or null is empty.
fn section_list(value: Option<Value>, section: &'static str, report: &mut LoadReport) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items,
        Some(_) => {
            report.warn(ConfigWarning::InvalidSection {
                section,
                expected: "a list",
            });
            Vec::new()
        }
    }
}

fn parse_limits(raw: Vec<(Value, Value)>, report: &mut LoadReport) -> BTreeMap<EntityKind, usize> {
    let mut limits = BTreeMap::new();
    for (key, value) in raw {
        let Some(name) = scalar_string(&key) else {
            report.warn(ConfigWarning::NotAString {
                section: "entity_limits",
                value: render(&key),
            });
            continue;
        };
        let kind = match name.parse::<EntityKind>() {
            Ok(kind) => kind,
            Err(_) => {
                report.warn(ConfigWarning::UnknownEntityType {
                    section: "entity_limits",
                    name,
                });
                continue;
            }
        };
        if limits.contains_key(&kind) {
            report.warn(ConfigWarning::DuplicateEntry {
                section: "entity_limits",
                name,
                kind,
            });
            continue;
        }
        match value.as_u64().and_then(|n| usize::try_from(n).ok()) {
            Some(cap) => {
                limits.insert(kind, cap);
            }
            None => report.warn(ConfigWarning::InvalidLimit {
                name,
                value: render(&value),
            }),
        }
    }
    limits
}

fn parse_blacklist(raw: Vec<Value>, report: &mut LoadReport) -> Vec<NamePattern> {
    let placeholder = PLACEHOLDER_NAME.to_lowercase();
    let mut patterns = Vec::with_capacity(raw.len());
    for value in raw {
        let Some(source) = scalar_string(&value) else {
            report.warn(ConfigWarning::NotAString {
                section: "display_name_blacklist",
                value: render(&value),
            });
            continue;
        };
        match NamePattern::new(&source) {
            Ok(pattern) if pattern.full_match(&placeholder) => {
                report.warn(ConfigWarning::PatternMatchesPlaceholder { pattern: source });
            }
            Ok(pattern) => patterns.push(pattern),
            Err(e) => report.warn(ConfigWarning::InvalidPattern {
                pattern: source,
                reason: e.to_string(),
            }),
        }
    }
    patterns
}

fn parse_whitelist(raw: Vec<Value>, report: &mut LoadReport) -> BTreeSet<EntityKind> {
    let mut whitelist = BTreeSet::new();
    for value in raw {
        let Some(name) = scalar_string(&value) else {
            report.warn(ConfigWarning::NotAString {
                section: "spawn_whitelist",
                value: render(&value),
            });
            continue;
        };
        match name.parse::<EntityKind>() {
            Ok(kind) => {
                whitelist.insert(kind);
            }
            Err(_) => report.warn(ConfigWarning::UnknownEntityType {
                section: "spawn_whitelist",
                name,
            }),
        }
    }
    whitelist
}

/// Strings as-is; numbers and booleans by their text, since a YAML author
/// writing `- 1234` in a pattern list means the literal.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}
