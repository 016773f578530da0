//! Configuration: YAML loading, tolerant validation, and atomic publication
//! of immutable snapshots.
//!
//! # Invariants
//! - A [`ConfigSnapshot`] never changes after construction.
//! - One bad entry never aborts a load; it is skipped with a warning.
//! - No blacklist pattern in a snapshot matches [`PLACEHOLDER_NAME`].

mod handle;
mod loader;
mod snapshot;

pub use handle::{ConfigHandle, ConfigReader};
pub use loader::{ConfigError, ConfigWarning, LoadReport, load_file, parse_config};
pub use snapshot::{
    ConfigSnapshot, DYNAMIC_SCAN_RADIUS, NamePattern, PLACEHOLDER_NAME, ScanRadius,
    SnapshotSummary,
};

/// The config written on first start.
pub const DEFAULT_CONFIG: &str = include_str!("../config.yml");

pub fn crate_info() -> &'static str {
    "popguard-config v0.1.0"
}
