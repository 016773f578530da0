use popguard_common::EntityKind;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Name applied to any entity whose custom name violates policy.
///
/// Must stay pure ASCII; the loader drops blacklist patterns that match its
/// lowercased form so that renaming is idempotent.
pub const PLACEHOLDER_NAME: &str = "Unnamed";

/// Sentinel value of `scan_radius` that selects the dynamic radius.
pub const DYNAMIC_SCAN_RADIUS: i64 = -1;

/// How far around each observer the scanner looks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanRadius {
    /// Fixed half-extent in world units.
    Fixed(f64),
    /// Follow each observer's view distance.
    Dynamic,
}

/// A blacklist entry: the pattern as written plus its anchored compilation.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `source` so that it only matches whole strings.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the entire input matches, not merely a substring.
    pub fn full_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

/// Immutable bundle of every policy value a pass or a spawn check needs.
///
/// A reload builds a new snapshot and swaps it in whole; nothing mutates a
/// snapshot after construction.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub spawn_radius: f64,
    pub scan_radius: ScanRadius,
    pub scan_interval: Duration,
    pub entity_limits: BTreeMap<EntityKind, usize>,
    pub blacklist: Vec<NamePattern>,
    pub spawn_whitelist: BTreeSet<EntityKind>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            spawn_radius: 512.0,
            scan_radius: ScanRadius::Fixed(64.0),
            scan_interval: Duration::from_secs(5),
            entity_limits: BTreeMap::new(),
            blacklist: Vec::new(),
            spawn_whitelist: BTreeSet::new(),
        }
    }
}

impl ConfigSnapshot {
    /// Cap for `kind`, `None` when the type is uncapped.
    pub fn limit_for(&self, kind: EntityKind) -> Option<usize> {
        self.entity_limits.get(&kind).copied()
    }

    pub fn is_whitelisted(&self, kind: EntityKind) -> bool {
        self.spawn_whitelist.contains(&kind)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            spawn_radius: self.spawn_radius,
            scan_radius: self.scan_radius,
            scan_interval_secs: self.scan_interval.as_secs(),
            entity_limits: self
                .entity_limits
                .iter()
                .map(|(kind, cap)| (kind.as_str().to_string(), *cap))
                .collect(),
            display_name_blacklist: self
                .blacklist
                .iter()
                .map(|p| p.source().to_string())
                .collect(),
            spawn_whitelist: self
                .spawn_whitelist
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
        }
    }
}

/// Serializable view of a snapshot for display.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub spawn_radius: f64,
    pub scan_radius: ScanRadius,
    pub scan_interval_secs: u64,
    pub entity_limits: BTreeMap<String, usize>,
    pub display_name_blacklist: Vec<String>,
    pub spawn_whitelist: Vec<String>,
}

impl std::fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scan = match self.scan_radius {
            ScanRadius::Fixed(r) => format!("{r}"),
            ScanRadius::Dynamic => "dynamic".to_string(),
        };
        writeln!(
            f,
            "spawn_radius={} scan_radius={} scan_interval={}s",
            self.spawn_radius, scan, self.scan_interval_secs
        )?;
        writeln!(f, "entity_limits: {}", self.entity_limits.len())?;
        for (kind, cap) in &self.entity_limits {
            writeln!(f, "  {kind}: {cap}")?;
        }
        writeln!(f, "display_name_blacklist: {}", self.display_name_blacklist.len())?;
        for pattern in &self.display_name_blacklist {
            writeln!(f, "  {pattern}")?;
        }
        write!(f, "spawn_whitelist: [{}]", self.spawn_whitelist.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_ascii() {
        assert!(PLACEHOLDER_NAME.is_ascii());
    }

    #[test]
    fn pattern_requires_full_match() {
        let p = NamePattern::new("admin").unwrap();
        assert!(p.full_match("admin"));
        assert!(!p.full_match("xadminx"));
        assert!(!p.full_match("admin2"));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        // Without the group, `^a|b$` would match any string starting with "a".
        let p = NamePattern::new("a|b").unwrap();
        assert!(p.full_match("a"));
        assert!(p.full_match("b"));
        assert!(!p.full_match("abc"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = ConfigSnapshot::default();
        assert_eq!(s.spawn_radius, 512.0);
        assert_eq!(s.scan_radius, ScanRadius::Fixed(64.0));
        assert_eq!(s.scan_interval, Duration::from_secs(5));
        assert!(s.entity_limits.is_empty());
        assert_eq!(s.limit_for(EntityKind::Zombie), None);
    }
}
