use popguard_common::{CHUNK_SIZE, EntityDescriptor, EntityId, Host, ObserverId};
use popguard_config::{ConfigSnapshot, ScanRadius};
use std::collections::HashSet;

use crate::sanitizer::{self, Sanitized};

/// One observer's slice of one cycle. Lives exactly as long as the pass.
#[derive(Debug, Clone)]
pub struct ScanUnit {
    pub observer: ObserverId,
    pub radius: f64,
    pub nearby: Vec<EntityDescriptor>,
}

/// Counters for a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Observer had disconnected before the pass ran.
    pub offline: bool,
    pub scanned: usize,
    pub evicted: usize,
    /// Entities that were gone by the time a removal or rename landed.
    pub vanished: usize,
    pub renamed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: &Sanitized) {
        match outcome {
            Sanitized::Renamed(_) => self.renamed += 1,
            Sanitized::Vanished => self.vanished += 1,
            Sanitized::Skipped | Sanitized::Untouched => {}
        }
    }
}

/// Half-extent of the scanned cube for an observer.
pub fn effective_radius(scan_radius: ScanRadius, view_distance: u32) -> f64 {
    match scan_radius {
        ScanRadius::Fixed(r) => r,
        ScanRadius::Dynamic => f64::from(view_distance) * CHUNK_SIZE,
    }
}

/// Run one reconciliation pass for `observer`.
///
/// Evicts the tail of every over-cap type in query order, then sanitizes the
/// names of everything that survived. Must run on the host's mutation context.
pub fn reconcile<H: Host + ?Sized>(
    host: &mut H,
    observer: ObserverId,
    snapshot: &ConfigSnapshot,
) -> ScanReport {
    let _span = tracing::info_span!("reconcile", %observer).entered();

    let Some(view) = host.observer(observer) else {
        tracing::debug!("observer went offline before its pass ran");
        return ScanReport {
            offline: true,
            ..ScanReport::default()
        };
    };
    let radius = effective_radius(snapshot.scan_radius, view.view_distance);
    let unit = ScanUnit {
        observer,
        radius,
        nearby: host.nearby_entities(&view.location, radius),
    };

    let mut report = ScanReport {
        scanned: unit.nearby.len(),
        ..ScanReport::default()
    };
    let mut visited: HashSet<EntityId> = HashSet::new();

    for (&kind, &cap) in &snapshot.entity_limits {
        let matching: Vec<&EntityDescriptor> =
            unit.nearby.iter().filter(|e| e.kind == kind).collect();

        if matching.len() > cap {
            for entity in &matching[cap..] {
                visited.insert(entity.id);
                if host.remove_entity(entity.id) {
                    report.evicted += 1;
                    tracing::debug!(id = %entity.id, %kind, "evicted");
                } else {
                    report.vanished += 1;
                    tracing::debug!(id = %entity.id, %kind, "already gone");
                }
            }
            tracing::debug!(%kind, found = matching.len(), cap, "cap enforced");
        }

        for entity in matching.iter().take(cap) {
            visited.insert(entity.id);
            report.record(&sanitizer::sanitize(host, entity, snapshot));
        }
    }

    // Uncapped types are still subject to name policy.
    for entity in unit.nearby.iter().filter(|e| !visited.contains(&e.id)) {
        report.record(&sanitizer::sanitize(host, entity, snapshot));
    }

    tracing::trace!(
        radius = unit.radius,
        scanned = report.scanned,
        evicted = report.evicted,
        vanished = report.vanished,
        renamed = report.renamed,
        "reconcile complete"
    );
    report
}
