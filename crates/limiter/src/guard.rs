use popguard_common::{Host, SpawnEvent, SpawnListener};
use popguard_config::ConfigReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sanitizer::{self, Sanitized};
use crate::spawn_gate::{self, Decision};

/// Running totals for spawn-time checks. Shared with whoever reports them.
#[derive(Debug, Default)]
pub struct SpawnStats {
    allowed: AtomicU64,
    denied: AtomicU64,
    renamed: AtomicU64,
}

impl SpawnStats {
    pub fn allowed(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    /// Names rewritten at creation time, including on spawns that were then
    /// denied.
    pub fn renamed(&self) -> u64 {
        self.renamed.load(Ordering::Relaxed)
    }
}

/// Creation-event listener: runs the spawn gate and the name sanitizer
/// inline, then cancels the event on `Deny`.
pub struct SpawnGuard {
    config: ConfigReader,
    stats: Arc<SpawnStats>,
}

impl SpawnGuard {
    pub fn new(config: ConfigReader) -> Self {
        Self {
            config,
            stats: Arc::new(SpawnStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SpawnStats> {
        Arc::clone(&self.stats)
    }
}

impl SpawnListener for SpawnGuard {
    fn on_entity_spawn(&mut self, host: &mut dyn Host, event: &mut SpawnEvent) {
        let snapshot = self.config.current();
        let decision = spawn_gate::decide(event.entity(), event.world_spawn(), &snapshot);

        // Names are checked even when the spawn is about to be cancelled.
        if let Sanitized::Renamed(_) = sanitizer::sanitize(host, event.entity(), &snapshot) {
            self.stats.renamed.fetch_add(1, Ordering::Relaxed);
        }

        match decision {
            Decision::Allow => {
                self.stats.allowed.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Deny => {
                self.stats.denied.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    id = %event.entity().id,
                    kind = %event.entity().kind,
                    "spawn denied near world spawn"
                );
                event.set_cancelled(true);
            }
        }
    }
}
