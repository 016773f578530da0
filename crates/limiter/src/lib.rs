//! Population reconciliation engine.
//!
//! - [`spawn_gate`]: allow/deny at creation time near a world's spawn.
//! - [`sanitizer`]: placeholder names for non-ASCII or blacklisted names.
//! - [`scanner`]: per-observer pass that evicts over-cap types and sanitizes
//!   everything nearby.
//! - [`dispatch`]: periodic trigger feeding the host's mutation queue.
//!
//! # Invariants
//! - Entity state is only touched on the mutation context: inside a queued
//!   job or inside a creation event.
//! - Every pass and every spawn check captures one config snapshot and uses
//!   it throughout.

pub mod command;
pub mod dispatch;
mod guard;
pub mod sanitizer;
pub mod scanner;
pub mod spawn_gate;

pub use command::{CommandReply, CommandSender};
pub use dispatch::{DispatchError, Dispatcher, Job, MutationHandle, MutationQueue, mutation_queue};
pub use guard::{SpawnGuard, SpawnStats};
pub use sanitizer::{Sanitized, Violation};
pub use scanner::{ScanReport, ScanUnit, effective_radius, reconcile};
pub use spawn_gate::{Decision, decide};

pub fn crate_info() -> &'static str {
    "popguard-limiter v0.1.0"
}
