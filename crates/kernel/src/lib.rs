//! In-memory host: worlds, entities, observers, and creation events.
//!
//! Stands in for the external simulation engine in tests and in the CLI
//! simulation. Implements [`popguard_common::Host`] exactly as a real engine
//! adapter would.
//!
//! # Invariants
//! - All state mutations flow through explicit operations and are logged.
//! - Cube queries return entities in ascending id (creation) order.
//! - A cancelled spawn leaves no trace besides its log entry.

mod grid;
pub mod server;

pub use grid::{ChunkCoord, ChunkGrid};
pub use server::{
    EntityData, Roster, Server, ServerError, ServerEvent, SpawnOutcome, SpawnRequest,
};

pub fn crate_info() -> &'static str {
    "popguard-kernel v0.1.0"
}
