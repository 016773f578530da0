//! Shared types for the population guard: entity descriptors, locations, and
//! the capability interface a host simulation exposes to the engine.
//!
//! # Invariants
//! - The engine never owns entities; it only holds descriptors for the
//!   duration of one pass and mutates through [`Host`].
//! - A [`EntityCategory`] is always derived from the [`EntityKind`].

pub mod host;
pub mod types;

pub use host::{Host, ObserverRoster, SpawnEvent, SpawnListener};
pub use types::{
    EntityCategory, EntityDescriptor, EntityId, EntityKind, Location, ObserverId, ObserverView,
    UnknownEntityKind, CHUNK_SIZE,
};

pub fn crate_info() -> &'static str {
    "popguard-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
