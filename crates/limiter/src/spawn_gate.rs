use glam::DVec3;
use popguard_common::{EntityCategory, EntityDescriptor};
use popguard_config::ConfigSnapshot;

/// Outcome of a creation-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decide whether a new entity may exist.
///
/// `origin` is the configured spawn location of the entity's world. Denies
/// exactly the creatures within `spawn_radius` of it whose type is not
/// whitelisted. Pure and O(1); the caller turns `Deny` into a cancellation.
pub fn decide(entity: &EntityDescriptor, origin: DVec3, snapshot: &ConfigSnapshot) -> Decision {
    if entity.category() != EntityCategory::Creature || snapshot.is_whitelisted(entity.kind) {
        return Decision::Allow;
    }
    let radius = snapshot.spawn_radius;
    if radius >= 0.0 && entity.location.position.distance_squared(origin) <= radius * radius {
        Decision::Deny
    } else {
        Decision::Allow
    }
}
