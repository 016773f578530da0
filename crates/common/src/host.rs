use glam::DVec3;

use crate::types::{EntityDescriptor, EntityId, Location, ObserverId, ObserverView};

/// Capabilities the engine needs from the simulation that owns the entities.
///
/// Every method must be called on the host's serialized mutation context.
/// Mutators return `false` when the entity no longer exists, which callers
/// treat as a benign race rather than an error.
pub trait Host {
    /// Current view of an online observer, `None` once it has disconnected.
    fn observer(&self, id: ObserverId) -> Option<ObserverView>;

    /// Entities inside the axis-aligned cube of `half_extent` around `center`.
    /// Order is host-defined and is the order eviction follows.
    fn nearby_entities(&self, center: &Location, half_extent: f64) -> Vec<EntityDescriptor>;

    fn entity(&self, id: EntityId) -> Option<EntityDescriptor>;

    fn set_custom_name(&mut self, id: EntityId, name: &str) -> bool;

    fn set_custom_name_visible(&mut self, id: EntityId, visible: bool) -> bool;

    /// Request removal. `false` if the entity had already vanished.
    fn remove_entity(&mut self, id: EntityId) -> bool;
}

/// Online-observer listing that may be read from any thread, including the
/// periodic trigger, without touching entity state.
pub trait ObserverRoster: Send + Sync {
    fn online(&self) -> Vec<ObserverId>;
}

/// A cancelable creation event raised by the host before an entity goes live.
#[derive(Debug, Clone)]
pub struct SpawnEvent {
    entity: EntityDescriptor,
    world_spawn: DVec3,
    cancelled: bool,
}

impl SpawnEvent {
    pub fn new(entity: EntityDescriptor, world_spawn: DVec3) -> Self {
        Self {
            entity,
            world_spawn,
            cancelled: false,
        }
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    /// Configured spawn location of the world the entity is created in.
    pub fn world_spawn(&self) -> DVec3 {
        self.world_spawn
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Receives creation events synchronously on the context that raised them.
/// Implementations must not block.
pub trait SpawnListener: Send {
    fn on_entity_spawn(&mut self, host: &mut dyn Host, event: &mut SpawnEvent);
}
