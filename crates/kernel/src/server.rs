use glam::DVec3;
use popguard_common::{
    EntityDescriptor, EntityId, EntityKind, Host, Location, ObserverId, ObserverRoster,
    ObserverView, SpawnEvent, SpawnListener,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::grid::ChunkGrid;

/// An event record produced by every mutation to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Entity went live after its creation event was not cancelled.
    Spawned { id: EntityId, kind: EntityKind },
    /// A listener cancelled the creation event; the entity never went live.
    SpawnCancelled { id: EntityId, kind: EntityKind },
    /// Entity was removed. Carries its kind for bookkeeping.
    Removed { id: EntityId, kind: EntityKind },
    /// Custom name changed.
    Renamed {
        id: EntityId,
        old: Option<String>,
        new: String,
    },
    ObserverJoined { id: ObserverId },
    ObserverLeft { id: ObserverId },
    /// Simulation advanced one tick with the given seed.
    Stepped { tick: u64, seed: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown world: {0}")]
    UnknownWorld(String),
    #[error("unknown observer: {0}")]
    UnknownObserver(ObserverId),
}

/// Result of a spawn attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(EntityId),
    Cancelled,
}

impl SpawnOutcome {
    pub fn id(self) -> Option<EntityId> {
        match self {
            Self::Spawned(id) => Some(id),
            Self::Cancelled => None,
        }
    }
}

/// What to create.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub kind: EntityKind,
    pub location: Location,
    pub custom_name: Option<String>,
}

impl SpawnRequest {
    pub fn new(kind: EntityKind, location: Location) -> Self {
        Self {
            kind,
            location,
            custom_name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }
}

/// Per-entity data stored in the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityData {
    pub kind: EntityKind,
    pub location: Location,
    pub custom_name: Option<String>,
    pub name_visible: bool,
}

#[derive(Debug, Clone)]
struct ObserverData {
    location: Location,
    view_distance: u32,
}

/// Online-observer list published by a [`Server`]; readable from any thread.
#[derive(Debug, Clone)]
pub struct Roster {
    rx: watch::Receiver<Arc<[ObserverId]>>,
}

impl ObserverRoster for Roster {
    fn online(&self) -> Vec<ObserverId> {
        self.rx.borrow().to_vec()
    }
}

/// The authoritative in-memory host.
///
/// All mutations go through explicit operations and are recorded in the
/// event log. Entity ids are allocated in increasing order and stored in a
/// BTreeMap, so cube queries return entities oldest first.
pub struct Server {
    worlds: BTreeMap<String, DVec3>,
    entities: BTreeMap<EntityId, EntityData>,
    observers: BTreeMap<ObserverId, ObserverData>,
    grid: ChunkGrid,
    listeners: Vec<Box<dyn SpawnListener>>,
    roster: watch::Sender<Arc<[ObserverId]>>,
    next_id: u64,
    tick: u64,
    /// Seed for the deterministic generator. Advanced by every draw and step.
    seed: u64,
    /// Append-only event log of all mutations.
    event_log: Vec<ServerEvent>,
}

impl Default for Server {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Server {
    /// Create a server seeded with zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server with a specific seed for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        let (roster, _rx) = watch::channel(Arc::<[ObserverId]>::from(Vec::new()));
        Self {
            worlds: BTreeMap::new(),
            entities: BTreeMap::new(),
            observers: BTreeMap::new(),
            grid: ChunkGrid::new(),
            listeners: Vec::new(),
            roster,
            next_id: 1,
            tick: 0,
            seed,
            event_log: Vec::new(),
        }
    }

    /// Add (or move the spawn point of) a world.
    pub fn add_world(&mut self, name: impl Into<String>, spawn: DVec3) {
        self.worlds.insert(name.into(), spawn);
    }

    /// Configured spawn point of `world`, if the world exists.
    pub fn world_spawn(&self, world: &str) -> Option<DVec3> {
        self.worlds.get(world).copied()
    }

    /// Current simulation tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current generator state.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of connected observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Read-only access to all entities in id order.
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    /// Look up a live entity.
    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only view of the event log since the last drain.
    pub fn events(&self) -> &[ServerEvent] {
        &self.event_log
    }

    /// Subscribe a listener to creation events. Listeners run in
    /// registration order.
    pub fn register_listener(&mut self, listener: Box<dyn SpawnListener>) {
        self.listeners.push(listener);
    }

    /// A live view of the online observers, usable off the server's thread.
    pub fn roster(&self) -> Roster {
        Roster {
            rx: self.roster.subscribe(),
        }
    }

    /// Raise a creation event for a new entity. If any listener cancels it,
    /// the entity is rolled back and never becomes visible; renames made by
    /// listeners are dropped from the log along with it.
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<SpawnOutcome, ServerError> {
        let world_spawn = self
            .world_spawn(&request.location.world)
            .ok_or_else(|| ServerError::UnknownWorld(request.location.world.clone()))?;

        let id = EntityId(self.next_id);
        self.next_id += 1;
        let kind = request.kind;
        let data = EntityData {
            kind,
            location: request.location,
            custom_name: request.custom_name,
            name_visible: false,
        };
        let mut event = SpawnEvent::new(Self::describe(id, &data), world_spawn);
        self.attach(id, data);
        let mark = self.event_log.len();

        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener.on_entity_spawn(self, &mut event);
        }
        // Keep anything registered from inside a listener.
        listeners.append(&mut self.listeners);
        self.listeners = listeners;

        if event.is_cancelled() {
            self.detach(id);
            let during = self.event_log.split_off(mark);
            self.event_log.extend(during.into_iter().filter(
                |e| !matches!(e, ServerEvent::Renamed { id: renamed, .. } if *renamed == id),
            ));
            self.event_log.push(ServerEvent::SpawnCancelled { id, kind });
            tracing::trace!(%id, %kind, "spawn cancelled");
            Ok(SpawnOutcome::Cancelled)
        } else {
            self.event_log.push(ServerEvent::Spawned { id, kind });
            Ok(SpawnOutcome::Spawned(id))
        }
    }

    /// Move an entity, keeping the chunk index in sync.
    pub fn move_entity(&mut self, id: EntityId, to: Location) -> bool {
        let Some(data) = self.entities.get_mut(&id) else {
            return false;
        };
        self.grid.remove(&data.location.world, data.location.position, id);
        self.grid.insert(&to.world, to.position, id);
        data.location = to;
        true
    }

    /// Connect an observer at `location` with a view distance in chunks.
    pub fn join(&mut self, location: Location, view_distance: u32) -> ObserverId {
        let id = ObserverId::new();
        self.observers.insert(
            id,
            ObserverData {
                location,
                view_distance,
            },
        );
        self.event_log.push(ServerEvent::ObserverJoined { id });
        self.publish_roster();
        id
    }

    /// Disconnect an observer. Returns false if it was not online.
    pub fn leave(&mut self, id: ObserverId) -> bool {
        let left = self.observers.remove(&id).is_some();
        if left {
            self.event_log.push(ServerEvent::ObserverLeft { id });
            self.publish_roster();
        }
        left
    }

    /// Teleport an online observer.
    pub fn move_observer(&mut self, id: ObserverId, to: Location) -> Result<(), ServerError> {
        let data = self
            .observers
            .get_mut(&id)
            .ok_or(ServerError::UnknownObserver(id))?;
        data.location = to;
        Ok(())
    }

    /// Change an online observer's view distance, in chunks.
    pub fn set_view_distance(&mut self, id: ObserverId, chunks: u32) -> Result<(), ServerError> {
        let data = self
            .observers
            .get_mut(&id)
            .ok_or(ServerError::UnknownObserver(id))?;
        data.view_distance = chunks;
        Ok(())
    }

    /// Live entities of `kind` inside the cube around `center`.
    pub fn count_nearby(&self, center: &Location, half_extent: f64, kind: EntityKind) -> usize {
        self.nearby_entities(center, half_extent)
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.seed = splitmix64(self.seed);
        self.event_log.push(ServerEvent::Stepped {
            tick: self.tick,
            seed: self.seed,
        });
    }

    /// Next value of the deterministic generator.
    pub fn next_random(&mut self) -> u64 {
        self.seed = splitmix64(self.seed);
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        (self.next_random() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn attach(&mut self, id: EntityId, data: EntityData) {
        self.grid
            .insert(&data.location.world, data.location.position, id);
        self.entities.insert(id, data);
    }

    fn detach(&mut self, id: EntityId) -> Option<EntityData> {
        let data = self.entities.remove(&id)?;
        self.grid
            .remove(&data.location.world, data.location.position, id);
        Some(data)
    }

    fn publish_roster(&self) {
        let online: Arc<[ObserverId]> = self.observers.keys().copied().collect();
        self.roster.send_replace(online);
    }

    fn describe(id: EntityId, data: &EntityData) -> EntityDescriptor {
        EntityDescriptor {
            id,
            kind: data.kind,
            location: data.location.clone(),
            custom_name: data.custom_name.clone(),
            name_visible: data.name_visible,
        }
    }
}

impl Host for Server {
    fn observer(&self, id: ObserverId) -> Option<ObserverView> {
        self.observers.get(&id).map(|o| ObserverView {
            id,
            location: o.location.clone(),
            view_distance: o.view_distance,
        })
    }

    fn nearby_entities(&self, center: &Location, half_extent: f64) -> Vec<EntityDescriptor> {
        let mut ids = self
            .grid
            .candidates(&center.world, center.position, half_extent);
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.entities.get(&id).map(|data| (id, data)))
            .filter(|(_, data)| data.location.within_cube(center, half_extent))
            .map(|(id, data)| Self::describe(id, data))
            .collect()
    }

    fn entity(&self, id: EntityId) -> Option<EntityDescriptor> {
        self.entities.get(&id).map(|data| Self::describe(id, data))
    }

    fn set_custom_name(&mut self, id: EntityId, name: &str) -> bool {
        let Some(data) = self.entities.get_mut(&id) else {
            return false;
        };
        if data.custom_name.as_deref() != Some(name) {
            let old = data.custom_name.replace(name.to_string());
            self.event_log.push(ServerEvent::Renamed {
                id,
                old,
                new: name.to_string(),
            });
        }
        true
    }

    fn set_custom_name_visible(&mut self, id: EntityId, visible: bool) -> bool {
        match self.entities.get_mut(&id) {
            Some(data) => {
                data.name_visible = visible;
                true
            }
            None => false,
        }
    }

    fn remove_entity(&mut self, id: EntityId) -> bool {
        match self.detach(id) {
            Some(data) => {
                self.event_log.push(ServerEvent::Removed {
                    id,
                    kind: data.kind,
                });
                true
            }
            None => false,
        }
    }
}

/// Splitmix64: a fast, high-quality deterministic PRNG step function.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        let mut s = Server::new();
        s.add_world("world", DVec3::new(0.0, 64.0, 0.0));
        s
    }

    fn at(x: f64, z: f64) -> Location {
        Location::new("world", x, 64.0, z)
    }

    /// Cancels every creation event.
    struct CancelAll;

    impl SpawnListener for CancelAll {
        fn on_entity_spawn(&mut self, _host: &mut dyn Host, event: &mut SpawnEvent) {
            event.set_cancelled(true);
        }
    }

    /// Renames every new entity through the host.
    struct RenameAll;

    impl SpawnListener for RenameAll {
        fn on_entity_spawn(&mut self, host: &mut dyn Host, event: &mut SpawnEvent) {
            host.set_custom_name(event.entity().id, "renamed");
        }
    }

    #[test]
    fn server_starts_empty() {
        let s = Server::new();
        assert_eq!(s.tick(), 0);
        assert_eq!(s.entity_count(), 0);
        assert_eq!(s.observer_count(), 0);
    }

    #[test]
    fn spawn_and_remove() {
        let mut s = server();
        let id = s
            .spawn(SpawnRequest::new(EntityKind::Cow, at(1.0, 1.0)))
            .unwrap()
            .id()
            .unwrap();
        assert_eq!(s.entity_count(), 1);
        assert!(s.remove_entity(id));
        assert_eq!(s.entity_count(), 0);
        // Second removal is a benign miss.
        assert!(!s.remove_entity(id));
    }

    #[test]
    fn spawn_in_unknown_world_fails() {
        let mut s = server();
        let err = s
            .spawn(SpawnRequest::new(
                EntityKind::Cow,
                Location::new("nowhere", 0.0, 0.0, 0.0),
            ))
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownWorld(w) if w == "nowhere"));
    }

    #[test]
    fn cancelled_spawn_is_rolled_back() {
        let mut s = server();
        s.register_listener(Box::new(CancelAll));
        let outcome = s
            .spawn(SpawnRequest::new(EntityKind::Zombie, at(0.0, 0.0)))
            .unwrap();
        assert_eq!(outcome, SpawnOutcome::Cancelled);
        assert_eq!(s.entity_count(), 0);
        assert!(s.nearby_entities(&at(0.0, 0.0), 10.0).is_empty());
        assert!(matches!(s.events(), [ServerEvent::SpawnCancelled { .. }]));
    }

    #[test]
    fn cancelled_spawn_leaves_no_rename_in_the_log() {
        let mut s = server();
        s.register_listener(Box::new(RenameAll));
        s.register_listener(Box::new(CancelAll));
        let outcome = s
            .spawn(SpawnRequest::new(EntityKind::Pig, at(0.0, 0.0)).named("x"))
            .unwrap();
        assert_eq!(outcome, SpawnOutcome::Cancelled);
        assert!(matches!(s.events(), [ServerEvent::SpawnCancelled { .. }]));
    }

    #[test]
    fn huge_query_radius_returns_promptly() {
        let mut s = server();
        s.spawn(SpawnRequest::new(EntityKind::Zombie, at(0.0, 0.0)))
            .unwrap();
        let start = std::time::Instant::now();
        assert_eq!(s.nearby_entities(&at(0.0, 0.0), 100_000.0).len(), 1);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn listeners_can_mutate_the_new_entity() {
        let mut s = server();
        s.register_listener(Box::new(RenameAll));
        let id = s
            .spawn(SpawnRequest::new(EntityKind::Pig, at(0.0, 0.0)).named("x"))
            .unwrap()
            .id()
            .unwrap();
        assert_eq!(s.get(id).unwrap().custom_name.as_deref(), Some("renamed"));
    }

    #[test]
    fn nearby_returns_creation_order_within_cube() {
        let mut s = server();
        let mut ids = Vec::new();
        for i in 0..5 {
            let outcome = s
                .spawn(SpawnRequest::new(EntityKind::Zombie, at(i as f64 * 7.0, 0.0)))
                .unwrap();
            ids.extend(outcome.id());
        }
        s.spawn(SpawnRequest::new(EntityKind::Zombie, at(500.0, 0.0)))
            .unwrap();
        let found: Vec<EntityId> = s
            .nearby_entities(&at(0.0, 0.0), 30.0)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(found, ids);
    }

    #[test]
    fn nearby_respects_vertical_extent() {
        let mut s = server();
        s.spawn(SpawnRequest::new(
            EntityKind::Bat,
            Location::new("world", 0.0, 200.0, 0.0),
        ))
        .unwrap();
        assert!(s.nearby_entities(&at(0.0, 0.0), 64.0).is_empty());
        assert_eq!(s.nearby_entities(&at(0.0, 0.0), 136.0).len(), 1);
    }

    #[test]
    fn moved_entity_is_found_at_new_location() {
        let mut s = server();
        let id = s
            .spawn(SpawnRequest::new(EntityKind::Sheep, at(0.0, 0.0)))
            .unwrap()
            .id()
            .unwrap();
        assert!(s.move_entity(id, at(300.0, 300.0)));
        assert!(s.nearby_entities(&at(0.0, 0.0), 16.0).is_empty());
        assert_eq!(s.nearby_entities(&at(300.0, 300.0), 16.0).len(), 1);
    }

    #[test]
    fn rename_logs_only_changes() {
        let mut s = server();
        let id = s
            .spawn(SpawnRequest::new(EntityKind::Pig, at(0.0, 0.0)))
            .unwrap()
            .id()
            .unwrap();
        s.drain_events();
        assert!(s.set_custom_name(id, "Babe"));
        assert!(s.set_custom_name(id, "Babe"));
        assert_eq!(s.events().len(), 1);
    }

    #[test]
    fn roster_tracks_join_and_leave() {
        let mut s = server();
        let roster = s.roster();
        let a = s.join(at(0.0, 0.0), 8);
        let b = s.join(at(50.0, 0.0), 8);
        let mut online = roster.online();
        online.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(online, expected);

        assert!(s.leave(a));
        assert_eq!(roster.online(), vec![b]);
        assert!(s.observer(a).is_none());
        assert_eq!(s.observer(b).unwrap().view_distance, 8);
    }

    #[test]
    fn deterministic_generator_same_seed() {
        let mut s1 = Server::with_seed(42);
        let mut s2 = Server::with_seed(42);
        for _ in 0..100 {
            s1.step();
            s2.step();
        }
        assert_eq!(s1.tick(), s2.tick());
        assert_eq!(s1.next_random(), s2.next_random());
        let u = s1.next_unit();
        assert!((0.0..1.0).contains(&u));
    }
}
