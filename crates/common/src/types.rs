use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Edge length of a spatial chunk in world units.
pub const CHUNK_SIZE: f64 = 16.0;

/// Identifier for an entity, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier for a connected observer (a player session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8}", self.0.to_string())
    }
}

/// Coarse classification used by the spawn gate and the name sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Living, nameable mobs.
    Creature,
    /// Dropped item stacks.
    Item,
    /// Projectiles, vehicles, decorations and everything else.
    Other,
}

/// Type tag carried by every entity. Used for capping and whitelisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Zombie,
    Husk,
    Drowned,
    Skeleton,
    Creeper,
    Spider,
    CaveSpider,
    Enderman,
    Witch,
    Slime,
    Blaze,
    Ghast,
    Phantom,
    Cow,
    Pig,
    Sheep,
    Chicken,
    Horse,
    Wolf,
    Cat,
    Rabbit,
    Bee,
    Bat,
    Squid,
    Villager,
    IronGolem,
    Item,
    ExperienceOrb,
    Arrow,
    ArmorStand,
    Boat,
    Minecart,
    PrimedTnt,
    FallingBlock,
    ItemFrame,
    Painting,
}

impl EntityKind {
    /// Every known kind, in declaration order.
    pub const ALL: [EntityKind; 36] = [
        Self::Zombie,
        Self::Husk,
        Self::Drowned,
        Self::Skeleton,
        Self::Creeper,
        Self::Spider,
        Self::CaveSpider,
        Self::Enderman,
        Self::Witch,
        Self::Slime,
        Self::Blaze,
        Self::Ghast,
        Self::Phantom,
        Self::Cow,
        Self::Pig,
        Self::Sheep,
        Self::Chicken,
        Self::Horse,
        Self::Wolf,
        Self::Cat,
        Self::Rabbit,
        Self::Bee,
        Self::Bat,
        Self::Squid,
        Self::Villager,
        Self::IronGolem,
        Self::Item,
        Self::ExperienceOrb,
        Self::Arrow,
        Self::ArmorStand,
        Self::Boat,
        Self::Minecart,
        Self::PrimedTnt,
        Self::FallingBlock,
        Self::ItemFrame,
        Self::Painting,
    ];

    /// Canonical upper-case tag, as written in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zombie => "ZOMBIE",
            Self::Husk => "HUSK",
            Self::Drowned => "DROWNED",
            Self::Skeleton => "SKELETON",
            Self::Creeper => "CREEPER",
            Self::Spider => "SPIDER",
            Self::CaveSpider => "CAVE_SPIDER",
            Self::Enderman => "ENDERMAN",
            Self::Witch => "WITCH",
            Self::Slime => "SLIME",
            Self::Blaze => "BLAZE",
            Self::Ghast => "GHAST",
            Self::Phantom => "PHANTOM",
            Self::Cow => "COW",
            Self::Pig => "PIG",
            Self::Sheep => "SHEEP",
            Self::Chicken => "CHICKEN",
            Self::Horse => "HORSE",
            Self::Wolf => "WOLF",
            Self::Cat => "CAT",
            Self::Rabbit => "RABBIT",
            Self::Bee => "BEE",
            Self::Bat => "BAT",
            Self::Squid => "SQUID",
            Self::Villager => "VILLAGER",
            Self::IronGolem => "IRON_GOLEM",
            Self::Item => "ITEM",
            Self::ExperienceOrb => "EXPERIENCE_ORB",
            Self::Arrow => "ARROW",
            Self::ArmorStand => "ARMOR_STAND",
            Self::Boat => "BOAT",
            Self::Minecart => "MINECART",
            Self::PrimedTnt => "PRIMED_TNT",
            Self::FallingBlock => "FALLING_BLOCK",
            Self::ItemFrame => "ITEM_FRAME",
            Self::Painting => "PAINTING",
        }
    }

    pub fn category(self) -> EntityCategory {
        match self {
            Self::Item => EntityCategory::Item,
            Self::ExperienceOrb
            | Self::Arrow
            | Self::ArmorStand
            | Self::Boat
            | Self::Minecart
            | Self::PrimedTnt
            | Self::FallingBlock
            | Self::ItemFrame
            | Self::Painting => EntityCategory::Other,
            _ => EntityCategory::Creature,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a configuration entry names a type tag the engine does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    /// Case-insensitive; `cave_spider`, `Cave_Spider` and `CAVE_SPIDER` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}

/// A point in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: DVec3,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            position: DVec3::new(x, y, z),
        }
    }

    /// True when `self` lies in the axis-aligned cube of the given half-extent
    /// around `center`. Each axis is tested independently; different worlds
    /// never match.
    pub fn within_cube(&self, center: &Location, half_extent: f64) -> bool {
        if self.world != center.world {
            return false;
        }
        let d = (self.position - center.position).abs();
        d.x <= half_extent && d.y <= half_extent && d.z <= half_extent
    }
}

/// Read-only view of a host entity at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: EntityId,
    pub kind: EntityKind,
    pub location: Location,
    pub custom_name: Option<String>,
    pub name_visible: bool,
}

impl EntityDescriptor {
    pub fn category(&self) -> EntityCategory {
        self.kind.category()
    }
}

/// Where an observer currently is and how far it can see.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverView {
    pub id: ObserverId,
    pub location: Location,
    /// Client view distance in chunks.
    pub view_distance: u32,
}
