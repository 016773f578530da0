use glam::DVec3;
use popguard_common::{CHUNK_SIZE, EntityId};
use std::collections::{HashMap, HashSet};

/// A 2D chunk coordinate (Y is not partitioned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(pos: DVec3) -> Self {
        Self {
            x: (pos.x / CHUNK_SIZE).floor() as i32,
            z: (pos.z / CHUNK_SIZE).floor() as i32,
        }
    }
}

/// Per-world chunk index, kept up to date on every insert, move and removal.
///
/// Queries return candidates from whole chunks; callers apply the exact
/// bounds test.
#[derive(Debug, Default)]
pub struct ChunkGrid {
    worlds: HashMap<String, HashMap<ChunkCoord, HashSet<EntityId>>>,
}

impl ChunkGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, world: &str, pos: DVec3, id: EntityId) {
        self.worlds
            .entry(world.to_string())
            .or_default()
            .entry(ChunkCoord::containing(pos))
            .or_default()
            .insert(id);
    }

    pub fn remove(&mut self, world: &str, pos: DVec3, id: EntityId) {
        let Some(chunks) = self.worlds.get_mut(world) else {
            return;
        };
        let coord = ChunkCoord::containing(pos);
        if let Some(cell) = chunks.get_mut(&coord) {
            cell.remove(&id);
            if cell.is_empty() {
                chunks.remove(&coord);
            }
        }
    }

    /// Ids in every chunk overlapping the XZ square of `half_extent` around
    /// `center`. Unordered.
    ///
    /// Cost is bounded by the smaller of the square's chunk count and the
    /// world's populated chunk count.
    pub fn candidates(&self, world: &str, center: DVec3, half_extent: f64) -> Vec<EntityId> {
        let Some(chunks) = self.worlds.get(world) else {
            return Vec::new();
        };
        let min = ChunkCoord::containing(center - DVec3::splat(half_extent));
        let max = ChunkCoord::containing(center + DVec3::splat(half_extent));
        if min.x > max.x || min.z > max.z {
            return Vec::new();
        }

        // Coordinates saturate at the i32 range, so widen before multiplying.
        let width = u64::from(max.x.abs_diff(min.x)) + 1;
        let depth = u64::from(max.z.abs_diff(min.z)) + 1;
        let span = width.saturating_mul(depth);

        let mut out = Vec::new();
        if span > chunks.len() as u64 {
            for (coord, cell) in chunks {
                if (min.x..=max.x).contains(&coord.x) && (min.z..=max.z).contains(&coord.z) {
                    out.extend(cell.iter().copied());
                }
            }
        } else {
            for x in min.x..=max.x {
                for z in min.z..=max.z {
                    if let Some(cell) = chunks.get(&ChunkCoord::new(x, z)) {
                        out.extend(cell.iter().copied());
                    }
                }
            }
        }
        out
    }

    /// Number of non-empty chunks across all worlds.
    pub fn chunk_count(&self) -> usize {
        self.worlds.values().map(|c| c.len()).sum()
    }

    pub fn entities_in_chunk(&self, world: &str, coord: ChunkCoord) -> usize {
        self.worlds
            .get(world)
            .and_then(|c| c.get(&coord))
            .map_or(0, |cell| cell.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_of_position() {
        assert_eq!(ChunkCoord::containing(DVec3::new(10.0, 70.0, 10.0)), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::containing(DVec3::new(20.0, 0.0, -5.0)), ChunkCoord::new(1, -1));
    }

    #[test]
    fn insert_and_remove() {
        let mut grid = ChunkGrid::new();
        grid.insert("world", DVec3::ZERO, EntityId(1));
        grid.insert("world", DVec3::new(1.0, 0.0, 1.0), EntityId(2));
        grid.insert("world", DVec3::new(40.0, 0.0, 0.0), EntityId(3));
        assert_eq!(grid.chunk_count(), 2);
        assert_eq!(grid.entities_in_chunk("world", ChunkCoord::new(0, 0)), 2);

        grid.remove("world", DVec3::new(40.0, 0.0, 0.0), EntityId(3));
        assert_eq!(grid.chunk_count(), 1);
    }

    #[test]
    fn candidates_cover_overlapping_chunks() {
        let mut grid = ChunkGrid::new();
        grid.insert("world", DVec3::ZERO, EntityId(1));
        grid.insert("world", DVec3::new(20.0, 0.0, 0.0), EntityId(2));
        grid.insert("world", DVec3::new(200.0, 0.0, 0.0), EntityId(3));
        grid.insert("nether", DVec3::ZERO, EntityId(4));

        let mut near = grid.candidates("world", DVec3::ZERO, 17.0);
        near.sort();
        assert_eq!(near, vec![EntityId(1), EntityId(2)]);
        assert!(grid.candidates("end", DVec3::ZERO, 100.0).is_empty());
    }

    #[test]
    fn huge_half_extent_walks_populated_chunks_only() {
        let mut grid = ChunkGrid::new();
        grid.insert("world", DVec3::ZERO, EntityId(1));
        grid.insert("world", DVec3::new(90_000.0, 0.0, -90_000.0), EntityId(2));
        grid.insert("world", DVec3::new(500_000.0, 0.0, 0.0), EntityId(3));

        let start = std::time::Instant::now();
        let mut hits = grid.candidates("world", DVec3::ZERO, 100_000.0);
        let mut all = grid.candidates("world", DVec3::ZERO, f64::MAX);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        hits.sort();
        all.sort();
        assert_eq!(hits, vec![EntityId(1), EntityId(2)]);
        assert_eq!(all, vec![EntityId(1), EntityId(2), EntityId(3)]);
    }

    #[test]
    fn negative_half_extent_finds_nothing() {
        let mut grid = ChunkGrid::new();
        grid.insert("world", DVec3::new(1.0, 0.0, 1.0), EntityId(1));
        assert!(grid.candidates("world", DVec3::new(8.0, 0.0, 8.0), -50.0).is_empty());
    }
}
