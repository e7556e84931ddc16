//! Uniform-grid spatial hash for the collision broad phase.
//!
//! Rebuilt every collision pass, one grid per team of living units. Query
//! results come back in spawn order so the narrow phase visits candidates
//! deterministically.

use std::collections::HashMap;

use crate::entity::EntityId;
use crate::math::{Fixed, Vec2Fixed};

/// Spatial hash keyed by grid cell.
#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: Fixed,
    cells: HashMap<(i32, i32), Vec<(u64, EntityId)>>,
    largest_radius: Fixed,
}

impl SpatialHash {
    /// Create an empty hash. Non-positive cell sizes fall back to one unit.
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        Self {
            cell_size: if cell_size > Fixed::ZERO {
                cell_size
            } else {
                Fixed::ONE
            },
            cells: HashMap::new(),
            largest_radius: Fixed::ZERO,
        }
    }

    /// Insert an entity with its spawn sequence and bounding radius.
    pub fn insert(&mut self, entity: EntityId, spawn_seq: u64, position: Vec2Fixed, radius: Fixed) {
        let coords = self.cell_coords(position);
        self.cells.entry(coords).or_default().push((spawn_seq, entity));
        self.largest_radius = self.largest_radius.max(radius);
    }

    /// Entities whose cell lies within `radius` (plus the largest inserted
    /// bounding radius) of `position`, in spawn order, without duplicates.
    /// Callers still run the exact test.
    #[must_use]
    pub fn query_neighbors(&self, position: Vec2Fixed, radius: Fixed) -> Vec<EntityId> {
        let reach = radius.saturating_add(self.largest_radius);
        let min = self.cell_coords(Vec2Fixed::new(position.x - reach, position.y - reach));
        let max = self.cell_coords(Vec2Fixed::new(position.x + reach, position.y + reach));
        let mut found: Vec<(u64, EntityId)> = Vec::new();
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                if let Some(bucket) = self.cells.get(&(x, y)) {
                    found.extend(bucket);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found.into_iter().map(|(_, id)| id).collect()
    }

    fn cell_coords(&self, position: Vec2Fixed) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor().to_num::<i32>(),
            (position.y / self.cell_size).floor().to_num::<i32>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    #[test]
    fn test_query_excludes_distant_entities() {
        let mut hash = SpatialHash::new(Fixed::from_num(50));
        let near = EntityId::new(1, 0);
        let far = EntityId::new(2, 0);
        hash.insert(near, 0, at(10, 10), Fixed::ONE);
        hash.insert(far, 1, at(500, 500), Fixed::ONE);

        let neighbors = hash.query_neighbors(at(10, 10), Fixed::from_num(30));
        assert!(neighbors.contains(&near));
        assert!(!neighbors.contains(&far));
    }

    #[test]
    fn test_boundary_entities_found() {
        let mut hash = SpatialHash::new(Fixed::from_num(50));
        let entity = EntityId::new(1, 0);
        hash.insert(entity, 0, at(50, 0), Fixed::ZERO);
        assert_eq!(hash.query_neighbors(at(49, 0), Fixed::from_num(5)), vec![entity]);
    }

    #[test]
    fn test_results_in_spawn_order() {
        let mut hash = SpatialHash::new(Fixed::from_num(10));
        let late = EntityId::new(0, 3);
        let early = EntityId::new(5, 0);
        hash.insert(late, 9, at(25, 0), Fixed::ONE);
        hash.insert(early, 2, at(-25, 0), Fixed::ONE);
        assert_eq!(hash.query_neighbors(at(0, 0), Fixed::from_num(40)), vec![early, late]);
    }

    #[test]
    fn test_large_bounding_radius_widens_query() {
        let mut hash = SpatialHash::new(Fixed::from_num(10));
        let giant = EntityId::new(1, 0);
        hash.insert(giant, 0, at(100, 0), Fixed::from_num(60));
        // The query point is 55 away: outside the query radius, inside the giant.
        assert_eq!(hash.query_neighbors(at(45, 0), Fixed::from_num(2)), vec![giant]);
    }
}
