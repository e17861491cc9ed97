//! Region geometry: bounding boxes, the rectangular generation region, and
//! direction-to-offset dispatch shared by ingest, AC-3 revision, and LCV.

use serde::{Deserialize, Serialize};

use crate::algorithm::connectivity::{ConnectivityMode, Direction};
use crate::spatial::hex::hex_neighbor;

/// Axis-aligned bounding box in world coordinates, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Minimum coordinates (inclusive).
    pub min: [i32; 2],
    /// Maximum coordinates (inclusive).
    pub max: [i32; 2],
}

impl BoundingBox {
    /// True if `pos` lies within `[min, max]` on both axes.
    #[must_use]
    pub const fn contains(&self, pos: [i32; 2]) -> bool {
        pos[0] >= self.min[0] && pos[0] <= self.max[0] && pos[1] >= self.min[1] && pos[1] <= self.max[1]
    }
}

/// A rectangular region of the world: an integer origin plus a size with
/// `w, h >= 1`. Local coordinates within a region are 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// World-space origin `(x0, y0)`.
    pub origin: [i32; 2],
    /// Size `(w, h)`, both at least 1.
    pub size: [usize; 2],
}

impl Region {
    /// Builds a region, clamping degenerate sizes up to 1x1.
    #[must_use]
    pub fn new(origin: [i32; 2], size: [usize; 2]) -> Self {
        Self {
            origin,
            size: [size[0].max(1), size[1].max(1)],
        }
    }

    /// Total number of cells in the region.
    #[must_use]
    pub const fn area(&self) -> usize {
        self.size[0] * self.size[1]
    }

    /// Converts a local (0-indexed) position to world coordinates.
    #[must_use]
    pub const fn to_world(&self, local: [i32; 2]) -> [i32; 2] {
        [self.origin[0] + local[0], self.origin[1] + local[1]]
    }

    /// Converts a world position to local coordinates, if it lies in-region.
    #[must_use]
    pub fn to_local(&self, world: [i32; 2]) -> Option<[i32; 2]> {
        let local = [world[0] - self.origin[0], world[1] - self.origin[1]];
        self.contains_local(local).then_some(local)
    }

    /// True if `local` lies within the region's bounds.
    #[must_use]
    pub fn contains_local(&self, local: [i32; 2]) -> bool {
        local[0] >= 0
            && local[1] >= 0
            && (local[0] as usize) < self.size[0]
            && (local[1] as usize) < self.size[1]
    }

    /// True if `local` lies on the edge matching `side` of this region.
    #[must_use]
    pub fn on_border(&self, local: [i32; 2], side: BorderSide) -> bool {
        match side {
            BorderSide::Left => local[0] == 0,
            BorderSide::Right => local[0] == self.size[0] as i32 - 1,
            BorderSide::Top => local[1] == self.size[1] as i32 - 1,
            BorderSide::Bottom => local[1] == 0,
        }
    }

    /// Iterates every local position in the region, row-major.
    pub fn iter_local(&self) -> impl Iterator<Item = [i32; 2]> + '_ {
        let (w, h) = (self.size[0], self.size[1]);
        (0..h).flat_map(move |y| (0..w).map(move |x| [x as i32, y as i32]))
    }
}

/// Which rectangular edge of a region a border rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderSide {
    /// The edge at local x == 0.
    Left,
    /// The edge at local x == size.w - 1.
    Right,
    /// The edge at local y == size.h - 1.
    Top,
    /// The edge at local y == 0.
    Bottom,
}

/// Returns the offset neighbor of `pos` (world coordinates) in direction `d`
/// under the given connectivity mode, or `None` if `d` is inactive for that
/// mode (non-hex modes have no row-parity dependence, so `start_y` is only
/// consulted for `ConnectivityMode::Hex`).
#[must_use]
pub fn neighbor_offset(
    pos: [i32; 2],
    mode: ConnectivityMode,
    start_y: i32,
    d: Direction,
) -> Option<[i32; 2]> {
    if !mode.directions().contains(&d) {
        return None;
    }
    match mode {
        ConnectivityMode::Hex => hex_neighbor(pos, start_y, d),
        ConnectivityMode::Four | ConnectivityMode::Eight => {
            let [x, y] = pos;
            Some(match d {
                Direction::Top => [x, y - 1],
                Direction::Bottom => [x, y + 1],
                Direction::Left => [x - 1, y],
                Direction::Right => [x + 1, y],
                Direction::TopLeft => [x - 1, y - 1],
                Direction::TopRight => [x + 1, y - 1],
                Direction::BottomLeft => [x - 1, y + 1],
                Direction::BottomRight => [x + 1, y + 1],
            })
        }
    }
}

/// Clamped `[row_start, row_end) x [col_start, col_end)` spans for iterating
/// the neighborhood of radius `radius` around `coordinates`, given an
/// `offset` mapping world coordinates to non-negative array indices.
#[must_use]
pub const fn clamped_span(
    offset: &[i32; 2],
    coordinates: &[i32; 2],
    radius: i32,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let index = [coordinates[0] + offset[0], coordinates[1] + offset[1]];

    let row_start = if index[0] - radius < 0 {
        0
    } else {
        (index[0] - radius) as usize
    };
    let col_start = if index[1] - radius < 0 {
        0
    } else {
        (index[1] - radius) as usize
    };
    let row_end = if index[0] + radius + 1 < 0 {
        0
    } else {
        (index[0] + radius + 1) as usize
    };
    let col_end = if index[1] + radius + 1 < 0 {
        0
    } else {
        (index[1] + radius + 1) as usize
    };

    (row_start..row_end, col_start..col_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_round_trips_local_and_world() {
        let region = Region::new([3, 4], [5, 5]);
        let world = region.to_world([1, 2]);
        assert_eq!(world, [4, 6]);
        assert_eq!(region.to_local(world), Some([1, 2]));
    }

    #[test]
    fn to_local_rejects_out_of_region_positions() {
        let region = Region::new([0, 0], [3, 3]);
        assert_eq!(region.to_local([5, 5]), None);
    }

    #[test]
    fn border_detection_matches_region_edges() {
        let region = Region::new([0, 0], [4, 4]);
        assert!(region.on_border([0, 2], BorderSide::Left));
        assert!(region.on_border([3, 2], BorderSide::Right));
        assert!(region.on_border([2, 3], BorderSide::Top));
        assert!(region.on_border([2, 0], BorderSide::Bottom));
        assert!(!region.on_border([1, 1], BorderSide::Left));
    }

    #[test]
    fn bounding_box_contains_is_inclusive() {
        let bbox = BoundingBox {
            min: [0, 0],
            max: [2, 2],
        };
        assert!(bbox.contains([2, 2]));
        assert!(!bbox.contains([3, 0]));
    }
}
