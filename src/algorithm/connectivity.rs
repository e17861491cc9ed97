//! Dense adjacency and border-observation tables learned from example maps.
//!
//! For each ordered pair of tile indices and each direction supported by the
//! connectivity mode, records whether that pair was ever observed as
//! neighbors anywhere in the training examples. Also records, per enabled
//! border side, which tile indices were ever observed on that side. Queried
//! during AC-3 revision and by the LCV value-ordering heuristic.

use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::spatial::grid::BorderSide;

/// One of the eight compass directions a neighbor can lie in. Which subset
/// is active depends on [`ConnectivityMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// World `(x, y-1)` under the non-hex convention.
    Top,
    /// World `(x, y+1)` under the non-hex convention.
    Bottom,
    /// World `(x-1, y)`.
    Left,
    /// World `(x+1, y)`.
    Right,
    /// Upper-left diagonal (non-hex) or parity-dependent hex upper-left.
    TopLeft,
    /// Upper-right diagonal (non-hex) or parity-dependent hex upper-right.
    TopRight,
    /// Lower-left diagonal (non-hex) or parity-dependent hex lower-left.
    BottomLeft,
    /// Lower-right diagonal (non-hex) or parity-dependent hex lower-right.
    BottomRight,
}

impl Direction {
    /// The direction that undoes this one: `d` applied then `d.opposite()`
    /// returns to the start. Used to keep the table symmetric: observing
    /// `a` in direction `d` of `b` also records `b` in direction `d.opposite()`
    /// of `a`.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::TopLeft => Self::BottomRight,
            Self::TopRight => Self::BottomLeft,
            Self::BottomLeft => Self::TopRight,
            Self::BottomRight => Self::TopLeft,
        }
    }
}

const FOUR: [Direction; 4] = [
    Direction::Top,
    Direction::Bottom,
    Direction::Left,
    Direction::Right,
];
const EIGHT: [Direction; 8] = [
    Direction::Top,
    Direction::Bottom,
    Direction::Left,
    Direction::Right,
    Direction::TopLeft,
    Direction::TopRight,
    Direction::BottomLeft,
    Direction::BottomRight,
];
const HEX: [Direction; 6] = [
    Direction::Left,
    Direction::Right,
    Direction::TopLeft,
    Direction::TopRight,
    Direction::BottomLeft,
    Direction::BottomRight,
];

/// The adjacency topology a generator was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityMode {
    /// {Top, Bottom, Left, Right}.
    Four,
    /// [`Self::Four`] plus the four ordinal diagonals.
    Eight,
    /// {Left, Right, TopLeft, TopRight, BottomLeft, BottomRight} with
    /// row-parity-dependent diagonal meaning; see [`crate::spatial::hex`].
    Hex,
}

impl ConnectivityMode {
    /// The directions active under this mode, in a fixed iteration order.
    #[must_use]
    pub const fn directions(self) -> &'static [Direction] {
        match self {
            Self::Four => &FOUR,
            Self::Eight => &EIGHT,
            Self::Hex => &HEX,
        }
    }
}

/// One training example's tile grid, used only during [`ConnectivityTable::ingest`].
pub struct ExampleGrid {
    /// Tile index at each local cell, row-major by `(y, x)`; `None` is an
    /// empty/missing cell.
    pub cells: Array2<Option<usize>>,
}

impl ExampleGrid {
    fn get(&self, x: i32, y: i32) -> Option<Option<usize>> {
        if x < 0 || y < 0 {
            return None;
        }
        self.cells.get([y as usize, x as usize]).copied()
    }

    /// Width (x extent) of the grid.
    #[must_use]
    pub fn width(&self) -> usize {
        self.cells.ncols()
    }

    /// Height (y extent) of the grid.
    #[must_use]
    pub fn height(&self) -> usize {
        self.cells.nrows()
    }
}

/// Dense `U x U` adjacency tables per direction, plus per-border observed-tile
/// tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityTable {
    mode: ConnectivityMode,
    unique_count: usize,
    start_y: i32,
    direction_tables: HashMap<Direction, Array2<bool>>,
    border_tables: HashMap<BorderSide, Vec<bool>>,
}

impl ConnectivityTable {
    /// Builds an all-`false` table for `unique_count` tiles under `mode`,
    /// with the given border sides tracked. `start_y` is the hex row-parity
    /// reference row (ignored outside [`ConnectivityMode::Hex`]).
    #[must_use]
    pub fn new(
        mode: ConnectivityMode,
        unique_count: usize,
        start_y: i32,
        enabled_borders: &[BorderSide],
    ) -> Self {
        let direction_tables = mode
            .directions()
            .iter()
            .map(|&d| (d, Array2::from_elem((unique_count, unique_count), false)))
            .collect();
        let border_tables = enabled_borders
            .iter()
            .map(|&side| (side, vec![false; unique_count]))
            .collect();
        Self {
            mode,
            unique_count,
            start_y,
            direction_tables,
            border_tables,
        }
    }

    /// The connectivity mode this table was built with.
    #[must_use]
    pub const fn mode(&self) -> ConnectivityMode {
        self.mode
    }

    /// The hex row-parity reference row.
    #[must_use]
    pub const fn start_y(&self) -> i32 {
        self.start_y
    }

    /// Number of distinct tile indices this table covers.
    #[must_use]
    pub const fn unique_count(&self) -> usize {
        self.unique_count
    }

    /// True iff tile `a` was ever observed with tile `b` as its neighbor in
    /// direction `d`. `false` for a direction inactive under this table's mode.
    #[must_use]
    pub fn get(&self, d: Direction, a: usize, b: usize) -> bool {
        self.direction_tables
            .get(&d)
            .and_then(|table| table.get([a, b]))
            .copied()
            .unwrap_or(false)
    }

    fn set(&mut self, d: Direction, a: usize, b: usize, value: bool) {
        if let Some(table) = self.direction_tables.get_mut(&d) {
            if let Some(cell) = table.get_mut([a, b]) {
                *cell = value;
            }
        }
    }

    /// True iff tile `a` was ever observed on border `side`. `false` if
    /// `side` was not enabled for this table.
    #[must_use]
    pub fn get_border(&self, side: BorderSide, a: usize) -> bool {
        self.border_tables
            .get(&side)
            .and_then(|table| table.get(a))
            .copied()
            .unwrap_or(false)
    }

    fn set_border(&mut self, side: BorderSide, a: usize, value: bool) {
        if let Some(table) = self.border_tables.get_mut(&side) {
            if let Some(cell) = table.get_mut(a) {
                *cell = value;
            }
        }
    }

    /// Records that `a` was observed with `b` as neighbor in direction `d`;
    /// also records the symmetric fact (`b` with `a` in `d.opposite()`), so
    /// the table is symmetric by construction.
    pub fn observe(&mut self, d: Direction, a: usize, b: usize) {
        self.set(d, a, b, true);
        self.set(d.opposite(), b, a, true);
    }

    /// Records that `a` was observed on border `side`. A no-op if `side`
    /// was not enabled for this table.
    pub fn observe_border(&mut self, side: BorderSide, a: usize) {
        self.set_border(side, a, true);
    }

    /// Populates direction and border tables by scanning every example grid.
    ///
    /// Per §4.2: missing/out-of-bounds neighbors are treated as the
    /// `empty_index` sentinel when `interpret_empty_as_tile` is set,
    /// otherwise that `(direction, neighbor)` pair is simply skipped (left
    /// at its default `false`, never asserted false).
    pub fn ingest(
        &mut self,
        examples: &[ExampleGrid],
        interpret_empty_as_tile: bool,
        empty_index: usize,
    ) {
        for example in examples {
            self.ingest_one(example, interpret_empty_as_tile, empty_index);
        }
    }

    fn ingest_one(&mut self, example: &ExampleGrid, interpret_empty_as_tile: bool, empty_index: usize) {
        use crate::spatial::grid::{Region, neighbor_offset};

        let region = Region::new([0, 0], [example.width(), example.height()]);
        for local in region.iter_local() {
            let Some(center) = example.get(local[0], local[1]).flatten().or_else(|| {
                interpret_empty_as_tile.then_some(empty_index)
            }) else {
                continue;
            };

            for &side in &[
                BorderSide::Left,
                BorderSide::Right,
                BorderSide::Top,
                BorderSide::Bottom,
            ] {
                if region.on_border(local, side) {
                    self.observe_border(side, center);
                }
            }

            for &d in self.mode.directions() {
                let Some(npos) = neighbor_offset(local, self.mode, self.start_y, d) else {
                    continue;
                };
                let neighbor_value = example.get(npos[0], npos[1]);
                let neighbor = match neighbor_value {
                    Some(Some(idx)) => Some(idx),
                    Some(None) | None => interpret_empty_as_tile.then_some(empty_index),
                };
                if let Some(b) = neighbor {
                    self.observe(d, center, b);
                }
            }
        }
    }

    /// Least-constraining-value cost of assigning `value`: the number of
    /// candidates across the given `(direction, neighbor_domain)` pairs that
    /// `value` would rule out (i.e. that have no supporter under `get`).
    /// Smaller is better.
    #[must_use]
    pub fn lcv_cost(&self, value: usize, neighbor_domains: &[(Direction, &[usize])]) -> usize {
        let mut cost = 0;
        for &(d, domain) in neighbor_domains {
            for &b in domain {
                if !self.get(d, value, b) {
                    cost += 1;
                }
            }
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn observe_populates_both_directions_symmetrically() {
        let mut table = ConnectivityTable::new(ConnectivityMode::Four, 3, 0, &[]);
        table.observe(Direction::Right, 0, 1);
        assert!(table.get(Direction::Right, 0, 1));
        assert!(table.get(Direction::Left, 1, 0));
        assert!(!table.get(Direction::Right, 1, 0));
    }

    #[test]
    fn border_query_is_false_when_side_not_enabled() {
        let mut table = ConnectivityTable::new(ConnectivityMode::Four, 2, 0, &[BorderSide::Bottom]);
        table.observe_border(BorderSide::Bottom, 0);
        assert!(table.get_border(BorderSide::Bottom, 0));
        assert!(!table.get_border(BorderSide::Top, 0));
    }

    #[test]
    fn ingest_records_observed_pairs_and_skips_missing_neighbors_by_default() {
        // 2x1 grid: tile 0 left of tile 1.
        let grid = ExampleGrid {
            cells: array![[Some(0), Some(1)]],
        };
        let mut table = ConnectivityTable::new(ConnectivityMode::Four, 2, 0, &[]);
        table.ingest(std::slice::from_ref(&grid), false, 0);
        assert!(table.get(Direction::Right, 0, 1));
        assert!(table.get(Direction::Left, 1, 0));
        // No neighbor below tile 0 within this 1-row example, and empty
        // isn't being interpreted as a tile, so nothing else gets set.
        assert!(!table.get(Direction::Bottom, 0, 0));
    }

    #[test]
    fn ingest_uses_empty_sentinel_at_borders_when_enabled() {
        let grid = ExampleGrid {
            cells: array![[Some(1)]],
        };
        let mut table = ConnectivityTable::new(ConnectivityMode::Four, 2, 0, &[]);
        table.ingest(std::slice::from_ref(&grid), true, 0);
        assert!(table.get(Direction::Top, 1, 0));
        assert!(table.get(Direction::Bottom, 1, 0));
    }

    #[test]
    fn lcv_cost_counts_unsupported_neighbor_candidates() {
        let mut table = ConnectivityTable::new(ConnectivityMode::Four, 3, 0, &[]);
        table.observe(Direction::Right, 0, 1);
        let domain = [1usize, 2usize];
        let cost = table.lcv_cost(0, &[(Direction::Right, &domain)]);
        // 1 is supported, 2 is not.
        assert_eq!(cost, 1);
    }
}
