//! `LayeredTile` values and the ingest-time map from distinct tuples to a
//! small dense integer index.
//!
//! Canonicalizes each tile and dedups through a hash map, the same shape as
//! collapsing repeated 3x3 patterns into a small alphabet, generalized here
//! from fixed 3x3 pixel patterns to an arbitrary per-layer tuple of opaque
//! host tile handles.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// The host's opaque per-layer tile reference. Only equality and hashing
/// are required of it; the core never inspects a handle's contents.
pub trait TileHandle: Clone + Eq + Hash + Send + Sync {}

impl<T: Clone + Eq + Hash + Send + Sync> TileHandle for T {}

/// A stable, non-negative integer identifying one distinct [`LayeredTile`]
/// for the lifetime of a trained generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileIndex(pub usize);

impl TileIndex {
    /// The raw index value.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

/// The tuple of per-layer tile handles present at one grid cell. A layer
/// entry of `None` means that layer has no tile at this cell. All
/// `LayeredTile`s sharing one generator must have the same layer count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "H: Serialize + for<'de2> Deserialize<'de2>")]
pub struct LayeredTile<H: TileHandle> {
    /// One entry per layer, in a fixed layer order.
    pub layers: Vec<Option<H>>,
}

impl<H: TileHandle> LayeredTile<H> {
    /// Builds a tile from per-layer handles.
    #[must_use]
    pub const fn new(layers: Vec<Option<H>>) -> Self {
        Self { layers }
    }

    /// A tile with every layer empty; used as the sentinel "no tile here"
    /// entry when `interpret_empty_as_tile` is enabled.
    #[must_use]
    pub fn empty(layer_count: usize) -> Self {
        Self {
            layers: vec![None; layer_count],
        }
    }

    /// True if every layer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Option::is_none)
    }
}

/// Assigns each distinct [`LayeredTile`] a small dense [`TileIndex`],
/// discovered in first-seen order during ingest.
#[derive(Debug, Clone)]
pub struct UniqueTileTable<H: TileHandle> {
    tiles: Vec<LayeredTile<H>>,
    index_of: HashMap<LayeredTile<H>, TileIndex>,
    empty_index: Option<TileIndex>,
}

impl<H: TileHandle> UniqueTileTable<H> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            index_of: HashMap::new(),
            empty_index: None,
        }
    }

    /// Returns `tile`'s index, assigning a new one if not seen before.
    pub fn intern(&mut self, tile: LayeredTile<H>) -> TileIndex {
        if let Some(&idx) = self.index_of.get(&tile) {
            return idx;
        }
        let idx = TileIndex(self.tiles.len());
        self.index_of.insert(tile.clone(), idx);
        self.tiles.push(tile);
        idx
    }

    /// Interns (if needed) and returns the empty-layers sentinel tile's
    /// index, for use when `interpret_empty_as_tile` is enabled.
    pub fn empty_index(&mut self, layer_count: usize) -> TileIndex {
        if let Some(idx) = self.empty_index {
            return idx;
        }
        let idx = self.intern(LayeredTile::empty(layer_count));
        self.empty_index = Some(idx);
        idx
    }

    /// The tile registered at `idx`, if any.
    #[must_use]
    pub fn get(&self, idx: TileIndex) -> Option<&LayeredTile<H>> {
        self.tiles.get(idx.0)
    }

    /// Number of distinct tiles registered (the `U` of the data model).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// True if no tiles have been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Iterates registered tiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = (TileIndex, &LayeredTile<H>)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, t)| (TileIndex(i), t))
    }

    /// All registered tiles, in index order, for persisting.
    #[must_use]
    pub fn tiles_in_order(&self) -> &[LayeredTile<H>] {
        &self.tiles
    }

    /// Rebuilds a table from a previously-persisted, index-ordered tile
    /// list. The empty-layers sentinel (if present) is rediscovered by
    /// value, not by a stored index.
    #[must_use]
    pub fn from_tiles(tiles: Vec<LayeredTile<H>>) -> Self {
        let index_of = tiles
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), TileIndex(i)))
            .collect();
        let empty_index = tiles
            .iter()
            .position(LayeredTile::is_empty)
            .map(TileIndex);
        Self {
            tiles,
            index_of,
            empty_index,
        }
    }
}

impl<H: TileHandle> Default for UniqueTileTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_assigns_stable_first_seen_order() {
        let mut table: UniqueTileTable<u32> = UniqueTileTable::new();
        let a = table.intern(LayeredTile::new(vec![Some(1)]));
        let b = table.intern(LayeredTile::new(vec![Some(2)]));
        let a_again = table.intern(LayeredTile::new(vec![Some(1)]));
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn empty_index_is_interned_once() {
        let mut table: UniqueTileTable<u32> = UniqueTileTable::new();
        let e1 = table.empty_index(2);
        let e2 = table.empty_index(2);
        assert_eq!(e1, e2);
        assert_eq!(table.len(), 1);
        let tile = table.get(e1);
        assert!(tile.is_some_and(LayeredTile::is_empty));
    }

    #[test]
    fn layered_tile_equality_is_element_wise() {
        let a = LayeredTile::new(vec![Some(1), None]);
        let b = LayeredTile::new(vec![Some(1), None]);
        let c = LayeredTile::new(vec![Some(1), Some(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
