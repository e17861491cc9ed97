//! Serialization of a trained generator to a human-diffable JSON document.
//!
//! Built on `serde`/`serde_json` for a structured, human-diffable round
//! trip.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::connectivity::{ConnectivityMode, ConnectivityTable};
use crate::algorithm::predictor::GeneratorWeights;
use crate::algorithm::tiles::{LayeredTile, TileHandle, UniqueTileTable};
use crate::io::error::{CoreError, Result};

/// Everything needed to reconstruct a trained generator, per §6's persisted
/// state list: layer count, unique-tile table, neighborhood radius,
/// connectivity mode, border flags, acknowledge-bounds flags, the weight
/// tensor, biases, epochs-trained counter, and the connectivity/border
/// tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "H: Serialize + for<'de2> Deserialize<'de2>")]
pub struct PersistedGenerator<H: TileHandle> {
    layer_count: usize,
    tiles: Vec<LayeredTile<H>>,
    connectivity_mode: ConnectivityMode,
    /// Which border sides the CSP solver enforces during AC-3.
    pub border_flags: [bool; 4],
    weights: GeneratorWeights,
    connectivity: ConnectivityTable,
}

impl<H: TileHandle> PersistedGenerator<H> {
    /// Bundles the pieces of a trained generator for serialization.
    #[must_use]
    pub fn new(
        layer_count: usize,
        tiles: &UniqueTileTable<H>,
        connectivity_mode: ConnectivityMode,
        border_flags: [bool; 4],
        weights: GeneratorWeights,
        connectivity: ConnectivityTable,
    ) -> Self {
        Self {
            layer_count,
            tiles: tiles.tiles_in_order().to_vec(),
            connectivity_mode,
            border_flags,
            weights,
            connectivity,
        }
    }

    /// Number of layers each tile in this generator carries.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// The connectivity mode this generator was trained under.
    #[must_use]
    pub const fn connectivity_mode(&self) -> ConnectivityMode {
        self.connectivity_mode
    }

    /// The trained weight tensor and biases.
    #[must_use]
    pub const fn weights(&self) -> &GeneratorWeights {
        &self.weights
    }

    /// The learned adjacency/border observation tables.
    #[must_use]
    pub const fn connectivity(&self) -> &ConnectivityTable {
        &self.connectivity
    }

    /// Rebuilds the unique-tile table from the persisted, index-ordered
    /// tile list.
    #[must_use]
    pub fn unique_tiles(&self) -> UniqueTileTable<H> {
        UniqueTileTable::from_tiles(self.tiles.clone())
    }

    /// Serializes to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Persistence`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| CoreError::Persistence {
            operation: "serialize generator",
            source,
        })
    }

    /// Deserializes from a JSON string previously produced by
    /// [`PersistedGenerator::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Persistence`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| CoreError::Persistence {
            operation: "deserialize generator",
            source,
        })
    }

    /// Writes the generator to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Persistence`] on a serialization failure or
    /// [`CoreError::FileSystem`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| CoreError::FileSystem {
            operation: "write persisted generator",
            source,
        })
    }

    /// Reads and deserializes a generator previously written by
    /// [`PersistedGenerator::save`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileSystem`] if the file cannot be read, or
    /// [`CoreError::Persistence`] if its contents are malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|source| CoreError::FileSystem {
            operation: "read persisted generator",
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::grid::BorderSide;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_generator() -> PersistedGenerator<u32> {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tiles: UniqueTileTable<u32> = UniqueTileTable::new();
        tiles.intern(LayeredTile::new(vec![Some(1)]));
        tiles.intern(LayeredTile::new(vec![Some(2)]));
        let weights = GeneratorWeights::new(1, 2, [false; 4], &mut rng);
        let connectivity = ConnectivityTable::new(ConnectivityMode::Four, 2, 0, &[BorderSide::Bottom]);
        PersistedGenerator::new(1, &tiles, ConnectivityMode::Four, [false, true, false, false], weights, connectivity)
    }

    #[test]
    fn round_trips_through_json() {
        let original = sample_generator();
        let Ok(json) = original.to_json() else {
            unreachable!("serializing a freshly built generator should never fail");
        };
        let Ok(restored) = PersistedGenerator::<u32>::from_json(&json) else {
            unreachable!("deserializing a just-serialized document should never fail");
        };
        assert_eq!(restored.layer_count(), original.layer_count());
        assert_eq!(restored.unique_tiles().len(), original.unique_tiles().len());
        assert_eq!(restored.weights().unique_count(), original.weights().unique_count());
    }

    #[test]
    fn round_trips_through_a_file() {
        let Ok(dir) = tempfile::tempdir() else {
            unreachable!("tempdir creation should succeed in a test sandbox");
        };
        let path = dir.path().join("generator.json");
        let original = sample_generator();
        if original.save(&path).is_err() {
            unreachable!("save should succeed against a writable temp file");
        }
        let Ok(restored) = PersistedGenerator::<u32>::load(&path) else {
            unreachable!("load should succeed immediately after save");
        };
        assert_eq!(restored.border_flags, original.border_flags);
    }

    #[test]
    fn malformed_json_reports_a_persistence_error() {
        let err = PersistedGenerator::<u32>::from_json("not json").unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
    }
}
