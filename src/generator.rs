//! Top-level facade tying training ([`algorithm::builder`]) and generation
//! ([`algorithm::solver`]) together behind the host's tilemap representation.
//!
//! A [`Generator`] owns everything a trained model needs: the learned
//! weights, the adjacency/border observation tables, and the dense tile
//! index. It is agnostic to how the host stores tiles; [`TilemapAdapter`]
//! is the seam a host implements once to read and write its own grid.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub use crate::algorithm::tiles::TileHandle;

use crate::algorithm::builder::{self, BuildControl, BuildProgress, ExampleMap};
use crate::algorithm::connectivity::ConnectivityTable;
use crate::algorithm::predictor::{GeneratorWeights, PredictorEngine};
use crate::algorithm::solver;
use crate::algorithm::tiles::{TileIndex, UniqueTileTable};
use crate::io::configuration::{BuildConfig, GenerateOptions};
use crate::io::error::{CoreError, Result};
use crate::io::persistence::PersistedGenerator;
use crate::spatial::grid::{BorderSide, BoundingBox, Region};

/// The host's layered tile grid, as the core needs to read and write it.
///
/// Handles are opaque to the core; only [`TileHandle`]'s `Eq`/`Hash` bound
/// is required. Implementations are expected to be cheap to call
/// repeatedly — `generate` reads one block per layer and writes one tile
/// per cell per layer.
pub trait TilemapAdapter {
    /// The host's per-layer tile reference type.
    type Handle: TileHandle;

    /// Number of layers this adapter's grid has.
    fn layer_count(&self) -> usize;

    /// Reads every tile handle on `layer` within `region`, row-major
    /// (matching [`Region::iter_local`]'s order). `None` marks an empty
    /// cell.
    fn read_block(&self, region: &Region, layer: usize) -> Vec<Option<Self::Handle>>;

    /// Writes a single tile handle at world position `pos` on `layer`.
    /// `None` clears that cell.
    fn write_tile(&mut self, layer: usize, pos: [i32; 2], tile: Option<Self::Handle>);

    /// The smallest bounding box containing every occupied cell on `layer`,
    /// or `None` if the layer is empty. Used by hosts for automatic bounds
    /// inference; the core itself does not require it.
    fn occupied_bounds(&self, layer: usize) -> Option<BoundingBox>;
}

/// Summary of a completed (or cancelled) training run, read once `build`/
/// `continue_build` returns.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The final progress snapshot observed when training stopped.
    pub progress: BuildProgress,
}

fn enabled_border_sides(flags: [bool; 4]) -> Vec<BorderSide> {
    let sides = [BorderSide::Top, BorderSide::Bottom, BorderSide::Left, BorderSide::Right];
    sides.into_iter().zip(flags).filter_map(|(side, enabled)| enabled.then_some(side)).collect()
}

fn snapshot(progress: &Arc<Mutex<BuildProgress>>) -> BuildProgress {
    progress.lock().map(|guard| guard.clone()).unwrap_or_default()
}

fn provisional_layer_count<H: TileHandle>(examples: &[ExampleMap<H>]) -> Option<usize> {
    examples.iter().find_map(|map| map.cells.iter().next().map(|t| t.layers.len()))
}

fn intern_all_tiles<H: TileHandle>(examples: &[ExampleMap<H>], tiles: &mut UniqueTileTable<H>) {
    for map in examples {
        for tile in &map.cells {
            if !tile.is_empty() {
                tiles.intern(tile.clone());
            }
        }
    }
}

/// A trained (or in-training) generator: the learned softmax weights, the
/// adjacency/border observation tables, and the dense tile index they were
/// both trained against.
pub struct Generator<H: TileHandle> {
    tiles: UniqueTileTable<H>,
    layer_count: usize,
    border_flags: [bool; 4],
    weights: GeneratorWeights,
    connectivity: ConnectivityTable,
}

impl<H: TileHandle> Generator<H> {
    /// Trains a fresh generator from scratch: interns every distinct tile
    /// across `examples`, builds Xavier-initialized weights and an empty
    /// connectivity table sized to the discovered tile alphabet, then runs
    /// [`builder::train`].
    ///
    /// # Errors
    ///
    /// Propagates ingest-validation and numeric-fault errors from
    /// [`builder::train`]; no partial generator is returned on failure.
    pub fn build(
        examples: &[ExampleMap<H>],
        config: &BuildConfig,
        border_flags: [bool; 4],
        progress: &Arc<Mutex<BuildProgress>>,
        control: &BuildControl,
        rng: &mut impl Rng,
    ) -> Result<(Self, BuildOutcome)> {
        let layer_count = provisional_layer_count(examples).unwrap_or(0);
        let mut tiles: UniqueTileTable<H> = UniqueTileTable::new();
        intern_all_tiles(examples, &mut tiles);
        if config.interpret_empty_as_tile && layer_count > 0 {
            tiles.empty_index(layer_count);
        }
        let unique_count = tiles.len().max(1);

        let mut weights = GeneratorWeights::new(config.radius, unique_count, config.acknowledge_bounds, rng);
        let mut connectivity = ConnectivityTable::new(
            config.connectivity_mode,
            unique_count,
            config.start_y,
            &enabled_border_sides(border_flags),
        );

        builder::train(examples, &mut tiles, config, &mut weights, &mut connectivity, progress, control, rng)?;

        let generator = Self {
            tiles,
            layer_count,
            border_flags,
            weights,
            connectivity,
        };
        Ok((generator, BuildOutcome { progress: snapshot(progress) }))
    }

    /// Continues training an existing generator, reusing its weights,
    /// connectivity table, and tile index; `weights.epoch` accumulates
    /// across this call rather than restarting from zero.
    ///
    /// # Errors
    ///
    /// Propagates ingest-validation and numeric-fault errors from
    /// [`builder::train`]; `self` may be left mid-trained if training fails
    /// partway through, matching `builder::train`'s own contract.
    pub fn continue_build(
        &mut self,
        examples: &[ExampleMap<H>],
        config: &BuildConfig,
        progress: &Arc<Mutex<BuildProgress>>,
        control: &BuildControl,
        rng: &mut impl Rng,
    ) -> Result<BuildOutcome> {
        builder::train(
            examples,
            &mut self.tiles,
            config,
            &mut self.weights,
            &mut self.connectivity,
            progress,
            control,
            rng,
        )?;
        Ok(BuildOutcome { progress: snapshot(progress) })
    }

    /// Fills `region` of `adapter`'s grid: reads preexisting tiles,
    /// prepares per-cell domains, runs a single predictor pass to seed a
    /// preferred value per cell, then solves and writes the result back.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyUniqueTileSet`] if this generator has no
    /// registered tiles, [`CoreError::LayerCountMismatch`] if `adapter`'s
    /// layer count disagrees with the one this generator was trained with,
    /// or [`CoreError::Unsatisfiable`]/[`CoreError::BorderImpossible`] from
    /// the solver.
    pub fn generate<A>(&self, adapter: &mut A, region: Region, options: &GenerateOptions) -> Result<()>
    where
        A: TilemapAdapter<Handle = H>,
    {
        if self.tiles.is_empty() {
            return Err(CoreError::EmptyUniqueTileSet);
        }
        if adapter.layer_count() != self.layer_count {
            return Err(CoreError::LayerCountMismatch {
                expected: self.layer_count,
                found: adapter.layer_count(),
            });
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let blocks: Vec<Vec<Option<H>>> = (0..self.layer_count).map(|layer| adapter.read_block(&region, layer)).collect();
        let width = region.size[0];
        let index_of = move |local: [i32; 2]| local[1] as usize * width + local[0] as usize;
        let preexisting = |layer: usize, local: [i32; 2]| -> Option<H> {
            blocks.get(layer).and_then(|block| block.get(index_of(local))).cloned().flatten()
        };

        let prepared = solver::prepare(&region, self.layer_count, self.tiles.len(), &preexisting, &self.tiles);

        let area = region.area();
        let mut preferred: Vec<Option<usize>> = vec![None; area];
        let mut engine = PredictorEngine::new(region, self.weights.radius(), &mut rng);

        while let Some(pos) = engine.next_pos() {
            let idx = index_of(pos);
            if let Some(value) = prepared.committed.get(idx).copied().flatten() {
                engine.mark_collapsed(pos, value);
                continue;
            }
            let features = engine.neighborhood_features(pos, self.tiles.len(), self.weights.acknowledge_bounds);
            let allowed = prepared.domains.get(idx).map(crate::spatial::index_set::IndexSet::as_slice);
            let predicted = match allowed {
                Some(allowed) if allowed.is_empty() => None,
                Some(allowed) => self.weights.collapse(&features, options.temperature, &mut rng, Some(allowed)),
                None => None,
            };
            match predicted {
                Some(value) => {
                    if let Some(slot) = preferred.get_mut(idx) {
                        *slot = Some(value);
                    }
                    engine.mark_collapsed(pos, value);
                }
                None => engine.mark_skipped(pos),
            }
        }

        let noise: Vec<f32> = (0..area).map(|_| rng.random::<f32>()).collect();

        let assignment = solver::solve(
            &region,
            self.connectivity.mode(),
            self.connectivity.start_y(),
            self.border_flags,
            &self.connectivity,
            prepared,
            &preferred,
            &noise,
            options.forceful,
        )?;

        for (idx, local) in region.iter_local().enumerate() {
            let Some(value) = assignment.get(idx).copied().flatten() else {
                continue;
            };
            let Some(tile) = self.tiles.get(TileIndex(value)) else {
                continue;
            };
            let world = region.to_world(local);
            for (layer, handle) in tile.layers.iter().enumerate() {
                adapter.write_tile(layer, world, handle.clone());
            }
        }

        Ok(())
    }

    /// Number of layers each registered tile carries.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Which border sides the CSP solver enforces during AC-3.
    #[must_use]
    pub const fn border_flags(&self) -> [bool; 4] {
        self.border_flags
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

    /// Bundles this generator into its serializable form.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedGenerator<H> {
        PersistedGenerator::new(
            self.layer_count,
            &self.tiles,
            self.connectivity.mode(),
            self.border_flags,
            self.weights.clone(),
            self.connectivity.clone(),
        )
    }

    /// Rebuilds a generator from its persisted form.
    #[must_use]
    pub fn from_persisted(persisted: PersistedGenerator<H>) -> Self {
        Self {
            layer_count: persisted.layer_count(),
            border_flags: persisted.border_flags,
            tiles: persisted.unique_tiles(),
            weights: persisted.weights().clone(),
            connectivity: persisted.connectivity().clone(),
        }
    }
}
