//! Epoch-by-epoch trainer driving [`crate::algorithm::predictor::GeneratorWeights`]
//! toward the adjacency patterns observed in a set of example maps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use rand::Rng;

use crate::algorithm::connectivity::{ConnectivityTable, ExampleGrid};
use crate::algorithm::predictor::{GeneratorWeights, PredictorEngine};
use crate::algorithm::tiles::{LayeredTile, TileHandle, UniqueTileTable};
use crate::io::configuration::{BuildConfig, LOSS_AVERAGE_WINDOW};
use crate::io::error::{CoreError, Result};
use crate::math::softmax::log_lerp_lr;
use crate::spatial::grid::Region;

/// One example map: a rectangular grid of layered tiles plus a non-negative
/// sampling weight.
pub struct ExampleMap<H: TileHandle> {
    /// Tile grid, row-major by `(y, x)`.
    pub cells: Array2<LayeredTile<H>>,
    /// Relative sampling frequency during training; must be non-negative.
    pub commonality: f64,
}

impl<H: TileHandle> ExampleMap<H> {
    fn layer_count(&self) -> Option<usize> {
        self.cells.iter().next().map(|t| t.layers.len())
    }

    fn region(&self) -> Region {
        Region::new([0, 0], [self.cells.ncols(), self.cells.nrows()])
    }
}

/// Polled progress snapshot for a build in progress, per the
/// `(epoch, total_epochs, loss_last, loss_avg20, lr, start_time, end_time, state)`
/// tuple.
#[derive(Debug, Clone, Default)]
pub struct BuildProgress {
    /// Epochs completed so far (cumulative across `Continue` runs).
    pub epoch: usize,
    /// Total epochs this run was asked to complete.
    pub total_epochs: usize,
    /// Average per-cell loss of the most recently completed epoch.
    pub loss_last: f32,
    /// Rolling mean of the last [`LOSS_AVERAGE_WINDOW`] epochs' average loss.
    pub loss_avg20: f32,
    /// Current learning rate.
    pub lr: f64,
    /// Current disposition of the build.
    pub state: BuildState,
}

/// Disposition of a build, mirroring the polling surface's `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    /// No build has started yet.
    #[default]
    None,
    /// Training is actively running.
    InProgress,
    /// Stopped via `CancelBuild`.
    Cancelled,
    /// Completed all requested epochs, or stopped cleanly via
    /// `SaveAndQuitBuild`.
    Success,
    /// Stopped after a weight, bias, or loss value went non-finite.
    NanError,
    /// Ingest validation failed: example maps disagree on layer count.
    MismatchedLayers,
    /// Ingest validation failed: a map has no layers.
    NullMaps,
    /// Ingest validation failed: zero example maps were given.
    ZeroMaps,
    /// Ingest validation failed: a negative or non-positive-total
    /// commonality weighting.
    InvalidCommonality,
}

/// Cooperative signals the trainer checks at epoch boundaries.
#[derive(Debug, Default)]
pub struct BuildControl {
    abort: AtomicBool,
    save_and_quit: AtomicBool,
}

impl BuildControl {
    /// Requests the trainer abort immediately at the next epoch boundary,
    /// leaving weights in whatever state they reached.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Requests the trainer finish its current epoch, then stop cleanly.
    pub fn save_and_quit(&self) {
        self.save_and_quit.store(true, Ordering::Relaxed);
    }

    fn should_abort(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    fn should_save_and_quit(&self) -> bool {
        self.save_and_quit.load(Ordering::Relaxed)
    }
}

fn validate_ingest<H: TileHandle>(examples: &[ExampleMap<H>]) -> Result<usize> {
    if examples.is_empty() {
        return Err(CoreError::ZeroMaps);
    }

    let total_commonality: f64 = examples.iter().map(|m| m.commonality).sum();
    if examples.iter().any(|m| m.commonality < 0.0) || total_commonality <= 0.0 {
        return Err(CoreError::InvalidCommonality {
            reason: "commonality weights must be non-negative with a positive total".to_string(),
        });
    }

    let mut layer_count = None;
    for map in examples {
        let Some(found) = map.layer_count() else {
            return Err(CoreError::NullMaps);
        };
        if found == 0 {
            return Err(CoreError::NullMaps);
        }
        match layer_count {
            None => layer_count = Some(found),
            Some(expected) if expected != found => {
                return Err(CoreError::MismatchedLayers { expected, found });
            }
            Some(_) => {}
        }
    }

    layer_count.ok_or(CoreError::NullMaps)
}

fn intern_example<H: TileHandle>(map: &ExampleMap<H>, tiles: &mut UniqueTileTable<H>) -> ExampleGrid {
    let (h, w) = map.cells.dim();
    let mut cells = Array2::from_elem((h, w), None);
    for y in 0..h {
        for x in 0..w {
            let Some(tile) = map.cells.get((y, x)) else {
                continue;
            };
            let resolved = (!tile.is_empty()).then(|| tiles.intern(tile.clone()).get());
            if let Some(cell) = cells.get_mut((y, x)) {
                *cell = resolved;
            }
        }
    }
    ExampleGrid { cells }
}

fn weighted_pick<H: TileHandle>(examples: &[ExampleMap<H>], total: f64, rng: &mut impl Rng) -> usize {
    let mut roll = rng.random_range(0.0..total);
    for (i, map) in examples.iter().enumerate() {
        if roll < map.commonality {
            return i;
        }
        roll -= map.commonality;
    }
    examples.len().saturating_sub(1)
}

/// Runs the training loop described in the component design's Builder
/// section: per-epoch weighted example sampling, engine-driven traversal,
/// gradient updates, and a rolling average-loss tracker.
///
/// `connectivity` is populated by ingest before training starts. `weights`
/// is trained in place; its `epoch` counter accumulates across calls so
/// `BuildMode::Continue` composes naturally by reusing a generator from a
/// previous call.
///
/// # Errors
///
/// Returns ingest-validation errors before any training occurs, or
/// [`CoreError::NumericFault`] if training produces a non-finite value.
/// `BuildControl::abort` surfaces as `Ok(())` with `progress.state` set to
/// [`BuildState::Cancelled`]; callers that need abort to be an error should
/// check `progress.state` themselves.
pub fn train<H: TileHandle>(
    examples: &[ExampleMap<H>],
    tiles: &mut UniqueTileTable<H>,
    config: &BuildConfig,
    weights: &mut GeneratorWeights,
    connectivity: &mut ConnectivityTable,
    progress: &Arc<Mutex<BuildProgress>>,
    control: &BuildControl,
    rng: &mut impl Rng,
) -> Result<()> {
    let layer_count = match validate_ingest(examples) {
        Ok(count) => count,
        Err(err) => {
            set_state_from_error(progress, &err);
            return Err(err);
        }
    };

    let example_grids: Vec<ExampleGrid> = examples.iter().map(|m| intern_example(m, tiles)).collect();
    let empty_index = tiles.empty_index(layer_count).get();
    connectivity.ingest(&example_grids, config.interpret_empty_as_tile, empty_index);

    let total_commonality: f64 = examples.iter().map(|m| m.commonality).sum();
    let mut recent_losses: Vec<f32> = Vec::with_capacity(LOSS_AVERAGE_WINDOW);
    let mut current_map: Option<usize> = None;
    let mut engine: Option<PredictorEngine> = None;

    if let Ok(mut snapshot) = progress.lock() {
        snapshot.total_epochs = config.epochs;
        snapshot.state = BuildState::InProgress;
    }

    for step in 0..config.epochs {
        if control.should_abort() {
            if let Ok(mut snapshot) = progress.lock() {
                snapshot.state = BuildState::Cancelled;
            }
            return Ok(());
        }

        #[allow(clippy::cast_precision_loss)]
        let t = step as f64 / config.epochs.max(1) as f64;
        let lr = log_lerp_lr(config.lr_start, config.lr_end, t);

        let chosen = weighted_pick(examples, total_commonality, rng);
        let (Some(chosen_map), Some(grid)) = (examples.get(chosen), example_grids.get(chosen)) else {
            continue;
        };
        if current_map != Some(chosen) {
            engine = Some(PredictorEngine::new(chosen_map.region(), config.radius, rng));
            current_map = Some(chosen);
        }
        let Some(engine) = engine.as_mut() else {
            unreachable!("engine is always populated before use");
        };
        engine.reset(rng);

        let mut epoch_losses: Vec<f32> = Vec::new();
        while let Some(pos) = engine.next_pos() {
            let target = grid.cells.get((pos[1] as usize, pos[0] as usize)).copied().flatten();
            let Some(target) = target else {
                engine.mark_skipped(pos);
                continue;
            };
            let features = engine.neighborhood_features(pos, weights.unique_count(), config.acknowledge_bounds);
            let loss = match weights.train_step(&features, target, lr) {
                Ok(loss) => loss,
                Err(err) => {
                    set_state_from_error(progress, &err);
                    return Err(err);
                }
            };
            epoch_losses.push(loss);
            engine.mark_collapsed(pos, target);
        }

        #[allow(clippy::cast_precision_loss)]
        let epoch_avg = if epoch_losses.is_empty() {
            0.0
        } else {
            epoch_losses.iter().sum::<f32>() / epoch_losses.len() as f32
        };
        if recent_losses.len() == LOSS_AVERAGE_WINDOW {
            recent_losses.remove(0);
        }
        recent_losses.push(epoch_avg);
        #[allow(clippy::cast_precision_loss)]
        let rolling_avg = recent_losses.iter().sum::<f32>() / recent_losses.len() as f32;

        weights.epoch += 1;
        if let Ok(mut snapshot) = progress.lock() {
            snapshot.epoch = weights.epoch;
            snapshot.loss_last = epoch_avg;
            snapshot.loss_avg20 = rolling_avg;
            snapshot.lr = lr;
        }

        if control.should_save_and_quit() {
            break;
        }
    }

    if let Ok(mut snapshot) = progress.lock() {
        snapshot.state = BuildState::Success;
    }
    Ok(())
}

fn set_state_from_error(progress: &Arc<Mutex<BuildProgress>>, err: &CoreError) {
    let state = match err {
        CoreError::ZeroMaps => BuildState::ZeroMaps,
        CoreError::NullMaps => BuildState::NullMaps,
        CoreError::MismatchedLayers { .. } => BuildState::MismatchedLayers,
        CoreError::InvalidCommonality { .. } => BuildState::InvalidCommonality,
        CoreError::NumericFault { .. } => BuildState::NanError,
        _ => return,
    };
    if let Ok(mut snapshot) = progress.lock() {
        snapshot.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::connectivity::ConnectivityMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn all_g_map() -> ExampleMap<u32> {
        let tile = LayeredTile::new(vec![Some(1)]);
        ExampleMap {
            cells: Array2::from_elem((3, 3), tile),
            commonality: 1.0,
        }
    }

    #[test]
    fn zero_maps_is_rejected_before_training() {
        let mut tiles: UniqueTileTable<u32> = UniqueTileTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut weights = GeneratorWeights::new(1, 1, [false; 4], &mut rng);
        let mut connectivity = ConnectivityTable::new(ConnectivityMode::Four, 1, 0, &[]);
        let progress = Arc::new(Mutex::new(BuildProgress::default()));
        let control = BuildControl::default();
        let config = BuildConfig::default();

        let examples: Vec<ExampleMap<u32>> = Vec::new();
        let err = train(
            &examples,
            &mut tiles,
            &config,
            &mut weights,
            &mut connectivity,
            &progress,
            &control,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ZeroMaps));
    }

    #[test]
    fn training_on_a_single_uniform_map_reduces_loss() {
        let mut tiles: UniqueTileTable<u32> = UniqueTileTable::new();
        let mut rng = StdRng::seed_from_u64(2);
        let examples = vec![all_g_map()];
        // Pre-intern so unique_count matches what ingest will discover.
        tiles.intern(LayeredTile::new(vec![Some(1)]));
        let mut weights = GeneratorWeights::new(1, tiles.len().max(2), [false; 4], &mut rng);
        let mut connectivity = ConnectivityTable::new(ConnectivityMode::Four, weights.unique_count(), 0, &[]);
        let progress = Arc::new(Mutex::new(BuildProgress::default()));
        let control = BuildControl::default();
        let config = BuildConfig {
            epochs: 30,
            ..BuildConfig::default()
        };

        let result = train(
            &examples,
            &mut tiles,
            &config,
            &mut weights,
            &mut connectivity,
            &progress,
            &control,
            &mut rng,
        );
        assert!(result.is_ok());
        let Ok(snapshot) = progress.lock() else {
            unreachable!("progress mutex is never poisoned in this test");
        };
        assert_eq!(snapshot.state, BuildState::Success);
        assert_eq!(snapshot.epoch, 30);
    }

    #[test]
    fn abort_stops_before_completing_all_epochs() {
        let mut tiles: UniqueTileTable<u32> = UniqueTileTable::new();
        let mut rng = StdRng::seed_from_u64(3);
        let examples = vec![all_g_map()];
        tiles.intern(LayeredTile::new(vec![Some(1)]));
        let mut weights = GeneratorWeights::new(1, 2, [false; 4], &mut rng);
        let mut connectivity = ConnectivityTable::new(ConnectivityMode::Four, weights.unique_count(), 0, &[]);
        let progress = Arc::new(Mutex::new(BuildProgress::default()));
        let control = BuildControl::default();
        control.abort();
        let config = BuildConfig {
            epochs: 10,
            ..BuildConfig::default()
        };

        let result = train(
            &examples,
            &mut tiles,
            &config,
            &mut weights,
            &mut connectivity,
            &progress,
            &control,
            &mut rng,
        );
        assert!(result.is_ok());
        let Ok(snapshot) = progress.lock() else {
            unreachable!("progress mutex is never poisoned in this test");
        };
        assert_eq!(snapshot.state, BuildState::Cancelled);
        assert_eq!(snapshot.epoch, 0);
    }
}
