//! Named tunables and the `BuildConfig`/`GenerateOptions` bundles for the
//! `Build`/`Generate` surfaces.

use crate::algorithm::connectivity::ConnectivityMode;

/// Rolling window size (in epochs) for the average-loss trend the build
/// progress snapshot reports.
pub const LOSS_AVERAGE_WINDOW: usize = 20;

/// Default fixed seed for reproducible generation when the caller doesn't
/// supply one.
pub const DEFAULT_SEED: u64 = 42;

/// Default learning rate at the start of training.
pub const DEFAULT_LR_START: f64 = 0.05;

/// Default learning rate at the end of training.
pub const DEFAULT_LR_END: f64 = 0.001;

/// Default neighborhood radius (`S = 2r + 1`).
pub const DEFAULT_RADIUS: usize = 1;

/// Width of progress bars in characters, for the demo CLI's `indicatif` use.
pub const PROGRESS_BAR_WIDTH: u16 = 40;

/// How a build request should treat any previously trained weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Start from fresh Xavier-initialized weights; fail if a generator
    /// already exists at the target.
    FreshFresh,
    /// Start from fresh weights, overwriting any existing generator.
    FreshOverwrite,
    /// Keep training an already-trained generator, continuing its epoch
    /// counter.
    Continue,
}

/// Bundles the tunables for `Build`: neighborhood shape, learning-rate
/// schedule, and ingest behavior.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Neighborhood radius.
    pub radius: usize,
    /// Adjacency topology to learn under.
    pub connectivity_mode: ConnectivityMode,
    /// Which border sides the CSP solver should enforce during AC-3
    /// (`Top, Bottom, Left, Right` order).
    pub border_flags: [bool; 4],
    /// Which border sides the predictor should expose as neighborhood
    /// features (`Top, Bottom, Left, Right` order).
    pub acknowledge_bounds: [bool; 4],
    /// Whether an empty cell should be treated as the dedicated empty tile
    /// during ingest and training.
    pub interpret_empty_as_tile: bool,
    /// Hex row-parity reference row; ignored outside
    /// [`ConnectivityMode::Hex`].
    pub start_y: i32,
    /// Learning rate at epoch 0.
    pub lr_start: f64,
    /// Learning rate at the final epoch.
    pub lr_end: f64,
    /// Number of epochs to run this build for.
    pub epochs: usize,
    /// How a host-level build entry point (e.g. the demo CLI's `train`
    /// subcommand) should treat a generator already present at its target:
    /// fail, overwrite, or load and keep training. `Generator::build` and
    /// `Generator::continue_build` are the two methods that realize the
    /// fresh/continue split in code; this field only carries the decision
    /// of which one (and which existence check) a caller should use.
    pub mode: BuildMode,
    /// Seed for the trainer's RNG (neighborhood-priority noise, example
    /// sampling).
    pub seed: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            connectivity_mode: ConnectivityMode::Four,
            border_flags: [false; 4],
            acknowledge_bounds: [false; 4],
            interpret_empty_as_tile: false,
            start_y: 0,
            lr_start: DEFAULT_LR_START,
            lr_end: DEFAULT_LR_END,
            epochs: 1000,
            mode: BuildMode::FreshFresh,
            seed: DEFAULT_SEED,
        }
    }
}

/// Bundles the tunables for `Generate`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Gumbel-max sampling temperature; higher values flatten the sampled
    /// distribution, lower values sharpen it toward the argmax.
    pub temperature: f32,
    /// Whether to discard preexisting constraints and retry with relaxed
    /// preferences if initial AC-3 establishment fails.
    pub forceful: bool,
    /// Seed for the solver's tie-break noise; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            forceful: false,
            seed: None,
        }
    }
}
