//! Command-line interface for the demo binary: train a generator from a
//! directory of plain-text example grids, or generate a new grid from a
//! trained one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand, ValueEnum};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::algorithm::builder::{BuildControl, BuildProgress, ExampleMap};
use crate::algorithm::connectivity::ConnectivityMode;
use crate::algorithm::tiles::LayeredTile;
use crate::generator::{Generator, TilemapAdapter};
use crate::io::configuration::{BuildConfig, BuildMode, GenerateOptions, DEFAULT_SEED};
use crate::io::error::{CoreError, Result};
use crate::io::persistence::PersistedGenerator;
use crate::io::progress::TrainingProgressBar;
use crate::spatial::grid::{BoundingBox, Region};

/// Token written for an empty cell in a plain-text example grid.
const EMPTY_TOKEN: &str = ".";

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "tilesynth")]
#[command(author, version, about = "Train a neighborhood-conditioned tile generator and fill a region with it")]
pub struct Cli {
    /// Which subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Train a generator, or generate a grid from one.
#[derive(Subcommand)]
pub enum Command {
    /// Train a generator from a directory of plain-text example grids.
    Train(TrainArgs),
    /// Generate a grid from a previously trained generator.
    Generate(GenerateArgs),
}

/// Adjacency topology accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConnectivityModeArg {
    /// {Top, Bottom, Left, Right}.
    Four,
    /// `Four` plus the four ordinal diagonals.
    Eight,
    /// Hex row-parity adjacency.
    Hex,
}

impl From<ConnectivityModeArg> for ConnectivityMode {
    fn from(value: ConnectivityModeArg) -> Self {
        match value {
            ConnectivityModeArg::Four => Self::Four,
            ConnectivityModeArg::Eight => Self::Eight,
            ConnectivityModeArg::Hex => Self::Hex,
        }
    }
}

/// How the `train` subcommand should treat a generator already present at
/// `--output`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BuildModeArg {
    /// Fail if `--output` already exists.
    FreshFresh,
    /// Train from scratch, overwriting `--output` if it exists.
    FreshOverwrite,
    /// Load the generator at `--output` and keep training it.
    Continue,
}

impl From<BuildModeArg> for BuildMode {
    fn from(value: BuildModeArg) -> Self {
        match value {
            BuildModeArg::FreshFresh => Self::FreshFresh,
            BuildModeArg::FreshOverwrite => Self::FreshOverwrite,
            BuildModeArg::Continue => Self::Continue,
        }
    }
}

/// Arguments for the `train` subcommand.
// A training run genuinely has this many independent toggles; splitting
// them into nested structs would not make any of them less of a bool.
#[allow(clippy::struct_excessive_bools)]
#[derive(Args)]
pub struct TrainArgs {
    /// Directory of `*.txt` example grids (whitespace-separated tokens per
    /// row, `.` for an empty cell).
    pub examples_dir: PathBuf,

    /// Where to write the trained generator as JSON.
    pub output: PathBuf,

    /// How to treat a generator already present at `output`.
    #[arg(long, value_enum, default_value_t = BuildModeArg::FreshFresh)]
    pub mode: BuildModeArg,

    /// Neighborhood radius.
    #[arg(long, default_value_t = 1)]
    pub radius: usize,

    /// Adjacency topology to learn under.
    #[arg(long, value_enum, default_value_t = ConnectivityModeArg::Four)]
    pub connectivity: ConnectivityModeArg,

    /// Number of training epochs.
    #[arg(long, default_value_t = 1000)]
    pub epochs: usize,

    /// Learning rate at epoch 0.
    #[arg(long, default_value_t = 0.05)]
    pub lr_start: f64,

    /// Learning rate at the final epoch.
    #[arg(long, default_value_t = 0.001)]
    pub lr_end: f64,

    /// Seed for the trainer's RNG.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Treat an empty cell as the dedicated empty tile during ingest.
    #[arg(long)]
    pub interpret_empty_as_tile: bool,

    /// Enforce the top border during CSP solving.
    #[arg(long)]
    pub border_top: bool,
    /// Enforce the bottom border during CSP solving.
    #[arg(long)]
    pub border_bottom: bool,
    /// Enforce the left border during CSP solving.
    #[arg(long)]
    pub border_left: bool,
    /// Enforce the right border during CSP solving.
    #[arg(long)]
    pub border_right: bool,

    /// Expose the top border as a predictor feature.
    #[arg(long)]
    pub acknowledge_top: bool,
    /// Expose the bottom border as a predictor feature.
    #[arg(long)]
    pub acknowledge_bottom: bool,
    /// Expose the left border as a predictor feature.
    #[arg(long)]
    pub acknowledge_left: bool,
    /// Expose the right border as a predictor feature.
    #[arg(long)]
    pub acknowledge_right: bool,

    /// Suppress the training progress bar.
    #[arg(long)]
    pub quiet: bool,
}

impl TrainArgs {
    const fn border_flags(&self) -> [bool; 4] {
        [self.border_top, self.border_bottom, self.border_left, self.border_right]
    }

    const fn acknowledge_bounds(&self) -> [bool; 4] {
        [
            self.acknowledge_top,
            self.acknowledge_bottom,
            self.acknowledge_left,
            self.acknowledge_right,
        ]
    }

    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            radius: self.radius,
            connectivity_mode: self.connectivity.into(),
            border_flags: self.border_flags(),
            acknowledge_bounds: self.acknowledge_bounds(),
            interpret_empty_as_tile: self.interpret_empty_as_tile,
            start_y: 0,
            lr_start: self.lr_start,
            lr_end: self.lr_end,
            epochs: self.epochs,
            mode: self.mode.into(),
            seed: self.seed,
        }
    }
}

/// Arguments for the `generate` subcommand.
#[derive(Args)]
pub struct GenerateArgs {
    /// Path to a trained generator JSON file.
    pub generator: PathBuf,

    /// Width of the region to fill.
    #[arg(long, default_value_t = 16)]
    pub width: usize,

    /// Height of the region to fill.
    #[arg(long, default_value_t = 16)]
    pub height: usize,

    /// Gumbel-max sampling temperature.
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Retry with relaxed preferences if initial establishment fails.
    #[arg(long)]
    pub forceful: bool,

    /// Seed for the solver's tie-break noise; omit to draw from entropy.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Parses one whitespace-separated row of a plain-text example grid into
/// single-layer tiles, `None` for [`EMPTY_TOKEN`].
fn parse_row(line: &str) -> Vec<LayeredTile<String>> {
    line.split_whitespace()
        .map(|token| {
            if token == EMPTY_TOKEN {
                LayeredTile::new(vec![None])
            } else {
                LayeredTile::new(vec![Some(token.to_string())])
            }
        })
        .collect()
}

/// Reads one `*.txt` example grid file into a rectangular tile array.
///
/// # Errors
///
/// Returns [`CoreError::FileSystem`] if the file cannot be read, or
/// [`CoreError::InvalidParameter`] if its rows have inconsistent width.
fn read_example_file(path: &Path) -> Result<Array2<LayeredTile<String>>> {
    let text = fs::read_to_string(path).map_err(|source| CoreError::FileSystem {
        operation: "read example grid",
        source,
    })?;

    let rows: Vec<Vec<LayeredTile<String>>> = text.lines().map(parse_row).filter(|row| !row.is_empty()).collect();
    let Some(width) = rows.first().map(Vec::len) else {
        return Err(crate::io::error::invalid_parameter(
            "examples_dir",
            &path.display(),
            &"example grid has no non-empty rows",
        ));
    };
    if rows.iter().any(|row| row.len() != width) {
        return Err(crate::io::error::invalid_parameter(
            "examples_dir",
            &path.display(),
            &"example grid rows have inconsistent width",
        ));
    }

    let height = rows.len();
    let flat: Vec<LayeredTile<String>> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((height, width), flat)
        .map_err(|err| crate::io::error::invalid_parameter("examples_dir", &path.display(), &err))
}

/// Loads every `*.txt` file directly under `dir` as an equally-weighted
/// example map.
///
/// # Errors
///
/// Returns [`CoreError::FileSystem`] if `dir` cannot be listed, or any error
/// from [`read_example_file`] for a malformed grid.
pub fn load_examples(dir: &Path) -> Result<Vec<ExampleMap<String>>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| CoreError::FileSystem {
            operation: "list examples directory",
            source,
        })?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("txt"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| read_example_file(&path).map(|cells| ExampleMap { cells, commonality: 1.0 }))
        .collect()
}

/// An in-memory single-layer tilemap adapter backed by a dense string grid,
/// used by the `generate` subcommand to fill a region and print the result.
pub struct TextGrid {
    width: usize,
    height: usize,
    cells: Vec<Option<String>>,
}

impl TextGrid {
    /// A blank grid of `width x height` cells.
    #[must_use]
    pub fn blank(width: usize, height: usize) -> Self {
        Self { width, height, cells: vec![None; width * height] }
    }

    fn index_of(&self, pos: [i32; 2]) -> Option<usize> {
        if pos[0] < 0 || pos[1] < 0 {
            return None;
        }
        let (x, y) = (pos[0] as usize, pos[1] as usize);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Renders the grid as whitespace-separated rows, `.` for empty cells.
    #[must_use]
    pub fn render(&self) -> String {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| {
                        self.cells
                            .get(y * self.width + x)
                            .and_then(Option::as_ref)
                            .map_or(EMPTY_TOKEN, String::as_str)
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TilemapAdapter for TextGrid {
    type Handle = String;

    fn layer_count(&self) -> usize {
        1
    }

    fn read_block(&self, region: &Region, layer: usize) -> Vec<Option<String>> {
        if layer != 0 {
            return vec![None; region.area()];
        }
        region
            .iter_local()
            .map(|local| {
                let world = region.to_world(local);
                self.index_of(world).and_then(|idx| self.cells.get(idx)).cloned().flatten()
            })
            .collect()
    }

    fn write_tile(&mut self, layer: usize, pos: [i32; 2], tile: Option<String>) {
        if layer != 0 {
            return;
        }
        if let Some(idx) = self.index_of(pos) {
            if let Some(slot) = self.cells.get_mut(idx) {
                *slot = tile;
            }
        }
    }

    fn occupied_bounds(&self, layer: usize) -> Option<BoundingBox> {
        if layer != 0 {
            return None;
        }
        let occupied: Vec<[i32; 2]> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.cells.get(y * self.width + x).is_some_and(Option::is_some))
            .map(|(x, y)| [x as i32, y as i32])
            .collect();
        let min_x = occupied.iter().map(|p| p[0]).min()?;
        let max_x = occupied.iter().map(|p| p[0]).max()?;
        let min_y = occupied.iter().map(|p| p[1]).min()?;
        let max_y = occupied.iter().map(|p| p[1]).max()?;
        Some(BoundingBox { min: [min_x, min_y], max: [max_x, max_y] })
    }
}

/// Runs the `train` subcommand: loads examples, trains a generator per
/// `args.mode`, and writes it to `args.output` as JSON.
///
/// [`BuildMode::FreshFresh`] fails if `args.output` already exists;
/// [`BuildMode::FreshOverwrite`] trains from scratch regardless;
/// [`BuildMode::Continue`] loads the generator at `args.output` and keeps
/// training it, accumulating its epoch counter.
///
/// # Errors
///
/// Propagates ingest, numeric-fault, file-system, and persistence errors.
/// Returns [`CoreError::InvalidParameter`] if `args.mode` is
/// [`BuildMode::FreshFresh`] and `args.output` already exists.
pub fn run_train(args: &TrainArgs) -> Result<()> {
    let examples = load_examples(&args.examples_dir)?;
    let config = args.build_config();
    let progress = Arc::new(Mutex::new(BuildProgress::default()));
    let control = BuildControl::default();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let bar = (!args.quiet).then(|| TrainingProgressBar::new(args.epochs));

    let (generator, outcome) = match config.mode {
        BuildMode::FreshFresh if args.output.exists() => {
            return Err(CoreError::InvalidParameter {
                parameter: "output",
                value: args.output.display().to_string(),
                reason: "a generator already exists at this path; pass --mode fresh-overwrite \
                         or --mode continue"
                    .to_string(),
            });
        }
        BuildMode::FreshFresh | BuildMode::FreshOverwrite => {
            Generator::build(&examples, &config, args.border_flags(), &progress, &control, &mut rng)?
        }
        BuildMode::Continue => {
            let persisted: PersistedGenerator<String> = PersistedGenerator::load(&args.output)?;
            let mut generator = Generator::from_persisted(persisted);
            let outcome = generator.continue_build(&examples, &config, &progress, &control, &mut rng)?;
            (generator, outcome)
        }
    };

    if let Some(bar) = &bar {
        bar.render(&outcome.progress);
        bar.finish("training complete");
    }

    generator.to_persisted().save(&args.output)
}

/// Runs the `generate` subcommand: loads a trained generator, fills a blank
/// region, and prints the result to stdout.
///
/// # Errors
///
/// Propagates persistence and solver errors.
pub fn run_generate(args: &GenerateArgs) -> Result<()> {
    let persisted: PersistedGenerator<String> = PersistedGenerator::load(&args.generator)?;
    let generator = Generator::from_persisted(persisted);

    let mut grid = TextGrid::blank(args.width, args.height);
    let region = Region::new([0, 0], [args.width, args.height]);
    let options = GenerateOptions { temperature: args.temperature, forceful: args.forceful, seed: args.seed };
    generator.generate(&mut grid, region, &options)?;

    // The demo binary's one and only user-facing output.
    #[allow(clippy::print_stdout)]
    {
        println!("{}", grid.render());
    }
    Ok(())
}
