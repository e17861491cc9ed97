//! Performance measurement for filling a region at varying sizes

// Criterion macros generate undocumented functions
#![allow(missing_docs)]

use std::hint::black_box;
use std::sync::{Arc, Mutex};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use tilesynth::algorithm::builder::{BuildControl, BuildProgress, ExampleMap};
use tilesynth::algorithm::connectivity::ConnectivityMode;
use tilesynth::algorithm::tiles::LayeredTile;
use tilesynth::generator::{Generator, TilemapAdapter};
use tilesynth::io::configuration::{BuildConfig, BuildMode, GenerateOptions};
use tilesynth::spatial::grid::{BoundingBox, Region};

struct Grid {
    width: usize,
    cells: Vec<Option<u32>>,
}

impl Grid {
    fn blank(width: usize, height: usize) -> Self {
        Self { width, cells: vec![None; width * height] }
    }

    fn index_of(&self, pos: [i32; 2]) -> Option<usize> {
        if pos[0] < 0 || pos[1] < 0 {
            return None;
        }
        let (x, y) = (pos[0] as usize, pos[1] as usize);
        (x < self.width).then(|| y * self.width + x)
    }
}

impl TilemapAdapter for Grid {
    type Handle = u32;

    fn layer_count(&self) -> usize {
        1
    }

    fn read_block(&self, region: &Region, layer: usize) -> Vec<Option<u32>> {
        if layer != 0 {
            return vec![None; region.area()];
        }
        region
            .iter_local()
            .map(|local| {
                let world = region.to_world(local);
                self.index_of(world).and_then(|idx| self.cells.get(idx)).copied().flatten()
            })
            .collect()
    }

    fn write_tile(&mut self, layer: usize, pos: [i32; 2], tile: Option<u32>) {
        if layer != 0 {
            return;
        }
        if let Some(idx) = self.index_of(pos) {
            if let Some(slot) = self.cells.get_mut(idx) {
                *slot = tile;
            }
        }
    }

    fn occupied_bounds(&self, _layer: usize) -> Option<BoundingBox> {
        None
    }
}

fn checkerboard_example(size: usize) -> ExampleMap<u32> {
    let mut cells = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let tile: u32 = if (x + y) % 2 == 0 { 0 } else { 1 };
            cells.push(LayeredTile::new(vec![Some(tile)]));
        }
    }
    let cells = Array2::from_shape_vec((size, size), cells)
        .unwrap_or_else(|e| unreachable!("checkerboard fixture is rectangular by construction: {e}"));
    ExampleMap { cells, commonality: 1.0 }
}

fn trained_generator() -> Generator<u32> {
    let examples = [checkerboard_example(16)];
    let config = BuildConfig {
        radius: 1,
        connectivity_mode: ConnectivityMode::Four,
        border_flags: [false; 4],
        acknowledge_bounds: [false; 4],
        interpret_empty_as_tile: false,
        start_y: 0,
        lr_start: 0.1,
        lr_end: 0.01,
        epochs: 100,
        mode: BuildMode::FreshFresh,
        seed: 1,
    };
    let progress = Arc::new(Mutex::new(BuildProgress::default()));
    let control = BuildControl::default();
    let mut rng = StdRng::seed_from_u64(1);
    Generator::build(&examples, &config, [false; 4], &progress, &control, &mut rng)
        .unwrap_or_else(|e| unreachable!("fixture training must not fail: {e}"))
        .0
}

/// Measures time to fill a square region, from preparation through AC-3 and
/// backtracking search, as the region's side length grows
fn bench_generate_at_varying_region_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let generator = trained_generator();

    for size in &[8_usize, 16, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut grid = Grid::blank(size, size);
                let region = Region::new([0, 0], [size, size]);
                let options = GenerateOptions { temperature: 1.0, forceful: false, seed: Some(7) };
                let result = generator.generate(&mut grid, region, &options);
                black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generate_at_varying_region_sizes);
criterion_main!(benches);
