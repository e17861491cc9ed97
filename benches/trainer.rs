//! Performance measurement for the epoch-by-epoch trainer at varying epoch counts

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
use tilesynth::generator::Generator;
use tilesynth::io::configuration::{BuildConfig, BuildMode};

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

/// Measures full training cost (ingest plus epoch loop) as the epoch budget grows
fn bench_train_at_varying_epoch_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("train");
    let examples = [checkerboard_example(16)];

    for epochs in &[50_usize, 200, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(epochs), epochs, |b, &epochs| {
            b.iter(|| {
                let config = BuildConfig {
                    radius: 1,
                    connectivity_mode: ConnectivityMode::Four,
                    border_flags: [false; 4],
                    acknowledge_bounds: [false; 4],
                    interpret_empty_as_tile: false,
                    start_y: 0,
                    lr_start: 0.1,
                    lr_end: 0.01,
                    epochs,
                    mode: BuildMode::FreshFresh,
                    seed: 1,
                };
                let progress = Arc::new(Mutex::new(BuildProgress::default()));
                let control = BuildControl::default();
                let mut rng = StdRng::seed_from_u64(1);
                let result = Generator::build(&examples, &config, [false; 4], &progress, &control, &mut rng);
                black_box(result.map(|(_, outcome)| outcome.progress.epoch));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_train_at_varying_epoch_counts);
criterion_main!(benches);
