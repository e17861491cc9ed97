//! Neighborhood-conditioned tilemap generation from learned adjacency and
//! placement models.
//!
//! The core learns a softmax classifier over small neighborhood windows and
//! a pairwise adjacency table from example tile grids, then uses both to
//! drive a backtracking constraint solver (AC-3 arc consistency plus
//! trail-based undo) that fills a target region with a placement consistent
//! with everything it learned.

#![forbid(unsafe_code)]

/// Connectivity learning, the softmax predictor, the trainer, and the CSP solver
pub mod algorithm;
/// Top-level `Generator` facade tying training and generation together
pub mod generator;
/// Input/output operations, configuration, persistence, and error handling
pub mod io;
/// Mathematical utilities: softmax, Gumbel sampling, Xavier init, schedules
pub mod math;
/// Spatial grid management: regions, directions, hex geometry, sparse sets
pub mod spatial;

pub use generator::{Generator, TileHandle, TilemapAdapter};
pub use io::error::{CoreError, Result};
