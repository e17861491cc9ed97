//! `GeneratorWeights`, the learned per-cell softmax classifier, and
//! `PredictorEngine`, the stateful driver that walks a region cell by cell
//! in most-constrained-first order.

use ndarray::{Array1, Array4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::io::error::{CoreError, Result};
use crate::math::softmax::{gumbel_noise, softmax_stable, xavier_uniform};
use crate::spatial::grid::{BorderSide, Region};

/// Feature index reserved for an uncollapsed (or out-of-region, unflagged)
/// neighborhood cell: always `unique_count`.
const fn uncollapsed_feature(unique_count: usize) -> usize {
    unique_count
}

/// Feature index for a border-flag feature. Only the four listed in
/// `BorderSide` are representable; each occupies one of the four columns
/// past the uncollapsed column.
const fn border_feature(unique_count: usize, side: BorderSide) -> usize {
    unique_count
        + 1
        + match side {
            BorderSide::Top => 0,
            BorderSide::Bottom => 1,
            BorderSide::Left => 2,
            BorderSide::Right => 3,
        }
}

/// Dense logistic-regression weight tensor and per-class biases.
///
/// Shape `(U, S, S, U + 5)`: `U` target classes, an `S x S` neighborhood,
/// and a feature axis of `U` one-hot tile features plus one "uncollapsed"
/// feature plus four border-flag features (one per [`BorderSide`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorWeights {
    radius: usize,
    unique_count: usize,
    /// Which border directions this generator was trained to recognize as
    /// feature flags (`acknowledgeBounds`).
    pub acknowledge_bounds: [bool; 4],
    /// Cumulative epochs trained, preserved across `Continue` builds.
    pub epoch: usize,
    weights: Array4<f32>,
    biases: Array1<f32>,
}

impl GeneratorWeights {
    /// Builds a freshly Xavier-initialized tensor: weights uniform in
    /// `[-1/sqrt(A), 1/sqrt(A))` where `A = (2r+1)^2`, biases at `1.0`.
    pub fn new(radius: usize, unique_count: usize, acknowledge_bounds: [bool; 4], rng: &mut impl Rng) -> Self {
        let side = 2 * radius + 1;
        let area = side * side;
        let feature_width = unique_count + 5;
        let mut weights = Array4::<f32>::zeros((unique_count, side, side, feature_width));
        for w in &mut weights {
            *w = xavier_uniform(rng, area);
        }
        let biases = Array1::<f32>::from_elem(unique_count, 1.0);
        Self {
            radius,
            unique_count,
            acknowledge_bounds,
            epoch: 0,
            weights,
            biases,
        }
    }

    /// Neighborhood radius `r`.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Neighborhood side `S = 2r + 1`.
    #[must_use]
    pub const fn side(&self) -> usize {
        2 * self.radius + 1
    }

    /// Number of target classes `U`.
    #[must_use]
    pub const fn unique_count(&self) -> usize {
        self.unique_count
    }

    /// Raw (noise-free) logits for every class given a neighborhood's active
    /// feature indices.
    #[must_use]
    pub fn logits(&self, features: &NeighborhoodFeatures) -> Vec<f32> {
        let side = self.side();
        (0..self.unique_count)
            .map(|c| {
                let mut z = self.biases.get(c).copied().unwrap_or(0.0);
                for ny in 0..side {
                    for nx in 0..side {
                        let f = features.get(nx, ny).unwrap_or_else(|| uncollapsed_feature(self.unique_count));
                        z += self.weights.get([c, nx, ny, f]).copied().unwrap_or(0.0);
                    }
                }
                z
            })
            .collect()
    }

    /// Cross-entropy training step toward `target` at this neighborhood.
    /// Returns the loss `-ln(p[target] + eps)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NumericFault`] if any resulting weight or bias
    /// becomes non-finite.
    pub fn train_step(
        &mut self,
        features: &NeighborhoodFeatures,
        target: usize,
        lr: f64,
    ) -> Result<f32> {
        let logits = self.logits(features);
        let probs = softmax_stable(&logits);
        let side = self.side();
        #[allow(clippy::cast_possible_truncation)]
        let lr = lr as f32;

        for c in 0..self.unique_count {
            let p_c = probs.get(c).copied().unwrap_or(0.0);
            let indicator = f32::from(u8::from(c == target));
            let grad = p_c - indicator;

            if let Some(bias) = self.biases.get_mut(c) {
                *bias -= lr * grad;
            }
            for ny in 0..side {
                for nx in 0..side {
                    let f = features
                        .get(nx, ny)
                        .unwrap_or_else(|| uncollapsed_feature(self.unique_count));
                    if let Some(w) = self.weights.get_mut([c, nx, ny, f]) {
                        *w -= lr * grad;
                    }
                }
            }
        }

        if self.weights.iter().any(|w| !w.is_finite()) || self.biases.iter().any(|b| !b.is_finite()) {
            return Err(CoreError::NumericFault {
                operation: "train_step",
                reason: "weight or bias became non-finite".to_string(),
            });
        }

        let p_target = probs.get(target).copied().unwrap_or(0.0);
        let loss = -(p_target + f32::EPSILON).ln();
        if !loss.is_finite() {
            return Err(CoreError::NumericFault {
                operation: "train_step",
                reason: "loss is non-finite".to_string(),
            });
        }
        Ok(loss)
    }

    /// Samples a class via the Gumbel-max trick, restricted to `allowed`
    /// (when given); falls back to the unrestricted argmax when `allowed`
    /// is `None` (a "pure preview" query outside the CSP).
    pub fn collapse(
        &self,
        features: &NeighborhoodFeatures,
        temperature: f32,
        rng: &mut impl Rng,
        allowed: Option<&[usize]>,
    ) -> Option<usize> {
        let logits = self.logits(features);
        let noise = gumbel_noise(rng, self.unique_count, temperature);
        let noisy: Vec<f32> = logits.iter().zip(&noise).map(|(z, g)| z + g).collect();

        let candidates: Vec<usize> = match allowed {
            Some(allowed) => allowed.to_vec(),
            None => (0..self.unique_count).collect(),
        };

        candidates
            .into_iter()
            .max_by(|&a, &b| {
                let va = noisy.get(a).copied().unwrap_or(f32::NEG_INFINITY);
                let vb = noisy.get(b).copied().unwrap_or(f32::NEG_INFINITY);
                va.total_cmp(&vb)
            })
    }
}

/// The active one-hot feature index at every neighborhood cell around one
/// target position, built by [`PredictorEngine::neighborhood_features`].
#[derive(Debug, Clone)]
pub struct NeighborhoodFeatures {
    side: usize,
    /// `features[ny * side + nx]`.
    features: Vec<usize>,
}

impl NeighborhoodFeatures {
    fn get(&self, nx: usize, ny: usize) -> Option<usize> {
        self.features.get(ny * self.side + nx).copied()
    }
}

/// Drives cell-by-cell traversal of a region in most-constrained-first
/// order, tracking which cells are collapsed and to what.
pub struct PredictorEngine {
    region: Region,
    radius: usize,
    collapsed: Vec<Option<usize>>,
    /// Separate from `collapsed`: a position becomes visited once the
    /// traversal has passed over it, whether or not it was trained on. An
    /// empty example cell is visited but never collapsed, so it still reads
    /// as "uncollapsed" in neighborhood features (see the empty-tile-during-
    /// training design note).
    visited: Vec<bool>,
    priority_noise: Vec<f32>,
}

impl PredictorEngine {
    /// Builds an engine over `region` with the given neighborhood `radius`,
    /// all cells uncollapsed.
    pub fn new(region: Region, radius: usize, rng: &mut impl Rng) -> Self {
        let area = region.area();
        Self {
            region,
            radius,
            collapsed: vec![None; area],
            visited: vec![false; area],
            priority_noise: (0..area).map(|_| rng.random::<f32>()).collect(),
        }
    }

    /// Clears all collapses and draws fresh tie-break noise.
    pub fn reset(&mut self, rng: &mut impl Rng) {
        self.collapsed.iter_mut().for_each(|c| *c = None);
        self.visited.iter_mut().for_each(|v| *v = false);
        self.priority_noise
            .iter_mut()
            .for_each(|n| *n = rng.random::<f32>());
    }

    fn index_of(&self, local: [i32; 2]) -> Option<usize> {
        self.region
            .contains_local(local)
            .then(|| local[1] as usize * self.region.size[0] + local[0] as usize)
    }

    /// The tile index collapsed at `local`, if any.
    #[must_use]
    pub fn collapsed_at(&self, local: [i32; 2]) -> Option<usize> {
        self.index_of(local).and_then(|i| self.collapsed.get(i).copied().flatten())
    }

    /// Marks `local` as collapsed to `tile` and visited.
    pub fn mark_collapsed(&mut self, local: [i32; 2], tile: usize) {
        if let Some(i) = self.index_of(local) {
            if let Some(slot) = self.collapsed.get_mut(i) {
                *slot = Some(tile);
            }
            if let Some(v) = self.visited.get_mut(i) {
                *v = true;
            }
        }
    }

    /// Marks `local` as visited without collapsing it, for empty example
    /// cells the trainer skips: traversal advances past the cell, but it
    /// remains "uncollapsed" for any neighborhood feature lookup.
    pub fn mark_skipped(&mut self, local: [i32; 2]) {
        if let Some(i) = self.index_of(local) {
            if let Some(v) = self.visited.get_mut(i) {
                *v = true;
            }
        }
    }

    fn is_visited(&self, local: [i32; 2]) -> bool {
        self.index_of(local)
            .and_then(|i| self.visited.get(i).copied())
            .unwrap_or(true)
    }

    fn collapsed_neighbor_count(&self, local: [i32; 2]) -> usize {
        let r = self.radius as i32;
        let mut count = 0;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = [local[0] + dx, local[1] + dy];
                if self.collapsed_at(n).is_some() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Returns the unvisited cell with the most collapsed neighbors, ties
    /// broken by the per-cell noise drawn at `reset`.
    #[must_use]
    pub fn next_pos(&self) -> Option<[i32; 2]> {
        self.region
            .iter_local()
            .filter(|&local| !self.is_visited(local))
            .map(|local| {
                let idx = self.index_of(local).unwrap_or(0);
                let noise = self.priority_noise.get(idx).copied().unwrap_or(0.0);
                (local, self.collapsed_neighbor_count(local), noise)
            })
            .max_by(|a, b| a.1.cmp(&b.1).then(a.2.total_cmp(&b.2)))
            .map(|(local, ..)| local)
    }

    /// True once every cell in the region has been visited, whether
    /// collapsed or skipped.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.visited.iter().all(|&v| v)
    }

    /// Builds the one-hot feature grid for the neighborhood centered at
    /// `local`. The center cell is always the uncollapsed feature. Cells
    /// outside the region use a border-flag feature when the position lies
    /// beyond an `acknowledge_bounds`-flagged side of the region, else the
    /// uncollapsed feature.
    #[must_use]
    pub fn neighborhood_features(
        &self,
        local: [i32; 2],
        unique_count: usize,
        acknowledge_bounds: [bool; 4],
    ) -> NeighborhoodFeatures {
        let r = self.radius as i32;
        let side = self.side();
        let mut features = vec![uncollapsed_feature(unique_count); side * side];

        for (fi, dy) in (-r..=r).enumerate() {
            for (fj, dx) in (-r..=r).enumerate() {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = [local[0] + dx, local[1] + dy];
                let value = if self.region.contains_local(n) {
                    self.collapsed_at(n)
                        .unwrap_or_else(|| uncollapsed_feature(unique_count))
                } else {
                    Self::border_feature_for(n, &self.region, acknowledge_bounds, unique_count)
                };
                if let Some(slot) = features.get_mut(fi * side + fj) {
                    *slot = value;
                }
            }
        }

        NeighborhoodFeatures { side, features }
    }

    fn border_feature_for(
        n: [i32; 2],
        region: &Region,
        acknowledge_bounds: [bool; 4],
        unique_count: usize,
    ) -> usize {
        let beyond_left = n[0] < 0;
        let beyond_right = n[0] >= region.size[0] as i32;
        let beyond_y_min = n[1] < 0;
        let beyond_y_max = n[1] >= region.size[1] as i32;

        // `Top` is the y == size.h - 1 edge, `Bottom` is y == 0; see `BorderSide`.
        let flagged = |side: BorderSide, beyond: bool, enabled: bool| (side, beyond && enabled);
        let sides = [
            flagged(BorderSide::Top, beyond_y_max, acknowledge_bounds[0]),
            flagged(BorderSide::Bottom, beyond_y_min, acknowledge_bounds[1]),
            flagged(BorderSide::Left, beyond_left, acknowledge_bounds[2]),
            flagged(BorderSide::Right, beyond_right, acknowledge_bounds[3]),
        ];

        sides
            .into_iter()
            .find_map(|(side, active)| active.then(|| border_feature(unique_count, side)))
            .unwrap_or_else(|| uncollapsed_feature(unique_count))
    }

    /// Neighborhood side `S = 2r + 1`.
    #[must_use]
    pub const fn side(&self) -> usize {
        2 * self.radius + 1
    }
}
