//! Mathematical utilities for the algorithm

/// Softmax, Gumbel sampling, Xavier init, and the learning-rate schedule
pub mod softmax;
