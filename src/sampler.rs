//! Minibatch sampling strategies over the training set
//!
//! How the per-iteration minibatch is drawn is pluggable; every strategy is
//! deterministic given the engine's seeded RNG, never ambient randomness.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Strategy for drawing minibatch indices from the training set
///
/// `sample` returns `batch_size` indices into a training set of `train_len`
/// records (fewer when the set is smaller than the batch). All randomness
/// must come from the engine-owned `rng`.
pub trait MinibatchSampler: Send {
    /// Draw the next minibatch's indices
    fn sample(&mut self, rng: &mut StdRng, train_len: usize, batch_size: usize) -> Vec<usize>;

    /// Name of the strategy, for logging and run summaries
    fn name(&self) -> &'static str;
}

/// Epoch-shuffled sampling without replacement (the default)
///
/// Shuffles the index space once per epoch and hands out consecutive chunks,
/// so every record is visited once before any repeats and the order is fully
/// determined by the seed.
#[derive(Debug, Default)]
pub struct ShuffledSampler {
    order: Vec<usize>,
    cursor: usize,
}

impl ShuffledSampler {
    /// Create a new shuffled sampler
    pub fn new() -> Self {
        Self::default()
    }

    fn reshuffle(&mut self, rng: &mut StdRng, train_len: usize) {
        self.order = (0..train_len).collect();
        self.order.shuffle(rng);
        self.cursor = 0;
    }
}

impl MinibatchSampler for ShuffledSampler {
    fn sample(&mut self, rng: &mut StdRng, train_len: usize, batch_size: usize) -> Vec<usize> {
        if train_len == 0 {
            return Vec::new();
        }
        let take = batch_size.min(train_len);

        if self.order.len() != train_len || self.cursor + take > train_len {
            self.reshuffle(rng, train_len);
        }

        let batch = self.order[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;
        batch
    }

    fn name(&self) -> &'static str {
        "shuffled"
    }
}

/// Strictly cyclic sampling in dataset order
///
/// Walks the training set front to back, wrapping around. Uses no randomness
/// at all; useful when run-to-run batch composition must be obvious.
#[derive(Debug, Default)]
pub struct RoundRobinSampler {
    cursor: usize,
}

impl RoundRobinSampler {
    /// Create a new round-robin sampler
    pub fn new() -> Self {
        Self::default()
    }
}

impl MinibatchSampler for RoundRobinSampler {
    fn sample(&mut self, _rng: &mut StdRng, train_len: usize, batch_size: usize) -> Vec<usize> {
        if train_len == 0 {
            return Vec::new();
        }
        let take = batch_size.min(train_len);
        let batch: Vec<usize> = (0..take)
            .map(|i| (self.cursor + i) % train_len)
            .collect();
        self.cursor = (self.cursor + take) % train_len;
        batch
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
