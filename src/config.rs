use crate::hashing::HashSeed;

/// Size of a table's first bucket array.
pub const DEFAULT_INITIAL_SIZE: usize = 4;

/// With resizing disabled, growth still happens once `used / size` exceeds
/// this ratio.
pub const DEFAULT_FORCE_RESIZE_RATIO: usize = 5;

/// Empty buckets a single rehash unit may skip before yielding.
pub const DEFAULT_EMPTY_VISITS_PER_STEP: usize = 10;

/// Per-instance tunables for a [`Dict`](crate::Dict).
///
/// ```rust
/// use rehash_dict::DictConfig;
/// use rehash_dict::HashSeed;
///
/// let config = DictConfig::default()
///     .with_initial_size(16)
///     .with_hash_seed(HashSeed::new([0; 16]))
///     .with_rng_seed(7);
/// assert_eq!(config.initial_size, 16);
/// ```
#[derive(Debug, Clone)]
pub struct DictConfig {
    /// Size of the first bucket array. Rounded up to a power of two.
    pub initial_size: usize,
    /// Whether automatic growth and [`resize`](crate::Dict::resize) may run.
    pub resize_enabled: bool,
    /// Load ratio that forces growth even when resizing is disabled.
    pub force_resize_ratio: usize,
    /// Empty-bucket skip budget per rehash unit.
    pub empty_visits_per_step: usize,
    /// SipHash key; drawn from the OS when `None`.
    pub hash_seed: Option<HashSeed>,
    /// Seed for the sampling RNG; drawn from the OS when `None`.
    pub rng_seed: Option<u64>,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_INITIAL_SIZE,
            resize_enabled: true,
            force_resize_ratio: DEFAULT_FORCE_RESIZE_RATIO,
            empty_visits_per_step: DEFAULT_EMPTY_VISITS_PER_STEP,
            hash_seed: None,
            rng_seed: None,
        }
    }
}

impl DictConfig {
    /// Sets the first bucket array size.
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Starts with resizing enabled or disabled.
    pub fn with_resize_enabled(mut self, enabled: bool) -> Self {
        self.resize_enabled = enabled;
        self
    }

    /// Sets the forced-growth ratio used while resizing is disabled.
    pub fn with_force_resize_ratio(mut self, ratio: usize) -> Self {
        self.force_resize_ratio = ratio;
        self
    }

    /// Sets the empty-bucket skip budget per rehash unit.
    pub fn with_empty_visits_per_step(mut self, visits: usize) -> Self {
        self.empty_visits_per_step = visits;
        self
    }

    /// Fixes the SipHash key.
    pub fn with_hash_seed(mut self, seed: HashSeed) -> Self {
        self.hash_seed = Some(seed);
        self
    }

    /// Fixes the sampling RNG seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Initial size after power-of-two rounding, never zero.
    pub(crate) fn initial_buckets(&self) -> usize {
        self.initial_size.max(1).next_power_of_two()
    }

    /// Ratio clamped so that it can divide.
    pub(crate) fn force_ratio(&self) -> usize {
        self.force_resize_ratio.max(1)
    }

    /// Skip budget clamped so that a step always visits at least one bucket.
    pub(crate) fn empty_visits(&self) -> usize {
        self.empty_visits_per_step.max(1)
    }
}
