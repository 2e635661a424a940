//! Evaluator configuration

/// Reference evaluator options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Seed for `random` ordering and aggregation (None = seeded from entropy)
    pub random_seed: Option<u64>,

    /// Reject fetch specs that break the get/cluster-by shape rules
    pub strict_fetch_spec: bool,

    /// Name given to the service objects, used in logs
    pub name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            strict_fetch_spec: true,
            name: "medialib".to_string(),
        }
    }
}

impl IndexConfig {
    /// Use a fixed seed so random orderings are reproducible
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Accept malformed fetch specs where a sensible reading exists
    pub fn lenient_fetch_spec(mut self) -> Self {
        self.strict_fetch_spec = false;
        self
    }

    /// Set the service name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
