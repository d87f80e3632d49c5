//! Configuration for typedkv
//!
//! Centralized configuration with sensible defaults.

/// Main configuration for a store and its in-memory backend
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // List Configuration
    // -------------------------------------------------------------------------
    /// Number of entries fetched from the backend per scan page
    pub list_batch_size: usize,

    // -------------------------------------------------------------------------
    // Backend Limits
    // -------------------------------------------------------------------------
    /// Max encoded key size (in bytes)
    pub max_key_size: usize,

    /// Max encoded value size (in bytes)
    pub max_value_size: usize,

    /// Max checks in one atomic operation
    pub max_checks: usize,

    /// Max mutations in one atomic operation
    pub max_mutations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            list_batch_size: 100,
            max_key_size: 2048,
            max_value_size: 64 * 1024, // 64 KB
            max_checks: 100,
            max_mutations: 1000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the scan page size used by `list` (clamped to at least 1)
    pub fn list_batch_size(mut self, size: usize) -> Self {
        self.config.list_batch_size = size.max(1);
        self
    }

    /// Set the maximum encoded key size (in bytes)
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.config.max_key_size = size;
        self
    }

    /// Set the maximum encoded value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Set the maximum number of checks per atomic operation
    pub fn max_checks(mut self, count: usize) -> Self {
        self.config.max_checks = count;
        self
    }

    /// Set the maximum number of mutations per atomic operation
    pub fn max_mutations(mut self, count: usize) -> Self {
        self.config.max_mutations = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
