use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Tuning knobs for an [`Engine`](super::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrent map calls. `1` maps on the calling thread.
    pub map_workers: usize,
    /// Upper bound on concurrent reduce calls. `1` reduces on the calling thread.
    pub reduce_workers: usize,
    /// Treat an unreadable input as fatal instead of skipping it.
    pub strict_inputs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = available_workers();
        Self {
            map_workers: workers,
            reduce_workers: workers,
            strict_inputs: false,
        }
    }
}

impl EngineConfig {
    /// Runs every phase on the calling thread.
    pub fn sequential() -> Self {
        Self {
            map_workers: 1,
            reduce_workers: 1,
            strict_inputs: false,
        }
    }

    pub fn with_map_workers(mut self, n: usize) -> Self {
        self.map_workers = n;
        self
    }

    pub fn with_reduce_workers(mut self, n: usize) -> Self {
        self.reduce_workers = n;
        self
    }

    /// Sets both worker bounds at once.
    pub fn with_workers(self, n: usize) -> Self {
        self.with_map_workers(n).with_reduce_workers(n)
    }

    pub fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }

    /// Map worker bound with `0` read as `1`.
    pub fn effective_map_workers(&self) -> usize {
        self.map_workers.max(1)
    }

    /// Reduce worker bound with `0` read as `1`.
    pub fn effective_reduce_workers(&self) -> usize {
        self.reduce_workers.max(1)
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
