//! Bounded worker pool for per-validator proof construction.

use crate::proof::ProofError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Rayon pool sized by `--proof-concurrency`; clones share the pool
#[derive(Debug, Clone)]
pub struct ProofWorkers {
    pool: Arc<ThreadPool>,
}

impl ProofWorkers {
    /// Create a pool with `concurrency` threads (at least one).
    ///
    /// # Errors
    /// Returns [`ProofError::WorkerPool`] if the threads cannot be spawned.
    pub fn new(concurrency: usize) -> Result<Self, ProofError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("proof-worker-{i}"))
            .build()
            .map_err(|e| ProofError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Default concurrency: the machine's available parallelism
    #[must_use]
    pub fn default_concurrency() -> usize {
        std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `f` to every item on the pool.
    ///
    /// Results come back in input order; the run fails if any item fails.
    ///
    /// # Errors
    /// Returns one of the errors produced by `f`.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>, ProofError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, ProofError> + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}
