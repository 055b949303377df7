//! Bounded worker pool for scoring candidate offsets.
//!
//! A pool is created by whoever runs a search and dropped with it; nothing
//! touches rayon's global pool. Workers only read shared, immutable feature
//! matrices and return one score per candidate.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::types::{AnalysisError, AnalysisResult};

/// Per-invocation candidate scoring pool.
pub struct CandidatePool {
    pool: ThreadPool,
    workers: usize,
}

impl CandidatePool {
    /// Create a pool with `workers` threads (`None` or 0 = available cores).
    pub fn new(workers: Option<usize>) -> AnalysisResult<Self> {
        let workers = workers.filter(|&n| n > 0).unwrap_or_else(default_workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ras-candidate-{i}"))
            .build()
            .map_err(|e| AnalysisError::WorkerPool(e.to_string()))?;
        tracing::debug!(workers, "Candidate pool created");
        Ok(Self { pool, workers })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Score every candidate independently and join the results.
    ///
    /// Output order matches `candidates`.
    pub fn score_all<T, R, F>(&self, candidates: &[T], score: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool
            .install(|| candidates.par_iter().map(|c| score(c)).collect())
    }
}

impl std::fmt::Debug for CandidatePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidatePool")
            .field("workers", &self.workers)
            .finish()
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_worker_count() {
        let pool = CandidatePool::new(Some(2)).unwrap();
        assert_eq!(pool.workers(), 2);
        assert!(CandidatePool::new(None).unwrap().workers() >= 1);
        assert!(CandidatePool::new(Some(0)).unwrap().workers() >= 1);
    }

    #[test]
    fn results_keep_candidate_order() {
        let pool = CandidatePool::new(Some(3)).unwrap();
        let candidates: Vec<usize> = (0..100).collect();
        let squares = pool.score_all(&candidates, |&c| c * c);
        assert_eq!(squares[7], 49);
        assert_eq!(squares.len(), 100);
    }

    #[test]
    fn workers_are_named() {
        let pool = CandidatePool::new(Some(1)).unwrap();
        let names = pool.score_all(&[()], |_| {
            std::thread::current().name().map(str::to_string)
        });
        assert_eq!(names[0].as_deref(), Some("ras-candidate-0"));
    }
}
