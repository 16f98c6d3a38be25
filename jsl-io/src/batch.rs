//! Worker sizing for concurrent ingestion batches.
//!
//! Jobs in a batch are independent pulls that share only the resource guard,
//! so the worker count is bounded by cores, job count and an optional cap.

const MAX_BATCH_THREADS: usize = 16;

/// Configuration for [`crate::IngestionPipeline::execute_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchConfig {
    /// Optional cap on worker threads after applying heuristics.
    pub max_threads: Option<usize>,
}

/// Worker count chosen for a batch, with the reason for the choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDecision {
    /// Number of rayon workers to build.
    pub thread_count: usize,
    /// Human-readable explanation of the chosen count.
    pub reason: String,
}

/// Decide how many workers a batch of `jobs` should use on this host.
pub fn plan_batch(jobs: usize, config: &BatchConfig) -> BatchDecision {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    evaluate_batch_decision(cores, jobs, config)
}

fn evaluate_batch_decision(cores: usize, jobs: usize, config: &BatchConfig) -> BatchDecision {
    if jobs <= 1 {
        return BatchDecision {
            thread_count: 1,
            reason: "Single job - running sequentially".into(),
        };
    }

    if cores < 2 {
        return BatchDecision {
            thread_count: 1,
            reason: "Single-core system detected".into(),
        };
    }

    let user_cap = config
        .max_threads
        .map(|cap| cap.max(1))
        .unwrap_or(MAX_BATCH_THREADS)
        .min(MAX_BATCH_THREADS);
    let thread_count = cores.min(jobs).min(user_cap).max(1);

    let reason = if config.max_threads.is_some() && thread_count == user_cap {
        format!(
            "Using {} worker(s) for {} jobs (capped by --threads, {} cores available)",
            thread_count, jobs, cores
        )
    } else {
        format!(
            "Using {}/{} cores for {} jobs",
            thread_count, cores, jobs
        )
    };

    BatchDecision {
        thread_count,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_job_is_sequential() {
        let decision = evaluate_batch_decision(8, 1, &BatchConfig::default());
        assert_eq!(decision.thread_count, 1);
    }

    #[test]
    fn single_core_is_sequential() {
        let decision = evaluate_batch_decision(1, 10, &BatchConfig::default());
        assert_eq!(decision.thread_count, 1);
        assert!(decision.reason.contains("Single-core"));
    }

    #[test]
    fn bounded_by_jobs_cores_and_cap() {
        assert_eq!(evaluate_batch_decision(8, 3, &BatchConfig::default()).thread_count, 3);
        assert_eq!(evaluate_batch_decision(4, 100, &BatchConfig::default()).thread_count, 4);
        assert_eq!(
            evaluate_batch_decision(64, 100, &BatchConfig::default()).thread_count,
            MAX_BATCH_THREADS
        );

        let capped = evaluate_batch_decision(8, 100, &BatchConfig { max_threads: Some(2) });
        assert_eq!(capped.thread_count, 2);
        assert!(capped.reason.contains("capped"));

        let zero = evaluate_batch_decision(8, 100, &BatchConfig { max_threads: Some(0) });
        assert_eq!(zero.thread_count, 1);
    }
}
