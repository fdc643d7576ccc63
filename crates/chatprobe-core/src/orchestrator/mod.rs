//! Runs many batches with bounded parallelism and keeps their results.

pub mod manifest;

use std::path::Path;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchDefinition, BatchFilter, RunBatch, discover};
use crate::error::Result;

pub use manifest::{FailedRun, ManifestEntry, ManifestStore, RunManifest, RunSummary};

pub struct Orchestrator<R> {
    runner: R,
    store: Option<ManifestStore>,
}

impl<R: RunBatch> Orchestrator<R> {
    /// Results are only kept in memory unless a store is given.
    pub fn new(runner: R, store: Option<ManifestStore>) -> Self {
        Self { runner, store }
    }

    /// Discovers the batches under `root`, keeps those matching `filters`,
    /// expands their settings overrides and runs the lot.
    pub async fn run(
        &self,
        root: &Path,
        filters: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<RunManifest> {
        let filter = BatchFilter::new(filters);
        let batches = discover(root)?;
        let found = batches.len();
        let queue: Vec<BatchDefinition> = batches
            .iter()
            .filter(|batch| filter.matches(batch))
            .flat_map(BatchDefinition::expand)
            .collect();
        if !filter.is_empty() {
            debug!(target: "chatprobe::orchestrator", found, queued = queue.len(), ?filters, "Applied batch filters");
        }
        self.run_queue(queue, concurrency, cancel).await
    }

    /// Runs `queue` in chunks of `concurrency`. A chunk starts only once the
    /// previous one has finished entirely; cancellation is honoured between
    /// chunks, and runs already started are allowed to finish.
    pub async fn run_queue(
        &self,
        queue: Vec<BatchDefinition>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<RunManifest> {
        let mut manifest = RunManifest::new();
        if let Some(store) = &self.store {
            let dir = store.prepare(&manifest)?;
            info!(target: "chatprobe::orchestrator", run_id = %manifest.id, dir = %dir.display(), "Saving results");
        }

        let total = queue.len();
        let concurrency = concurrency.max(1);
        info!(target: "chatprobe::orchestrator", run_id = %manifest.id, total, concurrency, "Starting run");

        for (index, chunk) in queue.chunks(concurrency).enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    target: "chatprobe::orchestrator",
                    run_id = %manifest.id,
                    completed = manifest.entries.len(),
                    total,
                    "Run interrupted, not starting remaining batches"
                );
                break;
            }
            debug!(
                target: "chatprobe::orchestrator",
                chunk = index,
                size = chunk.len(),
                remaining = total - manifest.entries.len() - chunk.len(),
                "Running chunk"
            );

            let mut running: FuturesUnordered<_> = chunk
                .iter()
                .map(|batch| async move { (batch, self.runner.run(batch).await) })
                .collect();
            while let Some((batch, result)) = running.next().await {
                manifest.push(batch.clone(), result);
                self.persist(&manifest);
            }
        }

        manifest.interrupted = cancel.is_cancelled() && manifest.entries.len() < total;
        self.persist(&manifest);

        let summary = manifest.summary();
        info!(
            target: "chatprobe::orchestrator",
            run_id = %manifest.id,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed.len(),
            interrupted = manifest.interrupted,
            "Run finished"
        );
        Ok(manifest)
    }

    fn persist(&self, manifest: &RunManifest) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(manifest) {
                error!(target: "chatprobe::orchestrator", run_id = %manifest.id, error = %e, "Failed to save results");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RunResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingRunner {
        active: AtomicUsize,
        max_active: AtomicUsize,
        log: Mutex<Vec<String>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    #[async_trait]
    impl RunBatch for CountingRunner {
        async fn run(&self, batch: &BatchDefinition) -> RunResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("start {}", batch.name));

            tokio::time::sleep(Duration::from_millis(100)).await;

            self.log.lock().unwrap().push(format!("end {}", batch.name));
            self.active.fetch_sub(1, Ordering::SeqCst);
            let finished = self.log.lock().unwrap().iter().filter(|l| l.starts_with("end")).count();
            if let Some((after, token)) = &self.cancel_after {
                if finished >= *after {
                    token.cancel();
                }
            }

            if batch.name.starts_with("bad") {
                RunResult::failed(&batch.name, batch.app_id(), "boom", Vec::new(), Utc::now())
            } else {
                RunResult::passed(&batch.name, batch.app_id(), Vec::new(), Utc::now())
            }
        }
    }

    fn queue(names: &[&str]) -> Vec<BatchDefinition> {
        names
            .iter()
            .map(|name| BatchDefinition {
                name: (*name).to_string(),
                file_path: format!("tests/{name}.yaml").into(),
                app_id: Some("poa".into()),
                settings: Default::default(),
                settings_overrides: Vec::new(),
                chat: Vec::new(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency() {
        let orchestrator = Orchestrator::new(CountingRunner::default(), None);

        let manifest = orchestrator
            .run_queue(queue(&["a", "b", "c", "d", "e"]), 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.entries.len(), 5);
        assert_eq!(orchestrator.runner.max_active.load(Ordering::SeqCst), 2);
        assert!(!manifest.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_are_barriers() {
        let orchestrator = Orchestrator::new(CountingRunner::default(), None);

        orchestrator
            .run_queue(queue(&["a", "b", "c"]), 2, &CancellationToken::new())
            .await
            .unwrap();

        let log = orchestrator.runner.log.lock().unwrap().clone();
        let start_c = log.iter().position(|l| l == "start c").unwrap();
        let end_a = log.iter().position(|l| l == "end a").unwrap();
        let end_b = log.iter().position(|l| l == "end b").unwrap();
        assert!(start_c > end_a && start_c > end_b, "{log:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_one_is_sequential() {
        let orchestrator = Orchestrator::new(CountingRunner::default(), None);

        orchestrator
            .run_queue(queue(&["a", "b", "c"]), 1, &CancellationToken::new())
            .await
            .unwrap();

        let log = orchestrator.runner.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_concurrency_runs_one_at_a_time() {
        let orchestrator = Orchestrator::new(CountingRunner::default(), None);

        let manifest = orchestrator
            .run_queue(queue(&["a", "b"]), 0, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(orchestrator.runner.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_new_chunks_and_flushes() {
        let output = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let runner = CountingRunner {
            cancel_after: Some((1, cancel.clone())),
            ..CountingRunner::default()
        };
        let store = ManifestStore::new(output.path());
        let orchestrator = Orchestrator::new(runner, Some(store.clone()));

        let manifest = orchestrator
            .run_queue(queue(&["a", "b", "c", "d"]), 2, &cancel)
            .await
            .unwrap();

        // the chunk in flight finishes, the next one never starts
        assert_eq!(manifest.entries.len(), 2);
        assert!(manifest.interrupted);
        let run_dir = store.run_dir(&manifest).join("poa");
        assert!(run_dir.join("a.yaml").is_file());
        assert!(run_dir.join("b.yaml").is_file());
        assert!(!run_dir.join("c.yaml").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_siblings() {
        let orchestrator = Orchestrator::new(CountingRunner::default(), None);

        let manifest = orchestrator
            .run_queue(queue(&["bad-1", "good", "bad-2"]), 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.entries.len(), 3);
        let summary = manifest.summary();
        assert_eq!(summary.passed, 1);
        let failed: Vec<&str> = summary.failed.iter().map(|f| f.name.as_str()).collect();
        assert!(failed.contains(&"bad-1") && failed.contains(&"bad-2"));
    }
}
