use async_trait::async_trait;
use eyre::{Result, bail};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Command;
use chatprobe_core::batch::{BatchRunner, RunnerOptions};
use chatprobe_core::config::ProbeConfig;
use chatprobe_core::orchestrator::{ManifestStore, Orchestrator, RunManifest};

pub struct BatchCommand {
    pub path: PathBuf,
    pub names: Vec<String>,
    pub show_chat: bool,
    pub config: ProbeConfig,
}

#[async_trait]
impl Command for BatchCommand {
    async fn execute(&self) -> Result<()> {
        let platform = crate::connect_platform(&self.config)?;
        let runner = BatchRunner::new(
            platform,
            RunnerOptions {
                timing: self.config.polling.timing(),
                default_language: self.config.language.clone(),
                show_chat: self.show_chat,
            },
        );
        let store = self.config.output_dir.clone().map(ManifestStore::new);
        let orchestrator = Orchestrator::new(runner, store.clone());

        let cancel = CancellationToken::new();
        let interrupts = tokio::spawn(watch_interrupts(cancel.clone()));

        let manifest = orchestrator
            .run(&self.path, &self.names, self.config.concurrency, &cancel)
            .await;
        interrupts.abort();
        let manifest = manifest?;

        print_summary(&manifest, store.as_ref());

        if manifest.interrupted {
            bail!("Interrupted before every batch had run");
        }
        if !manifest.success() {
            let summary = manifest.summary();
            bail!("{} of {} runs failed", summary.failed.len(), summary.total);
        }
        Ok(())
    }
}

/// First Ctrl-C stops new runs from starting; a second one exits at once.
/// Results are saved as each run ends, so nothing finished is lost either way.
async fn watch_interrupts(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_err() {
        return;
    }
    warn!(target: "chatprobe::batch", "Interrupted, waiting for runs in progress (Ctrl-C again to quit now)");
    cancel.cancel();

    if signal::ctrl_c().await.is_ok() {
        info!(target: "chatprobe::batch", "Interrupted again, exiting");
        std::process::exit(130);
    }
}

fn print_summary(manifest: &RunManifest, store: Option<&ManifestStore>) {
    let summary = manifest.summary();
    println!();
    println!(
        "{} run(s): {} passed, {} failed",
        summary.total,
        summary.passed,
        summary.failed.len()
    );
    for failed in &summary.failed {
        println!("  FAILED {}/{}: {}", failed.app_id, failed.name, failed.reason);
    }
    if let Some(store) = store {
        println!("Results saved to {}", store.run_dir(manifest).display());
    }
}
