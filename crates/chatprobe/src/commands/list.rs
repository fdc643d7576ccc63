use async_trait::async_trait;
use eyre::{Result, WrapErr};
use std::path::PathBuf;

use super::Command;
use chatprobe_core::batch::{BatchDefinition, BatchFilter, discover};

pub struct ListCommand {
    pub path: PathBuf,
    pub names: Vec<String>,
}

impl ListCommand {
    pub fn matching(&self) -> Result<Vec<BatchDefinition>> {
        let filter = BatchFilter::new(&self.names);
        let batches = discover(&self.path)
            .wrap_err_with(|| format!("Failed to read batches under {}", self.path.display()))?;
        Ok(batches
            .into_iter()
            .filter(|batch| filter.matches(batch))
            .collect())
    }
}

#[async_trait]
impl Command for ListCommand {
    async fn execute(&self) -> Result<()> {
        let batches = self.matching()?;
        if batches.is_empty() {
            println!("No batches found under {}", self.path.display());
            return Ok(());
        }

        for batch in &batches {
            let mut line = format!(
                "{:<24} {:<12} {} step(s)",
                batch.name,
                batch.app_id(),
                batch.chat.len()
            );
            if !batch.settings_overrides.is_empty() {
                line.push_str(&format!(", {} override(s)", batch.settings_overrides.len()));
            }
            println!("{line}  {}", batch.file_path.display());
        }
        println!("{} batch(es)", batches.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_only_matching_batches() {
        let dir = TempDir::new().unwrap();
        let tests = dir.path().join("poa/tests");
        fs::create_dir_all(&tests).unwrap();
        fs::write(dir.path().join("poa/app.yaml"), "appId: poa\n").unwrap();
        fs::write(tests.join("ticket.yaml"), "chat:\n  - message: hi\n").unwrap();
        fs::write(tests.join("hours.yaml"), "chat:\n  - message: hi\n").unwrap();

        let command = ListCommand {
            path: dir.path().to_path_buf(),
            names: vec!["ticket".to_string()],
        };
        let names: Vec<String> = command
            .matching()
            .unwrap()
            .into_iter()
            .map(|batch| batch.name)
            .collect();
        assert_eq!(names, ["ticket"]);
    }
}
