use std::fs;
use std::path::{Path, PathBuf};

use glob::{Pattern, glob};
use tracing::{debug, warn};

use super::{AppDescriptor, BatchDefinition};
use crate::error::{Error, Result};

const APP_DESCRIPTOR: &str = "app.yaml";
const TESTS_DIR: &str = "tests";

/// Finds every batch definition under `root`.
///
/// Each `tests` directory below `root` holds the batches of one application,
/// described by the `app.yaml` beside it. When there is no such directory,
/// `root` itself is treated as a tests directory.
pub fn discover(root: &Path) -> Result<Vec<BatchDefinition>> {
    if !root.is_dir() {
        return Err(Error::Configuration(format!(
            "batch directory {} does not exist",
            root.display()
        )));
    }

    let tests_dirs = find_tests_dirs(root)?;
    let mut definitions = Vec::new();
    if tests_dirs.is_empty() {
        definitions.extend(load_tests_dir(root));
    } else {
        for dir in tests_dirs {
            definitions.extend(load_tests_dir(&dir));
        }
    }

    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(target: "chatprobe::batch", root = %root.display(), count = definitions.len(), "Discovered batches");
    Ok(definitions)
}

fn find_tests_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/{TESTS_DIR}",
        Pattern::escape(&root.to_string_lossy())
    );
    let paths = glob(&pattern).map_err(|e| Error::Configuration(format!("invalid batch path: {e}")))?;

    Ok(paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(target: "chatprobe::batch", error = %e, "Cannot read directory");
                None
            }
        })
        .filter(|path| path.is_dir())
        .collect())
}

fn load_app_descriptor(dir: &Path) -> Option<AppDescriptor> {
    let path = dir.join(APP_DESCRIPTOR);
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(&path)
        .map_err(Error::from)
        .and_then(|content| serde_yaml::from_str(&content).map_err(Error::from))
    {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!(target: "chatprobe::batch", path = %path.display(), error = %e, "Ignoring unreadable app descriptor");
            None
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

/// Loads the batches of one tests directory. An unreadable directory is
/// logged and yields nothing.
fn load_tests_dir(dir: &Path) -> Vec<BatchDefinition> {
    let app = dir
        .parent()
        .and_then(load_app_descriptor)
        .unwrap_or_default();
    debug!(target: "chatprobe::batch", dir = %dir.display(), app_id = app.app_id.as_deref().unwrap_or_default(), "Loading batches");

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(target: "chatprobe::batch", dir = %dir.display(), error = %e, "Cannot read tests directory, skipping");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_yaml(path))
        .filter(|path| path.file_name().is_some_and(|name| name != APP_DESCRIPTOR))
        .collect();
    files.sort();

    files
        .into_iter()
        .filter_map(|path| load_definition(&path, &app))
        .collect()
}

fn load_definition(path: &Path, app: &AppDescriptor) -> Option<BatchDefinition> {
    let parsed = fs::read_to_string(path)
        .map_err(Error::from)
        .and_then(|content| serde_yaml::from_str::<BatchDefinition>(&content).map_err(Error::from));
    let mut definition = match parsed {
        Ok(definition) => definition,
        Err(e) => {
            warn!(target: "chatprobe::batch", path = %path.display(), error = %e, "Failed to load batch, skipping");
            return None;
        }
    };

    if definition.app_id.as_deref().is_none_or(str::is_empty) {
        definition.app_id.clone_from(&app.app_id);
    }
    if definition.app_id.as_deref().is_none_or(str::is_empty) {
        warn!(target: "chatprobe::batch", path = %path.display(), "appId is missing, skipping");
        return None;
    }
    if definition.chat.is_empty() {
        warn!(target: "chatprobe::batch", path = %path.display(), "No chat steps, skipping");
        return None;
    }

    definition.name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    definition.file_path = path.to_path_buf();
    definition.settings = app.settings.merged(&definition.settings);
    Some(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::TestStep;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_repository_layout_with_inheritance() {
        let root = TempDir::new().unwrap();
        let poa = root.path().join("apps/poa");
        write(
            &poa,
            "app.yaml",
            "appId: poa\nsettings:\n  language: it-IT\n  avatar: marco\n",
        );
        write(
            &poa.join("tests"),
            "ticket.yaml",
            "settings:\n  avatar: giulia\nchat:\n  - message: Ciao\n",
        );
        write(
            &poa.join("tests"),
            "hours.yml",
            "appId: other\nchat:\n  - message: Orari?\n",
        );

        let batches = discover(root.path()).unwrap();
        let names: Vec<&str> = batches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["hours", "ticket"]);

        let ticket = &batches[1];
        assert_eq!(ticket.app_id(), "poa");
        assert_eq!(ticket.settings.language.as_deref(), Some("it-IT"));
        assert_eq!(
            ticket.settings.extra.get("avatar"),
            Some(&serde_json::json!("giulia"))
        );
        assert_eq!(ticket.chat, vec![TestStep::Message("Ciao".into())]);
        assert!(ticket.file_path.ends_with("apps/poa/tests/ticket.yaml"));

        assert_eq!(batches[0].app_id(), "other");
    }

    #[test]
    fn plain_directory_uses_parent_descriptor() {
        let root = TempDir::new().unwrap();
        write(root.path(), "app.yaml", "appId: asa\n");
        let suite = root.path().join("suite");
        write(&suite, "quiz.yaml", "chat:\n  - select: 0\n");

        let batches = discover(&suite).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].app_id(), "asa");
    }

    #[test]
    fn skips_invalid_definitions() {
        let root = TempDir::new().unwrap();
        let tests = root.path().join("tests");
        write(&tests, "broken.yaml", "chat: [unterminated\n");
        write(&tests, "no-app.yaml", "chat:\n  - message: hi\n");
        write(root.path(), "app.yaml", "settings:\n  language: en-GB\n");
        write(&tests, "notes.txt", "appId: poa\nchat:\n  - message: hi\n");

        let other = root.path().join("other/tests");
        write(other.parent().unwrap(), "app.yaml", "appId: poa\n");
        write(&other, "empty.yaml", "chat: []\n");
        write(&other, "ok.yaml", "chat:\n  - wait: 1\n");

        let batches = discover(root.path()).unwrap();
        let names: Vec<&str> = batches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn unreadable_tests_dir_is_skipped() {
        let dir = TempDir::new().unwrap();
        assert!(load_tests_dir(&dir.path().join("gone/tests")).is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(discover(&root.path().join("nope")).is_err());
    }
}
