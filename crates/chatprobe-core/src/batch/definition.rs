use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::steps::TestStep;

/// Application settings a batch runs with. Keys other than `language` and
/// `llm` are carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BatchSettings {
    /// Shallow merge: every key set in `patch` replaces the one in `self`.
    pub fn merged(&self, patch: &BatchSettings) -> BatchSettings {
        let mut extra = self.extra.clone();
        extra.extend(patch.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        BatchSettings {
            language: patch.language.clone().or_else(|| self.language.clone()),
            llm: patch.llm.clone().or_else(|| self.llm.clone()),
            extra,
        }
    }
}

/// `app.yaml` next to a `tests` directory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub settings: BatchSettings,
}

/// A scripted conversation against one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDefinition {
    /// File stem of the definition, or `<stem>@<n>` for the n-th settings
    /// override.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub settings: BatchSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings_overrides: Vec<BatchSettings>,
    #[serde(default, alias = "steps")]
    pub chat: Vec<TestStep>,
}

impl BatchDefinition {
    pub fn app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or_default()
    }

    /// One runnable definition per settings override, or the definition
    /// itself when there are none.
    pub fn expand(&self) -> Vec<BatchDefinition> {
        if self.settings_overrides.is_empty() {
            return vec![self.clone()];
        }

        self.settings_overrides
            .iter()
            .enumerate()
            .map(|(i, patch)| BatchDefinition {
                name: format!("{}@{}", self.name, i + 1),
                settings: self.settings.merged(patch),
                settings_overrides: Vec::new(),
                ..self.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn definition(yaml: &str) -> BatchDefinition {
        let mut definition: BatchDefinition = serde_yaml::from_str(yaml).unwrap();
        definition.name = "ticket".into();
        definition
    }

    #[test]
    fn keeps_unknown_settings() {
        let definition = definition(
            r"
appId: poa
settings:
  language: it-IT
  avatar: marco
chat:
  - message: Ciao
",
        );
        assert_eq!(definition.settings.language.as_deref(), Some("it-IT"));
        assert_eq!(definition.settings.extra.get("avatar"), Some(&json!("marco")));
    }

    #[test]
    fn steps_is_an_alias_for_chat() {
        let definition = definition("appId: poa\nsteps:\n  - wait: 1\n");
        assert_eq!(definition.chat, vec![TestStep::Wait(Duration::from_secs(1))]);
    }

    #[test]
    fn expands_one_run_per_override() {
        let definition = definition(
            r"
appId: poa
settings:
  language: it-IT
  llm: { chat: openai/gpt-4o-mini }
settingsOverrides:
  - llm: { chat: openai/gpt-4o }
  - language: en-GB
chat:
  - message: Ciao
",
        );

        let runs = definition.expand();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "ticket@1");
        assert_eq!(runs[0].settings.language.as_deref(), Some("it-IT"));
        assert_eq!(
            runs[0].settings.llm.as_ref().and_then(|llm| llm.get("chat")),
            Some(&json!("openai/gpt-4o"))
        );
        assert_eq!(runs[1].name, "ticket@2");
        assert_eq!(runs[1].settings.language.as_deref(), Some("en-GB"));
        assert!(runs.iter().all(|run| run.settings_overrides.is_empty()));
    }

    #[test]
    fn no_overrides_is_a_single_run() {
        let definition = definition("appId: poa\nchat:\n  - message: hi\n");
        let runs = definition.expand();
        assert_eq!(runs, vec![definition]);
    }
}
