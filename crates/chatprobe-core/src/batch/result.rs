use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::Turn;

/// Verdict and transcript of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub name: String,
    pub app_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub transcript: Vec<Turn>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn passed(
        name: impl Into<String>,
        app_id: impl Into<String>,
        transcript: Vec<Turn>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
            success: true,
            reason: None,
            transcript,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        app_id: impl Into<String>,
        reason: impl Into<String>,
        transcript: Vec<Turn>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
            success: false,
            reason: Some(reason.into()),
            transcript,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
