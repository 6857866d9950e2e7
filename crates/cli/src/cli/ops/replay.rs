use std::path::PathBuf;

use clap::{Args, ValueEnum};

use bucket_ledger::replay::{self, ReplayError, Script};
use bucket_ledger::state::{AppState, StateError};

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct Replay {
    /// Path to the JSON operation script
    pub script: PathBuf,

    /// Output format for the report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayOpError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Replay {
    type Error = ReplayOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let account = state.account()?;

        let json = tokio::fs::read_to_string(&self.script)
            .await
            .map_err(|source| ReplayOpError::Read {
                path: self.script.clone(),
                source,
            })?;
        let script = Script::from_json(&json)?;

        tracing::info!(
            script = %self.script.display(),
            steps = script.steps.len(),
            "replaying script"
        );
        let report = replay::replay(&script, account, &state.config).await?;

        match self.format {
            OutputFormat::Json => Ok(report.to_json()?),
            OutputFormat::Text => Ok(report.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};

    const SCRIPT: &str = r#"{
        "participants": ["alice", "bob"],
        "steps": [
            { "op": "set_key", "sender": "alice", "participant": "alice", "key": "k0" },
            { "op": "create", "sender": "alice",
              "elements": [{ "meta": "m1", "data": "d1", "container": "c1" }] },
            { "op": "announce_holding", "sender": "bob", "element": 1 },
            { "op": "remove", "sender": "bob",
              "elements": [{ "meta": "m1", "data": "d1", "container": "c1" }] }
        ]
    }"#;

    fn setup() -> (tempfile::TempDir, OpContext, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        AppState::init(Some(state_dir.clone()), None).unwrap();
        let script = dir.path().join("script.json");
        std::fs::write(&script, SCRIPT).unwrap();
        (dir, OpContext::new(Some(state_dir)), script)
    }

    #[tokio::test]
    async fn test_replay_json() {
        let (_dir, ctx, script) = setup();
        let op = Replay {
            script,
            format: OutputFormat::Json,
        };

        let output = op.execute(&ctx).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["allElements"].as_array().unwrap().len(), 3);
        assert_eq!(json["history"].as_array().unwrap().len(), 6);
        assert_eq!(json["versions"]["d1"], "0x0");
        assert!(json["steps"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["status"] == "ok"));
    }

    #[tokio::test]
    async fn test_replay_text() {
        let (_dir, ctx, script) = setup();
        let op = Replay {
            script,
            format: OutputFormat::Text,
        };

        let output = op.execute(&ctx).await.unwrap();
        assert!(output.contains("[3] remove @1: ok"));
        assert!(output.contains("by bob"));
        assert!(output.contains("[removed]"));
    }

    #[tokio::test]
    async fn test_replay_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("missing")));
        let op = Replay {
            script: dir.path().join("script.json"),
            format: OutputFormat::Text,
        };

        assert!(matches!(
            op.execute(&ctx).await,
            Err(ReplayOpError::State(StateError::NotInitialized))
        ));
    }

    #[tokio::test]
    async fn test_replay_missing_script() {
        let (dir, ctx, _) = setup();
        let op = Replay {
            script: dir.path().join("nope.json"),
            format: OutputFormat::Json,
        };

        assert!(matches!(
            op.execute(&ctx).await,
            Err(ReplayOpError::Read { .. })
        ));
    }
}
