//! Run submission and polling, the surface an external transport layer
//! (HTTP, CLI) consumes: create the session, seed the conversation, drive
//! the control loop, and report status from persisted state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentLoop, AgentProfile, ModelProvider, StepObserver, TracingObserver};
use crate::error::StorageError;
use crate::storage::{Role, SessionStatus, SessionStore};

/// Client-facing status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// What a caller sees when submitting or polling a run. Every field is
/// reconstructed from committed state, so a poll never observes a
/// half-written step.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub status: RunStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Knobs for one run. All externally supplied; the defaults are safe
/// fallbacks, not policy baked into the loop.
pub struct RunOptions {
    pub max_iterations: usize,
    pub step_timeout: Duration,
    pub cancel: CancellationToken,
    pub observer: Arc<dyn StepObserver>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            step_timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
            observer: Arc::new(TracingObserver),
        }
    }
}

/// Create a session for `request`, seed it with the profile's preamble and
/// the user message, and drive the loop to termination.
///
/// Session creation failures propagate; a run never starts without a
/// durable session row. A loop failure is reported as a `Failed` run, with
/// the same description recorded in the session's metadata.
pub async fn submit(
    store: &SessionStore,
    model: Arc<dyn ModelProvider>,
    profile: &AgentProfile,
    user_id: Option<&str>,
    request: &str,
    options: RunOptions,
) -> Result<RunReport, StorageError> {
    let session = store.create_session(
        &profile.agent_type,
        user_id,
        Some(serde_json::json!({"request": request})),
        None,
    )?;

    if !profile.preamble.is_empty() {
        store.add_message(&session.id, Role::System, &profile.preamble, None, None)?;
    }
    store.add_message(&session.id, Role::User, request, None, None)?;

    let agent_loop = AgentLoop::new(
        store.clone(),
        model,
        options.max_iterations,
        options.step_timeout,
    )
    .with_observer(options.observer)
    .with_cancellation(options.cancel);

    match agent_loop.run(profile, &session.id).await {
        Ok(outcome) => Ok(RunReport {
            session_id: session.id,
            status: RunStatus::Success,
            output: Some(outcome.output),
            error: None,
        }),
        Err(err) => Ok(RunReport {
            session_id: session.id,
            status: RunStatus::Failed,
            output: None,
            error: Some(err.to_string()),
        }),
    }
}

/// Reconstruct a run's status from persisted state alone.
pub fn poll(store: &SessionStore, session_id: &str) -> Result<Option<RunReport>, StorageError> {
    let Some(session) = store.get_session(session_id)? else {
        return Ok(None);
    };

    let status = match session.status {
        SessionStatus::Completed => RunStatus::Success,
        SessionStatus::Failed => RunStatus::Failed,
        SessionStatus::Active => {
            if store.get_session_messages(session_id)?.is_empty() {
                RunStatus::Pending
            } else {
                RunStatus::Running
            }
        }
    };

    let output = session
        .output
        .as_ref()
        .and_then(|o| o.get("content"))
        .and_then(|c| c.as_str())
        .map(String::from);
    let error = session
        .metadata
        .as_ref()
        .and_then(|m| m.get("error"))
        .and_then(|e| e.as_str())
        .map(String::from);

    Ok(Some(RunReport {
        session_id: session.id,
        status,
        output,
        error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelProvider, ModelReply};
    use crate::storage::{Database, Message, PoolOptions, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<ModelReply>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<ModelReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedModel {
        async fn invoke(&self, _messages: &[Message]) -> anyhow::Result<ModelReply> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("runs.sqlite3"), PoolOptions::default()).unwrap();
        db.initialize().unwrap();
        (SessionStore::new(std::sync::Arc::new(db)), dir)
    }

    #[tokio::test]
    async fn submit_and_poll_successful_run() {
        let (store, _dir) = test_store();
        let model = ScriptedModel::new(vec![
            ModelReply {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "analyze_requirements".into(),
                    arguments: json!({"request": "a todo app"}),
                }],
            },
            ModelReply::text("Here is your app plan."),
        ]);

        let report = submit(
            &store,
            model,
            &AgentProfile::builder(),
            Some("u1"),
            "build me a todo app",
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.output.as_deref(), Some("Here is your app plan."));
        assert!(report.error.is_none());

        // Seed messages (system + user) precede the loop's messages.
        let messages = store.get_session_messages(&report.session_id).unwrap();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "build me a todo app");
        assert_eq!(messages.len(), 5);

        let polled = poll(&store, &report.session_id).unwrap().unwrap();
        assert_eq!(polled.status, RunStatus::Success);
        assert_eq!(polled.output.as_deref(), Some("Here is your app plan."));
    }

    #[tokio::test]
    async fn failed_run_is_reported_and_queryable() {
        let (store, _dir) = test_store();
        // The script runs dry on the first decide, failing the run.
        let model = ScriptedModel::new(vec![]);

        let report = submit(
            &store,
            model,
            &AgentProfile::builder(),
            None,
            "anything",
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        let error = report.error.unwrap();
        assert!(error.contains("model invocation failed"));

        let polled = poll(&store, &report.session_id).unwrap().unwrap();
        assert_eq!(polled.status, RunStatus::Failed);
        assert!(polled.error.unwrap().contains("model invocation failed"));
    }

    #[test]
    fn poll_unknown_session_is_none() {
        let (store, _dir) = test_store();
        assert!(poll(&store, "missing").unwrap().is_none());
    }

    #[test]
    fn poll_distinguishes_pending_from_running() {
        let (store, _dir) = test_store();
        let session = store.create_session("builder", None, None, None).unwrap();

        let report = poll(&store, &session.id).unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Pending);

        store
            .add_message(&session.id, Role::User, "hello", None, None)
            .unwrap();
        let report = poll(&store, &session.id).unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Running);
    }
}
