use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use tracing::debug;

use crate::error::StorageError;
use crate::storage::database::Database;
use crate::storage::types::{
    Artifact, Message, Role, Session, SessionStatus, SessionSummary, ToolCall,
};

/// Timestamps are stored as fixed-width RFC 3339 text so lexicographic
/// order matches chronological order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn to_json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn from_json_text(text: Option<String>) -> Option<serde_json::Value> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}

/// Partial update of a session row. Omitted fields are left untouched:
/// they are omitted from the generated statement, not overwritten.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub output: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

/// Conjunctive filters for session listing.
#[derive(Debug, Clone)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub agent_type: Option<String>,
    pub status: Option<SessionStatus>,
    pub limit: usize,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            agent_type: None,
            status: None,
            limit: 50,
        }
    }
}

/// CRUD operations over sessions, their message history, and artifacts.
/// Each operation is a single statement on one pooled connection.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session with status `active`.
    ///
    /// A write failure propagates: a run must not start without a durable
    /// session row.
    pub fn create_session(
        &self,
        agent_type: &str,
        user_id: Option<&str>,
        input: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Session, StorageError> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(|s| s.to_string()),
            agent_type: agent_type.to_string(),
            status: SessionStatus::Active,
            input,
            output: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        self.db.execute(
            "INSERT INTO sessions (id, user_id, agent_type, status, input, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                session.id,
                session.user_id,
                session.agent_type,
                session.status.as_str(),
                to_json_text(&session.input),
                to_json_text(&session.metadata),
                format_ts(now),
                format_ts(now),
            ],
        )?;

        debug!("created session {} ({agent_type})", session.id);
        Ok(session)
    }

    /// Apply a partial update; always refreshes `updated_at`.
    pub fn update_session(&self, id: &str, update: SessionUpdate) -> Result<(), StorageError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(output) = &update.output {
            sets.push("output = ?");
            values.push(Box::new(output.to_string()));
        }
        if let Some(metadata) = &update.metadata {
            sets.push("metadata = ?");
            values.push(Box::new(metadata.to_string()));
        }
        sets.push("updated_at = ?");
        values.push(Box::new(format_ts(Utc::now())));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE sessions SET {} WHERE id = ?", sets.join(", "));
        self.db
            .execute(&sql, rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())))?;
        Ok(())
    }

    /// Append one message to a session's history. Messages are immutable.
    pub fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        tool_calls: Option<Vec<ToolCall>>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Message, StorageError> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            tool_calls,
            metadata,
            created_at: Utc::now(),
        };

        let tool_calls_text = message
            .tool_calls
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_default());

        self.db.execute(
            "INSERT INTO messages (id, session_id, role, content, tool_calls, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id,
                message.session_id,
                message.role.as_str(),
                message.content,
                tool_calls_text,
                to_json_text(&message.metadata),
                format_ts(message.created_at),
            ],
        )?;

        Ok(message)
    }

    /// All messages of a session in causal order (creation time ascending,
    /// insertion order as tiebreaker). Unknown sessions yield an empty vec.
    pub fn get_session_messages(&self, session_id: &str) -> Result<Vec<Message>, StorageError> {
        self.db.query_rows(
            "SELECT id, session_id, role, content, tool_calls, metadata, created_at
             FROM messages
             WHERE session_id = ?1
             ORDER BY created_at ASC, rowid ASC",
            [session_id],
            |row| {
                let role: String = row.get(2)?;
                let tool_calls: Option<String> = row.get(4)?;
                let metadata: Option<String> = row.get(5)?;
                let created_at: String = row.get(6)?;
                Ok(Message {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: Role::from_str(&role).unwrap_or(Role::System),
                    content: row.get(3)?,
                    tool_calls: tool_calls.and_then(|t| serde_json::from_str(&t).ok()),
                    metadata: from_json_text(metadata),
                    created_at: parse_ts(&created_at),
                })
            },
        )
    }

    /// Persist a durable deliverable produced during or after a run.
    pub fn save_artifact(
        &self,
        session_id: &str,
        kind: &str,
        name: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Artifact, StorageError> {
        let artifact = Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        self.db.execute(
            "INSERT INTO artifacts (id, session_id, kind, name, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                artifact.id,
                artifact.session_id,
                artifact.kind,
                artifact.name,
                artifact.content,
                to_json_text(&artifact.metadata),
                format_ts(artifact.created_at),
            ],
        )?;

        debug!("saved artifact '{}' ({kind}) for session {session_id}", artifact.name);
        Ok(artifact)
    }

    /// All artifacts of a session, newest first. Artifacts are typically
    /// consumed most-recent-first, the reverse of message order.
    pub fn get_session_artifacts(&self, session_id: &str) -> Result<Vec<Artifact>, StorageError> {
        self.db.query_rows(
            "SELECT id, session_id, kind, name, content, metadata, created_at
             FROM artifacts
             WHERE session_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            [session_id],
            |row| {
                let metadata: Option<String> = row.get(5)?;
                let created_at: String = row.get(6)?;
                Ok(Artifact {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    kind: row.get(2)?,
                    name: row.get(3)?,
                    content: row.get(4)?,
                    metadata: from_json_text(metadata),
                    created_at: parse_ts(&created_at),
                })
            },
        )
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>, StorageError> {
        self.db.query_row_opt(
            "SELECT id, user_id, agent_type, status, input, output, metadata, created_at, updated_at
             FROM sessions
             WHERE id = ?1",
            [id],
            |row| {
                let status: String = row.get(3)?;
                let input: Option<String> = row.get(4)?;
                let output: Option<String> = row.get(5)?;
                let metadata: Option<String> = row.get(6)?;
                let created_at: String = row.get(7)?;
                let updated_at: String = row.get(8)?;
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    agent_type: row.get(2)?,
                    status: SessionStatus::from_str(&status).unwrap_or(SessionStatus::Active),
                    input: from_json_text(input),
                    output: from_json_text(output),
                    metadata: from_json_text(metadata),
                    created_at: parse_ts(&created_at),
                    updated_at: parse_ts(&updated_at),
                })
            },
        )
    }

    /// List sessions newest-first. Filters are conjunctive; the limit is
    /// enforced in the query, not by trimming a larger result.
    pub fn list_sessions(&self, filter: SessionFilter) -> Result<Vec<SessionSummary>, StorageError> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(user_id) = &filter.user_id {
            conditions.push("user_id = ?");
            values.push(Box::new(user_id.clone()));
        }
        if let Some(agent_type) = &filter.agent_type {
            conditions.push("agent_type = ?");
            values.push(Box::new(agent_type.clone()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(Box::new(filter.limit as i64));

        let sql = format!(
            "SELECT id, user_id, agent_type, status, created_at, updated_at
             FROM sessions
             {where_clause}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        );

        self.db.query_rows(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            |row| {
                let status: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                let updated_at: String = row.get(5)?;
                Ok(SessionSummary {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    agent_type: row.get(2)?,
                    status: SessionStatus::from_str(&status).unwrap_or(SessionStatus::Active),
                    created_at: parse_ts(&created_at),
                    updated_at: parse_ts(&updated_at),
                })
            },
        )
    }

    /// Administrative removal. Cascades to the session's messages and
    /// artifacts. Returns whether a row was deleted.
    pub fn delete_session(&self, id: &str) -> Result<bool, StorageError> {
        let n = self.db.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::PoolOptions;
    use serde_json::json;

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("store.sqlite3"), PoolOptions::default()).unwrap();
        db.initialize().unwrap();
        (SessionStore::new(Arc::new(db)), dir)
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (store, _dir) = test_store();
        let created = store
            .create_session(
                "builder",
                Some("u1"),
                Some(json!({"request": "a todo app"})),
                Some(json!({"channel": "cli"})),
            )
            .unwrap();

        let loaded = store.get_session(&created.id).unwrap().unwrap();
        assert_eq!(loaded.agent_type, "builder");
        assert_eq!(loaded.user_id.as_deref(), Some("u1"));
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.input, Some(json!({"request": "a todo app"})));
        assert_eq!(loaded.metadata, Some(json!({"channel": "cli"})));
        assert!(loaded.output.is_none());
    }

    #[test]
    fn get_unknown_session_is_none() {
        let (store, _dir) = test_store();
        assert!(store.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn update_leaves_unsupplied_fields_untouched() {
        let (store, _dir) = test_store();
        let session = store.create_session("builder", None, None, None).unwrap();

        store
            .update_session(
                &session.id,
                SessionUpdate {
                    output: Some(json!({"content": "done"})),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .update_session(
                &session.id,
                SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.output, Some(json!({"content": "done"})));
    }

    #[test]
    fn messages_in_causal_order() {
        let (store, _dir) = test_store();
        let session = store.create_session("builder", None, None, None).unwrap();

        store
            .add_message(&session.id, Role::User, "build me an app", None, None)
            .unwrap();
        store
            .add_message(
                &session.id,
                Role::Assistant,
                "",
                Some(vec![ToolCall {
                    id: "call-1".into(),
                    name: "analyze_requirements".into(),
                    arguments: json!({"request": "an app"}),
                }]),
                None,
            )
            .unwrap();
        store
            .add_message(
                &session.id,
                Role::Tool,
                "{\"app_type\": \"web_application\"}",
                None,
                Some(json!({"tool_call_id": "call-1"})),
            )
            .unwrap();

        let messages = store.get_session_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 3);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }

        // A tool result must be preceded by an assistant message.
        let tool_pos = messages.iter().position(|m| m.role == Role::Tool).unwrap();
        assert!(messages[..tool_pos].iter().any(|m| m.role == Role::Assistant));

        let calls = messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].name, "analyze_requirements");
    }

    #[test]
    fn messages_for_unknown_session_are_empty() {
        let (store, _dir) = test_store();
        assert!(store.get_session_messages("missing").unwrap().is_empty());
    }

    #[test]
    fn artifacts_newest_first() {
        let (store, _dir) = test_store();
        let session = store.create_session("builder", None, None, None).unwrap();

        store
            .save_artifact(&session.id, "code", "first.tsx", "// first", None)
            .unwrap();
        store
            .save_artifact(&session.id, "code", "second.tsx", "// second", None)
            .unwrap();

        let artifacts = store.get_session_artifacts(&session.id).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "second.tsx");
        assert_eq!(artifacts[1].name, "first.tsx");
    }

    #[test]
    fn list_sessions_filters_and_limit() {
        let (store, _dir) = test_store();
        for _ in 0..5 {
            store.create_session("builder", Some("u1"), None, None).unwrap();
        }
        store.create_session("database", Some("u2"), None, None).unwrap();

        let listed = store
            .list_sessions(SessionFilter {
                user_id: Some("u1".into()),
                limit: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.user_id.as_deref() == Some("u1")));
        // Newest first.
        assert!(listed[0].created_at >= listed[1].created_at);

        let by_agent = store
            .list_sessions(SessionFilter {
                agent_type: Some("database".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_agent.len(), 1);
        assert_eq!(by_agent[0].user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn list_sessions_filters_are_conjunctive() {
        let (store, _dir) = test_store();
        let s = store.create_session("builder", Some("u1"), None, None).unwrap();
        store.create_session("builder", Some("u2"), None, None).unwrap();
        store
            .update_session(
                &s.id,
                SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        let listed = store
            .list_sessions(SessionFilter {
                user_id: Some("u1".into()),
                agent_type: Some("builder".into()),
                status: Some(SessionStatus::Completed),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, s.id);
    }

    #[test]
    fn delete_session_cascades() {
        let (store, _dir) = test_store();
        let session = store.create_session("builder", None, None, None).unwrap();
        store
            .add_message(&session.id, Role::User, "hello", None, None)
            .unwrap();
        store
            .save_artifact(&session.id, "code", "a.tsx", "// a", None)
            .unwrap();

        assert!(store.delete_session(&session.id).unwrap());
        assert!(store.get_session(&session.id).unwrap().is_none());
        assert!(store.get_session_messages(&session.id).unwrap().is_empty());
        assert!(store.get_session_artifacts(&session.id).unwrap().is_empty());

        assert!(!store.delete_session(&session.id).unwrap());
    }
}
