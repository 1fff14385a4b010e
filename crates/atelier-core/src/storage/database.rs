use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::debug;

use crate::error::StorageError;

/// Bounds on the connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Idle connections the pool keeps open.
    pub min_idle: u32,
    /// Upper bound on open connections.
    pub max_size: u32,
    /// How long `execute`/`query` callers wait for a connection before
    /// failing with a connection error. Never blocks indefinitely.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_idle: 1,
            max_size: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    agent_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    input TEXT,
    output TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_agent_type ON sessions(agent_type);
CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    tool_calls TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_session_id ON artifacts(session_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_kind ON artifacts(kind);
";

/// Pooled handle to the session database.
///
/// Every statement runs inside its own transaction on a connection checked
/// out for just that statement, so no connection is held across a model or
/// tool invocation.
pub struct Database {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
}

impl Database {
    /// Open (or create) the database file and build the connection pool.
    pub fn open(path: &Path, options: PoolOptions) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Connection(format!("cannot create '{}': {e}", parent.display())))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        });

        let pool = Pool::builder()
            .min_idle(Some(options.min_idle))
            .max_size(options.max_size)
            .connection_timeout(options.acquire_timeout)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!(
            "opened '{}' (pool {}..{})",
            path.display(),
            options.min_idle,
            options.max_size
        );

        Ok(Self {
            pool: RwLock::new(Some(pool)),
        })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        let guard = self
            .pool
            .read()
            .map_err(|e| StorageError::Connection(format!("pool lock poisoned: {e}")))?;
        let pool = guard
            .as_ref()
            .ok_or_else(|| StorageError::Connection("pool is shut down".into()))?;
        pool.get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Idempotently create the tables and indexes. DDL rejection is fatal.
    pub fn initialize(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL).map_err(StorageError::Schema)
    }

    /// Run one statement inside a transaction that commits on success and
    /// rolls back on any error. Returns the number of affected rows.
    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let n = tx.execute(sql, params)?;
        tx.commit()?;
        Ok(n)
    }

    /// Run one query inside a transaction, mapping each result row.
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, StorageError>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut out = Vec::new();
        {
            let mut stmt = tx.prepare(sql)?;
            let rows = stmt.query_map(params, map)?;
            for row in rows {
                out.push(row?);
            }
        }
        tx.commit()?;
        Ok(out)
    }

    /// Run one query expected to yield at most a single row.
    pub fn query_row_opt<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>, StorageError>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let result = match tx.query_row(sql, params, map) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;
        Ok(result)
    }

    /// Release all pooled connections. Idempotent; once shut down, every
    /// subsequent call fails with a connection error.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.pool.write() {
            if guard.take().is_some() {
                debug!("connection pool released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.sqlite3"), PoolOptions::default()).unwrap();
        (db, dir)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (db, _dir) = open_temp();
        db.initialize().unwrap();
        db.initialize().unwrap();

        let tables = db
            .query_rows(
                "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('sessions', 'messages', 'artifacts')",
                [],
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn execute_and_query_roundtrip() {
        let (db, _dir) = open_temp();
        db.initialize().unwrap();

        let n = db
            .execute(
                "INSERT INTO sessions (id, agent_type, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params!["s1", "builder", "active", "2026-01-01T00:00:00Z", "2026-01-01T00:00:00Z"],
            )
            .unwrap();
        assert_eq!(n, 1);

        let status: Option<String> = db
            .query_row_opt("SELECT status FROM sessions WHERE id = ?1", ["s1"], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(status.as_deref(), Some("active"));

        let missing: Option<String> = db
            .query_row_opt("SELECT status FROM sessions WHERE id = ?1", ["nope"], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn malformed_statement_is_query_error() {
        let (db, _dir) = open_temp();
        db.initialize().unwrap();

        let err = db.execute("INSERT INTO nonexistent VALUES (1)", []).unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
    }

    #[test]
    fn foreign_key_violation_is_query_error() {
        let (db, _dir) = open_temp();
        db.initialize().unwrap();

        let err = db
            .execute(
                "INSERT INTO messages (id, session_id, role, content, created_at)
                 VALUES ('m1', 'no-such-session', 'user', 'hi', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
    }

    #[test]
    fn shutdown_is_idempotent_and_terminal() {
        let (db, _dir) = open_temp();
        db.initialize().unwrap();

        db.shutdown();
        db.shutdown();

        let err = db.execute("SELECT 1", []).unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
    }
}
