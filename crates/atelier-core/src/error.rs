use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No pooled connection could be obtained within the bounded wait, or
    /// the pool has been shut down. Callers may retry with backoff.
    #[error("database connection unavailable: {0}")]
    Connection(String),

    /// A statement was rejected or a constraint violated. Not retryable.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Schema DDL was rejected. Fatal at startup.
    #[error("schema initialization failed: {0}")]
    Schema(#[source] rusqlite::Error),
}

/// Errors from tool dispatch and execution. Either one fails the run.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model requested a tool name that was never registered. This is
    /// a configuration error, not a retry condition.
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

/// Errors surfaced by a control-loop run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model invocation failed: {0}")]
    Model(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("loop bound of {0} iterations exceeded")]
    LoopBound(usize),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
