pub mod database;
pub mod store;
pub mod types;

pub use database::{Database, PoolOptions};
pub use store::{SessionFilter, SessionStore, SessionUpdate};
pub use types::{Artifact, Message, Role, Session, SessionStatus, SessionSummary, ToolCall};
