pub mod r#loop;
pub mod model;
pub mod observer;
pub mod profile;

pub use model::{ModelProvider, ModelReply};
pub use observer::{NoopObserver, StepKind, StepObserver, TracingObserver};
pub use profile::AgentProfile;
pub use r#loop::{AgentLoop, RunOutcome};
