use std::time::Duration;

use tracing::{debug, warn};

/// Which half of the loop a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Decide,
    Act,
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Decide => "decide",
            StepKind::Act => "act",
        }
    }
}

/// Instrumentation hook invoked around each Decide/Act step.
///
/// Injected into the loop at construction time; implementations must be
/// cheap and must not fail.
pub trait StepObserver: Send + Sync {
    fn on_step_start(&self, _session_id: &str, _kind: StepKind, _iteration: usize) {}

    fn on_step_end(
        &self,
        _session_id: &str,
        _kind: StepKind,
        _iteration: usize,
        _elapsed: Duration,
        _error: Option<&str>,
    ) {
    }
}

/// Observer that does nothing.
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Observer that logs step boundaries through `tracing`.
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_step_start(&self, session_id: &str, kind: StepKind, iteration: usize) {
        debug!("[{session_id}] {} step {iteration} started", kind.as_str());
    }

    fn on_step_end(
        &self,
        session_id: &str,
        kind: StepKind,
        iteration: usize,
        elapsed: Duration,
        error: Option<&str>,
    ) {
        match error {
            None => debug!(
                "[{session_id}] {} step {iteration} finished in {:.2}s",
                kind.as_str(),
                elapsed.as_secs_f64()
            ),
            Some(e) => warn!(
                "[{session_id}] {} step {iteration} failed after {:.2}s: {e}",
                kind.as_str(),
                elapsed.as_secs_f64()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingObserver {
        started: AtomicUsize,
        ended: AtomicUsize,
    }

    impl StepObserver for CountingObserver {
        fn on_step_start(&self, _session_id: &str, _kind: StepKind, _iteration: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_step_end(
            &self,
            _session_id: &str,
            _kind: StepKind,
            _iteration: usize,
            _elapsed: Duration,
            _error: Option<&str>,
        ) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_is_object_safe() {
        let observer: Arc<dyn StepObserver> = Arc::new(CountingObserver::default());
        observer.on_step_start("s", StepKind::Decide, 0);
        observer.on_step_end("s", StepKind::Decide, 0, Duration::from_millis(1), None);
    }
}
