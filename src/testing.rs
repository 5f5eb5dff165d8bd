//! Shared test utilities for the relay mocks.
//!
//! The capture and sink mocks record every lifecycle call into a shared
//! [`CallLog`], so tests can assert on cross-component ordering (for example
//! that sinks close before the capture device does).

use std::sync::Arc;

use parking_lot::Mutex;

/// A lifecycle call observed by a mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Push(String),
    Close(String),
}

impl Call {
    /// Name of the component that received the call.
    pub fn component(&self) -> &str {
        match self {
            Self::Open(name) | Self::Push(name) | Self::Close(name) => name,
        }
    }
}

/// Append-only, cloneable record of mock calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    /// Copy of every call recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn opens(&self, component: &str) -> usize {
        self.count(|c| matches!(c, Call::Open(n) if n == component))
    }

    pub fn pushes(&self, component: &str) -> usize {
        self.count(|c| matches!(c, Call::Push(n) if n == component))
    }

    pub fn closes(&self, component: &str) -> usize {
        self.count(|c| matches!(c, Call::Close(n) if n == component))
    }

    /// Total number of close calls across all components.
    pub fn total_closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close(_)))
    }

    /// Components in the order they were closed.
    pub fn close_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Close(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }
}

/// Initialise a tracing subscriber for tests.
///
/// Respects `RUST_LOG`, defaults to `debug`. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_log() {
        let log = CallLog::new();
        let other = log.clone();
        other.record(Call::Open("camera".to_string()));
        log.record(Call::Close("camera".to_string()));

        assert_eq!(log.opens("camera"), 1);
        assert_eq!(other.closes("camera"), 1);
        assert_eq!(log.calls().len(), 2);
    }

    #[test]
    fn close_order_lists_only_closes() {
        let log = CallLog::new();
        log.record(Call::Open("a".to_string()));
        log.record(Call::Close("b".to_string()));
        log.record(Call::Push("a".to_string()));
        log.record(Call::Close("a".to_string()));

        assert_eq!(log.close_order(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(log.total_closes(), 2);
    }
}
