//! Per-call execution context handed to tool handlers.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context for one tool invocation.
///
/// `permissions` is advisory: the dispatch layer never checks it, a handler
/// may consult it to short-circuit. The cancellation token fires when the
/// call's deadline passes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub user_id: String,
    pub session_id: String,
    pub permissions: HashSet<String>,
    pub metadata: HashMap<String, Value>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a context with the default `read` permission.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            permissions: HashSet::from(["read".to_string()]),
            metadata: HashMap::new(),
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new("default", "default")
    }
}
