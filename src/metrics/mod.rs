//! Request counters for monitoring, rendered in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests dispatched
    pub requests_total: AtomicU64,
    /// Requests answered with a result
    pub requests_success: AtomicU64,
    /// Requests answered with a protocol error
    pub protocol_errors: AtomicU64,
    /// Tool invocations that reached a handler
    pub tool_calls: AtomicU64,
    /// Tool invocations whose handler failed (`isError: true`)
    pub tool_errors: AtomicU64,
    /// Tool invocations cut off by their deadline
    pub deadlines_exceeded: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_protocol_errors(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_errors(&self) {
        self.tool_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deadlines(&self) {
        self.deadlines_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            deadlines_exceeded: self.deadlines_exceeded.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP assistant_mcp_requests_total Total number of MCP requests
# TYPE assistant_mcp_requests_total counter
assistant_mcp_requests_total {}

# HELP assistant_mcp_requests_success Requests answered with a result
# TYPE assistant_mcp_requests_success counter
assistant_mcp_requests_success {}

# HELP assistant_mcp_protocol_errors Requests answered with a protocol error
# TYPE assistant_mcp_protocol_errors counter
assistant_mcp_protocol_errors {}

# HELP assistant_mcp_tool_calls Tool invocations
# TYPE assistant_mcp_tool_calls counter
assistant_mcp_tool_calls {}

# HELP assistant_mcp_tool_errors Tool invocations that reported an error
# TYPE assistant_mcp_tool_errors counter
assistant_mcp_tool_errors {}

# HELP assistant_mcp_deadlines_exceeded Tool invocations cut off by their deadline
# TYPE assistant_mcp_deadlines_exceeded counter
assistant_mcp_deadlines_exceeded {}
"#,
            s.requests_total,
            s.requests_success,
            s.protocol_errors,
            s.tool_calls,
            s.tool_errors,
            s.deadlines_exceeded
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub protocol_errors: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub deadlines_exceeded: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
