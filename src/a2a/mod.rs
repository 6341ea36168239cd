//! Agent-to-agent (A2A) messaging.
//!
//! A thin in-process router: messages are addressed by agent name and
//! handed to the registered [`A2aHandler`]. This sits outside MCP entirely;
//! a handler is free to use its own MCP-only agent underneath.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentBehavior, McpOnlyAgent};
use crate::error::Result;

/// Sender name used for workflow steps.
pub const WORKFLOW_SENDER: &str = "workflow_coordinator";

/// Default number of messages kept in the router's history.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Message priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A message from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aMessage {
    pub message_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub intent: String,
    pub payload: Value,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub requires_response: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl A2aMessage {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        intent: impl Into<String>,
        payload: Value,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            message_id: format!("msg_{}", Uuid::new_v4()),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            intent: intent.into(),
            payload,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            priority: Priority::Normal,
            requires_response: true,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Copy of this message addressed to another agent, with its own id.
    pub fn readdressed(&self, to_agent: &str) -> Self {
        Self {
            message_id: format!("msg_{}", Uuid::new_v4()),
            to_agent: to_agent.to_string(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// The request body an agent's `process_request` receives.
    pub fn to_request(&self) -> Value {
        json!({
            "intent": self.intent,
            "payload": self.payload,
            "from_agent": self.from_agent,
            "session_id": self.session_id,
            "message_id": self.message_id,
        })
    }
}

/// Reply to an [`A2aMessage`]. Sender and recipient are swapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aResponse {
    pub message_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl A2aResponse {
    pub fn ok(message: &A2aMessage, data: Value) -> Self {
        Self::reply(message, true, Some(data), None)
    }

    pub fn failed(message: &A2aMessage, error: impl Into<String>) -> Self {
        Self::reply(message, false, None, Some(error.into()))
    }

    fn reply(message: &A2aMessage, success: bool, data: Option<Value>, error: Option<String>) -> Self {
        Self {
            message_id: message.message_id.clone(),
            from_agent: message.to_agent.clone(),
            to_agent: message.from_agent.clone(),
            success,
            data,
            error,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }
}

/// Receives messages addressed to one agent.
#[async_trait]
pub trait A2aHandler: Send + Sync {
    async fn handle(&self, message: &A2aMessage) -> Result<Value>;
}

/// Adapter turning an async closure into an [`A2aHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> A2aHandler for FnHandler<F>
where
    F: Fn(A2aMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, message: &A2aMessage) -> Result<Value> {
        (self.f)(message.clone()).await
    }
}

/// An MCP-only agent behind a lock takes A2A messages as requests.
#[async_trait]
impl<B: AgentBehavior> A2aHandler for tokio::sync::Mutex<McpOnlyAgent<B>> {
    async fn handle(&self, message: &A2aMessage) -> Result<Value> {
        let mut agent = self.lock().await;
        agent.process_request(message.to_request()).await
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: String,
    pub intent: String,
    #[serde(default)]
    pub payload: Value,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: usize,
    pub agent: String,
    pub intent: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`A2aRouter::run_workflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Routes messages between named agents.
pub struct A2aRouter {
    handlers: HashMap<String, Arc<dyn A2aHandler>>,
    history: Mutex<Vec<A2aMessage>>,
    history_limit: usize,
}

impl Default for A2aRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl A2aRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            history: Mutex::new(Vec::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn register<H: A2aHandler + 'static>(&mut self, agent: impl Into<String>, handler: H) {
        self.register_arc(agent, Arc::new(handler));
    }

    pub fn register_arc(&mut self, agent: impl Into<String>, handler: Arc<dyn A2aHandler>) {
        let agent = agent.into();
        info!("Registered A2A agent: {}", agent);
        self.handlers.insert(agent, handler);
    }

    pub fn unregister(&mut self, agent: &str) -> bool {
        let removed = self.handlers.remove(agent).is_some();
        if removed {
            info!("Unregistered A2A agent: {}", agent);
        }
        removed
    }

    /// Registered agent names, sorted.
    pub fn agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver a message. Never fails: an unknown target or a handler
    /// error comes back as an unsuccessful response.
    pub async fn send(&self, message: A2aMessage) -> A2aResponse {
        let Some(handler) = self.handlers.get(&message.to_agent).cloned() else {
            warn!("A2A target not registered: {}", message.to_agent);
            return A2aResponse::failed(&message, format!("Agent {} not found", message.to_agent));
        };

        self.record(&message);
        match handler.handle(&message).await {
            Ok(data) => A2aResponse::ok(&message, data),
            Err(e) => {
                error!(
                    "A2A message {} to {} failed: {}",
                    message.message_id, message.to_agent, e
                );
                A2aResponse::failed(&message, e.to_string())
            }
        }
    }

    /// Send a copy of `message` to every agent except the sender.
    pub async fn broadcast(&self, message: &A2aMessage) -> Vec<A2aResponse> {
        let mut responses = Vec::new();
        for agent in self.agents() {
            if agent == message.from_agent {
                continue;
            }
            responses.push(self.send(message.readdressed(&agent)).await);
        }
        responses
    }

    /// Run steps in order. The first failed step stops the workflow and
    /// marks it unsuccessful.
    pub async fn run_workflow(
        &self,
        workflow_id: &str,
        steps: Vec<WorkflowStep>,
        session_id: &str,
    ) -> WorkflowReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(steps.len());
        let mut failure = None;

        for (step_id, step) in steps.into_iter().enumerate() {
            let message = A2aMessage::new(
                WORKFLOW_SENDER,
                step.agent.clone(),
                step.intent.clone(),
                step.payload,
                session_id,
            );
            let response = self.send(message).await;

            outcomes.push(StepOutcome {
                step_id,
                agent: step.agent.clone(),
                intent: step.intent,
                success: response.success,
                result: response.data,
                error: response.error.clone(),
            });

            if !response.success {
                let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
                failure = Some(format!("Step {} ({}) failed: {}", step_id, step.agent, reason));
                break;
            }
        }

        if let Some(reason) = &failure {
            warn!("Workflow {} failed: {}", workflow_id, reason);
        } else {
            info!("Workflow {} completed ({} steps)", workflow_id, outcomes.len());
        }

        WorkflowReport {
            workflow_id: workflow_id.to_string(),
            success: failure.is_none(),
            error: failure,
            steps: outcomes,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Most recent delivered messages, oldest first.
    pub fn history(&self, limit: usize) -> Vec<A2aMessage> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, message: &A2aMessage) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(message.clone());
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }
    }
}
