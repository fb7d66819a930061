//! Job handlers and the registry that dispatches to them
//!
//! Handlers run synchronously inside the broker's delivery callback, so they
//! must not block for long.

use conveyor_core::{Job, JobDescriptor, JobId, Message};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of running one job
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Job ID
    pub job_id: JobId,

    /// Success or failure
    pub success: bool,

    /// Result value (JSON)
    pub result: Option<serde_json::Value>,

    /// Error message if failed
    pub error: Option<String>,

    /// Execution duration
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create a success result
    pub fn success(job_id: JobId, result: serde_json::Value, duration: Duration) -> Self {
        Self {
            job_id,
            success: true,
            result: Some(result),
            error: None,
            duration,
        }
    }

    /// Create a failure result
    pub fn failure(job_id: JobId, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            job_id,
            success: false,
            result: None,
            error: Some(error.into()),
            duration,
        }
    }
}

/// Trait for job handlers
pub trait JobHandler: Send + Sync {
    /// Run a job
    fn execute(&self, job: &JobDescriptor) -> ExecutionResult;

    /// Get the handler name
    fn name(&self) -> &str;
}

/// Handlers keyed by job name
#[derive(Default, Clone)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `echo` and `fail` handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EchoHandler));
        registry.register(Arc::new(FailHandler));
        registry
    }

    /// Register a handler under its own name
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.register_as(handler.name().to_string(), handler);
    }

    /// Register a handler under another job name
    pub fn register_as(&mut self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered job names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler registered for a message's job name
    pub fn execute(&self, message: &Message) -> ExecutionResult {
        match self.handlers.get(message.name()) {
            Some(handler) => handler.execute(message.job()),
            None => ExecutionResult::failure(
                message.id().clone(),
                format!("No handler registered for job '{}'", message.name()),
                Duration::ZERO,
            ),
        }
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Returns the job's fields as its result
pub struct EchoHandler;

impl JobHandler for EchoHandler {
    fn execute(&self, job: &JobDescriptor) -> ExecutionResult {
        let start = Instant::now();

        let result = serde_json::json!({
            "job_id": job.id(),
            "job_name": job.name(),
            "meta": job.meta(),
            "body": job.body(),
        });

        ExecutionResult::success(job.id().clone(), result, start.elapsed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Always fails; the `message` field sets the error text
pub struct FailHandler;

impl JobHandler for FailHandler {
    fn execute(&self, job: &JobDescriptor) -> ExecutionResult {
        let message = job
            .field("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Intentional failure");

        ExecutionResult::failure(job.id().clone(), message, Duration::ZERO)
    }

    fn name(&self) -> &str {
        "fail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_handler() {
        let job = JobDescriptor::new("echo", 1)
            .with_meta("trace-1")
            .with_field("greeting", "hello");

        let result = EchoHandler.execute(&job);
        assert!(result.success);
        assert_eq!(
            result.result,
            Some(json!({
                "job_id": 1,
                "job_name": "echo",
                "meta": "trace-1",
                "body": {"greeting": "hello"},
            }))
        );
    }

    #[test]
    fn test_fail_handler() {
        let job = JobDescriptor::new("fail", "f-1").with_field("message", "test error");

        let result = FailHandler.execute(&job);
        assert!(!result.success);
        assert_eq!(result.error, Some("test error".to_string()));
    }

    #[test]
    fn test_registry() {
        let registry = JobRegistry::with_builtins();

        assert!(registry.has("echo"));
        assert!(!registry.has("unknown"));
        assert_eq!(registry.names(), vec!["echo", "fail"]);
    }

    #[test]
    fn test_register_under_alias() {
        let mut registry = JobRegistry::new();
        registry.register_as("ext-simple", Arc::new(EchoHandler));

        let result = registry.execute(&Message::new(JobDescriptor::new("ext-simple", 1)));
        assert!(result.success);
    }

    #[test]
    fn test_unknown_job_fails() {
        let registry = JobRegistry::new();
        let result = registry.execute(&Message::new(JobDescriptor::new("nobody", 3)));

        assert!(!result.success);
        assert_eq!(result.job_id, JobId::from(3));
        assert!(result.error.unwrap().contains("nobody"));
    }
}
