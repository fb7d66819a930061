//! Worker loop: pulls jobs through a queue driver and dispatches them

use crate::executor::{ExecutionResult, JobRegistry};
use chrono::{DateTime, Utc};
use conveyor_broker::{capability, BrokerError, BrokerResult, QueueDriver};
use conveyor_core::{Capability, JobDescriptor, Message};
use conveyor_telemetry::{
    log_job_completed, log_job_failed, log_job_pushed, log_job_received, log_job_rejected,
    JobLogContext,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counters shared with whoever wants to watch a running worker
#[derive(Debug, Default)]
pub struct WorkerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerCounters {
    pub fn jobs_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Worker statistics
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub worker_id: String,

    /// Jobs whose handler succeeded
    pub jobs_processed: u64,

    /// Jobs whose handler failed or that had no handler
    pub jobs_failed: u64,

    pub started_at: DateTime<Utc>,

    /// Uptime in seconds
    pub uptime: i64,
}

/// Single-channel worker over any `QueueDriver`
pub struct Worker<D> {
    worker_id: String,
    queue: String,
    driver: D,
    registry: Arc<JobRegistry>,
    counters: Arc<WorkerCounters>,
    started_at: DateTime<Utc>,
}

impl<D: QueueDriver> Worker<D> {
    /// Create a worker; `queue` is used for log context only
    pub fn new(
        worker_id: impl Into<String>,
        queue: impl Into<String>,
        driver: D,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue: queue.into(),
            driver,
            registry,
            counters: Arc::new(WorkerCounters::default()),
            started_at: Utc::now(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn counters(&self) -> Arc<WorkerCounters> {
        Arc::clone(&self.counters)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            worker_id: self.worker_id.clone(),
            jobs_processed: self.counters.jobs_processed(),
            jobs_failed: self.counters.jobs_failed(),
            started_at: self.started_at,
            uptime: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    /// Push a job, refusing ones that need delayed or prioritized delivery
    pub async fn push(&mut self, job: JobDescriptor) -> BrokerResult<Message> {
        if let Some(capability) = capability::unsupported_capability(&job) {
            return Err(BrokerError::Unsupported {
                operation: match capability {
                    Capability::Delayable => "delayed delivery",
                    Capability::Prioritized => "priority delivery",
                },
                transport: "amqp",
            });
        }

        let message = self.driver.push(job).await?;
        log_job_pushed!(message.id(), message.name(), self.queue);
        Ok(message)
    }

    /// Subscribe until the driver's run loop stops
    ///
    /// Handler failures are counted, not propagated; rejected payloads and
    /// transport errors end the loop.
    pub async fn listen(&mut self) -> BrokerResult<WorkerStats> {
        info!(
            "Worker {} listening on {} with handlers {:?}",
            self.worker_id,
            self.queue,
            self.registry.names()
        );

        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(&self.counters);
        let queue = self.queue.clone();

        self.driver
            .subscribe(&mut |message| {
                dispatch(&registry, &counters, &queue, &message);
                Ok(())
            })
            .await?;

        let stats = self.stats();
        info!(
            "Worker {} stopped. Processed: {}, Failed: {}",
            stats.worker_id, stats.jobs_processed, stats.jobs_failed
        );
        Ok(stats)
    }

    /// Process pending jobs until the queue is empty
    pub async fn run(&mut self) -> BrokerResult<WorkerStats> {
        let mut handled = 0u64;
        while let Some(message) = self.driver.next_message().await? {
            dispatch(&self.registry, &self.counters, &self.queue, &message);
            handled += 1;
        }

        info!("Worker {} drained {} jobs from {}", self.worker_id, handled, self.queue);
        Ok(self.stats())
    }
}

fn dispatch(
    registry: &JobRegistry,
    counters: &WorkerCounters,
    queue: &str,
    message: &Message,
) -> ExecutionResult {
    let context = JobLogContext::new(message.id(), message.name(), queue);
    let _span = context.span().entered();
    log_job_received!(context.job_id, context.job_name, context.queue);

    if !registry.has(message.name()) {
        log_job_rejected!(context.job_id, context.job_name, "no handler registered");
    }

    let result = registry.execute(message);
    if result.success {
        counters.processed.fetch_add(1, Ordering::Relaxed);
        log_job_completed!(context.job_id, context.job_name, result.duration.as_millis() as u64);
    } else {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        log_job_failed!(
            context.job_id,
            context.job_name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use conveyor_broker::{AmqpDriver, InMemoryBroker, InMemoryProvider, ShutdownLoop, StaticSettings};
    use conveyor_core::{ExchangeSettings, QueueSettings};

    type TestDriver = AmqpDriver<InMemoryProvider, StaticSettings, ShutdownLoop>;

    fn worker(broker: &InMemoryBroker, run_loop: ShutdownLoop) -> Worker<TestDriver> {
        let settings = StaticSettings::new(
            QueueSettings::new("jobs"),
            ExchangeSettings::new("jobs.direct").routing_key("jobs"),
        );
        let driver = AmqpDriver::new(InMemoryProvider::new(broker), settings, run_loop);
        Worker::new("test-worker", "jobs", driver, Arc::new(JobRegistry::with_builtins()))
    }

    #[tokio::test]
    async fn test_run_drains_queue() {
        let broker = InMemoryBroker::new();
        let mut worker = worker(&broker, ShutdownLoop::new());

        worker.push(JobDescriptor::new("echo", 1)).await.unwrap();
        worker.push(JobDescriptor::new("fail", 2)).await.unwrap();
        worker.push(JobDescriptor::new("missing", 3)).await.unwrap();

        let stats = worker.run().await.unwrap();
        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(stats.jobs_failed, 2);
        assert_eq!(broker.queue_length("jobs").await, 0);
    }

    #[tokio::test]
    async fn test_listen_respects_iteration_limit() {
        let broker = InMemoryBroker::new();
        let mut worker = worker(&broker, ShutdownLoop::new().with_max_iterations(2));
        for id in 1..=3 {
            worker.push(JobDescriptor::new("echo", id)).await.unwrap();
        }

        let stats = worker.listen().await.unwrap();
        assert_eq!(stats.jobs_processed, 2);
        assert_eq!(broker.queue_length("jobs").await, 1);
    }

    #[tokio::test]
    async fn test_listen_stops_on_malformed_payload() {
        let broker = InMemoryBroker::new();
        let mut worker = worker(&broker, ShutdownLoop::new());
        worker.push(JobDescriptor::new("echo", 1)).await.unwrap();
        broker
            .publish("jobs.direct", "jobs", Bytes::from_static(b"42"), None)
            .await
            .unwrap();

        let err = worker.listen().await.unwrap_err();
        assert!(err.payload_error().is_some_and(|e| e.is_malformed()));
        assert_eq!(worker.counters().jobs_processed(), 1);
    }

    #[tokio::test]
    async fn test_push_refuses_delayable_jobs() {
        let broker = InMemoryBroker::new();
        let mut worker = worker(&broker, ShutdownLoop::new());

        let job = JobDescriptor::new("echo", 1).with_capability(Capability::Delayable);
        let err = worker.push(job).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Unsupported {
                operation: "delayed delivery",
                ..
            }
        ));
        assert_eq!(broker.published().await, 0);
    }
}
