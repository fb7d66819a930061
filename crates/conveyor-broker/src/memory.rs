//! In-memory broker with AMQP routing semantics
//!
//! Supports direct and fanout exchanges plus the default (`""`) exchange,
//! which routes to the queue named by the routing key. Useful for tests and
//! single-process deployments.

use crate::traits::{
    BrokerChannel, BrokerError, BrokerResult, ChannelProvider, DeliveryCallback,
    PublishProperties, RawDelivery, WaitPolicy,
};
use async_trait::async_trait;
use bytes::Bytes;
use conveyor_core::{ExchangeKind, ExchangeSettings, QueueSettings};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Bytes,
    exchange: String,
    routing_key: String,
    content_type: Option<String>,
}

#[derive(Debug)]
struct ExchangeState {
    kind: ExchangeKind,
    /// (queue, routing key)
    bindings: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    exchanges: HashMap<String, ExchangeState>,
    published: u64,
    next_delivery_tag: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

/// Shared broker state; clones see the same queues
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new channel on this broker
    pub fn channel(&self) -> InMemoryChannel {
        InMemoryChannel {
            broker: self.clone(),
            consumers: Vec::new(),
            cursor: 0,
        }
    }

    /// Declare a queue; declaring an existing queue is a no-op
    pub async fn declare_queue(&self, name: &str) -> BrokerResult<()> {
        let mut state = self.open_state().await?;
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Declare an exchange; redeclaring with another kind fails
    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> BrokerResult<()> {
        let mut state = self.open_state().await?;
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(BrokerError::Declare(format!(
                "exchange {} already declared as {:?}",
                name, existing.kind
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    ExchangeState {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Bind a queue to an exchange
    pub async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> BrokerResult<()> {
        let mut state = self.open_state().await?;
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::Declare(format!("no queue {}", queue)));
        }

        let exchange_state = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::Declare(format!("no exchange {}", exchange)))?;

        let binding = (queue.to_string(), routing_key.to_string());
        if !exchange_state.bindings.contains(&binding) {
            exchange_state.bindings.push(binding);
        }
        Ok(())
    }

    /// Route a body to the matching queues, returning how many received it
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> BrokerResult<usize> {
        let mut state = self.open_state().await?;

        let targets: Vec<String> = if exchange.is_empty() {
            state
                .queues
                .contains_key(routing_key)
                .then(|| routing_key.to_string())
                .into_iter()
                .collect()
        } else {
            let exchange_state = state
                .exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::Publish(format!("no exchange {}", exchange)))?;

            exchange_state
                .bindings
                .iter()
                .filter(|(_, key)| match exchange_state.kind {
                    ExchangeKind::Direct => key == routing_key,
                    ExchangeKind::Fanout => true,
                })
                .map(|(queue, _)| queue.clone())
                .collect()
        };

        let message = StoredMessage {
            body,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type,
        };
        for queue in &targets {
            if let Some(messages) = state.queues.get_mut(queue) {
                messages.push_back(message.clone());
            }
        }
        state.published += 1;
        drop(state);

        if targets.is_empty() {
            debug!(exchange, routing_key, "Dropped unroutable message");
        }
        self.inner.notify.notify_waiters();
        Ok(targets.len())
    }

    /// Number of messages waiting in a queue (0 if it does not exist)
    pub async fn queue_length(&self, queue: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn has_queue(&self, queue: &str) -> bool {
        self.inner.state.lock().await.queues.contains_key(queue)
    }

    pub async fn has_exchange(&self, exchange: &str) -> bool {
        self.inner.state.lock().await.exchanges.contains_key(exchange)
    }

    /// Total number of publish calls accepted
    pub async fn published(&self) -> u64 {
        self.inner.state.lock().await.published
    }

    /// Simulate connection loss: every later operation fails
    pub async fn close(&self) {
        self.inner.state.lock().await.closed = true;
        self.inner.notify.notify_waiters();
    }

    async fn open_state(&self) -> BrokerResult<tokio::sync::MutexGuard<'_, State>> {
        let state = self.inner.state.lock().await;
        if state.closed {
            return Err(BrokerError::Connection("broker connection closed".to_string()));
        }
        Ok(state)
    }
}

/// A channel on an `InMemoryBroker`
#[derive(Debug)]
pub struct InMemoryChannel {
    broker: InMemoryBroker,
    /// (consumer tag, queue)
    consumers: Vec<(String, String)>,
    cursor: usize,
}

impl InMemoryChannel {
    /// Number of consumers currently registered
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Pop one message, round-robin across registered consumers
    async fn next_pending(&mut self) -> BrokerResult<Option<RawDelivery>> {
        let mut state = self.broker.open_state().await?;
        let count = self.consumers.len();

        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            let queue = &self.consumers[index].1;

            let Some(message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
                continue;
            };

            state.next_delivery_tag += 1;
            self.cursor = (index + 1) % count;
            return Ok(Some(RawDelivery {
                body: message.body,
                exchange: message.exchange,
                routing_key: message.routing_key,
                delivery_tag: state.next_delivery_tag,
                redelivered: false,
                content_type: message.content_type,
            }));
        }

        Ok(None)
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare(&mut self, queue: &QueueSettings, exchange: &ExchangeSettings) -> BrokerResult<()> {
        self.broker.declare_queue(&queue.name).await?;

        if !exchange.is_default() {
            self.broker
                .declare_exchange(&exchange.name, exchange.kind)
                .await?;
            self.broker
                .bind(&queue.name, &exchange.name, &exchange.routing_key)
                .await?;
        }

        debug!(queue = %queue.name, exchange = %exchange.name, "Declared in-memory topology");
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: PublishProperties,
    ) -> BrokerResult<()> {
        self.broker
            .publish(exchange, routing_key, body, properties.content_type)
            .await?;
        Ok(())
    }

    async fn consume(&mut self, queue: &str) -> BrokerResult<String> {
        if !self.broker.has_queue(queue).await {
            // Distinguish a dead connection from a missing queue
            self.broker.open_state().await?;
            return Err(BrokerError::Consume(format!("no queue {}", queue)));
        }

        let tag = format!("conveyor-{}", Uuid::new_v4());
        self.consumers.push((tag.clone(), queue.to_string()));
        Ok(tag)
    }

    async fn cancel(&mut self, consumer_tag: &str) -> BrokerResult<()> {
        self.consumers.retain(|(tag, _)| tag != consumer_tag);
        if self.cursor >= self.consumers.len() {
            self.cursor = 0;
        }
        Ok(())
    }

    async fn wait(
        &mut self,
        policy: WaitPolicy,
        on_delivery: &mut DeliveryCallback<'_>,
    ) -> BrokerResult<bool> {
        let deadline = policy.timeout.map(|t| tokio::time::Instant::now() + t);
        let inner = Arc::clone(&self.broker.inner);

        loop {
            // Register interest before checking, so a publish in between wakes us
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.next_pending().await? {
                on_delivery(delivery)?;
                return Ok(true);
            }

            if policy.non_blocking || self.consumers.is_empty() {
                return Ok(false);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(false);
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Channel provider over an `InMemoryBroker`
#[derive(Debug)]
pub struct InMemoryProvider {
    channel: InMemoryChannel,
    declared: Option<(QueueSettings, ExchangeSettings)>,
}

impl InMemoryProvider {
    pub fn new(broker: &InMemoryBroker) -> Self {
        Self {
            channel: broker.channel(),
            declared: None,
        }
    }
}

#[async_trait]
impl ChannelProvider for InMemoryProvider {
    type Channel = InMemoryChannel;

    async fn channel(
        &mut self,
        queue: &QueueSettings,
        exchange: &ExchangeSettings,
    ) -> BrokerResult<&mut Self::Channel> {
        let current = (queue.clone(), exchange.clone());
        if self.declared.as_ref() != Some(&current) {
            self.channel.declare(queue, exchange).await?;
            self.declared = Some(current);
        }
        Ok(&mut self.channel)
    }
}
