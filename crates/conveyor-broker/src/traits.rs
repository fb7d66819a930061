//! Broker trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use conveyor_core::{ExchangeSettings, Job, JobDescriptor, JobId, JobStatus, Message, PayloadError, QueueSettings};
use std::time::Duration;
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur during broker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Exchange/queue declaration error
    #[error("declare error: {0}")]
    Declare(String),

    /// Publish error
    #[error("publish error: {0}")]
    Publish(String),

    /// Consume error
    #[error("consume error: {0}")]
    Consume(String),

    /// Delivered body rejected by the payload codec
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Operation this transport cannot perform
    #[error("{operation} is not supported by the {transport} driver")]
    Unsupported {
        operation: &'static str,
        transport: &'static str,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure raised by a subscribe handler
    #[error("handler error: {0}")]
    Handler(String),
}

impl From<conveyor_core::Error> for BrokerError {
    fn from(err: conveyor_core::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

impl BrokerError {
    /// Check if this error came from the broker connection or protocol
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection(_)
                | BrokerError::Declare(_)
                | BrokerError::Publish(_)
                | BrokerError::Consume(_)
        )
    }

    /// Get the codec error, if a delivered body was rejected
    pub fn payload_error(&self) -> Option<&PayloadError> {
        match self {
            BrokerError::Payload(e) => Some(e),
            _ => None,
        }
    }
}

/// A message as the broker handed it over, before decoding
#[derive(Debug, Clone)]
pub struct RawDelivery {
    /// Opaque body
    pub body: Bytes,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used at publish time
    pub routing_key: String,

    /// Broker-assigned delivery tag
    pub delivery_tag: u64,

    /// Whether the broker delivered this message before
    pub redelivered: bool,

    /// Content type property, if set by the publisher
    pub content_type: Option<String>,
}

/// Properties attached to a published message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    /// Ask the broker to write the message to disk
    pub persistent: bool,
}

/// How long `BrokerChannel::wait` may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Upper bound on blocking (`None` = until a delivery arrives)
    pub timeout: Option<Duration>,

    /// Return at once when nothing is pending
    pub non_blocking: bool,
}

impl WaitPolicy {
    /// Single poll: deliver what is pending, never block
    pub const fn poll() -> Self {
        Self {
            timeout: None,
            non_blocking: true,
        }
    }

    /// Block until a delivery arrives
    pub const fn block() -> Self {
        Self {
            timeout: None,
            non_blocking: false,
        }
    }

    /// Block until a delivery arrives or the timeout elapses
    pub const fn block_for(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            non_blocking: false,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::poll()
    }
}

/// Callback invoked synchronously from inside `BrokerChannel::wait`
pub type DeliveryCallback<'a> = dyn FnMut(RawDelivery) -> BrokerResult<()> + Send + 'a;

/// Handler invoked by `QueueDriver::subscribe` for each decoded message
pub type MessageHandler<'a> = dyn FnMut(Message) -> BrokerResult<()> + Send + 'a;

/// A stateful session with the broker
///
/// Channels are not safe for concurrent use; every operation takes
/// `&mut self`. Deliveries are auto-acknowledged: the broker considers a
/// message delivered as soon as it is handed to the callback.
#[async_trait]
pub trait BrokerChannel: Send {
    /// Declare the exchange and queue and bind them
    async fn declare(&mut self, queue: &QueueSettings, exchange: &ExchangeSettings) -> BrokerResult<()>;

    /// Publish a body to an exchange
    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: PublishProperties,
    ) -> BrokerResult<()>;

    /// Register an auto-acknowledge consumer on a queue, returning its tag
    async fn consume(&mut self, queue: &str) -> BrokerResult<String>;

    /// Stop a consumer registered with `consume`
    async fn cancel(&mut self, consumer_tag: &str) -> BrokerResult<()>;

    /// Hand at most one delivery to `on_delivery`
    ///
    /// Returns whether a delivery was dispatched. An error returned by the
    /// callback is returned from `wait` unchanged.
    async fn wait(
        &mut self,
        policy: WaitPolicy,
        on_delivery: &mut DeliveryCallback<'_>,
    ) -> BrokerResult<bool>;
}

/// Hands out the channel bound to the current destinations
#[async_trait]
pub trait ChannelProvider: Send {
    type Channel: BrokerChannel;

    /// Get the channel, declaring topology if the destinations changed
    async fn channel(
        &mut self,
        queue: &QueueSettings,
        exchange: &ExchangeSettings,
    ) -> BrokerResult<&mut Self::Channel>;
}

/// Exposes the current destinations; may change between calls
pub trait SettingsProvider: Send + Sync {
    fn queue_settings(&self) -> QueueSettings;

    fn exchange_settings(&self) -> ExchangeSettings;
}

/// Cooperative stop signal polled between subscribe iterations
pub trait RunLoop: Send + Sync {
    fn can_continue(&self) -> bool;
}

impl<F> RunLoop for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn can_continue(&self) -> bool {
        self()
    }
}

/// Transport-agnostic queue driver used by the queue runtime
#[async_trait]
pub trait QueueDriver: Send {
    /// Publish a job and return its envelope
    async fn push(&mut self, job: JobDescriptor) -> BrokerResult<Message>;

    /// Fetch the next pending message without blocking
    async fn next_message(&mut self) -> BrokerResult<Option<Message>>;

    /// Feed messages to `handler` until the run loop says stop
    async fn subscribe(&mut self, handler: &mut MessageHandler<'_>) -> BrokerResult<()>;

    /// Look up the delivery state of a pushed job
    async fn status(&self, id: &JobId) -> BrokerResult<JobStatus>;

    /// Check if this driver can deliver the job as requested
    fn can_push(&self, job: &dyn Job) -> bool;
}
