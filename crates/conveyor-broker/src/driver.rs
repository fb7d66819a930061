//! AMQP queue driver
//!
//! Turns queue operations into channel operations. Destinations are read
//! from the settings provider on every call, so a swap between calls takes
//! effect without rebuilding the driver. Nothing here retries: transport
//! errors, rejected payloads and handler failures all reach the caller.

use crate::capability;
use crate::traits::{
    BrokerChannel, BrokerError, BrokerResult, ChannelProvider, MessageHandler, PublishProperties,
    QueueDriver, RawDelivery, RunLoop, SettingsProvider, WaitPolicy,
};
use async_trait::async_trait;
use conveyor_core::{
    ConveyorConfig, Job, JobDescriptor, JobId, JobStatus, Message, PayloadCodec, Serializer,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on one `subscribe` iteration unless configured otherwise
pub const DEFAULT_SUBSCRIBE_WAIT: Duration = Duration::from_millis(1000);

/// Wait and publish behaviour of an `AmqpDriver`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Policy for `next_message`; a single non-blocking poll
    pub next_message_wait: WaitPolicy,

    /// Policy for each `subscribe` iteration
    pub subscribe_wait: WaitPolicy,

    /// Publish with persistent delivery mode
    pub persistent: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            next_message_wait: WaitPolicy::poll(),
            subscribe_wait: WaitPolicy::block_for(DEFAULT_SUBSCRIBE_WAIT),
            persistent: true,
        }
    }
}

impl DriverConfig {
    pub fn from_config(config: &ConveyorConfig) -> Self {
        Self {
            subscribe_wait: match config.worker.wait_timeout() {
                Some(timeout) => WaitPolicy::block_for(timeout),
                None => WaitPolicy::poll(),
            },
            persistent: config.broker.persistent,
            ..Default::default()
        }
    }

    pub fn subscribe_wait(mut self, policy: WaitPolicy) -> Self {
        self.subscribe_wait = policy;
        self
    }
}

/// Queue driver over any `ChannelProvider`
pub struct AmqpDriver<P, S, L> {
    provider: P,
    settings: S,
    run_loop: L,
    codec: PayloadCodec,
    config: DriverConfig,
}

impl<P, S, L> AmqpDriver<P, S, L>
where
    P: ChannelProvider,
    S: SettingsProvider,
    L: RunLoop,
{
    pub fn new(provider: P, settings: S, run_loop: L) -> Self {
        Self {
            provider,
            settings,
            run_loop,
            codec: PayloadCodec::default(),
            config: DriverConfig::default(),
        }
    }

    /// Build a driver using the serializer and wait settings from config
    pub fn from_config(provider: P, settings: S, run_loop: L, config: &ConveyorConfig) -> Self {
        Self::new(provider, settings, run_loop)
            .with_codec(PayloadCodec::new(config.broker.serializer))
            .with_config(DriverConfig::from_config(config))
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn run_loop(&self) -> &L {
        &self.run_loop
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
}

/// Decode a delivery, honouring the serializer its publisher declared
fn decode_delivery(codec: PayloadCodec, delivery: &RawDelivery) -> BrokerResult<Message> {
    let codec = delivery
        .content_type
        .as_deref()
        .and_then(Serializer::from_content_type)
        .map(PayloadCodec::new)
        .unwrap_or(codec);

    codec.decode_message(&delivery.body).map_err(|e| {
        warn!(
            delivery_tag = delivery.delivery_tag,
            exchange = %delivery.exchange,
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
            error = %e,
            "Rejected payload"
        );
        BrokerError::Payload(e)
    })
}

#[async_trait]
impl<P, S, L> QueueDriver for AmqpDriver<P, S, L>
where
    P: ChannelProvider + Sync,
    S: SettingsProvider,
    L: RunLoop,
{
    async fn push(&mut self, job: JobDescriptor) -> BrokerResult<Message> {
        let queue = self.settings.queue_settings();
        let exchange = self.settings.exchange_settings();

        let body = self.codec.encode(&job)?;
        let properties = PublishProperties {
            content_type: Some(self.codec.serializer().content_type().to_string()),
            message_id: Some(job.id().to_string()),
            persistent: self.config.persistent,
        };

        let channel = self.provider.channel(&queue, &exchange).await?;
        channel
            .publish(&exchange.name, &exchange.routing_key, body, properties)
            .await?;

        debug!(
            job_id = %job.id(),
            job_name = %job.name(),
            exchange = %exchange.name,
            "Pushed job"
        );
        Ok(Message::new(job))
    }

    async fn next_message(&mut self) -> BrokerResult<Option<Message>> {
        let queue = self.settings.queue_settings();
        let exchange = self.settings.exchange_settings();
        let codec = self.codec;
        let policy = self.config.next_message_wait;

        let channel = self.provider.channel(&queue, &exchange).await?;
        let tag = channel.consume(&queue.name).await?;

        let mut received = None;
        let waited = channel
            .wait(policy, &mut |delivery| {
                received = Some(decode_delivery(codec, &delivery)?);
                Ok(())
            })
            .await;
        let cancelled = channel.cancel(&tag).await;
        waited?;
        cancelled?;

        Ok(received)
    }

    async fn subscribe(&mut self, handler: &mut MessageHandler<'_>) -> BrokerResult<()> {
        let codec = self.codec;
        let policy = self.config.subscribe_wait;

        while self.run_loop.can_continue() {
            let queue = self.settings.queue_settings();
            let exchange = self.settings.exchange_settings();

            let channel = self.provider.channel(&queue, &exchange).await?;
            let tag = channel.consume(&queue.name).await?;

            let waited = channel
                .wait(policy, &mut |delivery| {
                    let message = decode_delivery(codec, &delivery)?;
                    handler(message)
                })
                .await;
            let cancelled = channel.cancel(&tag).await;
            waited?;
            cancelled?;
        }

        debug!("Subscribe loop stopped");
        Ok(())
    }

    async fn status(&self, _id: &JobId) -> BrokerResult<JobStatus> {
        Err(BrokerError::Unsupported {
            operation: "status",
            transport: "amqp",
        })
    }

    fn can_push(&self, job: &dyn Job) -> bool {
        capability::can_push(job)
    }
}
