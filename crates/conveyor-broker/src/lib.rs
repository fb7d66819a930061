//! Conveyor Broker - Queue driver and broker channel abstraction
//!
//! This crate provides the AMQP queue driver and the transports it runs on:
//! - RabbitMQ (lapin, pull-based auto-acknowledged consumption)
//! - In-memory (AMQP routing semantics, for tests and single-process use)
//!
//! The driver only talks to the `ChannelProvider`, `SettingsProvider` and
//! `RunLoop` traits, so transports and destinations can be swapped freely.

pub mod capability;
pub mod driver;
pub mod memory;
pub mod rabbitmq;
pub mod run_loop;
pub mod settings;
pub mod traits;

pub use capability::can_push;
pub use driver::{AmqpDriver, DriverConfig};
pub use memory::{InMemoryBroker, InMemoryChannel, InMemoryProvider};
pub use rabbitmq::{AmqpChannel, RabbitMqConfig, RabbitMqProvider};
pub use run_loop::{ShutdownHandle, ShutdownLoop};
pub use settings::{SettingsHandle, SharedSettings, StaticSettings};
pub use traits::{
    BrokerChannel, BrokerError, BrokerResult, ChannelProvider, DeliveryCallback, MessageHandler,
    PublishProperties, QueueDriver, RawDelivery, RunLoop, SettingsProvider, WaitPolicy,
};
