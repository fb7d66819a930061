//! Conveyor Core - Core types for the Conveyor AMQP queue driver
//!
//! This crate provides the fundamental building blocks for Conveyor:
//! - Job descriptors and capability tags
//! - The payload codec that validates delivered bodies
//! - The message envelope handed to consumers
//! - Configuration structures
//! - Error types

pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod message;

pub use codec::PayloadCodec;
pub use config::{ConveyorConfig, ExchangeKind, ExchangeSettings, QueueSettings, WorkerConfig};
pub use error::{Error, FieldProblem, PayloadError, PayloadField, Result};
pub use job::{Capability, Job, JobDescriptor, JobId, JobStatus, TypedJob};
pub use message::{Message, Serializer};
