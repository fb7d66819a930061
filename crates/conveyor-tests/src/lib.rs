//! Conveyor Integration Tests
//!
//! This crate contains end-to-end tests of the queue driver. Most run
//! against the in-memory transport: `cargo test -p conveyor-tests`
//!
//! For tests that require RabbitMQ:
//! ```sh
//! docker run -d -p 5672:5672 rabbitmq:3-alpine
//! cargo test -p conveyor-tests -- --ignored
//! ```

pub mod common;
