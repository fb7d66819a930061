//! Conveyor Worker - Job runtime on top of the queue driver
//!
//! This crate provides the worker process for Conveyor:
//! - Job handler registry with built-in `echo` and `fail` handlers
//! - Subscribe-and-dispatch loop with cooperative shutdown
//! - Drain mode that processes pending jobs and exits

pub mod executor;
pub mod worker;

pub use executor::{ExecutionResult, JobHandler, JobRegistry};
pub use worker::{Worker, WorkerCounters, WorkerStats};
