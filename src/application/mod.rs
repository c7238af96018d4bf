//! Application layer: rule resolution, the calculation engine, the batch
//! lifecycle and the job pool that runs batch work off the request path.
//!
//! `PayrollService` is the entry point. Everything below it talks to storage
//! only through the ports in `domain::ports`.

pub mod batch;
pub mod catalog;
pub mod engine;
pub mod executor;
pub mod jobs;
pub mod resolver;
pub mod service;
