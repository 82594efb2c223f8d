//! Strata worker library
//!
//! Configuration, component wiring and the REST surface of the worker
//! process. The binary in `main.rs` adds tracing, the job worker pool, the
//! scheduler loop and graceful shutdown.

pub mod bootstrap;
pub mod config;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod types;
