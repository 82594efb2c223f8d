//! Shared test utilities for Strata crates
//!
//! This crate provides:
//! - **Fixtures**: pre-built backup and recovery-test records
//! - **Builders**: fluent builders for records and REST requests
//! - **Mocks**: in-memory object storage, encryption, dump tool, database
//!   admin and alert sink with call recording and failure injection
//! - **Assertions**: pipeline invariants and response checks
//!
//! # Example
//!
//! ```ignore
//! use strata_runtime::{BackupPipeline, PipelineConfig};
//! use strata_tests::{fixtures, mocks::MockServices};
//!
//! #[tokio::test]
//! async fn test_backup() {
//!     let mocks = MockServices::new(fixtures::dump_bytes(1000));
//!     let pipeline = BackupPipeline::new(mocks.services(), PipelineConfig::default());
//!     let id = pipeline.enqueue_full_backup("teachlink", "us-east-1").await.unwrap();
//!     // ...
//! }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use builders::{ApiRequestBuilder, BackupRecordBuilder};
pub use fixtures::dump_bytes;
pub use mocks::MockServices;
