//! Streaming export pipeline for FluxQuery.
//!
//! This crate contains the pieces a worker threads together for each job:
//! - `driver`: uniform cursor abstraction over relational and document stores
//! - `encode`: format-agnostic streaming row encoders (CSV, JSONL, XLSX, PDF)
//! - `storage`: streaming sinks over object-store backends
//! - `pipeline`: the cursor → encoder → gzip → sink chain with its fixed
//!   close order and error precedence
//! - `pool`: the bounded worker pool with the DB-concurrency semaphore
//! - `notify`: the email notification seam

pub mod driver;
pub mod encode;
pub mod notify;
pub mod pipeline;
pub mod pool;
pub mod storage;
