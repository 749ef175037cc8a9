//! Domain layer for the FluxQuery export service.
//!
//! This crate contains:
//! - Export job lifecycle model
//! - Dashboard event payloads and agent job commands
//! - The typed scalar value carried between cursors, encoders, and the wire
//! - The binary framing used on the agent data plane

pub mod models;
pub mod wire;

pub use models::command::JobCommand;
pub use models::event::{DashboardUpdate, UpdateKind};
pub use models::job::{ExportFormat, ExportJob, ExportStats, JobStatus};
pub use models::value::{harden_cell, ScalarValue};
