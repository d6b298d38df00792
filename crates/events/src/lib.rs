//! Event log and progress streaming for triage jobs (PRD-08).
//!
//! Building blocks:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`EventLog`] — the single append path: durable store write first,
//!   broadcast second, so a crash can lose fan-out but never history.
//! - [`ProgressStream`] — replayable live view over one job's events,
//!   with idle heartbeats and natural termination at terminal status.

pub mod bus;
pub mod log;
pub mod stream;

pub use bus::EventBus;
pub use log::EventLog;
pub use stream::{ProgressStream, StreamConfig, StreamItem};
