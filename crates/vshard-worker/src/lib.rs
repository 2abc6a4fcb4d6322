//! Unit transcoding worker.
//!
//! A worker receives `WorkUnitDispatch` messages, transcodes each unit on its
//! own task and replies with a `WorkerReply` on the sink supplied with the
//! unit. No state survives between units.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::UnitLogger;
pub use worker::{Worker, WorkerHandle, WorkerId, WorkerMessage};
