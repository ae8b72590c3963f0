//! Infrastructure adapters and runtime bootstrap.

pub mod archive;
pub mod error;
pub mod storage;
pub mod telemetry;
