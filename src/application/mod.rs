//! Application services layer.

pub mod error;
pub mod hero;
pub mod ingest;
