use thiserror::Error;

use crate::{
    application::ingest::IngestError, config::LoadError, infra::error::InfraError,
    infra::storage::StorageError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error("content storage is unavailable")]
    Storage(#[from] StorageError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Render the error followed by every source in its chain.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}
