use thiserror::Error;

use crate::domain::public_url::PublicUrlError;
use crate::infra::archive::ExtractionError;
use crate::infra::storage::StorageError;

/// Failures surfaced by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("archive extraction failed")]
    Extraction(#[source] ExtractionError),
    #[error(transparent)]
    ContentStructure(#[from] ContentStructureError),
    #[error("content storage failed")]
    Storage(#[source] StorageError),
    #[error("ingestion was cancelled")]
    Cancelled,
    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

impl IngestError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Extraction(_) => "extraction",
            Self::ContentStructure(_) => "content_structure",
            Self::Storage(_) => "storage",
            Self::Cancelled => "cancelled",
            Self::Worker(_) => "worker",
        }
    }
}

impl From<ExtractionError> for IngestError {
    fn from(error: ExtractionError) -> Self {
        match error {
            // Write failures are environmental, not a property of the archive.
            ExtractionError::Io { path, source } => Self::Storage(StorageError::Io {
                action: "extract",
                path,
                source,
            }),
            other => Self::Extraction(other),
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidSlug { slug } => {
                Self::Validation(ValidationError::InvalidSlug { slug })
            }
            other => Self::Storage(other),
        }
    }
}

/// Caller input rejected before any filesystem work happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("uploaded archive is empty")]
    EmptyArchive,
    #[error("uploaded archive is {size} bytes, more than the limit of {limit}")]
    ArchiveTooLarge { size: u64, limit: u64 },
    #[error("`{filename}` is not a `.{expected}` archive")]
    UnsupportedExtension { filename: String, expected: String },
    #[error("`{slug}` is not a valid slug")]
    InvalidSlug { slug: String },
}

/// The archive does not hold exactly one usable content root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentStructureError {
    #[error("archive does not contain an entry document (expected one of: {expected})")]
    MissingEntryDocument { expected: String },
    #[error("archive contains several content roots: {}", candidates.join(", "))]
    AmbiguousContentRoot { candidates: Vec<String> },
    #[error("entry document `{path}` is missing after placement")]
    EntryDocumentMissing { path: String },
    #[error(transparent)]
    Unmappable(#[from] PublicUrlError),
}
