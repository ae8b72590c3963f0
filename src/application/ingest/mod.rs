//! Archive ingestion: turns an uploaded archive into a placed post directory.
//!
//! One [`ArchiveIngestor::ingest`] call moves through
//! `Validating → Extracting → Locating → AllocatingSlug → Placing →
//! ParsingMetadata → ResolvingHero → Done`. Every failure, cancellation
//! included, unwinds through scoped guards: the extraction workspace is always
//! removed and a reserved post directory is released unless the call
//! succeeds. Concurrent calls share nothing but the storage root; slug
//! collisions are settled by the atomic directory reservation in
//! [`ContentStorage::reserve`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::application::hero::resolve_hero;
use crate::config::{IngestSettings, StorageSettings};
use crate::domain::{
    entities::PostContentRecord, front_matter::FrontMatter, public_url::public_url,
    slug::slugify_or_random,
};
use crate::infra::{
    archive::{ExtractionLimits, Workspace, extract_zip},
    storage::{ContentStorage, StorageError},
    telemetry::{
        METRIC_CONTENT_DELETED_TOTAL, METRIC_INGEST_FAILED_TOTAL, METRIC_INGEST_MS,
        METRIC_INGEST_TOTAL,
    },
};

pub mod error;
pub mod locate;

pub use error::{ContentStructureError, IngestError, ValidationError};
pub use locate::{ContentRoot, locate_content_root};

const UPLOAD_BASENAME: &str = "upload";
const EXTRACTED_DIR: &str = "extracted";

/// Steps of a single ingestion, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Validating,
    Extracting,
    Locating,
    AllocatingSlug,
    Placing,
    ParsingMetadata,
    ResolvingHero,
    Done,
}

impl IngestStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Locating => "locating",
            Self::AllocatingSlug => "allocating_slug",
            Self::Placing => "placing",
            Self::ParsingMetadata => "parsing_metadata",
            Self::ResolvingHero => "resolving_hero",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry point for ingesting, deleting and addressing post content.
///
/// Cheap to clone; clones share the same storage and settings.
#[derive(Clone)]
pub struct ArchiveIngestor {
    inner: Arc<Pipeline>,
}

struct Pipeline {
    storage: ContentStorage,
    public_base_prefix: String,
    settings: IngestSettings,
}

impl ArchiveIngestor {
    /// Build an ingestor over `storage`.
    ///
    /// `public_base_prefix` must already be normalized (see
    /// [`crate::config::normalize_public_prefix`]).
    pub fn new(
        storage: ContentStorage,
        public_base_prefix: impl Into<String>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Pipeline {
                storage,
                public_base_prefix: public_base_prefix.into(),
                settings,
            }),
        }
    }

    /// Open the configured storage root and build an ingestor over it.
    pub fn from_settings(
        storage: &StorageSettings,
        ingest: &IngestSettings,
    ) -> Result<Self, StorageError> {
        let content = ContentStorage::new(&storage.root)?;
        Ok(Self::new(
            content,
            storage.public_base_prefix.clone(),
            ingest.clone(),
        ))
    }

    pub fn storage(&self) -> &ContentStorage {
        &self.inner.storage
    }

    /// Ingest an uploaded archive and place its content under a fresh slug.
    ///
    /// `preferred_slug` is used as the slug candidate when non-empty; the
    /// content directory name is used otherwise. The blocking work runs on the
    /// blocking thread pool and checks `cancel` between stages.
    pub async fn ingest(
        &self,
        archive: Bytes,
        declared_filename: &str,
        preferred_slug: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PostContentRecord, IngestError> {
        let span = info_span!(
            "ingest",
            filename = declared_filename,
            archive_bytes = archive.len()
        );

        async move {
            let started_at = Instant::now();
            let result = self
                .run_ingest(archive, declared_filename, preferred_slug, cancel)
                .await;
            let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
            histogram!(METRIC_INGEST_MS).record(elapsed_ms);

            match &result {
                Ok(record) => {
                    counter!(METRIC_INGEST_TOTAL).increment(1);
                    info!(
                        slug = %record.slug,
                        hero = record.hero_relative_path.is_some(),
                        elapsed_ms,
                        "Ingestion complete"
                    );
                }
                Err(error) => {
                    counter!(METRIC_INGEST_FAILED_TOTAL, "kind" => error.kind()).increment(1);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_ingest(
        &self,
        archive: Bytes,
        declared_filename: &str,
        preferred_slug: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PostContentRecord, IngestError> {
        if let Err(error) = self.inner.validate(&archive, declared_filename) {
            warn!(stage = %IngestStage::Validating, kind = error.kind(), error = %error, "Ingestion failed");
            return Err(error);
        }

        let pipeline = Arc::clone(&self.inner);
        let hint = preferred_slug.map(str::to_string);
        let cancel = cancel.clone();
        let span = Span::current();

        // The worker is always awaited, so its guards finish cleaning up before
        // any error (cancellation included) reaches the caller.
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            pipeline.ingest_blocking(&archive, hint.as_deref(), &cancel)
        })
        .await
        .map_err(|err| IngestError::Worker(err.to_string()))?
    }

    /// Remove the content directory of `slug`. Returns whether it existed.
    pub async fn delete_content(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, IngestError> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let pipeline = Arc::clone(&self.inner);
        let owned_slug = slug.to_string();
        let existed = tokio::task::spawn_blocking(move || pipeline.storage.delete(&owned_slug))
            .await
            .map_err(|err| IngestError::Worker(err.to_string()))??;

        if existed {
            counter!(METRIC_CONTENT_DELETED_TOTAL).increment(1);
            info!(slug, "Content deleted");
        } else {
            debug!(slug, "content already absent");
        }
        Ok(existed)
    }

    /// Slugs of every post directory currently present, sorted.
    pub async fn list_slugs(&self) -> Result<Vec<String>, IngestError> {
        let pipeline = Arc::clone(&self.inner);
        let slugs = tokio::task::spawn_blocking(move || pipeline.storage.list_slugs())
            .await
            .map_err(|err| IngestError::Worker(err.to_string()))??;
        Ok(slugs)
    }

    /// Map an absolute path under the storage root to its public URL.
    pub fn resolve_public_url(&self, absolute: &Path) -> Result<String, IngestError> {
        public_url(
            self.inner.storage.root(),
            &self.inner.public_base_prefix,
            absolute,
        )
        .map_err(|err| ContentStructureError::from(err).into())
    }
}

impl Pipeline {
    fn validate(&self, archive: &[u8], declared_filename: &str) -> Result<(), IngestError> {
        if archive.is_empty() {
            return Err(ValidationError::EmptyArchive.into());
        }

        let size = archive.len() as u64;
        let limit = self.settings.max_archive_bytes.get();
        if size > limit {
            return Err(ValidationError::ArchiveTooLarge { size, limit }.into());
        }

        let expected = &self.settings.archive_extension;
        let suffix = format!(".{expected}");
        let name = declared_filename.trim().to_ascii_lowercase();
        if name.len() <= suffix.len() || !name.ends_with(&suffix) {
            return Err(ValidationError::UnsupportedExtension {
                filename: declared_filename.to_string(),
                expected: expected.clone(),
            }
            .into());
        }

        Ok(())
    }

    fn ingest_blocking(
        &self,
        archive: &[u8],
        preferred_slug: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PostContentRecord, IngestError> {
        let mut progress = Progress::new(cancel);
        let result = self.run_stages(&mut progress, archive, preferred_slug);
        if let Err(error) = &result {
            warn!(
                stage = %progress.stage,
                kind = error.kind(),
                error = %error,
                "Ingestion failed"
            );
        }
        result
    }

    fn run_stages(
        &self,
        progress: &mut Progress<'_>,
        archive: &[u8],
        preferred_slug: Option<&str>,
    ) -> Result<PostContentRecord, IngestError> {
        progress.enter(IngestStage::Extracting)?;
        let workspace = Workspace::create(self.settings.workspace_dir.as_deref())
            .map_err(|source| StorageError::Io {
                action: "create workspace in",
                path: self
                    .settings
                    .workspace_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                source,
            })?;

        let upload_path = workspace
            .path()
            .join(format!("{UPLOAD_BASENAME}.{}", self.settings.archive_extension));
        fs::write(&upload_path, archive).map_err(|source| StorageError::Io {
            action: "write",
            path: upload_path.clone(),
            source,
        })?;
        let source_checksum = hex::encode(&Sha256::digest(archive)[..]);

        let extracted = workspace.path().join(EXTRACTED_DIR);
        let summary = extract_zip(&upload_path, &extracted, self.extraction_limits())?;
        debug!(
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "archive extracted"
        );

        progress.enter(IngestStage::Locating)?;
        let content_root = locate_content_root(&extracted, &self.settings.entry_documents)?;

        progress.enter(IngestStage::AllocatingSlug)?;
        let candidate = candidate_slug(preferred_slug, &content_root);
        let reservation = self.storage.reserve(&candidate)?;
        debug!(candidate = %candidate, slug = reservation.slug(), "slug reserved");

        progress.enter(IngestStage::Placing)?;
        self.storage.place(&reservation, &content_root.path)?;

        let index_document_path = reservation.path().join(&content_root.entry_document);
        self.storage.ensure_contains(&index_document_path)?;
        if !index_document_path.is_file() {
            return Err(ContentStructureError::EntryDocumentMissing {
                path: index_document_path.display().to_string(),
            }
            .into());
        }

        progress.enter(IngestStage::ParsingMetadata)?;
        let raw_document = fs::read(&index_document_path).map_err(|source| StorageError::Io {
            action: "read",
            path: index_document_path.clone(),
            source,
        })?;
        let front_matter = FrontMatter::parse(&String::from_utf8_lossy(&raw_document));

        progress.enter(IngestStage::ResolvingHero)?;
        let hero_relative_path = resolve_hero(reservation.path(), &front_matter);

        workspace.close();
        let (slug, root_path) = reservation.commit();
        progress.finish();

        Ok(PostContentRecord {
            slug,
            root_path,
            index_document_path,
            hero_relative_path,
            front_matter,
            source_checksum,
        })
    }

    fn extraction_limits(&self) -> ExtractionLimits {
        ExtractionLimits {
            max_extracted_bytes: self.settings.max_extracted_bytes.get(),
            max_entries: usize::try_from(self.settings.max_entries.get()).unwrap_or(usize::MAX),
        }
    }
}

/// Tracks the current stage and turns cancellation into an error at stage boundaries.
struct Progress<'a> {
    cancel: &'a CancellationToken,
    stage: IngestStage,
    #[cfg(test)]
    on_enter: Option<&'a dyn Fn(IngestStage)>,
}

impl<'a> Progress<'a> {
    fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            stage: IngestStage::Validating,
            #[cfg(test)]
            on_enter: None,
        }
    }

    fn enter(&mut self, stage: IngestStage) -> Result<(), IngestError> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        debug!(from = %self.stage, to = %stage, "ingest stage");
        self.stage = stage;
        self.entered(stage);
        Ok(())
    }

    #[cfg(test)]
    fn entered(&self, stage: IngestStage) {
        if let Some(on_enter) = self.on_enter {
            on_enter(stage);
        }
    }

    #[cfg(not(test))]
    fn entered(&self, _stage: IngestStage) {}

    fn finish(&mut self) {
        self.stage = IngestStage::Done;
    }
}

/// Pick the slug candidate: the caller's hint, else the content directory name.
fn candidate_slug(preferred: Option<&str>, content_root: &ContentRoot) -> String {
    let source = preferred
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .or(content_root.directory_name.as_deref())
        .unwrap_or_default();
    slugify_or_random(source)
}
