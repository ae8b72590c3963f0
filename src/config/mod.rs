//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_STORAGE_ROOT: &str = "content";
const DEFAULT_PUBLIC_BASE_PREFIX: &str = "/content";
const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";
const DEFAULT_ENTRY_DOCUMENTS: &[&str] = &["index.md", "index.mdx"];
const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 256 * 1024 * 1024;
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Absolute path of the content storage root.
    pub root: PathBuf,
    /// Either empty or a `/`-prefixed path without trailing slash.
    pub public_base_prefix: String,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Lowercase archive extension without the leading dot.
    pub archive_extension: String,
    /// Accepted entry document file names, in preference order.
    pub entry_documents: Vec<String>,
    pub max_archive_bytes: NonZeroU64,
    pub max_extracted_bytes: NonZeroU64,
    pub max_entries: NonZeroU32,
    /// Parent directory for extraction workspaces; system temp dir when `None`.
    pub workspace_dir: Option<PathBuf>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            entry_documents: default_entry_documents(),
            max_archive_bytes: NonZeroU64::new(DEFAULT_MAX_ARCHIVE_BYTES)
                .unwrap_or(NonZeroU64::MAX),
            max_extracted_bytes: NonZeroU64::new(DEFAULT_MAX_EXTRACTED_BYTES)
                .unwrap_or(NonZeroU64::MAX),
            max_entries: NonZeroU32::new(DEFAULT_MAX_ENTRIES as u32).unwrap_or(NonZeroU32::MAX),
            workspace_dir: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("ingest.entry_documents")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    ingest: RawIngestSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.storage_root.as_ref() {
            self.storage.root = Some(root.clone());
        }
        if let Some(prefix) = overrides.public_base_prefix.as_ref() {
            self.storage.public_base_prefix = Some(prefix.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            storage,
            ingest,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            storage: build_storage_settings(storage)?,
            ingest: build_ingest_settings(ingest)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let root = storage
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.root", "path must not be empty"));
    }
    let root = std::path::absolute(&root)
        .map_err(|err| LoadError::invalid("storage.root", format!("cannot resolve: {err}")))?;

    let prefix = storage
        .public_base_prefix
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_PREFIX.to_string());
    let public_base_prefix = normalize_public_prefix(&prefix)
        .map_err(|reason| LoadError::invalid("storage.public_base_prefix", reason))?;

    Ok(StorageSettings {
        root,
        public_base_prefix,
    })
}

fn build_ingest_settings(ingest: RawIngestSettings) -> Result<IngestSettings, LoadError> {
    let extension = ingest
        .archive_extension
        .unwrap_or_else(|| DEFAULT_ARCHIVE_EXTENSION.to_string());
    let archive_extension = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if archive_extension.is_empty()
        || !archive_extension
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric())
    {
        return Err(LoadError::invalid(
            "ingest.archive_extension",
            format!("`{extension}` is not a file extension"),
        ));
    }

    let entry_documents = match ingest.entry_documents {
        Some(documents) => documents
            .into_iter()
            .map(|document| document.trim().to_string())
            .collect(),
        None => default_entry_documents(),
    };
    if entry_documents.is_empty() {
        return Err(LoadError::invalid(
            "ingest.entry_documents",
            "at least one entry document name is required",
        ));
    }
    if let Some(bad) = entry_documents
        .iter()
        .find(|document| !is_plain_file_name(document))
    {
        return Err(LoadError::invalid(
            "ingest.entry_documents",
            format!("`{bad}` is not a plain file name"),
        ));
    }

    let max_archive_bytes = non_zero_u64(
        ingest.max_archive_bytes.unwrap_or(DEFAULT_MAX_ARCHIVE_BYTES),
        "ingest.max_archive_bytes",
    )?;
    let max_extracted_bytes = non_zero_u64(
        ingest
            .max_extracted_bytes
            .unwrap_or(DEFAULT_MAX_EXTRACTED_BYTES),
        "ingest.max_extracted_bytes",
    )?;
    let max_entries = non_zero_u32(
        ingest.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
        "ingest.max_entries",
    )?;

    let workspace_dir = ingest
        .workspace_dir
        .filter(|path| !path.as_os_str().is_empty());

    Ok(IngestSettings {
        archive_extension,
        entry_documents,
        max_archive_bytes,
        max_extracted_bytes,
        max_entries,
        workspace_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    root: Option<PathBuf>,
    public_base_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIngestSettings {
    archive_extension: Option<String>,
    entry_documents: Option<Vec<String>>,
    max_archive_bytes: Option<u64>,
    max_extracted_bytes: Option<u64>,
    max_entries: Option<u64>,
    workspace_dir: Option<PathBuf>,
}

fn default_entry_documents() -> Vec<String> {
    DEFAULT_ENTRY_DOCUMENTS
        .iter()
        .map(|document| (*document).to_string())
        .collect()
}

/// Normalize a URL path prefix to `""` or `/segment[/segment…]`.
pub fn normalize_public_prefix(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.contains(['?', '#']) {
        return Err(format!("`{raw}` must be a plain path"));
    }
    let inner = trimmed.trim_matches('/');
    if inner.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("/{inner}"))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some()
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
