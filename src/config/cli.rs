use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Folio content ingestion tool")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Ingest a post archive into content storage.
    Ingest(IngestArgs),
    /// Remove the content directory of a post.
    Delete(DeleteArgs),
    /// Print the public URL of a file under the storage root.
    Url(UrlArgs),
    /// List the slugs currently present in content storage.
    List,
}

#[derive(Debug, Args, Clone)]
pub struct IngestArgs {
    /// Path to the archive to ingest.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Preferred slug; defaults to the name of the archive's content directory.
    #[arg(long = "slug", value_name = "SLUG")]
    pub slug: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    /// Slug of the post to remove.
    #[arg(value_name = "SLUG")]
    pub slug: String,
}

#[derive(Debug, Args, Clone)]
pub struct UrlArgs {
    /// Absolute path of a file under the storage root.
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub path: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the content storage root directory.
    #[arg(long = "storage-root", value_name = "PATH", global = true)]
    pub storage_root: Option<PathBuf>,

    /// Override the URL prefix under which the storage root is served.
    #[arg(long = "public-base-prefix", value_name = "PREFIX", global = true)]
    pub public_base_prefix: Option<String>,
}
