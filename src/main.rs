use std::{path::Path, process};

use bytes::Bytes;
use folio::{
    application::{error::AppError, ingest::ArchiveIngestor},
    config::{self, Command, DeleteArgs, IngestArgs, UrlArgs},
    domain::entities::PostContentRecord,
    infra::{error::InfraError, telemetry},
};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let causes = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, causes = ?causes, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, causes = ?causes, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let ingestor = ArchiveIngestor::from_settings(&settings.storage, &settings.ingest)?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    match cli_args.command {
        Command::Ingest(args) => run_ingest(&ingestor, args, &cancel).await,
        Command::Delete(args) => run_delete(&ingestor, args, &cancel).await,
        Command::Url(args) => run_url(&ingestor, args),
        Command::List => run_list(&ingestor).await,
    }
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

async fn run_ingest(
    ingestor: &ArchiveIngestor,
    args: IngestArgs,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let archive = tokio::fs::read(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        target = "folio::ingest",
        file = %args.file.display(),
        "Starting ingest"
    );

    let record = ingestor
        .ingest(Bytes::from(archive), &filename, args.slug.as_deref(), cancel)
        .await?;

    print_json(&IngestSummary::build(ingestor, &record)?)
}

async fn run_delete(
    ingestor: &ArchiveIngestor,
    args: DeleteArgs,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let deleted = ingestor.delete_content(&args.slug, cancel).await?;
    print_json(&DeleteSummary {
        slug: &args.slug,
        deleted,
    })
}

fn run_url(ingestor: &ArchiveIngestor, args: UrlArgs) -> Result<(), AppError> {
    let absolute =
        std::path::absolute(&args.path).map_err(|err| AppError::from(InfraError::Io(err)))?;
    let url = ingestor.resolve_public_url(&absolute)?;
    println!("{url}");
    Ok(())
}

async fn run_list(ingestor: &ArchiveIngestor) -> Result<(), AppError> {
    let slugs = ingestor.list_slugs().await?;
    print_json(&slugs)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{encoded}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct DeleteSummary<'a> {
    slug: &'a str,
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct IngestSummary<'a> {
    slug: &'a str,
    title: String,
    summary: Option<&'a str>,
    date: Option<String>,
    tags: &'a [String],
    root_path: &'a Path,
    index_document_path: &'a Path,
    index_document_url: String,
    hero_relative_path: Option<&'a str>,
    hero_url: Option<String>,
    source_checksum: &'a str,
}

impl<'a> IngestSummary<'a> {
    fn build(ingestor: &ArchiveIngestor, record: &'a PostContentRecord) -> Result<Self, AppError> {
        let front_matter = &record.front_matter;
        let date = front_matter
            .date
            .map(|date| date.format(&Rfc3339))
            .transpose()
            .map_err(|err| AppError::unexpected(format!("failed to format date: {err}")))?;
        let hero_url = record
            .hero_path()
            .map(|path| ingestor.resolve_public_url(&path))
            .transpose()?;

        Ok(Self {
            slug: &record.slug,
            title: record.display_title(),
            summary: front_matter.summary.as_deref(),
            date,
            tags: front_matter.tags.as_deref().unwrap_or_default(),
            root_path: &record.root_path,
            index_document_path: &record.index_document_path,
            index_document_url: ingestor.resolve_public_url(&record.index_document_path)?,
            hero_relative_path: record.hero_relative_path.as_deref(),
            hero_url,
            source_checksum: &record.source_checksum,
        })
    }
}
