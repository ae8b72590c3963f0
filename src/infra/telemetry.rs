use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_INGEST_TOTAL: &str = "folio_ingest_total";
pub const METRIC_INGEST_FAILED_TOTAL: &str = "folio_ingest_failed_total";
pub const METRIC_INGEST_MS: &str = "folio_ingest_ms";
pub const METRIC_CONTENT_DELETED_TOTAL: &str = "folio_content_deleted_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_INGEST_TOTAL,
            Unit::Count,
            "Total number of archives ingested successfully."
        );
        describe_counter!(
            METRIC_INGEST_FAILED_TOTAL,
            Unit::Count,
            "Total number of failed ingestions, labelled by failure kind."
        );
        describe_histogram!(
            METRIC_INGEST_MS,
            Unit::Milliseconds,
            "End-to-end ingestion latency in milliseconds."
        );
        describe_counter!(
            METRIC_CONTENT_DELETED_TOTAL,
            Unit::Count,
            "Total number of post directories removed."
        );
    });
}
