//! Logging and metrics setup.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` style directives come from the config; an unparsable filter
/// falls back to `info`.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

/// Installs the Prometheus recorder and its scrape listener on `addr`.
pub fn install_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("commands_total", "Commands handled, by command and outcome");
    metrics::describe_counter!("events_published_total", "Envelopes published, by topic");
    metrics::describe_counter!("publish_failures_total", "Envelopes the bus refused");
    metrics::describe_gauge!(
        "command_outbox_pending",
        "Committed envelopes waiting to be republished"
    );
    metrics::describe_counter!(
        "item_store_writes_total",
        "Authoritative store writes, by operation and outcome"
    );
    metrics::describe_counter!(
        "processor_envelopes_total",
        "Envelopes processed by the single writer, by outcome"
    );
    metrics::describe_counter!("processor_conflicts_total", "Version conflicts retried");
    metrics::describe_histogram!(
        "processor_apply_seconds",
        metrics::Unit::Seconds,
        "Time from receipt to final outcome of an envelope"
    );
    metrics::describe_counter!("dead_letters_total", "Dead letters published, by reason");
    metrics::describe_counter!(
        "cache_sync_events_total",
        "Confirmations handled by the cache synchronizer, by outcome"
    );
    metrics::describe_counter!("projections_events_processed", "Envelopes delivered to projections");
    metrics::describe_counter!("cache_reads_total", "Read-path cache lookups, by result");
    metrics::describe_counter!("cache_errors_total", "Read-path cache failures, by operation");
}
