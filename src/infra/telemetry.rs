use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
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

/// Register descriptions for every metric the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "fequery_query_fetch_total",
            Unit::Count,
            "Total number of query fetches started."
        );
        describe_counter!(
            "fequery_query_dedup_total",
            Unit::Count,
            "Total number of subscriptions that joined an in-flight fetch."
        );
        describe_counter!(
            "fequery_query_discarded_total",
            Unit::Count,
            "Total number of fetch results discarded as superseded or orphaned."
        );
        describe_histogram!(
            "fequery_query_fetch_ms",
            Unit::Milliseconds,
            "Query fetch latency in milliseconds."
        );
        describe_gauge!(
            "fequery_query_entries",
            Unit::Count,
            "Current number of entries held by the query cache."
        );
        describe_counter!(
            "fequery_mutation_total",
            Unit::Count,
            "Total number of mutations run, labelled by kind and outcome."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn second_init_reports_telemetry_error() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };
        let _ = init(&logging);

        let err = init(&logging).expect_err("subscriber already installed");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
