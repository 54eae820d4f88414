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
/// Fails if a global subscriber is already installed.
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Register descriptions for every cache metric with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "querycache_hit_total",
            Unit::Count,
            "Total number of query results served from storage."
        );
        describe_counter!(
            "querycache_miss_total",
            Unit::Count,
            "Total number of query executions that issued a request."
        );
        describe_counter!(
            "querycache_evict_total",
            Unit::Count,
            "Total number of entries removed by eviction policies."
        );
        describe_counter!(
            "querycache_invalidated_total",
            Unit::Count,
            "Total number of cached queries invalidated by tag."
        );
        describe_gauge!(
            "querycache_subscriptions",
            Unit::Count,
            "Current number of live invalidation subscriptions."
        );
        describe_histogram!(
            "querycache_request_ms",
            Unit::Milliseconds,
            "Endpoint request latency in milliseconds."
        );
    });
}
