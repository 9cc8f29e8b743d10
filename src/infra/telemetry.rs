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

/// Per-target overrides, e.g. `PRESSROOM_LOG=pressroom::render=debug`.
pub const LOG_ENV_VAR: &str = "PRESSROOM_LOG";

/// Install the global subscriber: env filter, span traces for errors, then compact or JSON output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pressroom_render_total",
            Unit::Count,
            "Total number of render jobs finished, labelled by result."
        );
        describe_histogram!(
            "pressroom_render_ms",
            Unit::Milliseconds,
            "Time a worker spent printing one job in milliseconds."
        );
        describe_counter!(
            "pressroom_worker_restart_total",
            Unit::Count,
            "Total number of worker relaunch attempts, labelled by result."
        );
        describe_gauge!(
            "pressroom_pool_idle_workers",
            Unit::Count,
            "Current number of idle renderer workers."
        );
    });
}
