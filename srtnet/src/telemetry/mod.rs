//! # Telemetry and Observability
//!
//! Structured logging plus event-driven metrics for the session engine.
//!
//! ## Architecture
//!
//! 1. **Hot path** (receive/send): fire-and-forget metric events via channel
//! 2. **Metrics thread**: aggregates events and logs periodic summaries
//! 3. **Logging**: lifecycle at `info`, per connection at `debug`, per message
//!    at `trace`
//!
//! ## Usage
//!
//! ```no_run
//! use srtnet::config::GlobalConfig;
//! use srtnet::telemetry::{init_telemetry, record_metric, MetricsEvent};
//!
//! let metrics = init_telemetry(&GlobalConfig::default())?;
//! record_metric(MetricsEvent::MessageSent { bytes: 1000 });
//! metrics.shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    record_metric, start_metrics_task, MetricsCollector, MetricsEvent, MetricsHandle,
    MetricsSnapshot,
};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{GlobalConfig, LoggingConfig};

/// Initialize logging and, if enabled, the metrics thread.
pub fn init_telemetry(global: &GlobalConfig) -> Result<MetricsHandle> {
    init_logging(&global.logging, &global.telemetry.service_name)?;

    let metrics_handle = if global.telemetry.enable_metrics {
        tracing::info!(
            service = %global.telemetry.service_name,
            interval_secs = global.telemetry.report_interval_secs,
            "Starting event-driven metrics system"
        );
        start_metrics_task(&global.telemetry)?
    } else {
        tracing::warn!("Metrics collection is disabled");
        MetricsHandle::disabled()
    };

    Ok(metrics_handle)
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. A second call is a
/// no-op.
pub fn init_logging(logging: &LoggingConfig, service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.to_string()))?;

    let installed = if logging.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(logging.include_file_line)
            .with_file(logging.include_file_line);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(logging.enable_colors)
            .with_line_number(logging.include_file_line)
            .with_file(logging.include_file_line);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };

    match installed {
        Ok(()) => tracing::info!(service = %service_name, level = %logging.level, "Logging initialized"),
        Err(_) => tracing::debug!("Logging already initialized"),
    }
    Ok(())
}
