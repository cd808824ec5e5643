use serde::{Deserialize, Serialize};

/// Telemetry configuration.
///
/// Metrics are aggregated in-process and reported through the log at a fixed
/// interval.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to log and metrics output.
    pub service_name: String,

    /// Enable metrics aggregation (default: true).
    ///
    /// When disabled, [`record_metric`](super::record_metric) is a no-op.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Seconds between metrics summaries in the log (default: 10).
    ///
    /// `0` disables periodic reporting; a final summary is still logged on
    /// shutdown.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_report_interval() -> u64 {
    10
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "srtnet".to_string(),
            enable_metrics: true,
            report_interval_secs: default_report_interval(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.service_name.trim().is_empty() {
            errors.push("telemetry.service_name must not be empty".to_string());
        }
        if self.report_interval_secs > 86_400 {
            errors.push("telemetry.report_interval_secs is unreasonably high (> 1 day)".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
