//! Metrics exporter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_push_interval_secs() -> u64 {
    10
}

/// Where recorded metrics go.
///
/// At most one exporter may be configured. With neither set, metrics are
/// still recorded and the final snapshot is logged at debug level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to serve `/metrics` on for the lifetime of the process.
    #[serde(default)]
    pub address: Option<String>,
    /// Prometheus push gateway receiving the metrics of a run.
    #[serde(default)]
    pub push_gateway: Option<PushGatewayConfig>,
}

/// Push gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushGatewayConfig {
    /// Full push URL, e.g. `http://pushgateway:9091/metrics/job/thaw`.
    pub endpoint: String,
    #[serde(default = "default_push_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl PushGatewayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl MetricsConfig {
    /// Whether an exporter ships metrics out of the process.
    pub fn is_exporting(&self) -> bool {
        self.address.is_some() || self.push_gateway.is_some()
    }

    /// Merge values from another file (last-write-wins per field).
    pub fn merge_from(&mut self, other: Self) {
        if other.address.is_some() {
            self.address = other.address;
        }
        if other.push_gateway.is_some() {
            self.push_gateway = other.push_gateway;
        }
    }
}
