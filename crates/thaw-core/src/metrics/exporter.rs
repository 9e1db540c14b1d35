//! Prometheus recorder installation.
//!
//! A run is short-lived, so metrics normally go to a Prometheus push gateway.
//! A listen address serves `/metrics` for as long as the process lives. With
//! neither configured the recorder still collects, and the final snapshot is
//! logged when the run finishes.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use tracing::{debug, error, info};

use crate::config::MetricsConfig;
use crate::error::{
    AlreadyInitializedSnafu, ConflictingExportersSnafu, InvalidMetricsAddressSnafu,
    MetricsError, PrometheusInitSnafu,
};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// Slack after the last push interval for the request itself.
const PUSH_GRACE: Duration = Duration::from_secs(1);

/// Handle on the installed recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
    push_interval: Option<Duration>,
}

/// Build a Prometheus builder for `config` without installing it.
pub fn builder(config: &MetricsConfig) -> Result<PrometheusBuilder, MetricsError> {
    ensure!(
        config.address.is_none() || config.push_gateway.is_none(),
        ConflictingExportersSnafu
    );

    let mut builder = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?;

    if let Some(address) = &config.address {
        let addr: SocketAddr = address
            .parse()
            .context(InvalidMetricsAddressSnafu { address })?;
        builder = builder.with_http_listener(addr);
    }
    if let Some(push) = &config.push_gateway {
        builder = builder
            .with_push_gateway(
                &push.endpoint,
                push.interval(),
                push.username.clone(),
                push.password.clone(),
            )
            .context(PrometheusInitSnafu)?;
    }
    Ok(builder)
}

/// Install the global recorder and start the configured exporter.
///
/// Must be called from within a Tokio runtime when an exporter is configured.
pub fn init_global(config: &MetricsConfig) -> Result<MetricsController, MetricsError> {
    let builder = builder(config)?;

    let (recorder, exporter) = if config.is_exporting() {
        let (recorder, exporter) = builder.build().context(PrometheusInitSnafu)?;
        (recorder, Some(exporter))
    } else {
        (builder.build_recorder(), None)
    };
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| AlreadyInitializedSnafu.build())?;

    if let Some(exporter) = exporter {
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                error!(error = ?e, "Metrics exporter stopped");
            }
        });
    }

    if let Some(address) = &config.address {
        info!(%address, "Serving metrics");
    }
    let push_interval = config.push_gateway.as_ref().map(|push| {
        info!(endpoint = %push.endpoint, interval = ?push.interval(), "Pushing metrics");
        push.interval()
    });

    Ok(MetricsController {
        handle,
        push_interval,
    })
}

impl MetricsController {
    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Let the exporter ship the final values of the run.
    ///
    /// With a push gateway this waits one push interval so the last push
    /// happens after every metric of the run was recorded.
    pub async fn finish(self) {
        if let Some(interval) = self.push_interval {
            info!("Waiting {:?} for the final metrics push", interval);
            tokio::time::sleep(interval + PUSH_GRACE).await;
        }
        debug!(metrics = %self.render(), "Final metrics snapshot");
    }
}
