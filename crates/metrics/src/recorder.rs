use {
    anyhow::Context,
    metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle},
    tracing::info,
};

use crate::{DURATION_BUCKETS, describe_all, fetch};

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Render the current state in the Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus.run_upkeep();
        self.prometheus.render()
    }
}

impl std::fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandle").finish_non_exhaustive()
    }
}

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(fetch::REQUEST_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .context("configuring histogram buckets")
}

/// Install the global Prometheus recorder. Fails if a recorder is already
/// installed.
pub fn init_metrics() -> anyhow::Result<MetricsHandle> {
    let prometheus = builder()?
        .install_recorder()
        .context("installing Prometheus recorder")?;
    describe_all();
    info!("prometheus metrics recorder installed");
    Ok(MetricsHandle { prometheus })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, crate::cache};

    #[test]
    fn local_recorder_renders_counters_and_histograms() {
        let recorder = builder().unwrap().build_recorder();
        let handle = MetricsHandle {
            prometheus: recorder.handle(),
        };

        metrics::with_local_recorder(&recorder, || {
            crate::counter!(cache::OPERATIONS_TOTAL, "operation" => "hit").increment(2);
            crate::histogram!(fetch::REQUEST_DURATION_SECONDS).record(0.2);
        });

        let text = handle.render();
        assert!(text.contains("proxy_cache_operations_total{operation=\"hit\"} 2"));
        assert!(text.contains("proxy_request_duration_seconds_bucket"));
    }
}
