use super::GLOBAL_LABELS;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets to measure the distribution of request durations in seconds
const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// The extraction flow is bounded by the streaming and parsing timeouts,
/// so its buckets are much coarser.
const EXTRACT_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0];

/// Installs the global prometheus recorder. The rendered metrics are served
/// by the health-check listener.
pub fn init_metrics() -> PrometheusHandle {
    let mut builder = PrometheusBuilder::new()
        .set_buckets(DEFAULT_DURATION_BUCKETS)
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Prefix("extract_".to_owned()),
                EXTRACT_DURATION_BUCKETS,
            )
        })
        .unwrap_or_else(|err| panic!("BUG: invalid histogram buckets: {err}"));

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install_recorder()
        .unwrap_or_else(|err| panic!("BUG: failed to initialize the metrics recorder: {err}"))
}
