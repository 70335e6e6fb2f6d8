//! Prometheus registry for the command-line tool.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

fn register_metrics(registry: &Registry) {
    for metric in audioconv_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use audioconv_core::metrics::{BATCHES_TOTAL, CONVERSIONS_TOTAL};

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Prometheus only outputs labelled metrics that have been touched
        CONVERSIONS_TOTAL
            .with_label_values(&["flac", "success"])
            .inc();
        BATCHES_TOTAL.with_label_values(&["completed"]).inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("audioconv_conversions_total"));
        assert!(output.contains("audioconv_batches_total"));
        assert!(output.contains("audioconv_spawn_failures_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
