/// Fire-and-forget numeric gauge export
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    /// Returns whether the point was accepted
    fn export_gauge(&self, metric: &str, value: f64, labels: &[(&str, &str)]) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn export_gauge(&self, _metric: &str, _value: f64, _labels: &[(&str, &str)]) -> bool {
        true
    }
}

/// Emits gauges as structured tracing events on `guardian::metrics`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn export_gauge(&self, metric: &str, value: f64, labels: &[(&str, &str)]) -> bool {
        if !value.is_finite() {
            tracing::warn!("Skipping non-finite value for metric {}", metric);
            return false;
        }

        let labels = labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(target: "guardian::metrics", metric, value, labels = %labels, "gauge");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_metrics_rejects_nan() {
        let sink = TracingMetrics;
        assert!(sink.export_gauge("agent/x", 3.0, &[("agent", "a")]));
        assert!(!sink.export_gauge("agent/x", f64::NAN, &[]));
    }
}
