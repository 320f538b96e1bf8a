//! Capability ports for fire-and-forget side channels
//!
//! Analytics, secrets and metrics are injected into the pipeline rather than
//! constructed by it. None of them may fail the caller: every operation
//! reports success as a value and logs the cause of a failure.

mod analytics;
mod metrics;
mod secrets;

pub use analytics::{AnalyticsSink, JsonlAnalyticsSink, NoopAnalytics};
pub use metrics::{MetricsSink, NoopMetrics, TracingMetrics};
pub use secrets::{DirSecretStore, EnvSecretStore, NoopSecrets, SecretStore};

use std::sync::Arc;

/// The side channels one pipeline is wired to
#[derive(Debug, Clone)]
pub struct Ports {
    pub analytics: Arc<dyn AnalyticsSink>,
    pub secrets: Arc<dyn SecretStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Ports {
    /// All ports disabled
    pub fn noop() -> Self {
        Self {
            analytics: Arc::new(NoopAnalytics),
            secrets: Arc::new(NoopSecrets),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self::noop()
    }
}
