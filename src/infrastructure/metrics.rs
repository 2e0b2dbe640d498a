//! Prometheus metrics.
//!
//! All metrics live on an explicit registry owned by this struct; nothing
//! registers into a process-wide default. The exposition endpoint gathers
//! from here.

use prometheus::{IntCounter, IntGaugeVec, Opts, Registry};

const METRICS_PREFIX: &str = "nightshift_";

pub struct Metrics {
    registry: Registry,
    /// Total number of processed scale events.
    pub scale_event: IntCounter,
    /// Total number of errors while scaling.
    pub scale_error: IntCounter,
    /// Total number of errors while resyncing objects.
    pub resync_error: IntCounter,
    /// Total number of watcher connection retries.
    pub watch_retries: IntCounter,
    /// Total number of error events received from watcher connections.
    pub watch_event_error: IntCounter,
    replicas: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(format!("{METRICS_PREFIX}{name}"), help))
        };
        let scale_event = counter("scale_event", "The total number of processed scale events")?;
        let scale_error = counter("scale_error", "The total number of errors while scaling")?;
        let resync_error = counter(
            "resync_error",
            "The total number of errors while resyncing objects",
        )?;
        let watch_retries = counter(
            "watch_retries",
            "The total number of watcher connection retries",
        )?;
        let watch_event_error = counter(
            "watch_event_error",
            "The total number of error events received from watcher connections",
        )?;
        let replicas = IntGaugeVec::new(
            Opts::new(
                format!("{METRICS_PREFIX}replicas"),
                "The last replica count set per namespace and scanner",
            ),
            &["namespace", "scanner"],
        )?;

        registry.register(Box::new(scale_event.clone()))?;
        registry.register(Box::new(scale_error.clone()))?;
        registry.register(Box::new(resync_error.clone()))?;
        registry.register(Box::new(watch_retries.clone()))?;
        registry.register(Box::new(watch_event_error.clone()))?;
        registry.register(Box::new(replicas.clone()))?;

        Ok(Self {
            registry,
            scale_event,
            scale_error,
            resync_error,
            watch_retries,
            watch_event_error,
            replicas,
        })
    }

    /// Record the last replica count set for a workload.
    pub fn set_replicas(&self, namespace: &str, scanner: &str, replicas: i64) {
        self.replicas
            .with_label_values(&[namespace, scanner])
            .set(replicas);
    }

    pub fn replicas_for(&self, namespace: &str, scanner: &str) -> i64 {
        self.replicas.with_label_values(&[namespace, scanner]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_exact() {
        let metrics = Metrics::new().unwrap();
        metrics.scale_event.inc();
        metrics.set_replicas("shop", "deployment", 3);

        let names: Vec<String> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        for expected in [
            "nightshift_scale_event",
            "nightshift_scale_error",
            "nightshift_resync_error",
            "nightshift_watch_retries",
            "nightshift_watch_event_error",
            "nightshift_replicas",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_replicas_gauge_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.set_replicas("shop", "deployment", 5);
        assert_eq!(metrics.replicas_for("shop", "deployment"), 5);
        metrics.set_replicas("shop", "deployment", 0);
        assert_eq!(metrics.replicas_for("shop", "deployment"), 0);
    }
}
