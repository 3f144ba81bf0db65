//! Prometheus export for admission gates
//!
//! [`GateMetrics`] implements [`AdmissionObserver`] so rejected admissions
//! bump a per-service counter, and samples [`GateSnapshot`]s into usage and
//! capacity gauges. Sampling is pull-based: call [`GateMetrics::sample`]
//! from whatever scrape or interval hook the surrounding service already has.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `bulkhead_limit_reached_total` | counter | `service` |
//! | `bulkhead_cancelled_total` | counter | `service` |
//! | `bulkhead_usage` | gauge | `service` |
//! | `bulkhead_capacity` | gauge | `service` |

use prometheus::{CounterVec, GaugeVec, Opts, Registry};

use crate::cancel::CancelReason;
use crate::gate::GateSnapshot;
use crate::observer::AdmissionObserver;
use crate::registry::GateRegistry;

const SERVICE_LABEL: &str = "service";

/// Prometheus collectors for admission gates
#[derive(Debug, Clone)]
pub struct GateMetrics {
    /// Counter for admissions that hit the capacity limit
    limit_reached: CounterVec,
    /// Counter for admissions abandoned through cancellation
    cancelled: CounterVec,
    /// Gauge for permits in use
    usage: GaugeVec,
    /// Gauge for configured capacity
    capacity: GaugeVec,
}

impl GateMetrics {
    /// Create the collectors and register them with `registry`
    ///
    /// # Errors
    /// Returns a Prometheus error if a collector with the same name is
    /// already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Self::build(registry, None)
    }

    /// Like [`GateMetrics::new`], prefixing every metric with `namespace_`
    ///
    /// # Errors
    /// Returns a Prometheus error if a collector with the same name is
    /// already registered.
    pub fn with_namespace(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        Self::build(registry, Some(namespace))
    }

    fn build(registry: &Registry, namespace: Option<&str>) -> Result<Self, prometheus::Error> {
        let opts = |name: &str, help: &str| {
            let base = Opts::new(name, help);
            match namespace {
                Some(namespace) => base.namespace(namespace),
                None => base,
            }
        };

        let limit_reached = CounterVec::new(
            opts(
                "bulkhead_limit_reached_total",
                "Counts the number of times bulkhead limits have been reached.",
            ),
            &[SERVICE_LABEL],
        )?;
        registry.register(Box::new(limit_reached.clone()))?;

        let cancelled = CounterVec::new(
            opts(
                "bulkhead_cancelled_total",
                "Counts admissions abandoned because the caller cancelled while waiting.",
            ),
            &[SERVICE_LABEL],
        )?;
        registry.register(Box::new(cancelled.clone()))?;

        let usage = GaugeVec::new(
            opts("bulkhead_usage", "Number of bulkhead permits currently in use."),
            &[SERVICE_LABEL],
        )?;
        registry.register(Box::new(usage.clone()))?;

        let capacity = GaugeVec::new(
            opts("bulkhead_capacity", "Maximum number of concurrent bulkhead admissions."),
            &[SERVICE_LABEL],
        )?;
        registry.register(Box::new(capacity.clone()))?;

        Ok(Self { limit_reached, cancelled, usage, capacity })
    }

    /// Export one gate's usage and capacity
    pub fn record(&self, snapshot: &GateSnapshot) {
        self.usage.with_label_values(&[snapshot.name.as_str()]).set(snapshot.usage as f64);
        self.capacity.with_label_values(&[snapshot.name.as_str()]).set(snapshot.capacity as f64);
    }

    /// Export usage and capacity for every gate in `registry`
    pub fn sample(&self, registry: &GateRegistry) {
        for snapshot in registry.snapshots() {
            self.record(&snapshot);
        }
    }
}

impl AdmissionObserver for GateMetrics {
    fn limit_reached(&self, gate: &str, _capacity: usize) {
        self.limit_reached.with_label_values(&[gate]).inc();
    }

    fn admission_cancelled(&self, gate: &str, _reason: &CancelReason) {
        self.cancelled.with_label_values(&[gate]).inc();
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};

    use super::*;

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_limit_reached_counter() {
        let registry = Registry::new();
        let metrics = GateMetrics::new(&registry).unwrap();

        metrics.limit_reached("auth", 2);

        let output = render(&registry);
        assert!(output.contains(
            "# HELP bulkhead_limit_reached_total Counts the number of times bulkhead limits have been reached."
        ));
        assert!(output.contains("bulkhead_limit_reached_total{service=\"auth\"} 1"));
    }

    #[test]
    fn test_namespace_prefix() {
        let registry = Registry::new();
        let metrics = GateMetrics::with_namespace(&registry, "app_resilience").unwrap();

        metrics.admission_cancelled("auth", &CancelReason::DeadlineExceeded);

        let output = render(&registry);
        assert!(output.contains("app_resilience_bulkhead_cancelled_total{service=\"auth\"} 1"));
    }

    #[test]
    fn test_record_snapshot_gauges() {
        let registry = Registry::new();
        let metrics = GateMetrics::new(&registry).unwrap();

        metrics.record(&GateSnapshot { name: "db".to_string(), capacity: 4, usage: 3 });

        let output = render(&registry);
        assert!(output.contains("bulkhead_usage{service=\"db\"} 3"));
        assert!(output.contains("bulkhead_capacity{service=\"db\"} 4"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        GateMetrics::new(&registry).unwrap();

        assert!(GateMetrics::new(&registry).is_err());
    }
}
