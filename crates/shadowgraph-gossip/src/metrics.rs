//! Prometheus metrics for the shadow graph

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Metrics published by a [`ShadowGraph`](crate::ShadowGraph)
#[derive(Clone)]
pub struct ShadowGraphMetrics {
    /// Current size of the tip set
    pub tips: IntGauge,
    /// Events currently indexed
    pub events: IntGauge,
    /// Generations that should be expired but are held by reservations
    pub generations_awaiting_expiry: IntGauge,
    pub events_inserted: IntCounter,
    pub events_expired: IntCounter,
    /// Insertion failures by error label
    pub insertions_rejected: IntCounterVec,
    /// Logged anomalies by kind
    pub anomalies: IntCounterVec,
}

impl ShadowGraphMetrics {
    /// Create metrics and register them with `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let tips = IntGauge::new("shadowgraph_tips", "Shadow events with no self child")?;
        let events = IntGauge::new("shadowgraph_events", "Shadow events currently indexed")?;
        let generations_awaiting_expiry = IntGauge::new(
            "shadowgraph_generations_awaiting_expiry",
            "Generations held back from expiry by reservations",
        )?;
        let events_inserted = IntCounter::new(
            "shadowgraph_events_inserted_total",
            "Events inserted into the shadow graph",
        )?;
        let events_expired = IntCounter::new(
            "shadowgraph_events_expired_total",
            "Events expired from the shadow graph",
        )?;
        let insertions_rejected = IntCounterVec::new(
            Opts::new(
                "shadowgraph_insertions_rejected_total",
                "Events the shadow graph refused to insert",
            ),
            &["reason"],
        )?;
        let anomalies = IntCounterVec::new(
            Opts::new(
                "shadowgraph_anomalies_total",
                "Tolerated inconsistencies observed by the shadow graph",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(tips.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(generations_awaiting_expiry.clone()))?;
        registry.register(Box::new(events_inserted.clone()))?;
        registry.register(Box::new(events_expired.clone()))?;
        registry.register(Box::new(insertions_rejected.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;

        Ok(Self {
            tips,
            events,
            generations_awaiting_expiry,
            events_inserted,
            events_expired,
            insertions_rejected,
            anomalies,
        })
    }

    /// Count of anomalies recorded under `kind`
    pub fn anomaly_count(&self, kind: &str) -> u64 {
        self.anomalies.with_label_values(&[kind]).get()
    }

    /// Count of insertions rejected under `reason`
    pub fn rejection_count(&self, reason: &str) -> u64 {
        self.insertions_rejected.with_label_values(&[reason]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register() {
        let registry = Registry::new();
        let metrics = ShadowGraphMetrics::new(&registry).unwrap();

        metrics.tips.set(3);
        metrics.anomalies.with_label_values(&["tip_overflow"]).inc();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"shadowgraph_tips".to_string()));
        assert!(names.contains(&"shadowgraph_anomalies_total".to_string()));
        assert_eq!(metrics.anomaly_count("tip_overflow"), 1);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ShadowGraphMetrics::new(&registry).unwrap();
        assert!(ShadowGraphMetrics::new(&registry).is_err());
    }
}
