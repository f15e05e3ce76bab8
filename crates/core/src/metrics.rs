//! Metrics Bridge: emits the five per-cycle Prometheus series in the fixed
//! order §4.7 specifies. Emission never fails a cycle — every recording
//! call here is infallible once the metrics are constructed, and
//! construction failures are logged and fall back to [`NoopMetricsSink`].

use crate::schema::PentagramResult;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];
const SCORE_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
const LEVEL_BUCKETS: &[f64] = &[0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

pub trait MetricsSink: Send + Sync {
    /// `development_level` is the Development Monitor's current level
    /// (`get_development_level().level`), not the cycle's own growth_delta —
    /// the two are different quantities (§4.7).
    fn record_cycle(&self, result: &PentagramResult, development_level: f64);
}

/// Drops every recording. Used when metrics construction fails or a caller
/// genuinely doesn't want metrics (spec §4.7's Non-goals around dashboards,
/// not around the emission itself).
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_cycle(&self, _result: &PentagramResult, _development_level: f64) {}
}

#[derive(Clone)]
pub struct PentagramMetrics {
    pub registry: Registry,
    cycles_total: IntCounterVec,
    cycle_duration_seconds: HistogramVec,
    vertex_votes_total: IntCounterVec,
    vertex_score: HistogramVec,
    development_level: HistogramVec,
    tensions_total: IntCounterVec,
    tension_magnitude: HistogramVec,
}

impl PentagramMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let cycles_total = IntCounterVec::new(
            Opts::new("cycles_total", "Pentagram cycles by outcome status").namespace("pentagram"),
            &["status"],
        )?;

        let cycle_duration_seconds = HistogramVec::new(
            HistogramOpts::new("cycle_duration_seconds", "Total cycle duration in seconds")
                .namespace("pentagram")
                .buckets(DURATION_BUCKETS.to_vec()),
            &[],
        )?;

        let vertex_votes_total = IntCounterVec::new(
            Opts::new("vertex_votes_total", "Vertex votes by vertex and outcome status")
                .namespace("pentagram"),
            &["vertex", "status"],
        )?;

        let vertex_score = HistogramVec::new(
            HistogramOpts::new("vertex_score", "Successful vertex vote scores")
                .namespace("pentagram")
                .buckets(SCORE_BUCKETS.to_vec()),
            &["vertex"],
        )?;

        let development_level = HistogramVec::new(
            HistogramOpts::new("development_level", "Development Monitor level per cycle")
                .namespace("pentagram")
                .buckets(LEVEL_BUCKETS.to_vec()),
            &[],
        )?;

        let tensions_total = IntCounterVec::new(
            Opts::new("tensions_total", "Detected tensions by dimension").namespace("pentagram"),
            &["dimension"],
        )?;

        let tension_magnitude = HistogramVec::new(
            HistogramOpts::new("tension_magnitude", "Tension magnitudes")
                .namespace("pentagram")
                .buckets(SCORE_BUCKETS.to_vec()),
            &["dimension"],
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(vertex_votes_total.clone()))?;
        registry.register(Box::new(vertex_score.clone()))?;
        registry.register(Box::new(development_level.clone()))?;
        registry.register(Box::new(tensions_total.clone()))?;
        registry.register(Box::new(tension_magnitude.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            cycle_duration_seconds,
            vertex_votes_total,
            vertex_score,
            development_level,
            tensions_total,
            tension_magnitude,
        })
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl MetricsSink for PentagramMetrics {
    /// Emission order matches §4.7 exactly: cycle status, total duration,
    /// per-vertex votes/scores, development level, then per-tension
    /// counters/magnitudes. Only successful vertex votes feed `vertex_score`.
    fn record_cycle(&self, result: &PentagramResult, development_level: f64) {
        let successful = result.successful_votes();
        let status = if result.has_synthesis() && successful >= 4 {
            "success"
        } else if successful > 0 {
            "partial"
        } else {
            "error"
        };
        self.cycles_total.with_label_values(&[status]).inc();

        self.cycle_duration_seconds
            .with_label_values(&[])
            .observe(result.total_duration());

        for vote in result.votes.values() {
            let vote_status = if vote.attachments.is_error() { "error" } else { "success" };
            self.vertex_votes_total
                .with_label_values(&[vote.vertex_name.as_str(), vote_status])
                .inc();
            if vote_status == "success" {
                self.vertex_score
                    .with_label_values(&[vote.vertex_name.as_str()])
                    .observe(vote.score());
            }
        }

        self.development_level
            .with_label_values(&[])
            .observe(development_level);

        for tension in &result.tensions {
            self.tensions_total
                .with_label_values(&[&tension.dimension])
                .inc();
            self.tension_magnitude
                .with_label_values(&[&tension.dimension])
                .observe(tension.magnitude());
        }
    }
}

/// Builds a `PentagramMetrics`, logging and degrading to a no-op sink on
/// construction failure rather than taking down the caller (spec §7:
/// metrics emission failures are logged and swallowed, never fatal).
pub fn build_metrics_sink() -> Box<dyn MetricsSink> {
    match PentagramMetrics::new() {
        Ok(metrics) => Box::new(metrics),
        Err(err) => {
            tracing::warn!(error = %err, "failed to construct Pentagram metrics, using no-op sink");
            Box::new(NoopMetricsSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        ActionProposal, KernelSynthesis, Tension, VertexAttachments, VertexName, VertexVote,
    };
    use chrono::Utc;
    use std::collections::HashMap;

    fn healthy_result() -> PentagramResult {
        let mut votes = HashMap::new();
        for name in VertexName::ALL {
            votes.insert(
                name,
                VertexVote::new(name, 0.7, "r", vec![], vec![], VertexAttachments::error(), Utc::now()),
            );
        }
        let mut timings = HashMap::new();
        timings.insert("total".to_string(), 1.25);

        PentagramResult {
            experience: serde_json::json!({}),
            votes,
            tensions: vec![Tension::new(
                VertexName::Ledger,
                VertexName::Garden,
                "storage_vs_pruning",
                0.4,
                "hint",
            )],
            synthesis: Some(KernelSynthesis::new(
                serde_json::json!({}),
                vec![],
                0.02,
                vec![] as Vec<ActionProposal>,
                serde_json::json!({}),
                "r",
                None,
            )),
            timings,
            errors: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn records_without_panicking_and_increments_counters() {
        let metrics = PentagramMetrics::new().unwrap();
        metrics.record_cycle(&healthy_result(), 0.087);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("pentagram_cycles_total"));
        assert!(encoded.contains("pentagram_tensions_total"));
    }

    #[test]
    fn development_level_observation_uses_the_passed_level_not_growth_delta() {
        let metrics = PentagramMetrics::new().unwrap();
        metrics.record_cycle(&healthy_result(), 0.087);

        let families = metrics.registry.gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "pentagram_development_level")
            .unwrap();
        let observed = family.get_metric()[0].get_histogram().get_sample_sum();
        assert_eq!(observed, 0.087);
    }

    #[test]
    fn noop_sink_never_panics() {
        let sink = NoopMetricsSink;
        sink.record_cycle(&healthy_result(), 0.5);
    }
}
