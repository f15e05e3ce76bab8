//! Standalone Drift Detector: aggregates recent cycle results into the four
//! proxy signals `IdentityTopology::check_drift` expects, independent of
//! any single cycle's Mirror/Compass/Orchestra votes (§4.5).

use super::topology::{DriftSignals, IdentityTopology};
use crate::schema::{DriftReport, PentagramResult, VertexName};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct StandaloneDriftDetector {
    topology: Arc<IdentityTopology>,
    capacity: usize,
    recent_cycles: RwLock<VecDeque<PentagramResult>>,
    check_count: RwLock<u64>,
}

impl StandaloneDriftDetector {
    pub fn new(topology: Arc<IdentityTopology>, capacity: usize) -> Self {
        Self {
            topology,
            capacity: capacity.max(1),
            recent_cycles: RwLock::new(VecDeque::with_capacity(capacity)),
            check_count: RwLock::new(0),
        }
    }

    pub async fn record_cycle(&self, result: PentagramResult) {
        let mut cycles = self.recent_cycles.write().await;
        if cycles.len() == self.capacity {
            cycles.pop_front();
        }
        cycles.push_back(result);
    }

    pub async fn check_now(&self) -> DriftReport {
        *self.check_count.write().await += 1;
        let signals = self.aggregate_signals().await;
        self.topology.check_drift(signals).await
    }

    pub async fn cycle_count(&self) -> usize {
        self.recent_cycles.read().await.len()
    }

    pub async fn check_count(&self) -> u64 {
        *self.check_count.read().await
    }

    async fn aggregate_signals(&self) -> DriftSignals {
        let cycles = self.recent_cycles.read().await;
        if cycles.is_empty() {
            return DriftSignals {
                invariant_alignment: 1.0,
                coherence: 1.0,
                value_misalignment: 0.0,
                relationship_integrity: 1.0,
            };
        }

        let mut invariant_alignments = Vec::new();
        let mut compass_alignments = Vec::new();
        let mut orchestra_scores = Vec::new();
        let mut tension_magnitudes = Vec::new();

        for cycle in cycles.iter() {
            if let Some(mirror) = cycle.votes.get(&VertexName::Mirror) {
                if let Some(payload) = mirror.attachments.as_mirror() {
                    invariant_alignments.push(payload.identity_alignment.invariant_alignment);
                }
            }
            if let Some(compass) = cycle.votes.get(&VertexName::Compass) {
                if let Some(payload) = compass.attachments.as_compass() {
                    compass_alignments.push(payload.goal_alignment.alignment_score);
                }
            }
            if let Some(orchestra) = cycle.votes.get(&VertexName::Orchestra) {
                orchestra_scores.push(orchestra.score());
            }
            tension_magnitudes.extend(cycle.tensions.iter().map(|t| t.magnitude()));
        }

        let coherence = if tension_magnitudes.is_empty() {
            1.0
        } else {
            (1.0 - average(&tension_magnitudes)).clamp(0.0, 1.0)
        };

        DriftSignals {
            invariant_alignment: average_or(&invariant_alignments, 1.0),
            coherence,
            value_misalignment: if compass_alignments.is_empty() {
                0.0
            } else {
                (1.0 - average(&compass_alignments)).clamp(0.0, 1.0)
            },
            relationship_integrity: average_or(&orchestra_scores, 1.0),
        }
    }
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn average_or(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        default
    } else {
        average(values)
    }
}
