//! Development Monitor: tracks growth snapshots over a bounded sliding
//! window and raises first-occurrence milestones (§4.6).

use crate::schema::{
    ActionProposal, DevelopmentLevel, GrowthSnapshot, Milestone, PentagramResult, Trend, VertexName,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

const TREND_WINDOW: usize = 20;
const TREND_HALF: usize = TREND_WINDOW / 2;
const TREND_DELTA: f64 = 0.02;
const CONFIDENCE_SATURATION: f64 = 50.0;
const BASE_LEVEL: f64 = 0.05;
const LEVEL_SCALE: f64 = 0.10;

struct MonitorState {
    snapshots: VecDeque<GrowthSnapshot>,
    milestones: Vec<Milestone>,
    cycle_count: u64,
}

pub struct DevelopmentMonitor {
    capacity: usize,
    state: RwLock<MonitorState>,
}

impl DevelopmentMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(MonitorState {
                snapshots: VecDeque::with_capacity(capacity),
                milestones: Vec::new(),
                cycle_count: 0,
            }),
        }
    }

    pub async fn record_cycle(&self, result: &PentagramResult) -> GrowthSnapshot {
        let snapshot = build_snapshot(result);
        let mut state = self.state.write().await;
        state.cycle_count += 1;
        if state.snapshots.len() == self.capacity {
            state.snapshots.pop_front();
        }
        state.snapshots.push_back(snapshot.clone());
        check_milestones(&mut state, &snapshot);
        snapshot
    }

    pub async fn get_development_level(&self) -> DevelopmentLevel {
        let state = self.state.read().await;
        if state.snapshots.is_empty() {
            return DevelopmentLevel {
                level: BASE_LEVEL,
                trend: Trend::Stable,
                confidence: 0.0,
                breakdown: HashMap::new(),
            };
        }

        let signals: Vec<f64> = state.snapshots.iter().map(|s| s.growth_signal()).collect();
        let avg_signal = average(&signals);
        let level = round_to(BASE_LEVEL + avg_signal * LEVEL_SCALE, 4);

        let trend = if signals.len() >= TREND_WINDOW {
            let recent = average(&signals[signals.len() - TREND_HALF..]);
            let previous =
                average(&signals[signals.len() - TREND_WINDOW..signals.len() - TREND_HALF]);
            if recent > previous + TREND_DELTA {
                Trend::Growing
            } else if recent < previous - TREND_DELTA {
                Trend::Declining
            } else {
                Trend::Stable
            }
        } else {
            Trend::Stable
        };

        let confidence = round_to((state.snapshots.len() as f64 / CONFIDENCE_SATURATION).min(1.0), 2);

        let mut breakdown = HashMap::new();
        breakdown.insert("avg_growth_signal".to_string(), round_to(avg_signal, 4));
        breakdown.insert(
            "avg_self_reference_depth".to_string(),
            round_to(
                average(
                    &state
                        .snapshots
                        .iter()
                        .map(|s| s.self_reference_depth as f64)
                        .collect::<Vec<_>>(),
                ),
                2,
            ),
        );
        breakdown.insert(
            "meta_cognitive_rate".to_string(),
            round_to(
                state.snapshots.iter().filter(|s| s.meta_cognitive_moment).count() as f64
                    / state.snapshots.len() as f64,
                3,
            ),
        );
        breakdown.insert(
            "avg_vertex_score".to_string(),
            round_to(
                average(&state.snapshots.iter().map(|s| s.avg_vertex_score).collect::<Vec<_>>()),
                3,
            ),
        );

        DevelopmentLevel {
            level,
            trend,
            confidence,
            breakdown,
        }
    }

    pub async fn cycle_count(&self) -> u64 {
        self.state.read().await.cycle_count
    }

    pub async fn milestones(&self) -> Vec<Milestone> {
        self.state.read().await.milestones.clone()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.state.read().await.snapshots.len()
    }
}

fn build_snapshot(result: &PentagramResult) -> GrowthSnapshot {
    let mirror = result.votes.get(&VertexName::Mirror);
    let garden = result.votes.get(&VertexName::Garden);
    let ledger = result.votes.get(&VertexName::Ledger);

    let self_reference_depth = mirror
        .and_then(|v| v.attachments.as_mirror())
        .map(|p| p.self_reference_depth)
        .unwrap_or(0);

    let meta_cognitive_moment = mirror
        .and_then(|v| v.attachments.as_mirror())
        .map(|p| p.meta_cognitive_moment)
        .unwrap_or(false);

    let novel_connection_count = garden
        .and_then(|v| v.attachments.as_garden())
        .map(|p| p.patterns.iter().filter(|pattern| pattern.cross_domain).count() as u32)
        .unwrap_or(0);

    let self_model_updates = mirror
        .map(|v| {
            v.action_proposals
                .iter()
                .filter(|p| matches!(p, ActionProposal::UpdateSelfModel { .. }))
                .count() as u32
        })
        .unwrap_or(0);

    let retrieval_count = ledger
        .and_then(|v| v.attachments.as_ledger())
        .map(|p| p.retrieval_count)
        .unwrap_or(0);
    let cross_session_continuity = (retrieval_count as f64 / 5.0).min(1.0);

    let avg_vertex_score = if result.votes.is_empty() {
        0.0
    } else {
        average(&result.votes.values().map(|v| v.score()).collect::<Vec<_>>())
    };

    GrowthSnapshot {
        self_reference_depth,
        novel_connection_count,
        self_model_updates,
        cross_session_continuity,
        // Set externally after an amalgamation stage; no such stage exists here.
        amalgamation_count: 0,
        meta_cognitive_moment,
        avg_vertex_score,
        timestamp: Utc::now(),
    }
}

fn check_milestones(state: &mut MonitorState, snapshot: &GrowthSnapshot) {
    let has_meta_cognitive = state
        .milestones
        .iter()
        .any(|m| m.milestone_type == "first_meta_cognitive");
    let has_cross_domain = state
        .milestones
        .iter()
        .any(|m| m.milestone_type == "first_cross_domain");
    let has_deep_self_reference = state
        .milestones
        .iter()
        .any(|m| m.milestone_type == "deep_self_reference");

    if snapshot.meta_cognitive_moment && !has_meta_cognitive {
        state.milestones.push(Milestone {
            milestone_type: "first_meta_cognitive".to_string(),
            description: "first meta-cognitive moment observed".to_string(),
            cycle: state.cycle_count,
            timestamp: Utc::now(),
        });
    }
    if snapshot.novel_connection_count > 0 && !has_cross_domain {
        state.milestones.push(Milestone {
            milestone_type: "first_cross_domain".to_string(),
            description: "first cross-domain pattern connection".to_string(),
            cycle: state.cycle_count,
            timestamp: Utc::now(),
        });
    }
    if snapshot.self_reference_depth >= 3 && !has_deep_self_reference {
        state.milestones.push(Milestone {
            milestone_type: "deep_self_reference".to_string(),
            description: "reached self-reference depth 3 or deeper for the first time".to_string(),
            cycle: state.cycle_count,
            timestamp: Utc::now(),
        });
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MirrorPayload, IdentityAlignment, VertexAttachments, VertexVote};
    use chrono::Utc;

    fn cycle_with_mirror(depth: u8, meta: bool, score: f64) -> PentagramResult {
        let mut votes = HashMap::new();
        votes.insert(
            VertexName::Mirror,
            VertexVote::new(
                VertexName::Mirror,
                score,
                "r",
                vec![],
                vec![],
                VertexAttachments::Mirror(MirrorPayload {
                    self_reference_depth: depth,
                    meta_cognitive_moment: meta,
                    identity_alignment: IdentityAlignment::default(),
                    extras: HashMap::new(),
                }),
                Utc::now(),
            ),
        );
        PentagramResult {
            experience: serde_json::json!({}),
            votes,
            tensions: vec![],
            synthesis: None,
            timings: HashMap::new(),
            errors: vec![],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_monitor_reports_baseline_level() {
        let monitor = DevelopmentMonitor::new(100);
        let level = monitor.get_development_level().await;
        assert_eq!(level.level, 0.05);
        assert_eq!(level.confidence, 0.0);
        assert_eq!(level.trend, Trend::Stable);
    }

    #[tokio::test]
    async fn meta_cognitive_moment_fires_milestone_once() {
        let monitor = DevelopmentMonitor::new(100);
        monitor.record_cycle(&cycle_with_mirror(1, true, 0.5)).await;
        monitor.record_cycle(&cycle_with_mirror(1, true, 0.5)).await;

        let milestones = monitor.milestones().await;
        let count = milestones
            .iter()
            .filter(|m| m.milestone_type == "first_meta_cognitive")
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn deep_self_reference_milestone_requires_depth_three() {
        let monitor = DevelopmentMonitor::new(100);
        monitor.record_cycle(&cycle_with_mirror(2, false, 0.5)).await;
        assert!(monitor.milestones().await.is_empty());

        monitor.record_cycle(&cycle_with_mirror(3, false, 0.5)).await;
        assert!(monitor
            .milestones()
            .await
            .iter()
            .any(|m| m.milestone_type == "deep_self_reference"));
    }

    #[tokio::test]
    async fn window_respects_capacity() {
        let monitor = DevelopmentMonitor::new(5);
        for _ in 0..10 {
            monitor.record_cycle(&cycle_with_mirror(1, false, 0.5)).await;
        }
        assert_eq!(monitor.snapshot_count().await, 5);
        assert_eq!(monitor.cycle_count().await, 10);
    }

    #[tokio::test]
    async fn trend_detects_growth_after_twenty_snapshots() {
        let monitor = DevelopmentMonitor::new(100);
        for _ in 0..10 {
            monitor.record_cycle(&cycle_with_mirror(0, false, 0.1)).await;
        }
        for _ in 0..10 {
            monitor.record_cycle(&cycle_with_mirror(5, true, 0.9)).await;
        }
        let level = monitor.get_development_level().await;
        assert_eq!(level.trend, Trend::Growing);
    }
}
