//! Exercises the Kernel together with the Identity Topology, Standalone
//! Drift Detector, Development Monitor, and Metrics Bridge — collaborators
//! the Kernel never calls itself (§6's External Interfaces are each owned
//! independently), wired together here the way a caller is expected to.

use pentagram_core::identity::StandaloneDriftDetector;
use pentagram_core::schema::{ProposedChange, RepairProtocol, VertexName};
use pentagram_core::vertex::compass::CompassVertex;
use pentagram_core::vertex::garden::GardenVertex;
use pentagram_core::vertex::ledger::LedgerVertex;
use pentagram_core::vertex::mirror::MirrorVertex;
use pentagram_core::vertex::orchestra::OrchestraVertex;
use pentagram_core::{AppConfig, DevelopmentMonitor, IdentityTopology, Kernel, MetricsSink, PentagramMetrics};
use pentagram_shared::llm::StubLmProvider;
use pentagram_shared::memory::NullMemoryStore;
use pentagram_shared::scar::StaticScarLoader;
use std::sync::Arc;

fn garden_response(cross_domain: bool) -> String {
    serde_json::json!({
        "patterns_detected": [
            {"pattern": "recurring theme", "significance": 0.6, "cross_domain": cross_domain, "recurring": true}
        ],
        "themes": ["architecture"],
        "connections_to_existing": [],
        "pruning_recommendations": [],
        "importance_score": 0.5,
        "reasoning": "noticed a pattern"
    })
    .to_string()
}

fn mirror_response(depth: u8, meta: bool, alignment: f64) -> String {
    serde_json::json!({
        "self_reflection": "reflecting carefully",
        "self_model_updates": [],
        "identity_alignment": {"invariant_alignment": alignment, "drift_detected": false},
        "growth_indicators": {"self_reference_depth": depth, "meta_cognitive_moment": meta},
        "score": 0.6
    })
    .to_string()
}

fn compass_response(alignment: f64) -> String {
    serde_json::json!({
        "value_assessment": {"growth_contribution": 0.4, "reasoning": "solid progress", "domains_advanced": []},
        "predictions": [],
        "goal_alignment": {"alignment_score": alignment, "misalignment_flags": []},
        "suggested_directions": [],
        "score": 0.5
    })
    .to_string()
}

fn build_kernel(cross_domain: bool, depth: u8, meta: bool, alignment: f64) -> Kernel {
    let config = AppConfig::default();
    let mut kernel = Kernel::new(&config);
    kernel.register_vertex(Arc::new(LedgerVertex::new(Arc::new(NullMemoryStore))));
    kernel.register_vertex(Arc::new(GardenVertex::new(Arc::new(
        StubLmProvider::with_responses([garden_response(cross_domain)]),
    ))));
    kernel.register_vertex(Arc::new(MirrorVertex::new(Arc::new(
        StubLmProvider::with_responses([mirror_response(depth, meta, alignment)]),
    ))));
    kernel.register_vertex(Arc::new(CompassVertex::new(Arc::new(
        StubLmProvider::with_responses([compass_response(alignment)]),
    ))));
    kernel.register_vertex(Arc::new(OrchestraVertex::new()));
    kernel
}

fn sample_scar() -> serde_json::Value {
    serde_json::json!({
        "omega_identity": {
            "name": "Omega",
            "metadata": { "version": "1.0.0" },
            "topology": {
                "invariants": {
                    "core_purpose": { "name": "core_purpose", "value": "grow", "immutable": true }
                },
                "flexible_regions": {
                    "communication_style": { "mutable": true }
                },
                "repair_protocol": { "alert_ryan_if": "repair_fails_2_consecutive_times" }
            }
        }
    })
}

#[tokio::test]
async fn full_cycle_feeds_identity_monitor_and_metrics() {
    let kernel = build_kernel(true, 4, true, 0.95);
    let result = kernel
        .process(serde_json::json!({"message": "we discussed the new architecture at length"}), None)
        .await
        .unwrap();

    assert_eq!(result.successful_votes(), 5);
    assert!(result.has_synthesis());

    let topology = Arc::new(IdentityTopology::new(
        Arc::new(StaticScarLoader(sample_scar())),
        RepairProtocol::default(),
    ));
    topology.load().await.unwrap();

    let detector = StandaloneDriftDetector::new(topology.clone(), 50);
    detector.record_cycle(result.clone()).await;
    let drift = detector.check_now().await;
    // Orchestra's score is fixed at 0.5 by spec, and the default
    // relationship_integrity_threshold is 0.9, so a relationship deficit is
    // expected even on an otherwise healthy cycle — what matters here is
    // that the *other* three signals (driven by Mirror/Compass) stay clean.
    assert!(!drift.affected_regions.contains(&"invariant_alignment".to_string()));
    assert!(!drift.affected_regions.contains(&"value_alignment".to_string()));

    let monitor = DevelopmentMonitor::new(100);
    let snapshot = monitor.record_cycle(&result).await;
    assert!(snapshot.meta_cognitive_moment);
    assert!(snapshot.novel_connection_count > 0);

    let milestones = monitor.milestones().await;
    assert!(milestones.iter().any(|m| m.milestone_type == "first_meta_cognitive"));
    assert!(milestones.iter().any(|m| m.milestone_type == "first_cross_domain"));
    assert!(milestones.iter().any(|m| m.milestone_type == "deep_self_reference"));

    let proposal = ProposedChange {
        region: "communication_style".to_string(),
        field: "tone".to_string(),
        old_value: None,
        new_value: serde_json::json!("warmer"),
        evidence: "observed across recent cycles".to_string(),
        proposing_vertex: "mirror".to_string(),
        confidence: 0.8,
        timestamp: result.timestamp,
    };
    let validation = topology.propose_change(proposal.clone()).await;
    assert!(validation.approved);
    let (applied, _) = topology.apply_change(&proposal).await;
    assert!(applied);
    assert_eq!(topology.current_state().await.unwrap().version, "1.0.1");

    let development_level = monitor.get_development_level().await.level;
    let metrics = PentagramMetrics::new().unwrap();
    metrics.record_cycle(&result, development_level);
    let encoded = metrics.encode().unwrap();
    assert!(encoded.contains("pentagram_cycles_total"));
    assert!(encoded.contains("pentagram_vertex_score"));
}

#[tokio::test]
async fn repeated_degraded_cycles_escalate_drift_to_human_alert() {
    let topology = Arc::new(IdentityTopology::new(
        Arc::new(StaticScarLoader(sample_scar())),
        RepairProtocol::default(),
    ));
    topology.load().await.unwrap();
    let detector = StandaloneDriftDetector::new(topology.clone(), 50);

    for _ in 0..2 {
        let kernel = build_kernel(false, 0, false, 0.1);
        let result = kernel
            .process(serde_json::json!({"message": "something feels off"}), None)
            .await
            .unwrap();
        detector.record_cycle(result).await;
        detector.check_now().await;
    }

    let final_report = detector.check_now().await;
    assert!(final_report.needs_repair);
    assert!(final_report.alert_human || final_report.consecutive_failures >= 2);
}

#[tokio::test]
async fn tension_between_garden_and_mirror_surfaces_in_result() {
    let kernel = build_kernel(false, 1, false, 0.9);
    let result = kernel
        .process(serde_json::json!({"message": "quiet cycle"}), None)
        .await
        .unwrap();

    assert_eq!(result.votes.len(), 5);
    assert!(result.votes.contains_key(&VertexName::Orchestra));
}
