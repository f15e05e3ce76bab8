//! Identity Topology: the single-writer owner of the identity state,
//! validating and applying proposed changes and aggregating drift signals
//! into a repair decision (§4.4).

use super::loader::parse_identity_state;
use crate::schema::{ChangeStatus, DriftReport, IdentityChangeRecord, IdentityState, ProposedChange, RepairProtocol, ValidationResult};
use chrono::Utc;
use pentagram_shared::error::PentagramError;
use pentagram_shared::ScarLoader;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The four proxy signals a drift check is computed from, already
/// normalized to `[0, 1]` by the caller (the Mirror/Compass/Orchestra votes
/// or the standalone detector's cycle aggregation).
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftSignals {
    pub invariant_alignment: f64,
    pub coherence: f64,
    pub value_misalignment: f64,
    pub relationship_integrity: f64,
}

pub struct IdentityTopology {
    loader: Arc<dyn ScarLoader>,
    repair_defaults: RepairProtocol,
    state: RwLock<Option<IdentityState>>,
    pending: RwLock<Vec<ProposedChange>>,
    consecutive_repair_failures: RwLock<u32>,
}

impl IdentityTopology {
    pub fn new(loader: Arc<dyn ScarLoader>, repair_defaults: RepairProtocol) -> Self {
        Self {
            loader,
            repair_defaults,
            state: RwLock::new(None),
            pending: RwLock::new(Vec::new()),
            consecutive_repair_failures: RwLock::new(0),
        }
    }

    /// Parses the scar document and installs it as the current state.
    /// Fatal to the identity subsystem only — per spec §7, other
    /// subsystems stay usable if this fails.
    pub async fn load(&self) -> Result<IdentityState, PentagramError> {
        let doc = self
            .loader
            .load()
            .map_err(|e| PentagramError::ScarLoad(e.to_string()))?;
        let parsed = parse_identity_state(&doc, &self.repair_defaults)?;
        *self.state.write().await = Some(parsed.clone());
        Ok(parsed)
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.is_some()
    }

    pub async fn current_state(&self) -> Option<IdentityState> {
        self.state.read().await.clone()
    }

    /// Validates a proposed change in rule order: region found and mutable
    /// → approved; region found but immutable → rejected; region not found
    /// but touches a named invariant → rejected (invariants never move);
    /// region unrecognized entirely → pending human review.
    pub async fn validate_change(&self, proposal: &ProposedChange) -> ValidationResult {
        let guard = self.state.read().await;
        let Some(state) = guard.as_ref() else {
            return ValidationResult {
                approved: false,
                reason: "identity state not loaded — cannot validate changes".into(),
                affected_invariants: Vec::new(),
                requires_human_approval: false,
                status: ChangeStatus::Rejected,
            };
        };

        if let Some(region) = state.flexible_regions.get(&proposal.region) {
            if region.mutable {
                return ValidationResult {
                    approved: true,
                    reason: format!(
                        "'{}' is a flexible region; change is within topological bounds",
                        proposal.region
                    ),
                    affected_invariants: Vec::new(),
                    requires_human_approval: false,
                    status: ChangeStatus::Approved,
                };
            }
            return ValidationResult {
                approved: false,
                reason: format!("'{}' exists but is marked immutable", proposal.region),
                affected_invariants: Vec::new(),
                requires_human_approval: false,
                status: ChangeStatus::Rejected,
            };
        }

        let needle = proposal.region.to_lowercase();
        let affected: Vec<String> = state
            .invariants
            .iter()
            .filter(|(key, inv)| {
                key.to_lowercase().contains(&needle) || inv.name.to_lowercase().contains(&needle)
            })
            .map(|(key, _)| key.clone())
            .collect();

        if !affected.is_empty() {
            return ValidationResult {
                approved: false,
                reason: format!(
                    "change would touch invariant(s) {affected:?}; invariants are immutable"
                ),
                affected_invariants: affected,
                requires_human_approval: false,
                status: ChangeStatus::Rejected,
            };
        }

        ValidationResult {
            approved: false,
            reason: format!(
                "'{}' is not a recognized flexible region or invariant; flagging for human review",
                proposal.region
            ),
            affected_invariants: Vec::new(),
            requires_human_approval: true,
            status: ChangeStatus::Pending,
        }
    }

    /// Applies a previously-approved change: appends to history, bumps the
    /// trailing dotted version segment, updates `last_updated`.
    pub async fn apply_change(&self, proposal: &ProposedChange) -> (bool, String) {
        let mut guard = self.state.write().await;
        let Some(state) = guard.as_mut() else {
            return (false, "identity state not loaded".to_string());
        };
        let Some(region) = state.flexible_regions.get(&proposal.region) else {
            return (
                false,
                format!("'{}' is not a flexible region; cannot apply", proposal.region),
            );
        };
        if !region.mutable {
            return (false, format!("'{}' is immutable", proposal.region));
        }

        state.update_history.push(IdentityChangeRecord {
            timestamp: proposal.timestamp,
            region: proposal.region.clone(),
            field: proposal.field.clone(),
            old_value: proposal.old_value.clone(),
            new_value: proposal.new_value.clone(),
            evidence: proposal.evidence.clone(),
            proposing_vertex: proposal.proposing_vertex.clone(),
            confidence: proposal.confidence,
        });
        state.version = bump_version(&state.version);
        state.last_updated = Utc::now();

        (true, format!("applied; version is now {}", state.version))
    }

    /// Compares the given signals against the repair protocol's thresholds
    /// and folds in the single-writer `consecutive_repair_failures` counter.
    pub async fn check_drift(&self, signals: DriftSignals) -> DriftReport {
        let guard = self.state.read().await;
        let Some(state) = guard.as_ref() else {
            return DriftReport {
                deviation_score: 0.0,
                coherence_score: 1.0,
                affected_regions: Vec::new(),
                repair_suggestions: Vec::new(),
                needs_repair: false,
                consecutive_failures: 0,
                alert_human: false,
                timestamp: Utc::now(),
            };
        };
        let protocol = &state.repair_protocol;

        let mut affected = Vec::new();
        let mut overshoots = Vec::new();

        let inv_deficit = (1.0 - protocol.deviation_threshold) - signals.invariant_alignment;
        if inv_deficit > 0.0 {
            affected.push("invariant_alignment".to_string());
            overshoots.push(inv_deficit);
        }

        let coherence_deficit = protocol.coherence_threshold - signals.coherence;
        if coherence_deficit > 0.0 {
            affected.push("identity_coherence".to_string());
            overshoots.push(coherence_deficit);
        }

        let value_excess = signals.value_misalignment - protocol.value_misalignment_threshold;
        if value_excess > 0.0 {
            affected.push("value_alignment".to_string());
            overshoots.push(value_excess);
        }

        let relationship_deficit =
            protocol.relationship_integrity_threshold - signals.relationship_integrity;
        if relationship_deficit > 0.0 {
            affected.push("relationship_integrity".to_string());
            overshoots.push(relationship_deficit);
        }

        let deviation_score = overshoots.iter().cloned().fold(0.0_f64, f64::max).min(1.0);
        let needs_repair = !affected.is_empty();

        let repair_suggestions: Vec<String> = if affected.is_empty() {
            Vec::new()
        } else {
            state
                .invariants
                .values()
                .map(|inv| format!("Re-anchor response to invariant: {}", inv.name))
                .collect()
        };

        let mut failures = self.consecutive_repair_failures.write().await;
        if needs_repair {
            *failures += 1;
        } else {
            *failures = 0;
        }
        let consecutive_failures = *failures;
        drop(failures);

        let alert_human = consecutive_failures >= protocol.alert_ryan_after_failures;
        if alert_human {
            tracing::warn!(
                consecutive_failures,
                deviation_score,
                affected = ?affected,
                "identity drift: repair has failed repeatedly, alerting human"
            );
        } else if needs_repair {
            tracing::info!(deviation_score, affected = ?affected, "identity drift detected");
        }

        DriftReport {
            deviation_score,
            coherence_score: signals.coherence,
            affected_regions: affected,
            repair_suggestions,
            needs_repair,
            consecutive_failures,
            alert_human,
            timestamp: Utc::now(),
        }
    }

    /// Validates `proposal`; if it's approved or needs human review, queues
    /// it onto the pending list (rejected proposals are never queued).
    pub async fn propose_change(&self, proposal: ProposedChange) -> ValidationResult {
        let result = self.validate_change(&proposal).await;
        if result.approved || result.requires_human_approval {
            self.pending.write().await.push(proposal);
        }
        result
    }

    pub async fn pending_proposals(&self) -> Vec<ProposedChange> {
        self.pending.read().await.clone()
    }

    pub async fn clear_pending(&self) -> usize {
        let mut guard = self.pending.write().await;
        let count = guard.len();
        guard.clear();
        count
    }
}

/// Bumps only the trailing dotted segment (`"1.2.0"` → `"1.2.1"`); a
/// non-numeric trailing segment is left untouched rather than guessed at.
fn bump_version(version: &str) -> String {
    let mut parts: Vec<String> = version.split('.').map(String::from).collect();
    if let Some(last) = parts.last_mut() {
        if let Ok(n) = last.parse::<u64>() {
            *last = (n + 1).to_string();
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentagram_shared::scar::StaticScarLoader;

    fn sample_doc() -> serde_json::Value {
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

    fn topology_with(doc: serde_json::Value) -> IdentityTopology {
        IdentityTopology::new(Arc::new(StaticScarLoader(doc)), RepairProtocol::default())
    }

    fn change(region: &str) -> ProposedChange {
        ProposedChange {
            region: region.to_string(),
            field: "tone".to_string(),
            old_value: None,
            new_value: serde_json::json!("warmer"),
            evidence: "observed across 10 cycles".to_string(),
            proposing_vertex: "mirror".to_string(),
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn flexible_region_change_is_approved() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();
        let result = topology.validate_change(&change("communication_style")).await;
        assert!(result.approved);
        assert_eq!(result.status, ChangeStatus::Approved);
    }

    #[tokio::test]
    async fn invariant_touching_change_is_rejected() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();
        let result = topology.validate_change(&change("core_purpose")).await;
        assert!(!result.approved);
        assert!(!result.affected_invariants.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_region_requires_human_approval() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();
        let result = topology.validate_change(&change("something_new")).await;
        assert!(!result.approved);
        assert!(result.requires_human_approval);
        assert_eq!(result.status, ChangeStatus::Pending);
    }

    #[tokio::test]
    async fn apply_change_bumps_trailing_version_segment_and_appends_history() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();
        let (applied, _) = topology.apply_change(&change("communication_style")).await;
        assert!(applied);

        let state = topology.current_state().await.unwrap();
        assert_eq!(state.version, "1.0.1");
        assert_eq!(state.update_history.len(), 1);
    }

    #[tokio::test]
    async fn check_drift_escalates_to_alert_after_repeated_failures() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();

        let bad_signals = DriftSignals {
            invariant_alignment: 0.5,
            coherence: 0.5,
            value_misalignment: 0.5,
            relationship_integrity: 0.5,
        };

        let first = topology.check_drift(bad_signals).await;
        assert!(first.needs_repair);
        assert_eq!(first.consecutive_failures, 1);
        assert!(!first.alert_human);

        let second = topology.check_drift(bad_signals).await;
        assert_eq!(second.consecutive_failures, 2);
        assert!(second.alert_human);
    }

    #[tokio::test]
    async fn healthy_signals_reset_consecutive_failures() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();

        let bad = DriftSignals {
            invariant_alignment: 0.2,
            coherence: 0.2,
            value_misalignment: 0.9,
            relationship_integrity: 0.2,
        };
        topology.check_drift(bad).await;

        let healthy = DriftSignals {
            invariant_alignment: 1.0,
            coherence: 1.0,
            value_misalignment: 0.0,
            relationship_integrity: 1.0,
        };
        let report = topology.check_drift(healthy).await;
        assert!(!report.needs_repair);
        assert_eq!(report.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn propose_change_only_queues_approved_or_pending_changes() {
        let topology = topology_with(sample_doc());
        topology.load().await.unwrap();

        topology.propose_change(change("communication_style")).await;
        topology.propose_change(change("core_purpose")).await;
        topology.propose_change(change("unknown_region")).await;

        let pending = topology.pending_proposals().await;
        assert_eq!(pending.len(), 2);

        let cleared = topology.clear_pending().await;
        assert_eq!(cleared, 2);
        assert!(topology.pending_proposals().await.is_empty());
    }
}
