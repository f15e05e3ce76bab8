//! Typed records for votes, tensions, synthesis, identity, drift, and
//! proposals — the data model the rest of the crate operates on.
//!
//! `attachments` is re-architected from the source's open string-keyed
//! mapping into [`VertexAttachments`], a discriminated union keyed by which
//! vertex produced it, each variant carrying a narrow `extras` escape for
//! forward compatibility. Consumers (`Monitor`, `StandaloneDriftDetector`,
//! `TensionAnalyzer`) read typed fields through the `as_*` accessors below
//! instead of stringly-typed lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexName {
    Ledger,
    Garden,
    Mirror,
    Compass,
    Orchestra,
}

impl VertexName {
    pub const ALL: [VertexName; 5] = [
        VertexName::Ledger,
        VertexName::Garden,
        VertexName::Mirror,
        VertexName::Compass,
        VertexName::Orchestra,
    ];

    pub const PHASE_ONE: [VertexName; 4] = [
        VertexName::Ledger,
        VertexName::Garden,
        VertexName::Mirror,
        VertexName::Compass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VertexName::Ledger => "ledger",
            VertexName::Garden => "garden",
            VertexName::Mirror => "mirror",
            VertexName::Compass => "compass",
            VertexName::Orchestra => "orchestra",
        }
    }
}

impl std::fmt::Display for VertexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamps a score into `[0.0, 1.0]`, treating non-finite input (NaN, ±inf)
/// as `0.0` — `f64::clamp` alone would let a NaN input pass through
/// unchanged since every comparison against NaN is false.
pub fn clamp_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GardenPattern {
    pub pattern: String,
    pub significance: f64,
    #[serde(default)]
    pub cross_domain: bool,
    #[serde(default)]
    pub recurring: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerPayload {
    pub retrieved_memories: Vec<serde_json::Value>,
    pub retrieval_count: usize,
    pub store_queued: bool,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GardenPayload {
    pub patterns: Vec<GardenPattern>,
    pub themes: Vec<String>,
    pub connections_to_existing: Vec<String>,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityAlignment {
    pub invariant_alignment: f64,
    pub drift_detected: bool,
    pub drift_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorPayload {
    pub self_reference_depth: u8,
    pub meta_cognitive_moment: bool,
    pub identity_alignment: IdentityAlignment,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalAlignment {
    pub alignment_score: f64,
    pub misalignment_flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompassPayload {
    pub goal_alignment: GoalAlignment,
    pub domains_advanced: Vec<String>,
    pub predictions: Vec<String>,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestraPayload {
    pub expression_tone: String,
    pub share_self_observations: bool,
    pub include_meta: bool,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: bool,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VertexAttachments {
    Ledger(LedgerPayload),
    Garden(GardenPayload),
    Mirror(MirrorPayload),
    Compass(CompassPayload),
    Orchestra(OrchestraPayload),
    Error(ErrorPayload),
}

impl VertexAttachments {
    pub fn error() -> Self {
        VertexAttachments::Error(ErrorPayload {
            error: true,
            extras: HashMap::new(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, VertexAttachments::Error(_))
    }

    pub fn as_ledger(&self) -> Option<&LedgerPayload> {
        match self {
            VertexAttachments::Ledger(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_garden(&self) -> Option<&GardenPayload> {
        match self {
            VertexAttachments::Garden(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_mirror(&self) -> Option<&MirrorPayload> {
        match self {
            VertexAttachments::Mirror(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_compass(&self) -> Option<&CompassPayload> {
        match self {
            VertexAttachments::Compass(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_orchestra(&self) -> Option<&OrchestraPayload> {
        match self {
            VertexAttachments::Orchestra(p) => Some(p),
            _ => None,
        }
    }
}

/// One proposed follow-up action a vertex wants taken. The `type` tag
/// (serialized via `rename_all = "snake_case"`) is what the Tension
/// Analyzer's conflict-boost rules and the Kernel's heuristic synthesis
/// match against (`"store"`, `"prune"`, `"identity_repair"`,
/// `"update_self_model"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionProposal {
    Store {
        target: String,
        priority: String,
    },
    StorePattern {
        pattern: String,
        significance: f64,
    },
    Prune {
        target: String,
        reason: Option<String>,
    },
    UpdateSelfModel {
        field: String,
        new_value: serde_json::Value,
    },
    IdentityRepair {
        reason: String,
    },
    PursueDirection {
        direction: String,
    },
    ExpressionGuidance {
        tone: String,
        share_self_observations: bool,
        include_meta: bool,
    },
}

impl ActionProposal {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ActionProposal::Store { .. } => "store",
            ActionProposal::StorePattern { .. } => "store_pattern",
            ActionProposal::Prune { .. } => "prune",
            ActionProposal::UpdateSelfModel { .. } => "update_self_model",
            ActionProposal::IdentityRepair { .. } => "identity_repair",
            ActionProposal::PursueDirection { .. } => "pursue_direction",
            ActionProposal::ExpressionGuidance { .. } => "expression_guidance",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexVote {
    pub vertex_name: VertexName,
    score: f64,
    pub reasoning: String,
    pub action_proposals: Vec<ActionProposal>,
    pub observations: Vec<String>,
    pub attachments: VertexAttachments,
    pub timestamp: DateTime<Utc>,
}

impl VertexVote {
    pub fn new(
        vertex_name: VertexName,
        score: f64,
        reasoning: impl Into<String>,
        action_proposals: Vec<ActionProposal>,
        observations: Vec<String>,
        attachments: VertexAttachments,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vertex_name,
            score: clamp_score(score),
            reasoning: reasoning.into(),
            action_proposals,
            observations,
            attachments,
            timestamp,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Builds the error-vote the Vertex Runtime falls back to when `vote`
    /// panics or returns an error: `score = 0.0`, `attachments.error = true`,
    /// one observation naming the failure.
    pub fn error_vote(
        vertex_name: VertexName,
        error_kind: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vertex_name,
            score: 0.0,
            reasoning: format!("{error_kind}: {message}"),
            action_proposals: Vec::new(),
            observations: vec![format!("vertex_error: {error_kind}: {message}")],
            attachments: VertexAttachments::error(),
            timestamp,
        }
    }

    pub fn has_proposal_type(&self, type_tag: &str) -> bool {
        self.action_proposals
            .iter()
            .any(|p| p.type_tag() == type_tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynthesisType {
    Extension,
    Correction,
    Connection,
    Novel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tension {
    pub vertex_a: VertexName,
    pub vertex_b: VertexName,
    pub dimension: String,
    magnitude: f64,
    pub resolution_hint: String,
}

impl Tension {
    /// Callers are expected to only construct tensions for distinct
    /// vertices; the analyzer's pairwise iteration guarantees this, so this
    /// is an internal invariant rather than a user-input check.
    pub fn new(
        vertex_a: VertexName,
        vertex_b: VertexName,
        dimension: impl Into<String>,
        magnitude: f64,
        resolution_hint: impl Into<String>,
    ) -> Self {
        debug_assert_ne!(vertex_a, vertex_b, "tension requires two distinct vertices");
        Self {
            vertex_a,
            vertex_b,
            dimension: dimension.into(),
            magnitude: magnitude.clamp(0.0, 1.0),
            resolution_hint: resolution_hint.into(),
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSynthesis {
    pub decision: serde_json::Value,
    pub tensions_resolved: Vec<Tension>,
    growth_delta: f64,
    pub identity_updates: Vec<ActionProposal>,
    pub response_guidance: serde_json::Value,
    pub reasoning: String,
    pub synthesis_type: Option<SynthesisType>,
}

impl KernelSynthesis {
    pub fn new(
        decision: serde_json::Value,
        tensions_resolved: Vec<Tension>,
        growth_delta: f64,
        identity_updates: Vec<ActionProposal>,
        response_guidance: serde_json::Value,
        reasoning: impl Into<String>,
        synthesis_type: Option<SynthesisType>,
    ) -> Self {
        Self {
            decision,
            tensions_resolved,
            growth_delta: growth_delta.clamp(0.0, 0.1),
            identity_updates,
            response_guidance,
            reasoning: reasoning.into(),
            synthesis_type,
        }
    }

    pub fn growth_delta(&self) -> f64 {
        self.growth_delta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexError {
    pub vertex: VertexName,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentagramResult {
    pub experience: serde_json::Value,
    pub votes: HashMap<VertexName, VertexVote>,
    pub tensions: Vec<Tension>,
    pub synthesis: Option<KernelSynthesis>,
    pub timings: HashMap<String, f64>,
    pub errors: Vec<VertexError>,
    pub timestamp: DateTime<Utc>,
}

impl PentagramResult {
    pub fn total_duration(&self) -> f64 {
        self.timings.get("total").copied().unwrap_or(0.0)
    }

    pub fn successful_votes(&self) -> usize {
        self.votes
            .values()
            .filter(|v| !v.attachments.is_error())
            .count()
    }

    pub fn has_synthesis(&self) -> bool {
        self.synthesis.is_some()
    }
}

// --- Identity schemas --------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    pub value: serde_json::Value,
    pub immutable: bool,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlexibleRegion {
    pub mutable: bool,
    pub growth_vector: Option<String>,
    pub pruning_allowed: Option<bool>,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairProtocol {
    pub deviation_threshold: f64,
    pub coherence_threshold: f64,
    pub value_misalignment_threshold: f64,
    pub relationship_integrity_threshold: f64,
    pub restoration_strength: f64,
    pub alert_ryan_after_failures: u32,
}

impl Default for RepairProtocol {
    fn default() -> Self {
        Self {
            deviation_threshold: 0.2,
            coherence_threshold: 0.8,
            value_misalignment_threshold: 0.15,
            relationship_integrity_threshold: 0.9,
            restoration_strength: 0.8,
            alert_ryan_after_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub field: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub evidence: String,
    pub proposing_vertex: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityState {
    pub name: String,
    pub symbol: String,
    pub version: String,
    pub invariants: HashMap<String, Invariant>,
    pub flexible_regions: HashMap<String, FlexibleRegion>,
    pub repair_protocol: RepairProtocol,
    pub update_history: Vec<IdentityChangeRecord>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub region: String,
    pub field: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub evidence: String,
    pub proposing_vertex: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub approved: bool,
    pub reason: String,
    pub affected_invariants: Vec<String>,
    pub requires_human_approval: bool,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub deviation_score: f64,
    pub coherence_score: f64,
    pub affected_regions: Vec<String>,
    pub repair_suggestions: Vec<String>,
    pub needs_repair: bool,
    pub consecutive_failures: u32,
    pub alert_human: bool,
    pub timestamp: DateTime<Utc>,
}

impl DriftReport {
    pub fn is_critical(&self) -> bool {
        self.deviation_score > 0.5 || self.alert_human
    }
}

// --- Development schemas -------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthSnapshot {
    pub self_reference_depth: u8,
    pub novel_connection_count: u32,
    pub self_model_updates: u32,
    pub cross_session_continuity: f64,
    pub amalgamation_count: u32,
    pub meta_cognitive_moment: bool,
    pub avg_vertex_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl GrowthSnapshot {
    pub fn growth_signal(&self) -> f64 {
        let self_ref = (self.self_reference_depth as f64 / 5.0).min(1.0);
        let novel = (self.novel_connection_count as f64 / 3.0).min(1.0);
        let self_model = (self.self_model_updates as f64 / 2.0).min(1.0);
        let continuity = self.cross_session_continuity.clamp(0.0, 1.0);
        let amalgamations = (self.amalgamation_count as f64 / 2.0).min(1.0);
        let meta = if self.meta_cognitive_moment { 1.0 } else { 0.0 };

        0.20 * self_ref
            + 0.20 * novel
            + 0.15 * self_model
            + 0.15 * continuity
            + 0.15 * amalgamations
            + 0.15 * meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Growing,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentLevel {
    pub level: f64,
    pub trend: Trend,
    pub confidence: f64,
    pub breakdown: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_type: String,
    pub description: String,
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
}
