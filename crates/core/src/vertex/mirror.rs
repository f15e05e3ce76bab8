//! Mirror vertex: LM-driven self-reflection against the current identity
//! state.

use super::{call_lm, parse_json_response, Vertex, VertexContext};
use crate::schema::{
    ActionProposal, IdentityAlignment, MirrorPayload, VertexAttachments, VertexName, VertexVote,
};
use async_trait::async_trait;
use chrono::Utc;
use pentagram_shared::LmProvider;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MirrorVertex {
    llm: Arc<dyn LmProvider>,
}

impl MirrorVertex {
    pub fn new(llm: Arc<dyn LmProvider>) -> Self {
        Self { llm }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SelfModelUpdateResponse {
    field: String,
    new_value: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityAlignmentResponse {
    #[serde(default)]
    invariant_alignment: f64,
    #[serde(default)]
    drift_detected: bool,
    #[serde(default)]
    drift_details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GrowthIndicatorsResponse {
    #[serde(default)]
    self_reference_depth: u8,
    #[serde(default)]
    novel_self_insight: bool,
    #[serde(default)]
    meta_cognitive_moment: bool,
}

#[derive(Debug, Default, Deserialize)]
struct MirrorResponse {
    #[serde(default)]
    self_reflection: String,
    #[serde(default)]
    self_model_updates: Vec<SelfModelUpdateResponse>,
    #[serde(default)]
    identity_alignment: IdentityAlignmentResponse,
    #[serde(default)]
    growth_indicators: GrowthIndicatorsResponse,
    #[serde(default)]
    score: f64,
}

fn build_prompt(
    message: &str,
    identity_state: &Option<serde_json::Value>,
    self_model: &Option<serde_json::Value>,
    ledger_context: &Option<serde_json::Value>,
    garden_context: &Option<serde_json::Value>,
) -> String {
    format!(
        "Reflect on this experience against the current identity.\n\
         Experience: {message}\n\
         Identity state: {}\n\
         Self model: {}\n\
         Ledger context: {}\n\
         Garden context: {}\n\
         Respond as JSON: {{\"self_reflection\": \"...\", \"self_model_updates\": [...], \
         \"identity_alignment\": {{\"invariant_alignment\": 0.0, \"drift_detected\": false}}, \
         \"growth_indicators\": {{\"self_reference_depth\": 0, \"novel_self_insight\": false, \
         \"meta_cognitive_moment\": false}}, \"score\": 0.0}}",
        identity_state.as_ref().map(ToString::to_string).unwrap_or_default(),
        self_model.as_ref().map(ToString::to_string).unwrap_or_default(),
        ledger_context.as_ref().map(ToString::to_string).unwrap_or_default(),
        garden_context.as_ref().map(ToString::to_string).unwrap_or_default(),
    )
}

#[async_trait]
impl Vertex for MirrorVertex {
    fn name(&self) -> VertexName {
        VertexName::Mirror
    }

    async fn vote(
        &self,
        experience: &serde_json::Value,
        context: &VertexContext,
    ) -> anyhow::Result<VertexVote> {
        let message = experience
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let prompt = build_prompt(
            message,
            &context.identity_state,
            &context.self_model,
            &context.ledger_context,
            &context.garden_context,
        );

        let (text, _latency) = call_lm(self.llm.as_ref(), &prompt, 0.4, 700).await?;
        let json = parse_json_response(&text)?;
        let parsed: MirrorResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("mirror response did not match expected schema: {e}"))?;

        let mut action_proposals: Vec<ActionProposal> = parsed
            .self_model_updates
            .into_iter()
            .map(|u| ActionProposal::UpdateSelfModel {
                field: u.field,
                new_value: u.new_value,
            })
            .collect();

        let mut observations = Vec::new();
        if parsed.identity_alignment.drift_detected {
            let details = parsed
                .identity_alignment
                .drift_details
                .clone()
                .unwrap_or_else(|| "identity drift detected".to_string());
            action_proposals.push(ActionProposal::IdentityRepair {
                reason: details.clone(),
            });
            // Kept for backward-compatible string scanning (Orchestra falls
            // back to this if the typed flag is ever unavailable).
            observations.push(format!("DRIFT DETECTED: {details}"));
        }

        let self_reference_depth = parsed.growth_indicators.self_reference_depth.min(5);

        let attachments = VertexAttachments::Mirror(MirrorPayload {
            self_reference_depth,
            meta_cognitive_moment: parsed.growth_indicators.meta_cognitive_moment,
            identity_alignment: IdentityAlignment {
                invariant_alignment: parsed.identity_alignment.invariant_alignment.clamp(0.0, 1.0),
                drift_detected: parsed.identity_alignment.drift_detected,
                drift_details: parsed.identity_alignment.drift_details,
            },
            extras: HashMap::new(),
        });

        Ok(VertexVote::new(
            VertexName::Mirror,
            parsed.score,
            parsed.self_reflection,
            action_proposals,
            observations,
            attachments,
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentagram_shared::llm::StubLmProvider;

    #[tokio::test]
    async fn drift_detected_emits_identity_repair_and_legacy_observation() {
        let llm = Arc::new(StubLmProvider::with_responses([serde_json::json!({
            "self_reflection": "noticing drift from core values",
            "self_model_updates": [{"field": "mood", "new_value": "cautious"}],
            "identity_alignment": {"invariant_alignment": 0.6, "drift_detected": true, "drift_details": "values slipping"},
            "growth_indicators": {"self_reference_depth": 2, "novel_self_insight": true, "meta_cognitive_moment": false},
            "score": 0.5
        }).to_string()]));

        let vertex = MirrorVertex::new(llm);
        let experience = serde_json::json!({"message": "something felt off"});
        let vote = vertex.vote(&experience, &VertexContext::default()).await.unwrap();

        assert!(vote.has_proposal_type("identity_repair"));
        assert!(vote.has_proposal_type("update_self_model"));
        assert!(vote.observations[0].contains("DRIFT DETECTED"));
        assert!(vote.attachments.as_mirror().unwrap().identity_alignment.drift_detected);
    }

    #[tokio::test]
    async fn self_reference_depth_clamped_to_five() {
        let llm = Arc::new(StubLmProvider::with_responses([serde_json::json!({
            "self_reflection": "deep recursion",
            "growth_indicators": {"self_reference_depth": 9},
            "identity_alignment": {"invariant_alignment": 1.0},
            "score": 0.9
        }).to_string()]));

        let vertex = MirrorVertex::new(llm);
        let experience = serde_json::json!({"message": "thinking about thinking"});
        let vote = vertex.vote(&experience, &VertexContext::default()).await.unwrap();

        assert_eq!(vote.attachments.as_mirror().unwrap().self_reference_depth, 5);
    }
}
