//! Compass vertex: LM-driven strategic assessment of growth direction.

use super::{call_lm, parse_json_response, Vertex, VertexContext};
use crate::schema::{ActionProposal, CompassPayload, GoalAlignment, VertexAttachments, VertexName, VertexVote};
use async_trait::async_trait;
use chrono::Utc;
use pentagram_shared::LmProvider;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CompassVertex {
    llm: Arc<dyn LmProvider>,
}

impl CompassVertex {
    pub fn new(llm: Arc<dyn LmProvider>) -> Self {
        Self { llm }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueAssessmentResponse {
    #[serde(default)]
    growth_contribution: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    domains_advanced: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoalAlignmentResponse {
    #[serde(default)]
    alignment_score: f64,
    #[serde(default)]
    misalignment_flags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompassResponse {
    #[serde(default)]
    value_assessment: ValueAssessmentResponse,
    #[serde(default)]
    predictions: Vec<String>,
    #[serde(default)]
    goal_alignment: GoalAlignmentResponse,
    #[serde(default)]
    suggested_directions: Vec<String>,
    #[serde(default)]
    score: f64,
}

fn build_prompt(
    message: &str,
    garden_patterns: &Option<Vec<crate::schema::GardenPattern>>,
    identity_context: &Option<serde_json::Value>,
) -> String {
    let patterns = garden_patterns
        .as_ref()
        .map(|p| serde_json::to_string(p).unwrap_or_default())
        .unwrap_or_default();
    format!(
        "Assess the strategic/value significance of this experience.\n\
         Experience: {message}\n\
         Garden patterns: {patterns}\n\
         Identity context: {}\n\
         Respond as JSON: {{\"value_assessment\": {{\"growth_contribution\": 0.0, \
         \"reasoning\": \"...\", \"domains_advanced\": [...]}}, \"predictions\": [...], \
         \"goal_alignment\": {{\"alignment_score\": 0.0, \"misalignment_flags\": [...]}}, \
         \"suggested_directions\": [...], \"score\": 0.0}}",
        identity_context.as_ref().map(ToString::to_string).unwrap_or_default(),
    )
}

#[async_trait]
impl Vertex for CompassVertex {
    fn name(&self) -> VertexName {
        VertexName::Compass
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
        let prompt = build_prompt(message, &context.garden_patterns, &context.identity_context);

        let (text, _latency) = call_lm(self.llm.as_ref(), &prompt, 0.4, 700).await?;
        let json = parse_json_response(&text)?;
        let parsed: CompassResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("compass response did not match expected schema: {e}"))?;

        let action_proposals = parsed
            .suggested_directions
            .iter()
            .map(|direction| ActionProposal::PursueDirection {
                direction: direction.clone(),
            })
            .collect();

        let attachments = VertexAttachments::Compass(CompassPayload {
            goal_alignment: GoalAlignment {
                alignment_score: parsed.goal_alignment.alignment_score.clamp(0.0, 1.0),
                misalignment_flags: parsed.goal_alignment.misalignment_flags,
            },
            domains_advanced: parsed.value_assessment.domains_advanced,
            predictions: parsed.predictions,
            extras: HashMap::new(),
        });

        Ok(VertexVote::new(
            VertexName::Compass,
            parsed.score,
            parsed.value_assessment.reasoning,
            action_proposals,
            Vec::new(),
            attachments,
            Utc::now(),
        ))
    }
}
