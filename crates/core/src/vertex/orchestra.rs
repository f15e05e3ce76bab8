//! Orchestra vertex: rule-based expression-strategy shaper evaluated after
//! the other four vertices have voted. No LM call.

use super::{Vertex, VertexContext};
use crate::schema::{ActionProposal, OrchestraPayload, VertexAttachments, VertexName, VertexVote};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

pub struct OrchestraVertex;

impl OrchestraVertex {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrchestraVertex {
    fn default() -> Self {
        Self::new()
    }
}

const SCORE_SHARE_THRESHOLD: f64 = 0.6;

#[async_trait]
impl Vertex for OrchestraVertex {
    fn name(&self) -> VertexName {
        VertexName::Orchestra
    }

    async fn vote(
        &self,
        _experience: &serde_json::Value,
        context: &VertexContext,
    ) -> anyhow::Result<VertexVote> {
        let other_votes = context.other_votes.clone().unwrap_or_default();

        let mirror = other_votes.get(&VertexName::Mirror);
        let drift_observed = mirror
            .map(|v| v.observations.iter().any(|o| o.contains("DRIFT")))
            .unwrap_or(false)
            || mirror
                .and_then(|v| v.attachments.as_mirror())
                .map(|p| p.identity_alignment.drift_detected)
                .unwrap_or(false);

        let any_high_score = other_votes
            .values()
            .any(|v| v.vertex_name != VertexName::Orchestra && v.score() > SCORE_SHARE_THRESHOLD);

        let (tone, share_self, reasoning) = if drift_observed {
            (
                "reflective_concerned",
                true,
                "Mirror reported identity drift; expression shifts to address it".to_string(),
            )
        } else if any_high_score {
            (
                "engaged_exploratory",
                true,
                "A vertex scored highly enough to warrant sharing self-observations".to_string(),
            )
        } else {
            (
                "natural_conversational",
                false,
                "No vertex raised a strong signal; default conversational tone".to_string(),
            )
        };

        let include_meta = mirror
            .and_then(|v| v.attachments.as_mirror())
            .map(|p| p.meta_cognitive_moment)
            .unwrap_or(false);

        let attachments = VertexAttachments::Orchestra(OrchestraPayload {
            expression_tone: tone.to_string(),
            share_self_observations: share_self,
            include_meta,
            extras: HashMap::new(),
        });

        Ok(VertexVote::new(
            VertexName::Orchestra,
            0.5,
            reasoning,
            vec![ActionProposal::ExpressionGuidance {
                tone: tone.to_string(),
                share_self_observations: share_self,
                include_meta,
            }],
            Vec::new(),
            attachments,
            Utc::now(),
        ))
    }
}
