//! Garden vertex: LM-driven pattern recognition over the experience and up
//! to five prior memories.

use super::{call_lm, parse_json_response, Vertex, VertexContext};
use crate::schema::{ActionProposal, GardenPattern, GardenPayload, VertexAttachments, VertexName, VertexVote};
use async_trait::async_trait;
use chrono::Utc;
use pentagram_shared::LmProvider;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_PRIOR_MEMORIES: usize = 5;

pub struct GardenVertex {
    llm: Arc<dyn LmProvider>,
}

impl GardenVertex {
    pub fn new(llm: Arc<dyn LmProvider>) -> Self {
        Self { llm }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GardenPatternResponse {
    pattern: String,
    #[serde(default)]
    significance: f64,
    #[serde(default)]
    cross_domain: bool,
    #[serde(default)]
    recurring: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GardenResponse {
    #[serde(default)]
    patterns_detected: Vec<GardenPatternResponse>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    connections_to_existing: Vec<String>,
    #[serde(default)]
    pruning_recommendations: Vec<String>,
    #[serde(default)]
    importance_score: f64,
    #[serde(default)]
    reasoning: String,
}

fn build_prompt(message: &str, prior_memories: &[serde_json::Value]) -> String {
    let memories_block = prior_memories
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Identify recurring patterns, themes, and pruning candidates in this experience.\n\
         Experience: {message}\n\
         Prior memories:\n{memories_block}\n\
         Respond as JSON: {{\"patterns_detected\": [...], \"themes\": [...], \
         \"connections_to_existing\": [...], \"pruning_recommendations\": [...], \
         \"importance_score\": 0.0, \"reasoning\": \"...\"}}"
    )
}

#[async_trait]
impl Vertex for GardenVertex {
    fn name(&self) -> VertexName {
        VertexName::Garden
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
        let prior_memories: Vec<serde_json::Value> = context
            .ledger_memories
            .clone()
            .unwrap_or_default()
            .into_iter()
            .take(MAX_PRIOR_MEMORIES)
            .collect();

        let prompt = build_prompt(message, &prior_memories);
        let (text, _latency) = call_lm(self.llm.as_ref(), &prompt, 0.3, 700).await?;
        let json = parse_json_response(&text)?;
        let parsed: GardenResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("garden response did not match expected schema: {e}"))?;

        let mut action_proposals = Vec::new();
        let mut patterns = Vec::with_capacity(parsed.patterns_detected.len());
        for p in parsed.patterns_detected {
            if p.significance > 0.5 {
                action_proposals.push(ActionProposal::StorePattern {
                    pattern: p.pattern.clone(),
                    significance: p.significance,
                });
            }
            patterns.push(GardenPattern {
                pattern: p.pattern,
                significance: p.significance,
                cross_domain: p.cross_domain,
                recurring: p.recurring,
            });
        }
        for target in &parsed.pruning_recommendations {
            action_proposals.push(ActionProposal::Prune {
                target: target.clone(),
                reason: None,
            });
        }

        let attachments = VertexAttachments::Garden(GardenPayload {
            patterns,
            themes: parsed.themes,
            connections_to_existing: parsed.connections_to_existing,
            extras: HashMap::new(),
        });

        Ok(VertexVote::new(
            VertexName::Garden,
            parsed.importance_score,
            parsed.reasoning,
            action_proposals,
            Vec::new(),
            attachments,
            Utc::now(),
        ))
    }
}
