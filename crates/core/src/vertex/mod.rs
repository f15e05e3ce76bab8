//! The Vertex Runtime: the abstract vertex contract, LM invocation with
//! measured latency, resilient JSON extraction, and the error-vote fallback
//! that keeps one vertex's failure from ever crashing a cycle.

pub mod compass;
pub mod garden;
pub mod ledger;
pub mod mirror;
pub mod orchestra;

use crate::schema::{GardenPattern, VertexName, VertexVote};
use async_trait::async_trait;
use pentagram_shared::error::PentagramError;
use pentagram_shared::llm::extract_json;
use pentagram_shared::LmProvider;
use std::collections::HashMap;
use std::time::Instant;

/// The vertex-specific context view the Kernel builds for each phase (§4.3).
/// All fields are optional — which ones are populated depends on which
/// phase and which vertex is being scheduled; an unpopulated field means
/// "not available yet," not an error.
#[derive(Debug, Clone, Default)]
pub struct VertexContext {
    pub identity_state: Option<serde_json::Value>,
    pub self_model: Option<serde_json::Value>,
    pub ledger_context: Option<serde_json::Value>,
    pub garden_context: Option<serde_json::Value>,
    pub ledger_memories: Option<Vec<serde_json::Value>>,
    pub identity_context: Option<serde_json::Value>,
    pub garden_patterns: Option<Vec<GardenPattern>>,
    pub other_votes: Option<HashMap<VertexName, VertexVote>>,
}

#[async_trait]
pub trait Vertex: Send + Sync {
    fn name(&self) -> VertexName;

    /// Produces this vertex's assessment of `experience`. Implementations
    /// may return `Err` (configuration error, LM failure, parse failure);
    /// the caller converts that into an error-vote rather than propagating.
    async fn vote(
        &self,
        experience: &serde_json::Value,
        context: &VertexContext,
    ) -> anyhow::Result<VertexVote>;
}

/// Calls the LM provider and returns its text alongside the measured
/// latency in seconds. Failures propagate to the caller — a vertex that
/// needs an LM and doesn't have one configured should fail before reaching
/// this point (a configuration error, raised eagerly).
pub async fn call_lm(
    provider: &dyn LmProvider,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> anyhow::Result<(String, f64)> {
    let started = Instant::now();
    let text = provider.generate(prompt, temperature, max_tokens).await?;
    let elapsed = started.elapsed().as_secs_f64();
    tracing::debug!(duration_secs = elapsed, "LM call completed");
    Ok((text, elapsed))
}

/// Parses LM text into JSON using the ordered resilient extraction strategy.
pub fn parse_json_response(text: &str) -> Result<serde_json::Value, PentagramError> {
    extract_json(text)
}

/// Runs a vertex's `vote`, timing it and converting any `Err` into an
/// error-vote rather than letting it propagate. Panics are not caught
/// here — the Kernel's Phase 1/2 scheduler wraps the task spawn itself in
/// `catch_unwind` since that's the only place a panic can be intercepted.
pub async fn run_vertex(
    vertex: &dyn Vertex,
    experience: &serde_json::Value,
    context: &VertexContext,
) -> (VertexVote, f64) {
    let started = Instant::now();
    let name = vertex.name();
    let result = vertex.vote(experience, context).await;
    let elapsed = started.elapsed().as_secs_f64();

    let vote = match result {
        Ok(vote) => {
            tracing::debug!(vertex = %name, score = vote.score(), duration_secs = elapsed, "vertex vote");
            vote
        }
        Err(err) => {
            tracing::error!(vertex = %name, error = %err, "vertex error, falling back to error-vote");
            VertexVote::error_vote(name, "VertexError", &err.to_string(), chrono::Utc::now())
        }
    };
    (vote, elapsed)
}
