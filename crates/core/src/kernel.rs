//! The Metabolic Kernel: four-phase orchestration of a single cognitive
//! cycle — parallel fan-out over Ledger/Garden/Mirror/Compass, Orchestra
//! shaped by their votes, tension analysis over the vote set, and a final
//! synthesis (LM-backed, falling back to a heuristic) that produces the
//! cycle's decision and identity-update proposals.

use crate::config::AppConfig;
use crate::schema::{
    ActionProposal, KernelSynthesis, PentagramResult, SynthesisType, Tension, VertexError,
    VertexName, VertexVote,
};
use crate::tension::TensionAnalyzer;
use crate::vertex::{call_lm, parse_json_response, Vertex, VertexContext};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use pentagram_shared::LmProvider;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Kernel {
    vertices: HashMap<VertexName, Arc<dyn Vertex>>,
    tension_analyzer: TensionAnalyzer,
    synthesis_llm: Option<Arc<dyn LmProvider>>,
    vertex_timeout: Duration,
}

impl Kernel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            vertices: HashMap::new(),
            tension_analyzer: TensionAnalyzer::new(config.tension_significance_threshold),
            synthesis_llm: None,
            vertex_timeout: Duration::from_secs(config.vertex_timeout_secs),
        }
    }

    pub fn with_synthesis_llm(mut self, llm: Arc<dyn LmProvider>) -> Self {
        self.synthesis_llm = Some(llm);
        self
    }

    pub fn register_vertex(&mut self, vertex: Arc<dyn Vertex>) {
        self.vertices.insert(vertex.name(), vertex);
    }

    pub fn is_complete(&self) -> bool {
        VertexName::ALL.iter().all(|n| self.vertices.contains_key(n))
    }

    fn missing_vertices(&self) -> Vec<VertexName> {
        VertexName::ALL
            .into_iter()
            .filter(|n| !self.vertices.contains_key(n))
            .collect()
    }

    /// Runs one full cognitive cycle over `experience`. `context` carries
    /// whatever identity/self-model/memory snapshot the caller has on hand;
    /// fields it doesn't provide are simply absent from the vertex-specific
    /// views (§4.3) rather than an error.
    pub async fn process(
        &self,
        experience: serde_json::Value,
        context: Option<serde_json::Value>,
    ) -> anyhow::Result<PentagramResult> {
        if !self.is_complete() {
            anyhow::bail!(
                "kernel is missing vertex registrations: {:?}",
                self.missing_vertices()
            );
        }

        let cycle_started = Instant::now();
        let base_context = build_base_context(&context);

        let (mut votes, mut timings) = self.run_phase_one(&experience, &base_context).await;

        let orchestra_context = VertexContext {
            other_votes: Some(votes.clone()),
            ..base_context
        };
        let (orchestra_vote, orchestra_elapsed) = self
            .run_one(VertexName::Orchestra, &experience, &orchestra_context)
            .await;
        timings.insert("orchestra".to_string(), orchestra_elapsed);
        votes.insert(VertexName::Orchestra, orchestra_vote);

        let tension_started = Instant::now();
        let tensions = self.tension_analyzer.analyze(&votes);
        timings.insert(
            "tension".to_string(),
            tension_started.elapsed().as_secs_f64(),
        );

        let synth_started = Instant::now();
        let synthesis = self.synthesize(&votes, &tensions).await;
        timings.insert(
            "synthesis".to_string(),
            synth_started.elapsed().as_secs_f64(),
        );
        timings.insert(
            "total".to_string(),
            cycle_started.elapsed().as_secs_f64(),
        );

        let errors = votes
            .values()
            .filter(|v| v.attachments.is_error())
            .map(|v| VertexError {
                vertex: v.vertex_name,
                error: v.reasoning.clone(),
            })
            .collect();

        Ok(PentagramResult {
            experience,
            votes,
            tensions,
            synthesis: Some(synthesis),
            timings,
            errors,
            timestamp: Utc::now(),
        })
    }

    /// Phase 1: Ledger, Garden, Mirror, and Compass vote concurrently.
    /// Each task is timed out and shielded from panics individually so one
    /// runaway vertex can never take the cycle down with it.
    async fn run_phase_one(
        &self,
        experience: &serde_json::Value,
        base_context: &VertexContext,
    ) -> (HashMap<VertexName, VertexVote>, HashMap<String, f64>) {
        let phase_started = Instant::now();
        let mut tasks = FuturesUnordered::new();

        for name in VertexName::PHASE_ONE {
            let vertex = self.vertices[&name].clone();
            let experience = experience.clone();
            let context = base_context.clone();
            let timeout = self.vertex_timeout;

            tasks.push(tokio::spawn(async move {
                let (vote, elapsed) = run_guarded(vertex.as_ref(), name, &experience, &context, timeout).await;
                (name, vote, elapsed)
            }));
        }

        let mut votes = HashMap::with_capacity(VertexName::PHASE_ONE.len());
        let mut timings = HashMap::with_capacity(VertexName::PHASE_ONE.len() + 1);
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok((name, vote, elapsed)) => {
                    timings.insert(name.as_str().to_string(), elapsed);
                    votes.insert(name, vote);
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "vertex task join failed");
                }
            }
        }
        timings.insert(
            "phase1_parallel".to_string(),
            phase_started.elapsed().as_secs_f64(),
        );
        (votes, timings)
    }

    /// Runs a single vertex (used for Orchestra, which must see Phase 1's
    /// results and so can't join the Phase 1 fan-out).
    async fn run_one(
        &self,
        name: VertexName,
        experience: &serde_json::Value,
        context: &VertexContext,
    ) -> (VertexVote, f64) {
        let vertex = self.vertices[&name].clone();
        run_guarded(vertex.as_ref(), name, experience, context, self.vertex_timeout).await
    }

    async fn synthesize(&self, votes: &HashMap<VertexName, VertexVote>, tensions: &[Tension]) -> KernelSynthesis {
        if let Some(llm) = &self.synthesis_llm {
            match self.lm_synthesize(llm.as_ref(), votes, tensions).await {
                Ok(synthesis) => return synthesis,
                Err(err) => {
                    tracing::warn!(error = %err, "LM synthesis failed, falling back to heuristic synthesis");
                }
            }
        }
        heuristic_synthesize(votes, tensions)
    }

    async fn lm_synthesize(
        &self,
        llm: &dyn LmProvider,
        votes: &HashMap<VertexName, VertexVote>,
        tensions: &[Tension],
    ) -> anyhow::Result<KernelSynthesis> {
        let prompt = build_synthesis_prompt(votes, tensions);
        let (text, _latency) = call_lm(llm, &prompt, 0.3, 800).await?;
        let json = parse_json_response(&text)?;
        let parsed: SynthesisResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("synthesis response did not match expected schema: {e}"))?;

        let identity_updates: Vec<ActionProposal> = parsed
            .identity_updates
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        let synthesis_type = parsed.synthesis_type.as_deref().and_then(parse_synthesis_type);

        Ok(KernelSynthesis::new(
            parsed.decision,
            tensions.to_vec(),
            parsed.growth_delta,
            identity_updates,
            parsed.response_guidance,
            parsed.reasoning,
            synthesis_type,
        ))
    }
}

/// Wraps a single vertex's vote in a timeout and a panic guard — the only
/// place in the crate a vertex's misbehavior can't escalate into a crashed
/// cycle. Mirrors the spawn-level guard the Vertex Runtime's `run_vertex`
/// deliberately leaves for the caller to supply.
async fn run_guarded(
    vertex: &dyn Vertex,
    name: VertexName,
    experience: &serde_json::Value,
    context: &VertexContext,
    timeout: Duration,
) -> (VertexVote, f64) {
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        timeout,
        std::panic::AssertUnwindSafe(vertex.vote(experience, context)).catch_unwind(),
    )
    .await;
    let elapsed = started.elapsed().as_secs_f64();

    let vote = match outcome {
        Ok(Ok(Ok(vote))) => {
            tracing::debug!(vertex = %name, score = vote.score(), duration_secs = elapsed, "vertex vote");
            vote
        }
        Ok(Ok(Err(err))) => {
            tracing::error!(vertex = %name, error = %err, "vertex error, falling back to error-vote");
            VertexVote::error_vote(name, "VertexError", &err.to_string(), Utc::now())
        }
        Ok(Err(_panic)) => {
            tracing::error!(vertex = %name, "vertex panicked, falling back to error-vote");
            VertexVote::error_vote(name, "Panic", "vertex panicked during vote", Utc::now())
        }
        Err(_timed_out) => {
            tracing::error!(vertex = %name, timeout_secs = timeout.as_secs(), "vertex timed out");
            VertexVote::error_vote(name, "Timeout", "vertex exceeded configured timeout", Utc::now())
        }
    };
    (vote, elapsed)
}

fn build_base_context(context: &Option<serde_json::Value>) -> VertexContext {
    let Some(ctx) = context else {
        return VertexContext::default();
    };
    VertexContext {
        identity_state: ctx.get("identity_state").cloned(),
        self_model: ctx.get("self_model").cloned(),
        ledger_context: ctx.get("ledger_context").cloned(),
        garden_context: ctx.get("garden_context").cloned(),
        ledger_memories: ctx
            .get("ledger_memories")
            .and_then(|v| v.as_array())
            .cloned(),
        identity_context: ctx.get("identity_context").cloned(),
        garden_patterns: ctx
            .get("garden_patterns")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        other_votes: None,
    }
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    decision: serde_json::Value,
    #[serde(default)]
    growth_delta: f64,
    #[serde(default)]
    identity_updates: Vec<serde_json::Value>,
    #[serde(default)]
    response_guidance: serde_json::Value,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    synthesis_type: Option<String>,
}

fn parse_synthesis_type(raw: &str) -> Option<SynthesisType> {
    match raw {
        "extension" => Some(SynthesisType::Extension),
        "correction" => Some(SynthesisType::Correction),
        "connection" => Some(SynthesisType::Connection),
        "novel" => Some(SynthesisType::Novel),
        _ => None,
    }
}

fn build_synthesis_prompt(votes: &HashMap<VertexName, VertexVote>, tensions: &[Tension]) -> String {
    let mut ordered: Vec<&VertexVote> = votes.values().collect();
    ordered.sort_by_key(|v| v.vertex_name.as_str());
    let opinions = ordered
        .iter()
        .map(|v| format!("## {} (score {:.2}):\n{}", v.vertex_name, v.score(), v.reasoning))
        .collect::<Vec<_>>()
        .join("\n\n");
    let tension_block = tensions
        .iter()
        .map(|t| {
            format!(
                "- {} vs {} on {}: magnitude {:.2} — {}",
                t.vertex_a, t.vertex_b, t.dimension, t.magnitude(), t.resolution_hint
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Synthesize these vertex votes into a single decision.\n\n{opinions}\n\nTensions:\n{tension_block}\n\n\
         Respond as JSON: {{\"decision\": {{}}, \"growth_delta\": 0.0, \"identity_updates\": [...], \
         \"response_guidance\": {{}}, \"reasoning\": \"...\", \"synthesis_type\": \"extension\"}}"
    )
}

fn heuristic_synthesize(votes: &HashMap<VertexName, VertexVote>, tensions: &[Tension]) -> KernelSynthesis {
    let count = votes.len().max(1);
    let avg_score: f64 = votes.values().map(|v| v.score()).sum::<f64>() / count as f64;
    let action_proposals_count: usize = votes.values().map(|v| v.action_proposals.len()).sum();

    let identity_updates: Vec<ActionProposal> = votes
        .get(&VertexName::Mirror)
        .map(|v| {
            v.action_proposals
                .iter()
                .filter(|p| p.type_tag() == "update_self_model")
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let orchestra_attachments = votes
        .get(&VertexName::Orchestra)
        .and_then(|v| v.attachments.as_orchestra());
    let response_guidance = serde_json::json!({
        "tone": orchestra_attachments.map(|p| p.expression_tone.as_str()).unwrap_or("natural"),
        "share_self": orchestra_attachments.map(|p| p.share_self_observations).unwrap_or(false),
    });

    let decision = serde_json::json!({
        "action": "process_and_store",
        "avg_importance": round_to_3dp(avg_score),
        "proposal_count": action_proposals_count,
    });

    let growth_delta = round_to_4dp(avg_score * 0.1);

    KernelSynthesis::new(
        decision,
        tensions.to_vec(),
        growth_delta,
        identity_updates,
        response_guidance,
        format!(
            "Heuristic synthesis over {count} votes, avg score {avg_score:.2}, {} tensions",
            tensions.len()
        ),
        None,
    )
}

fn round_to_4dp(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn round_to_3dp(x: f64) -> f64 {
    (x * 1_000.0).round() / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::compass::CompassVertex;
    use crate::vertex::garden::GardenVertex;
    use crate::vertex::ledger::LedgerVertex;
    use crate::vertex::mirror::MirrorVertex;
    use crate::vertex::orchestra::OrchestraVertex;
    use pentagram_shared::llm::StubLmProvider;
    use pentagram_shared::memory::NullMemoryStore;

    fn garden_response() -> String {
        serde_json::json!({
            "patterns_detected": [],
            "themes": [],
            "connections_to_existing": [],
            "pruning_recommendations": [],
            "importance_score": 0.4,
            "reasoning": "nothing notable"
        })
        .to_string()
    }

    fn mirror_response() -> String {
        serde_json::json!({
            "self_reflection": "steady",
            "self_model_updates": [],
            "identity_alignment": {"invariant_alignment": 0.9, "drift_detected": false},
            "growth_indicators": {"self_reference_depth": 1, "meta_cognitive_moment": false},
            "score": 0.5
        })
        .to_string()
    }

    fn compass_response() -> String {
        serde_json::json!({
            "value_assessment": {"growth_contribution": 0.3, "reasoning": "modest progress", "domains_advanced": []},
            "predictions": [],
            "goal_alignment": {"alignment_score": 0.6, "misalignment_flags": []},
            "suggested_directions": [],
            "score": 0.3
        })
        .to_string()
    }

    fn build_kernel() -> Kernel {
        let config = AppConfig::default();
        let mut kernel = Kernel::new(&config);
        kernel.register_vertex(Arc::new(LedgerVertex::new(Arc::new(NullMemoryStore))));
        kernel.register_vertex(Arc::new(GardenVertex::new(Arc::new(
            StubLmProvider::with_responses([garden_response()]),
        ))));
        kernel.register_vertex(Arc::new(MirrorVertex::new(Arc::new(
            StubLmProvider::with_responses([mirror_response()]),
        ))));
        kernel.register_vertex(Arc::new(CompassVertex::new(Arc::new(
            StubLmProvider::with_responses([compass_response()]),
        ))));
        kernel.register_vertex(Arc::new(OrchestraVertex::new()));
        kernel
    }

    #[tokio::test]
    async fn incomplete_kernel_refuses_to_process() {
        let config = AppConfig::default();
        let kernel = Kernel::new(&config);
        assert!(!kernel.is_complete());
        let result = kernel.process(serde_json::json!({"message": "hi"}), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn full_cycle_produces_five_votes_and_heuristic_synthesis() {
        let kernel = build_kernel();
        let result = kernel
            .process(serde_json::json!({"message": "we discussed architecture"}), None)
            .await
            .unwrap();

        assert_eq!(result.votes.len(), 5);
        assert_eq!(result.successful_votes(), 5);
        assert!(result.errors.is_empty());
        assert!(result.has_synthesis());

        let synthesis = result.synthesis.unwrap();
        assert!(synthesis.growth_delta() > 0.0);
        assert_eq!(synthesis.decision["action"], "process_and_store");
        assert!(synthesis.response_guidance.get("share_self").is_some());
        assert!(result.total_duration() >= 0.0);
    }

    #[tokio::test]
    async fn timed_out_vertex_degrades_to_error_vote_without_failing_the_cycle() {
        let config = AppConfig::default();
        let mut kernel = Kernel::new(&config);
        kernel.register_vertex(Arc::new(LedgerVertex::new(Arc::new(NullMemoryStore))));
        // Garden's stub has no queued response, so `generate` errors immediately
        // rather than timing out — still exercises the error-vote fallback path.
        kernel.register_vertex(Arc::new(GardenVertex::new(Arc::new(StubLmProvider::new()))));
        kernel.register_vertex(Arc::new(MirrorVertex::new(Arc::new(
            StubLmProvider::with_responses([mirror_response()]),
        ))));
        kernel.register_vertex(Arc::new(CompassVertex::new(Arc::new(
            StubLmProvider::with_responses([compass_response()]),
        ))));
        kernel.register_vertex(Arc::new(OrchestraVertex::new()));

        let result = kernel
            .process(serde_json::json!({"message": "hello"}), None)
            .await
            .unwrap();

        assert_eq!(result.successful_votes(), 4);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].vertex, VertexName::Garden);
    }
}
