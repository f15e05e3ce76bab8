//! Ledger vertex: memory-driven, no LM call in the hot path. Always votes to
//! store the experience; retrieval of related memories is best-effort.

use super::{Vertex, VertexContext};
use crate::schema::{ActionProposal, LedgerPayload, VertexAttachments, VertexName, VertexVote};
use async_trait::async_trait;
use chrono::Utc;
use pentagram_shared::memory::RetrievalMethod;
use pentagram_shared::MemoryStore;
use std::collections::HashMap;
use std::sync::Arc;

const RETRIEVAL_TOP_K: usize = 5;

pub struct LedgerVertex {
    memory: Arc<dyn MemoryStore>,
}

impl LedgerVertex {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Vertex for LedgerVertex {
    fn name(&self) -> VertexName {
        VertexName::Ledger
    }

    async fn vote(
        &self,
        experience: &serde_json::Value,
        _context: &VertexContext,
    ) -> anyhow::Result<VertexVote> {
        let query = experience
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let user_id = experience
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let group_id = experience
            .get("group_id")
            .and_then(|v| v.as_str())
            .unwrap_or(user_id);

        // Retrieval failures are non-fatal: degrade to an empty result
        // rather than an error-vote (spec §7).
        let groups = match self
            .memory
            .retrieve(query, user_id, group_id, RETRIEVAL_TOP_K, RetrievalMethod::Hybrid)
            .await
        {
            Ok(groups) => groups,
            Err(err) => {
                tracing::warn!(error = %err, "ledger memory retrieval failed, degrading to empty result");
                Vec::new()
            }
        };

        let retrieval_count = groups.len();
        let retrieved_memories = groups
            .into_iter()
            .map(|g| serde_json::json!({ "label": g.label, "items": g.items }))
            .collect();

        let attachments = VertexAttachments::Ledger(LedgerPayload {
            retrieved_memories,
            retrieval_count,
            store_queued: true,
            extras: HashMap::new(),
        });

        Ok(VertexVote::new(
            VertexName::Ledger,
            1.0,
            "Every experience is queued for storage regardless of content",
            vec![ActionProposal::Store {
                target: "memorize_pipeline".to_string(),
                priority: "normal".to_string(),
            }],
            Vec::new(),
            attachments,
            Utc::now(),
        ))
    }
}
