//! The Memory Store external collaborator: write-only storage of experiences
//! plus grouped retrieval for the Ledger vertex.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Keyword,
    Vector,
    Hybrid,
    Agentic,
}

/// One grouped result returned by `retrieve`. Kept intentionally loose
/// (`items` is raw JSON) since the core treats memory content as opaque —
/// only `retrieval_count` (the number of groups) and the group payload
/// itself, passed through to vertex prompts, matter to this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryGroup {
    pub label: String,
    pub items: Vec<serde_json::Value>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Write-only; fire-and-forget from the cycle's perspective. Failures
    /// here are the caller's concern, not the Ledger vertex's — see the
    /// module docs on retrieval failure handling below.
    async fn store(&self, experience: &serde_json::Value) -> anyhow::Result<()>;

    /// Retrieval failures are non-fatal for the Ledger vertex: the caller
    /// degrades to an empty `Vec` rather than raising an error-vote.
    async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        group_id: &str,
        top_k: usize,
        method: RetrievalMethod,
    ) -> anyhow::Result<Vec<MemoryGroup>>;
}

/// A memory store with nothing in it. Useful as a default when no real
/// memory backend is wired up, and in tests that only care about the
/// Ledger's non-fatal degrade path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMemoryStore;

#[async_trait]
impl MemoryStore for NullMemoryStore {
    async fn store(&self, _experience: &serde_json::Value) -> anyhow::Result<()> {
        Ok(())
    }

    async fn retrieve(
        &self,
        _query: &str,
        _user_id: &str,
        _group_id: &str,
        _top_k: usize,
        _method: RetrievalMethod,
    ) -> anyhow::Result<Vec<MemoryGroup>> {
        Ok(Vec::new())
    }
}
