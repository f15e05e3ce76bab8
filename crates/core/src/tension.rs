//! Tension Analyzer: pairwise score-disagreement detection over the
//! collected votes, with a fixed axis table and conflict-boost rules.
//! The Orchestra vote is excluded — it shapes expression, not content
//! judgment.

use crate::schema::{Tension, VertexName, VertexVote};
use std::collections::HashMap;

const TENSION_AXES: &[(VertexName, VertexName, &str)] = &[
    (VertexName::Ledger, VertexName::Garden, "storage_vs_pruning"),
    (VertexName::Ledger, VertexName::Mirror, "recording_vs_reflecting"),
    (VertexName::Ledger, VertexName::Compass, "preservation_vs_direction"),
    (VertexName::Garden, VertexName::Mirror, "pattern_vs_identity"),
    (VertexName::Garden, VertexName::Compass, "meaning_vs_value"),
    (VertexName::Mirror, VertexName::Compass, "self_relevance_vs_strategic_value"),
];

pub struct TensionAnalyzer {
    significance_threshold: f64,
}

impl TensionAnalyzer {
    pub fn new(significance_threshold: f64) -> Self {
        Self {
            significance_threshold,
        }
    }

    /// Pairwise-compares every combination of non-Orchestra vertices
    /// present in `votes`, in Phase-1 enumeration order (`Ledger < Garden <
    /// Mirror < Compass`) so the fixed axis table's pair keys line up
    /// without needing to re-sort per call.
    pub fn analyze(&self, votes: &HashMap<VertexName, VertexVote>) -> Vec<Tension> {
        let names: Vec<VertexName> = VertexName::PHASE_ONE
            .into_iter()
            .filter(|n| votes.contains_key(n))
            .collect();

        let mut tensions = Vec::new();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let a = names[i];
                let b = names[j];
                if let Some(t) = self.compare_pair(a, b, &votes[&a], &votes[&b]) {
                    tensions.push(t);
                }
            }
        }

        tensions.sort_by(|x, y| {
            y.magnitude()
                .partial_cmp(&x.magnitude())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tensions
    }

    fn compare_pair(
        &self,
        a: VertexName,
        b: VertexName,
        vote_a: &VertexVote,
        vote_b: &VertexVote,
    ) -> Option<Tension> {
        let score_diff = (vote_a.score() - vote_b.score()).abs();
        if score_diff < self.significance_threshold {
            return None;
        }

        let (higher_name, higher, lower_name, lower) = if vote_a.score() >= vote_b.score() {
            (a, vote_a, b, vote_b)
        } else {
            (b, vote_b, a, vote_a)
        };

        let dimension = lookup_dimension(a, b);
        let mut magnitude = score_diff;
        let mut hint = format!(
            "{higher_name} scored higher ({:.2} vs {:.2} for {lower_name})",
            higher.score(),
            lower.score()
        );

        if (higher.has_proposal_type("store") && lower.has_proposal_type("prune"))
            || (higher.has_proposal_type("prune") && lower.has_proposal_type("store"))
        {
            magnitude += 0.10;
            hint.push_str(" Direct conflict: store vs prune.");
        }
        if higher.has_proposal_type("identity_repair") || lower.has_proposal_type("identity_repair") {
            magnitude += 0.15;
            hint.push_str(" Identity repair requested — prioritize stability.");
        }
        magnitude = magnitude.min(1.0);

        Some(Tension::new(a, b, dimension, magnitude, hint))
    }
}

fn lookup_dimension(a: VertexName, b: VertexName) -> String {
    for (pa, pb, dim) in TENSION_AXES {
        if *pa == a && *pb == b {
            return (*dim).to_string();
        }
    }
    format!("{a}_vs_{b}")
}
