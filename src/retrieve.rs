//! Category- and allowlist-filtered retrieval on top of [`VectorIndex`].
//!
//! Filters are plain data ([`CategoryFilter`]) interpreted here, so callers
//! never pass behavior across the retrieval boundary. The full query is
//! scored against the whole index once; filtering happens on the ranked
//! rows, and only the top `k` survivors are copied out as hits.

use serde::Serialize;
use std::sync::Arc;

use crate::index::{IndexState, RankedRow, VectorIndex};
use crate::models::{Category, Chunk, RetrievalHit};

/// Which chunks a filtered search may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFilter {
    pub category: Category,
    /// Case-insensitive substrings of `metadata.path`; empty means any path.
    pub allowlist: Vec<String>,
}

impl CategoryFilter {
    pub fn new(category: Category, allowlist: &[String]) -> Self {
        Self {
            category,
            allowlist: allowlist
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        if chunk.metadata.category != self.category {
            return false;
        }
        if self.allowlist.is_empty() {
            return true;
        }
        let path = chunk.metadata.path.to_lowercase();
        self.allowlist.iter().any(|entry| path.contains(entry.as_str()))
    }
}

/// Hits gathered for one grading request.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub hits: Vec<RetrievalHit>,
    /// True when the filtered searches found nothing and the unfiltered
    /// search supplied the evidence.
    pub used_fallback: bool,
}

/// Filtered search over a shared index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn search_by_category(
        &self,
        query: &str,
        category: Category,
        allowlist: &[String],
        k: usize,
    ) -> Vec<RetrievalHit> {
        let filter = CategoryFilter::new(category, allowlist);
        let snapshot = self.index.snapshot();
        let ranked = snapshot.rank(query);
        into_hits(&snapshot, matching(&snapshot, &ranked, &filter, k))
    }

    /// Rubric hits plus question hits, merged by score. Falls back to an
    /// unfiltered top `k_rubric + k_question` when both filters come up
    /// empty. The query is ranked once against a single snapshot.
    #[tracing::instrument(skip(self, query), fields(query_len = query.len()))]
    pub fn retrieve_for_grading(
        &self,
        query: &str,
        rubric_allowlist: &[String],
        question_allowlist: &[String],
        k_rubric: usize,
        k_question: usize,
    ) -> RetrievalOutcome {
        let snapshot = self.index.snapshot();
        let ranked = snapshot.rank(query);
        let rubric = CategoryFilter::new(Category::Rubric, rubric_allowlist);
        let question = CategoryFilter::new(Category::Question, question_allowlist);

        let mut rows = matching(&snapshot, &ranked, &rubric, k_rubric);
        rows.extend(matching(&snapshot, &ranked, &question, k_question));

        if rows.is_empty() {
            let fallback = ranked.iter().copied().take(k_rubric + k_question).collect();
            let hits = into_hits(&snapshot, fallback);
            tracing::debug!(hits = hits.len(), "filtered retrieval empty, using unfiltered search");
            return RetrievalOutcome {
                hits,
                used_fallback: true,
            };
        }

        rows.sort_by(RankedRow::by_rank);
        let hits = into_hits(&snapshot, rows);
        tracing::debug!(hits = hits.len(), "filtered retrieval");
        RetrievalOutcome {
            hits,
            used_fallback: false,
        }
    }
}

/// First `k` ranked rows whose chunk passes `filter`.
fn matching(
    snapshot: &IndexState,
    ranked: &[RankedRow],
    filter: &CategoryFilter,
    k: usize,
) -> Vec<RankedRow> {
    let chunks = snapshot.corpus().chunks();
    ranked
        .iter()
        .copied()
        .filter(|r| filter.matches(&chunks[r.row]))
        .take(k)
        .collect()
}

fn into_hits(snapshot: &IndexState, rows: Vec<RankedRow>) -> Vec<RetrievalHit> {
    rows.into_iter().map(|r| snapshot.hit(r)).collect()
}
