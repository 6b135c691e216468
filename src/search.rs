//! `grader search`: query a persisted index from the command line.

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::index::VectorIndex;
use crate::models::{Category, RetrievalHit};
use crate::retrieve::Retriever;

/// Restore the index named by `[index].path`.
pub fn open_index(config: &Config) -> Result<VectorIndex> {
    VectorIndex::restore(&config.index.path, config.index.max_features).with_context(|| {
        format!(
            "Failed to load index {} (run `grader index` first)",
            config.index.path.display()
        )
    })
}

pub fn run_search(
    config: &Config,
    query: &str,
    category: Option<Category>,
    allow: &[String],
    limit: Option<usize>,
) -> Result<()> {
    check_allowlist_scope(category, allow)?;
    let index = Arc::new(open_index(config)?);
    let limit = limit.unwrap_or(config.retrieval.k_rubric + config.retrieval.k_question);

    let hits = match category {
        Some(category) => Retriever::new(index).search_by_category(query, category, allow, limit),
        None => index.search(query, limit),
    };

    print_hits(&hits);
    Ok(())
}

/// An allowlist narrows paths within one category; without a category it
/// has nothing to apply to.
fn check_allowlist_scope(category: Option<Category>, allow: &[String]) -> Result<()> {
    if category.is_none() && allow.iter().any(|a| !a.trim().is_empty()) {
        bail!("--allow requires --category");
    }
    Ok(())
}

fn print_hits(hits: &[RetrievalHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.score,
            hit.chunk.metadata.category,
            hit.chunk.provenance()
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 160));
        println!("    id: {}", hit.chunk.id);
        println!();
    }
}

/// First `max_chars` characters on one line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
