//! `grader index`: load the corpus, build the vector index, persist it.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::corpus::{CorpusLoader, LoadReport};
use crate::index::VectorIndex;

/// Load every configured category root and build a fresh index from it.
pub fn build_index(config: &Config) -> Result<(VectorIndex, LoadReport)> {
    let loader = CorpusLoader::new(&config.corpus, &config.chunking)?;
    let outcome = loader.load();
    let index = VectorIndex::new(config.index.max_features);
    index.build(outcome.corpus);
    Ok((index, outcome.report))
}

pub fn run_index(config: &Config) -> Result<()> {
    let (index, report) = build_index(config)?;
    index.persist(&config.index.path).with_context(|| {
        format!(
            "Failed to write index file: {}",
            config.index.path.display()
        )
    })?;

    println!("index {}", config.index.path.display());
    println!("  files seen: {}", report.files_seen);
    println!("  files indexed: {}", report.files_indexed);
    println!("  files skipped: {}", report.files_skipped);
    println!("  chunks: {}", report.chunks);
    if report.empty_pages > 0 {
        println!("  empty pages: {}", report.empty_pages);
    }
    println!("  vocabulary: {}", index.snapshot().vocabulary_len());
    println!("ok");
    Ok(())
}
