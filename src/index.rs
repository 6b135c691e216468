//! In-memory TF-IDF vector index with persistence.
//!
//! [`VectorIndex`] owns an immutable [`IndexState`] behind an
//! `RwLock<Arc<_>>`. A rebuild computes the complete new state first and then
//! swaps the pointer, so a reader holding a [`snapshot`](VectorIndex::snapshot)
//! sees either the old corpus or the new one for its whole query, never a mix.
//!
//! The persisted form is a JSON document tagged with a format name and schema
//! version, plus the corpus fingerprint, so a stale or foreign file is
//! rejected on load instead of producing wrong results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::models::{Corpus, RetrievalHit};
use crate::tfidf::{sparse_dot, SparseVector, TfidfModel};

/// Format tag written into every persisted index.
pub const INDEX_FORMAT: &str = "rag-grader/tfidf-index";
/// Bumped whenever the persisted layout changes.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("incompatible index file: format '{format}' version {version}")]
    Incompatible { format: String, version: u32 },
    #[error("corrupt index file: {0}")]
    Corrupt(String),
}

/// A fully built, read-only index over one corpus.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    model: TfidfModel,
    vectors: Vec<SparseVector>,
    corpus: Corpus,
    built_at: Option<DateTime<Utc>>,
}

impl IndexState {
    /// Fit the vectorizer over every chunk text. Placeholder chunks get an
    /// empty row so row count always equals corpus length.
    pub fn build(corpus: Corpus, max_features: usize) -> Self {
        let texts: Vec<&str> = corpus.chunks().iter().map(|c| c.text.as_str()).collect();
        let (model, vectors) = TfidfModel::fit_transform(&texts, max_features);
        Self {
            model,
            vectors,
            corpus,
            built_at: Some(Utc::now()),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.model.vocabulary_len()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Every searchable row scored against `query`, in [`RankedRow::by_rank`]
    /// order. Nothing is cloned; turn survivors into hits with
    /// [`hit`](Self::hit).
    pub fn rank(&self, query: &str) -> Vec<RankedRow> {
        if self.is_empty() {
            return Vec::new();
        }
        let q = self.model.transform(query);
        let mut scored: Vec<RankedRow> = self
            .corpus
            .chunks()
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_placeholder())
            .map(|(row, _)| {
                let sim = sparse_dot(&q, &self.vectors[row]) as f64;
                RankedRow {
                    row,
                    score: sim.clamp(0.0, 1.0),
                }
            })
            .collect();
        scored.sort_by(RankedRow::by_rank);
        scored
    }

    /// Materialize a ranked row as a hit carrying its chunk.
    pub fn hit(&self, ranked: RankedRow) -> RetrievalHit {
        RetrievalHit {
            score: ranked.score,
            chunk: self.corpus.chunks()[ranked.row].clone(),
        }
    }

    /// Top `k` hits for `query`.
    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        if k == 0 {
            return Vec::new();
        }
        self.rank(query)
            .into_iter()
            .take(k)
            .map(|ranked| self.hit(ranked))
            .collect()
    }
}

/// A corpus row and its similarity to one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedRow {
    pub row: usize,
    pub score: f64,
}

impl RankedRow {
    /// Score descending, ties in corpus order.
    pub fn by_rank(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.row.cmp(&b.row))
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedHeader {
    format: String,
    schema_version: u32,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format: String,
    schema_version: u32,
    built_at: Option<DateTime<Utc>>,
    fingerprint: String,
    model: TfidfModel,
    vectors: Vec<SparseVector>,
    corpus: Corpus,
}

/// Shared, atomically rebuildable vector index.
pub struct VectorIndex {
    state: RwLock<Arc<IndexState>>,
    max_features: usize,
}

impl VectorIndex {
    /// An empty index; every query returns no hits until [`build`](Self::build).
    pub fn new(max_features: usize) -> Self {
        Self {
            state: RwLock::new(Arc::new(IndexState::default())),
            max_features,
        }
    }

    /// Build a fresh index over `corpus` and swap it in.
    #[tracing::instrument(skip(self, corpus), fields(chunks = corpus.len()))]
    pub fn build(&self, corpus: Corpus) {
        let state = IndexState::build(corpus, self.max_features);
        tracing::info!(
            chunks = state.len(),
            vocabulary = state.vocabulary_len(),
            "vector index built"
        );
        self.replace(state);
    }

    /// Current state. Hold the returned `Arc` for the duration of a query.
    pub fn snapshot(&self) -> Arc<IndexState> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        self.snapshot().search(query, k)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn replace(&self, state: IndexState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(state);
    }

    /// Write the current state to `path` via a temporary sibling file.
    pub fn persist(&self, path: &Path) -> Result<(), IndexError> {
        let state = self.snapshot();
        let doc = PersistedIndex {
            format: INDEX_FORMAT.to_string(),
            schema_version: INDEX_SCHEMA_VERSION,
            built_at: state.built_at,
            fingerprint: state.corpus.fingerprint(),
            model: state.model.clone(),
            vectors: state.vectors.clone(),
            corpus: state.corpus.clone(),
        };
        let bytes = serde_json::to_vec(&doc)?;

        let io_err = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = tmp_path(path);
        std::fs::write(&tmp, &bytes).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        tracing::info!(path = %path.display(), chunks = state.len(), "vector index persisted");
        Ok(())
    }

    /// Load a persisted index into a new instance.
    pub fn restore(path: &Path, max_features: usize) -> Result<Self, IndexError> {
        let index = Self::new(max_features);
        index.reload(path)?;
        Ok(index)
    }

    /// Replace this index's state with the one persisted at `path`. On any
    /// error the current state is left untouched.
    pub fn reload(&self, path: &Path) -> Result<(), IndexError> {
        let bytes = std::fs::read(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state = decode(&bytes)?;
        tracing::info!(path = %path.display(), chunks = state.len(), "vector index restored");
        self.replace(state);
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<IndexState, IndexError> {
    let header: PersistedHeader = serde_json::from_slice(bytes)?;
    if header.format != INDEX_FORMAT || header.schema_version != INDEX_SCHEMA_VERSION {
        return Err(IndexError::Incompatible {
            format: header.format,
            version: header.schema_version,
        });
    }

    let doc: PersistedIndex = serde_json::from_slice(bytes)?;
    if doc.vectors.len() != doc.corpus.len() {
        return Err(IndexError::Corrupt(format!(
            "{} vectors for {} chunks",
            doc.vectors.len(),
            doc.corpus.len()
        )));
    }
    if doc.corpus.fingerprint() != doc.fingerprint {
        return Err(IndexError::Corrupt(
            "corpus fingerprint does not match".to_string(),
        ));
    }
    doc.model.check_consistency().map_err(IndexError::Corrupt)?;
    let vocab = doc.model.vocabulary_len() as u32;
    if doc.vectors.iter().flatten().any(|(idx, _)| *idx >= vocab) {
        return Err(IndexError::Corrupt(
            "vector references a term outside the vocabulary".to_string(),
        ));
    }

    Ok(IndexState {
        model: doc.model,
        vectors: doc.vectors,
        corpus: doc.corpus,
        built_at: doc.built_at,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Chunk, ChunkMetadata};
    use tempfile::TempDir;

    fn corpus(texts: &[(&str, Category)]) -> Corpus {
        Corpus::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, (text, cat))| {
                    Chunk::new(
                        format!("{}-{}", cat, i),
                        text.to_string(),
                        ChunkMetadata {
                            path: format!("{}/doc{}.txt", cat, i),
                            category: *cat,
                            page: None,
                            chunk_index: 0,
                            note: None,
                        },
                    )
                })
                .collect(),
        )
    }

    fn sample() -> Corpus {
        corpus(&[
            ("Explain gradient descent and the learning rate.", Category::Rubric),
            ("Photosynthesis converts light into chemical energy.", Category::Question),
            ("Convergence of gradient descent depends on the learning rate.", Category::Rubric),
            ("Unrelated notes about medieval history.", Category::Solution),
        ])
    }

    #[test]
    fn unbuilt_and_empty_indexes_return_nothing() {
        let index = VectorIndex::new(1000);
        assert!(index.search("anything", 5).is_empty());
        index.build(Corpus::default());
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn k_zero_returns_nothing() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        assert!(index.search("gradient", 0).is_empty());
    }

    #[test]
    fn hits_are_sorted_and_ties_keep_corpus_order() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        let hits = index.search("gradient descent learning rate", 4);
        assert_eq!(hits.len(), 4);
        for w in hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
        assert!(hits[0].chunk.metadata.category == Category::Rubric);
        // The two unrelated chunks score zero and keep insertion order.
        assert_eq!(hits[2].score, 0.0);
        assert_eq!(hits[2].chunk.id, "question-1");
        assert_eq!(hits[3].chunk.id, "solution-3");
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.score));
        }
    }

    #[test]
    fn rank_orders_rows_without_materializing_chunks() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        let snapshot = index.snapshot();
        let ranked = snapshot.rank("gradient descent learning rate");
        assert_eq!(ranked.len(), 4);
        assert!(matches!(ranked[0].row, 0 | 2));
        assert_eq!(
            ranked[2..].iter().map(|r| r.row).collect::<Vec<_>>(),
            vec![1, 3]
        );

        let hit = snapshot.hit(ranked[0]);
        assert_eq!(hit.chunk.id, snapshot.corpus().chunks()[ranked[0].row].id);
        assert_eq!(hit.score, ranked[0].score);
    }

    #[test]
    fn ties_break_on_row() {
        let mut rows = vec![
            RankedRow { row: 5, score: 0.5 },
            RankedRow { row: 1, score: 0.5 },
            RankedRow { row: 3, score: 0.9 },
        ];
        rows.sort_by(RankedRow::by_rank);
        assert_eq!(rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![3, 1, 5]);
    }

    #[test]
    fn identical_text_scores_one() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        let hits = index.search("Photosynthesis converts light into chemical energy.", 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn placeholders_are_never_returned() {
        let mut chunks = sample().chunks().to_vec();
        chunks.push(Chunk::new(
            "rubric-9".into(),
            String::new(),
            ChunkMetadata {
                path: "rubric/scan.pdf".into(),
                category: Category::Rubric,
                page: Some(1),
                chunk_index: 0,
                note: Some(crate::models::EMPTY_PAGE_NOTE.into()),
            },
        ));
        let index = VectorIndex::new(1000);
        index.build(Corpus::new(chunks));
        assert_eq!(index.len(), 5);
        let hits = index.search("anything", 10);
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| !h.chunk.is_placeholder()));
    }

    #[test]
    fn persist_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.json");
        let index = VectorIndex::new(1000);
        index.build(sample());
        index.persist(&path).unwrap();

        let restored = VectorIndex::restore(&path, 1000).unwrap();
        for query in ["gradient descent", "light energy", "history", "nothing matches"] {
            let a = index.search(query, 3);
            let b = restored.search(query, 3);
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                assert_eq!(x.chunk.id, y.chunk.id);
                assert!((x.score - y.score).abs() < 1e-6);
            }
        }
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn restore_rejects_foreign_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, r#"{"format":"something-else","schema_version":1}"#).unwrap();
        let err = VectorIndex::restore(&path, 1000).err().unwrap();
        assert!(matches!(err, IndexError::Incompatible { .. }));

        std::fs::write(&path, r#"{"format":"rag-grader/tfidf-index","schema_version":99}"#)
            .unwrap();
        let err = VectorIndex::restore(&path, 1000).err().unwrap();
        assert!(matches!(err, IndexError::Incompatible { version: 99, .. }));
    }

    #[test]
    fn restore_rejects_tampered_corpus() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let index = VectorIndex::new(1000);
        index.build(sample());
        index.persist(&path).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["fingerprint"] = serde_json::json!("0000");
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = VectorIndex::restore(&path, 1000).err().unwrap();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn restore_rejects_vocabulary_pointing_past_idf() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let index = VectorIndex::new(1000);
        index.build(sample());
        index.persist(&path).unwrap();
        let pristine: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        let mut doc = pristine.clone();
        doc["model"]["vocabulary"]["gradient"] = serde_json::json!(999_999);
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        let err = VectorIndex::restore(&path, 1000).err().unwrap();
        assert!(matches!(err, IndexError::Corrupt(_)), "{}", err);

        let mut doc = pristine;
        doc["model"]["idf"].as_array_mut().unwrap().pop();
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        let err = VectorIndex::restore(&path, 1000).err().unwrap();
        assert!(matches!(err, IndexError::Corrupt(_)), "{}", err);
    }

    #[test]
    fn failed_reload_keeps_previous_state() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        assert!(index.reload(Path::new("/no/such/index.json")).is_err());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn snapshot_survives_rebuild() {
        let index = VectorIndex::new(1000);
        index.build(sample());
        let before = index.snapshot();
        index.build(corpus(&[("only one chunk now", Category::Rubric)]));
        assert_eq!(before.len(), 4);
        assert_eq!(index.len(), 1);
    }
}
