//! Core data models used throughout the grading pipeline.
//!
//! These types represent the chunks, retrieval hits, and grade results that
//! flow from ingestion through retrieval to the scoring oracle and back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Note attached to placeholder chunks for pages without extractable text.
pub const EMPTY_PAGE_NOTE: &str = "EMPTY_OR_SCANNED";

/// Logical kind of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rubric,
    Question,
    Solution,
    Exemplar,
}

impl Category {
    /// All categories in corpus load order.
    pub const ALL: [Category; 4] = [
        Category::Rubric,
        Category::Question,
        Category::Solution,
        Category::Exemplar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Rubric => "rubric",
            Category::Question => "question",
            Category::Solution => "solution",
            Category::Exemplar => "exemplar",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rubric" => Ok(Category::Rubric),
            "question" => Ok(Category::Question),
            "solution" => Ok(Category::Solution),
            "exemplar" => Ok(Category::Exemplar),
            other => Err(format!(
                "unknown category '{}': expected rubric, question, solution, or exemplar",
                other
            )),
        }
    }
}

/// Provenance attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// `<category>/<path relative to the category root>`, `/`-separated.
    pub path: String,
    pub category: Category,
    /// 1-based page number for paginated sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Position of the chunk within its document (or page).
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A bounded, provenance-tagged slice of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `text`, lowercase hex.
    pub hash: String,
}

impl Chunk {
    pub fn new(id: String, text: String, metadata: ChunkMetadata) -> Self {
        let hash = sha256_hex(text.as_bytes());
        Self {
            id,
            text,
            metadata,
            hash,
        }
    }

    /// Placeholder chunks record pages that produced no text. They are kept
    /// for auditing and never returned from search.
    pub fn is_placeholder(&self) -> bool {
        self.text.is_empty()
    }

    /// Human-readable location: `path` or `path:pN`.
    pub fn provenance(&self) -> String {
        match self.metadata.page {
            Some(page) => format!("{}:p{}", self.metadata.path, page),
            None => self.metadata.path.clone(),
        }
    }
}

/// The ordered chunk set produced by one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    chunks: Vec<Chunk>,
}

impl Corpus {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Digest over chunk ids and content hashes, in order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for chunk in &self.chunks {
            hasher.update(chunk.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(chunk.hash.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    /// Cosine similarity in `[0, 1]`.
    pub score: f64,
    pub chunk: Chunk,
}

impl RetrievalHit {
    /// Evidence line shown to users: `[score=0.1234] path:p2#c0`.
    pub fn evidence_line(&self) -> String {
        format!(
            "[score={:.4}] {}#c{}",
            self.score,
            self.chunk.provenance(),
            self.chunk.metadata.chunk_index
        )
    }
}

/// Validated, bounded grading output consumed by reporting collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: Option<String>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub evidence: Vec<String>,
}

/// A single per-criterion judgement after clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub score: f64,
    pub rationale: String,
}

/// The oracle's structured output after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub total_score: f64,
    pub criteria: Vec<CriterionScore>,
    pub overall_feedback: Option<String>,
    pub improvable_sections: Vec<String>,
    pub policy_flags: Vec<String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str, page: Option<u32>) -> Chunk {
        Chunk::new(
            id.to_string(),
            text.to_string(),
            ChunkMetadata {
                path: "rubric/week1.pdf".to_string(),
                category: Category::Rubric,
                page,
                chunk_index: 0,
                note: None,
            },
        )
    }

    #[test]
    fn provenance_includes_page_when_present() {
        assert_eq!(chunk("rubric-0", "x", Some(3)).provenance(), "rubric/week1.pdf:p3");
        assert_eq!(chunk("rubric-0", "x", None).provenance(), "rubric/week1.pdf");
    }

    #[test]
    fn evidence_line_uses_four_decimals() {
        let hit = RetrievalHit {
            score: 0.123456,
            chunk: chunk("rubric-0", "x", Some(2)),
        };
        assert_eq!(hit.evidence_line(), "[score=0.1235] rubric/week1.pdf:p2#c0");
    }

    #[test]
    fn evidence_lines_tell_chunks_of_one_file_apart() {
        let mut second = chunk("rubric-1", "y", None);
        second.metadata.chunk_index = 1;
        let lines: Vec<String> = [chunk("rubric-0", "x", None), second]
            .into_iter()
            .map(|chunk| RetrievalHit { score: 0.5, chunk }.evidence_line())
            .collect();
        assert_eq!(
            lines,
            vec![
                "[score=0.5000] rubric/week1.pdf#c0",
                "[score=0.5000] rubric/week1.pdf#c1"
            ]
        );
        assert_eq!(chunk("rubric-0", "x", None).provenance(), "rubric/week1.pdf");
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Rubric".parse::<Category>().unwrap(), Category::Rubric);
        assert_eq!(" exemplar ".parse::<Category>().unwrap(), Category::Exemplar);
        assert!("answers".parse::<Category>().is_err());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = Corpus::new(vec![chunk("rubric-0", "alpha", None)]);
        let b = Corpus::new(vec![chunk("rubric-0", "beta", None)]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn empty_text_is_placeholder() {
        assert!(chunk("rubric-0", "", Some(1)).is_placeholder());
        assert!(!chunk("rubric-0", "text", Some(1)).is_placeholder());
    }
}
