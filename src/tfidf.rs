//! TF-IDF vectorizer over unigrams and bigrams.
//!
//! Tokens are lowercase, accent-folded runs of two or more
//! alphanumeric/underscore characters with English stop words removed; bigrams are formed from
//! adjacent surviving tokens. The vocabulary keeps the `max_features` terms
//! with the highest corpus frequency (ties broken alphabetically) and is
//! indexed alphabetically.
//!
//! Weights are raw term counts times smooth IDF `ln((1 + n) / (1 + df)) + 1`,
//! and every vector is L2-normalized so a dot product is cosine similarity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Sparse vector: `(term index, weight)` sorted by term index.
pub type SparseVector = Vec<(u32, f32)>;

static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn stop_words() -> &'static HashSet<&'static str> {
    STOP_WORDS.get_or_init(|| {
        [
            "a", "about", "above", "after", "again", "against", "all", "almost", "along",
            "already", "also", "although", "always", "am", "among", "an", "and", "another",
            "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are", "around", "as",
            "at", "be", "became", "because", "become", "becomes", "been", "before", "being",
            "below", "beside", "besides", "between", "beyond", "both", "but", "by", "can",
            "cannot", "could", "did", "do", "does", "doing", "done", "down", "during", "each",
            "either", "else", "elsewhere", "enough", "etc", "even", "ever", "every",
            "everyone", "everything", "everywhere", "except", "few", "for", "from", "further",
            "had", "has", "hasnt", "have", "having", "he", "hence", "her", "here", "hers",
            "herself", "him", "himself", "his", "how", "however", "ie", "if", "in", "indeed",
            "into", "is", "it", "its", "itself", "just", "last", "latter", "least", "less",
            "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most",
            "mostly", "much", "must", "my", "myself", "neither", "never", "nevertheless",
            "next", "no", "nobody", "none", "nor", "not", "nothing", "now", "nowhere", "of",
            "off", "often", "on", "once", "one", "only", "onto", "or", "other", "others",
            "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
            "please", "rather", "re", "same", "several", "she", "should", "since", "so",
            "some", "somehow", "someone", "something", "sometime", "sometimes", "somewhere",
            "still", "such", "than", "that", "the", "their", "theirs", "them", "themselves",
            "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
            "thereupon", "these", "they", "this", "those", "though", "through", "throughout",
            "thru", "thus", "to", "together", "too", "toward", "towards", "under", "until",
            "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever",
            "when", "whence", "whenever", "where", "whereas", "whereby", "wherein", "whether",
            "which", "while", "who", "whoever", "whole", "whom", "whose", "why", "will",
            "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
            "yourselves",
        ]
        .iter()
        .copied()
        .collect()
    })
}

/// Compatibility-decompose `text` and drop combining marks, so "café"
/// and "cafe" produce the same token.
pub fn fold_accents(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercased, accent-folded word tokens of length >= 2 with stop words
/// removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let stop = stop_words();
    fold_accents(&text.to_lowercase())
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| s.chars().count() >= 2)
        .filter(|s| !stop.contains(s))
        .map(|s| s.to_string())
        .collect()
}

/// Unigram and bigram terms of `text`, in occurrence order.
pub fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut out = Vec::with_capacity(tokens.len() * 2);
    out.extend(tokens.iter().cloned());
    for pair in tokens.windows(2) {
        out.push(format!("{} {}", pair[0], pair[1]));
    }
    out
}

/// A fitted TF-IDF model: vocabulary plus per-term IDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfidfModel {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfModel {
    /// Fit on `docs` and return the model with the L2-normalized document
    /// vectors, one per input document.
    pub fn fit_transform(docs: &[&str], max_features: usize) -> (Self, Vec<SparseVector>) {
        let doc_terms: Vec<Vec<String>> = docs.iter().map(|d| terms(d)).collect();

        let mut corpus_freq: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();
        for terms in &doc_terms {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in terms {
                *corpus_freq.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, u64)> = corpus_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(max_features);
        let mut kept: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort_unstable();

        let n = docs.len() as f64;
        let mut vocabulary = HashMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (i, term) in kept.iter().enumerate() {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf.push((((1.0 + n) / (1.0 + df)).ln() + 1.0) as f32);
            vocabulary.insert(term.to_string(), i as u32);
        }

        let model = Self { vocabulary, idf };
        let vectors = doc_terms.iter().map(|t| model.vectorize(t)).collect();
        (model, vectors)
    }

    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    /// Check that every vocabulary entry points at an IDF slot, one slot per
    /// term. A model read from disk must pass this before it is queried.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(format!(
                "{} vocabulary terms for {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            ));
        }
        let limit = self.idf.len() as u64;
        if let Some((term, idx)) = self
            .vocabulary
            .iter()
            .find(|(_, idx)| u64::from(**idx) >= limit)
        {
            return Err(format!("term '{}' maps to missing idf slot {}", term, idx));
        }
        Ok(())
    }

    /// Project arbitrary text into the fitted space.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.vectorize(&terms(text))
    }

    fn vectorize(&self, terms: &[String]) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for term in terms {
            if let Some(&idx) = self.vocabulary.get(term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut vec: SparseVector = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx as usize]))
            .collect();
        let norm = vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in vec.iter_mut() {
                *w /= norm;
            }
        }
        vec
    }
}

/// Dot product of two index-sorted sparse vectors.
pub fn sparse_dot(a: &[(u32, f32)], b: &[(u32, f32)]) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0f32;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}
