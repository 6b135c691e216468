//! # rag-grader
//!
//! Retrieval-augmented grading of free-text submissions.
//!
//! Rubric, question, solution, and exemplar documents are segmented into
//! overlapping chunks and indexed with TF-IDF. A submission is graded by
//! retrieving the most relevant rubric and question passages, asking a
//! language model for a structured JSON grade, and validating that reply
//! into bounded scores and a letter grade.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │   Corpus    │──▶│  Segmenter  │──▶│ TF-IDF index│
//! │  (4 roots)  │   │  (windows)  │   │ persist/swap│
//! └─────────────┘   └─────────────┘   └──────┬──────┘
//!                                            │
//!                   ┌────────────────────────┤
//!                   ▼                        ▼
//!            ┌─────────────┐          ┌─────────────┐
//!            │  Retriever  │─────────▶│  Evaluator  │──▶ oracle (LLM)
//!            │ (filtered)  │          │ parse/clamp │
//!            └─────────────┘          └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grader index                          # load corpus, build and persist index
//! grader search "learning rate" --category rubric
//! grader grade submission.docx --hint "week 3 essay"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction for txt/md/json/pdf/docx |
//! | [`chunk`] | Sliding-window text segmentation |
//! | [`corpus`] | Category-rooted corpus loader |
//! | [`tfidf`] | Accent-folding tokenizer and TF-IDF vectorizer |
//! | [`index`] | Vector index with persistence and atomic rebuild |
//! | [`retrieve`] | Category and allowlist filtered retrieval |
//! | [`oracle`] | Scoring oracle trait and chat-completions client |
//! | [`prompt`] | Grading prompt assembly |
//! | [`grader`] | Grading evaluator |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`ingest`] | `grader index` command |
//! | [`search`] | `grader search` command and index loading |
//! | [`grade_cmd`] | `grader grade` command |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod extract;
pub mod grade_cmd;
pub mod grader;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod prompt;
pub mod retrieve;
pub mod search;
pub mod tfidf;
