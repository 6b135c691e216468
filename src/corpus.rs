//! Corpus loader: walks the category roots and turns files into chunks.
//!
//! Files are visited category by category (rubric, question, solution,
//! exemplar) and, within a root, in sorted relative-path order, so the same
//! directory contents always yield the same chunk ids.
//!
//! A file that cannot be read or extracted is logged and skipped; it never
//! aborts the load.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::segment;
use crate::config::{ChunkingConfig, CorpusConfig};
use crate::extract::{extract_file, ExtractedText};
use crate::models::{Category, Chunk, ChunkMetadata, Corpus, EMPTY_PAGE_NOTE};

/// Counters describing one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks: usize,
    pub empty_pages: usize,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub corpus: Corpus,
    pub report: LoadReport,
}

/// Builds a [`Corpus`] from the configured category roots.
pub struct CorpusLoader {
    roots: Vec<(Category, PathBuf)>,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    chunking: ChunkingConfig,
}

impl CorpusLoader {
    pub fn new(corpus: &CorpusConfig, chunking: &ChunkingConfig) -> Result<Self> {
        let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
        default_excludes.extend(corpus.exclude_globs.clone());

        Ok(Self {
            roots: corpus
                .roots()
                .into_iter()
                .map(|(cat, dir)| (cat, dir.to_path_buf()))
                .collect(),
            include: build_globset(&corpus.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: corpus.follow_symlinks,
            chunking: chunking.clone(),
        })
    }

    /// Convenience constructor for an explicit category → directory mapping
    /// using the default include globs.
    pub fn from_roots(roots: Vec<(Category, PathBuf)>, chunking: &ChunkingConfig) -> Result<Self> {
        let mut ordered = roots;
        ordered.sort_by_key(|(cat, _)| *cat);
        let include: Vec<String> = ["**/*.txt", "**/*.md", "**/*.json", "**/*.pdf", "**/*.docx"]
            .iter()
            .map(|g| g.to_string())
            .collect();
        Ok(Self {
            roots: ordered,
            include: build_globset(&include)?,
            exclude: build_globset(&["**/.*".to_string()])?,
            follow_symlinks: false,
            chunking: chunking.clone(),
        })
    }

    #[tracing::instrument(skip(self), fields(roots = self.roots.len()))]
    pub fn load(&self) -> LoadOutcome {
        let mut builder = CorpusBuilder::new(&self.chunking);

        for (category, root) in &self.roots {
            if !root.is_dir() {
                tracing::debug!(category = %category, root = %root.display(), "corpus root missing, skipping");
                continue;
            }
            for (path, rel) in self.scan_root(root) {
                builder.report.files_seen += 1;
                match extract_file(&path) {
                    Ok(extracted) => {
                        builder.add_document(*category, &rel, extracted);
                        builder.report.files_indexed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable document");
                        builder.report.files_skipped += 1;
                    }
                }
            }
        }

        let outcome = builder.finish();
        tracing::info!(
            files = outcome.report.files_indexed,
            skipped = outcome.report.files_skipped,
            chunks = outcome.report.chunks,
            "corpus loaded"
        );
        outcome
    }

    /// Matching files under `root` as `(absolute, relative)` pairs, sorted.
    fn scan_root(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(self.follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            files.push((path.to_path_buf(), rel_str));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }
}

/// Accumulates chunks and assigns per-category ids.
pub(crate) struct CorpusBuilder<'a> {
    chunking: &'a ChunkingConfig,
    chunks: Vec<Chunk>,
    next_id: [usize; 4],
    report: LoadReport,
}

impl<'a> CorpusBuilder<'a> {
    pub(crate) fn new(chunking: &'a ChunkingConfig) -> Self {
        Self {
            chunking,
            chunks: Vec::new(),
            next_id: [0; 4],
            report: LoadReport::default(),
        }
    }

    pub(crate) fn add_document(&mut self, category: Category, rel: &str, extracted: ExtractedText) {
        let path = format!("{}/{}", category, rel);
        match extracted {
            ExtractedText::Whole(text) => {
                for (i, piece) in self.split(&text).into_iter().enumerate() {
                    self.push(category, &path, None, i, piece, None);
                }
            }
            ExtractedText::Pages(pages) => {
                for (page_idx, page_text) in pages.iter().enumerate() {
                    let page = Some(page_idx as u32 + 1);
                    let pieces = self.split(page_text);
                    if pieces.is_empty() {
                        self.report.empty_pages += 1;
                        if self.chunking.keep_empty_pages {
                            self.push(
                                category,
                                &path,
                                page,
                                0,
                                String::new(),
                                Some(EMPTY_PAGE_NOTE.to_string()),
                            );
                        }
                        continue;
                    }
                    for (i, piece) in pieces.into_iter().enumerate() {
                        self.push(category, &path, page, i, piece, None);
                    }
                }
            }
        }
    }

    fn split(&self, text: &str) -> Vec<String> {
        segment(
            text,
            self.chunking.chunk_size,
            self.chunking.overlap,
            self.chunking.min_chars,
        )
    }

    fn push(
        &mut self,
        category: Category,
        path: &str,
        page: Option<u32>,
        chunk_index: usize,
        text: String,
        note: Option<String>,
    ) {
        let slot = &mut self.next_id[category as usize];
        let id = format!("{}-{}", category, *slot);
        *slot += 1;
        self.chunks.push(Chunk::new(
            id,
            text,
            ChunkMetadata {
                path: path.to_string(),
                category,
                page,
                chunk_index: chunk_index as u32,
                note,
            },
        ));
    }

    pub(crate) fn finish(mut self) -> LoadOutcome {
        self.report.chunks = self.chunks.len();
        LoadOutcome {
            corpus: Corpus::new(self.chunks),
            report: self.report,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn chunking(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            overlap,
            min_chars: 1,
            keep_empty_pages: false,
        }
    }

    #[test]
    fn pages_carry_page_numbers_and_empty_pages_are_counted() {
        let cfg = chunking(100, 10);
        let mut builder = CorpusBuilder::new(&cfg);
        builder.add_document(
            Category::Rubric,
            "week1.pdf",
            ExtractedText::Pages(vec!["Page one text".into(), "   ".into(), "Page three".into()]),
        );
        let outcome = builder.finish();
        let chunks = outcome.corpus.chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.page, Some(1));
        assert_eq!(chunks[1].metadata.page, Some(3));
        assert_eq!(chunks[1].provenance(), "rubric/week1.pdf:p3");
        assert_eq!(outcome.report.empty_pages, 1);
    }

    #[test]
    fn empty_pages_become_placeholders_when_configured() {
        let mut cfg = chunking(100, 10);
        cfg.keep_empty_pages = true;
        let mut builder = CorpusBuilder::new(&cfg);
        builder.add_document(
            Category::Question,
            "scan.pdf",
            ExtractedText::Pages(vec!["".into(), "Question 1".into()]),
        );
        let chunks = builder.finish().corpus;
        let chunks = chunks.chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_placeholder());
        assert_eq!(chunks[0].metadata.note.as_deref(), Some(EMPTY_PAGE_NOTE));
        assert_eq!(chunks[0].metadata.page, Some(1));
        assert_eq!(chunks[1].id, "question-1");
    }

    #[test]
    fn ids_count_per_category() {
        let cfg = chunking(5, 0);
        let mut builder = CorpusBuilder::new(&cfg);
        builder.add_document(Category::Rubric, "a.txt", ExtractedText::Whole("0123456789".into()));
        builder.add_document(Category::Question, "q.txt", ExtractedText::Whole("short".into()));
        let corpus = builder.finish().corpus;
        let ids: Vec<&str> = corpus.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["rubric-0", "rubric-1", "question-0"]);
        assert_eq!(corpus.chunks()[1].metadata.chunk_index, 1);
    }

    #[test]
    fn load_walks_roots_in_category_order_and_skips_bad_files() {
        let tmp = TempDir::new().unwrap();
        let rubrics = tmp.path().join("rubrics");
        let questions = tmp.path().join("questions");
        fs::create_dir_all(rubrics.join("nested")).unwrap();
        fs::create_dir_all(&questions).unwrap();
        fs::write(rubrics.join("b.txt"), "Second rubric file").unwrap();
        fs::write(rubrics.join("nested").join("a.md"), "First rubric file").unwrap();
        fs::write(rubrics.join("broken.pdf"), "not really a pdf").unwrap();
        fs::write(rubrics.join("image.png"), [0u8, 1, 2]).unwrap();
        fs::write(questions.join("q1.json"), r#"{"question": "Describe optimization"}"#).unwrap();

        let loader = CorpusLoader::from_roots(
            vec![(Category::Question, questions), (Category::Rubric, rubrics)],
            &chunking(1200, 200),
        )
        .unwrap();
        let outcome = loader.load();

        let paths: Vec<&str> = outcome
            .corpus
            .chunks()
            .iter()
            .map(|c| c.metadata.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec!["rubric/b.txt", "rubric/nested/a.md", "question/q1.json"]
        );
        assert_eq!(outcome.report.files_seen, 4);
        assert_eq!(outcome.report.files_skipped, 1);
        assert_eq!(outcome.report.files_indexed, 3);

        let again = loader.load();
        assert_eq!(again.corpus, outcome.corpus);
    }

    #[test]
    fn missing_root_yields_empty_corpus() {
        let loader = CorpusLoader::from_roots(
            vec![(Category::Rubric, PathBuf::from("/definitely/not/here"))],
            &chunking(100, 10),
        )
        .unwrap();
        let outcome = loader.load();
        assert!(outcome.corpus.is_empty());
        assert_eq!(outcome.report, LoadReport::default());
    }
}
