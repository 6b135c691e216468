//! Text extraction for the document kinds the corpus accepts.
//!
//! Plain text and Markdown are read as (lossy) UTF-8. JSON is re-rendered
//! pretty-printed when it parses, raw otherwise. PDF is extracted per page so
//! chunks can carry page numbers. DOCX is read from `word/document.xml`.
//!
//! Extraction never panics; failures come back as [`ExtractError`] and the
//! corpus loader skips the file.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document kind: {0}")]
    Unsupported(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Ooxml(String),
}

/// Supported source document kinds, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `.txt`, `.md`
    PlainText,
    /// `.json`
    Structured,
    /// `.pdf`
    Paginated,
    /// `.docx`
    WordProcessing,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" | "markdown" => Some(DocumentKind::PlainText),
            "json" => Some(DocumentKind::Structured),
            "pdf" => Some(DocumentKind::Paginated),
            "docx" => Some(DocumentKind::WordProcessing),
            _ => None,
        }
    }
}

/// Extracted text, either whole-document or one entry per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedText {
    Whole(String),
    Pages(Vec<String>),
}

impl ExtractedText {
    /// Flatten pages into one newline-joined string.
    pub fn into_text(self) -> String {
        match self {
            ExtractedText::Whole(text) => text,
            ExtractedText::Pages(pages) => pages.join("\n"),
        }
    }
}

/// Read and extract a file, choosing the extractor from its extension.
pub fn extract_file(path: &Path) -> Result<ExtractedText, ExtractError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&bytes, kind)
}

/// Extract text from in-memory bytes of a known kind.
pub fn extract_bytes(bytes: &[u8], kind: DocumentKind) -> Result<ExtractedText, ExtractError> {
    match kind {
        DocumentKind::PlainText => Ok(ExtractedText::Whole(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        DocumentKind::Structured => Ok(ExtractedText::Whole(render_json(bytes))),
        DocumentKind::Paginated => extract_pdf_pages(bytes).map(ExtractedText::Pages),
        DocumentKind::WordProcessing => extract_docx(bytes).map(ExtractedText::Whole),
    }
}

/// Whole-document text of any supported file, used for submissions.
pub fn read_document_text(path: &Path) -> Result<String, ExtractError> {
    extract_file(path).map(ExtractedText::into_text)
}

fn render_json(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.into_owned()),
        Err(_) => raw.into_owned(),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(format!("word/document.xml: {}", e)))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraph_text(&doc_xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph. Run text is kept
/// verbatim: Word splits words and their separating spaces across runs.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut in_run_text = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_run_text = false,
            Ok(Event::Text(te)) if in_run_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
