//! services/api/src/adapters/extractor.rs
//!
//! Turns uploaded documents into plain text. Implements the `TextExtractionService`
//! port; the format is picked from the file name's extension.

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use study_assistant_core::domain::DocumentFormat;
use study_assistant_core::ports::{ExtractionError, TextExtractionService};
use tracing::debug;

const DOCX_BODY: &str = "word/document.xml";

/// Ceiling on the inflated size of `word/document.xml`.
const MAX_DOCX_XML_BYTES: u64 = 20 * 1024 * 1024;

/// Matches the WordprocessingML elements that carry text or layout we keep.
static DOCX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab\s*/>|<w:br\s*/>|<w:cr\s*/>|</w:p>")
        .expect("static regex")
});

#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractionService for DocumentExtractor {
    async fn extract_text(&self, data: Bytes, file_name: &str) -> Result<String, ExtractionError> {
        let format = DocumentFormat::from_file_name(file_name);
        debug!(file_name, ?format, bytes = data.len(), "Extracting text");
        match format {
            DocumentFormat::Pdf => extract_pdf(data).await,
            DocumentFormat::Docx => {
                tokio::task::spawn_blocking(move || extract_docx(&data, MAX_DOCX_XML_BYTES))
                    .await
                    .map_err(|e| ExtractionError::Malformed(format!("DOCX reader aborted: {}", e)))?
            }
            DocumentFormat::LegacyDoc => Err(ExtractionError::UnsupportedFormat(
                "DOC files are not supported. Please convert to DOCX.".to_string(),
            )),
            DocumentFormat::PlainText => Ok(extract_plain(&data)),
        }
    }
}

/// `pdf-extract` is synchronous and may panic on hostile input, so it runs on the
/// blocking pool where a panic surfaces as a `JoinError`.
async fn extract_pdf(data: Bytes) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| ExtractionError::Malformed(format!("PDF parser aborted: {}", e)))?
        .map_err(|e| ExtractionError::Malformed(e.to_string()))
}

/// Reads the document body, refusing entries that inflate past `limit` bytes.
/// The declared size is checked first and the read itself is capped as well,
/// since the header is attacker-controlled.
fn extract_docx(data: &[u8], limit: u64) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExtractionError::Malformed(format!("not a DOCX archive: {}", e)))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|e| ExtractionError::Malformed(format!("missing {}: {}", DOCX_BODY, e)))?;
    if entry.size() > limit {
        return Err(too_large(limit));
    }

    let mut body = String::new();
    entry
        .take(limit + 1)
        .read_to_string(&mut body)
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    if body.len() as u64 > limit {
        return Err(too_large(limit));
    }
    Ok(docx_xml_to_text(&body))
}

fn too_large(limit: u64) -> ExtractionError {
    ExtractionError::Malformed(format!(
        "{} inflates past {} MB",
        DOCX_BODY,
        limit / (1024 * 1024)
    ))
}

fn docx_xml_to_text(xml: &str) -> String {
    let mut text = String::with_capacity(xml.len() / 4);
    for token in DOCX_TOKEN.captures_iter(xml) {
        match token.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match &token[0] {
                t if t.starts_with("<w:tab") => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }
    text.trim_end().to_string()
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn extract_plain(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}
