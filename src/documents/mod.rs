// Document loading
// Turns uploaded or fetched bytes into plain text ready for chunking


use std::path::Path;
use tracing::{debug, warn};

use crate::{DobbError, Result};

pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Detect the kind from a file name's extension
    #[inline]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "text" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    #[inline]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME_TYPE,
        }
    }
}

/// Raw document text plus where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub mime_type: String,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(source: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mime_type: kind.mime_type().to_string(),
            text: text.into(),
        }
    }

    /// Decode bytes of the given kind into a document
    #[inline]
    pub fn from_bytes(source: &str, kind: DocumentKind, bytes: &[u8]) -> Result<Self> {
        let text = match kind {
            DocumentKind::Text => decode_text(source, bytes)?,
            DocumentKind::Pdf => extract_pdf_text(source, bytes)?,
            DocumentKind::Docx => extract_docx_text(source, bytes)?,
        };
        if text.trim().is_empty() {
            return Err(DobbError::Validation(format!(
                "Document '{}' contains no text",
                source
            )));
        }
        Ok(Self::new(source, kind, text))
    }

    /// Load a document from disk, detecting the kind from the extension
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let kind = DocumentKind::from_file_name(&source).ok_or_else(|| {
            DobbError::Validation(format!(
                "Unsupported file type for '{}': only .txt, .pdf and .docx are accepted",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&source, kind, &bytes)
    }
}

fn decode_text(source: &str, bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        DobbError::Validation(format!("File '{}' is not valid UTF-8 text: {}", source, e))
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

/// Extract the text of every page, in page order
fn extract_pdf_text(source: &str, bytes: &[u8]) -> Result<String> {
    let document = lopdf::Document::load_mem(bytes).map_err(|e| {
        DobbError::Validation(format!("File '{}' is not a readable PDF: {}", source, e))
    })?;

    let pages = document.get_pages();
    debug!("Extracting text from {} PDF pages of '{}'", pages.len(), source);

    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => {
                if !text.is_empty() && !page_text.is_empty() {
                    text.push('\n');
                }
                text.push_str(page_text.trim_end());
            }
            Err(e) => warn!(
                "Skipping unreadable page {} of '{}': {}",
                page_number, source, e
            ),
        }
    }

    Ok(text)
}

/// Paragraph text of a Word document, one line per paragraph
fn extract_docx_text(source: &str, bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| {
        DobbError::Validation(format!("File '{}' is not a readable DOCX: {}", source, e))
    })?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        let docx_rs::DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        let mut line = String::new();
        for paragraph_child in &paragraph.children {
            let docx_rs::ParagraphChild::Run(run) = paragraph_child else {
                continue;
            };
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(text) => line.push_str(&text.text),
                    docx_rs::RunChild::Tab(_) => line.push('\t'),
                    _ => {}
                }
            }
        }
        lines.push(line);
    }
    debug!("Extracted {} paragraphs from '{}'", lines.len(), source);

    Ok(lines.join("\n"))
}
