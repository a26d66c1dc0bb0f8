//! PDF text extraction with OCR fallback.
//!
//! The text layer is tried first. When it is missing, too short or cannot
//! be parsed, every page is rendered to PNG and OCR'd in order. If that
//! whole pipeline fails it is retried once as a pure render + OCR pass
//! before the extraction is declared failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object};
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::PdfConfig;
use crate::error::{OcrError, PdfError};
use crate::processor::ocr::OcrExtractor;
use crate::sanitize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

/// Result of parsing the text layer.
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    pub text: String,
    pub page_count: usize,
    pub info: DocumentInfo,
}

/// Reads the embedded text layer. Runs on the blocking pool.
pub trait PdfParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedPdf, PdfError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_number: u32,
    pub path: PathBuf,
}

/// Renders every page of a PDF to an image file inside `out_dir`.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, PdfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Direct,
    Ocr,
    #[serde(rename = "ocr-fallback")]
    OcrFallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::OcrFallback => "ocr-fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PdfExtraction {
    pub text: String,
    pub page_count: usize,
    pub extraction_method: ExtractionMethod,
    pub document_info: DocumentInfo,
}

#[derive(Clone)]
pub struct PdfExtractor {
    parser: Arc<dyn PdfParser>,
    renderer: Arc<dyn PageRenderer>,
    ocr: OcrExtractor,
    min_direct_text_chars: usize,
}

impl PdfExtractor {
    pub fn new(
        parser: Arc<dyn PdfParser>,
        renderer: Arc<dyn PageRenderer>,
        ocr: OcrExtractor,
        config: &PdfConfig,
    ) -> Self {
        Self {
            parser,
            renderer,
            ocr,
            min_direct_text_chars: config.min_direct_text_chars,
        }
    }

    pub async fn extract(&self, pdf_path: &Path) -> Result<PdfExtraction, PdfError> {
        let span = info_span!("processor.pdf", file = %sanitize::redact_path(pdf_path));
        async {
            if !tokio::fs::try_exists(pdf_path).await.unwrap_or(false) {
                return Err(PdfError::FileNotFound(pdf_path.to_path_buf()));
            }

            match self.extract_primary(pdf_path).await {
                Ok(extraction) => Ok(extraction),
                Err(e) => {
                    warn!(error = %e, "pdf extraction failed, retrying with ocr fallback");
                    let fallback = self
                        .ocr_pages(pdf_path)
                        .instrument(info_span!("processor.ocr_fallback"))
                        .await;
                    match fallback {
                        Ok((text, page_count)) => Ok(PdfExtraction {
                            text,
                            page_count,
                            extraction_method: ExtractionMethod::OcrFallback,
                            document_info: DocumentInfo::default(),
                        }),
                        Err(fallback_err) => Err(PdfError::ExtractionFailed {
                            path: pdf_path.to_path_buf(),
                            source: Box::new(fallback_err),
                        }),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn extract_primary(&self, pdf_path: &Path) -> Result<PdfExtraction, PdfError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| PdfError::ReadDocument {
                path: pdf_path.to_path_buf(),
                source: e,
            })?;

        let parser = Arc::clone(&self.parser);
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&bytes))
            .await
            .map_err(|e| PdfError::Parse(format!("PDF parser task failed: {}", e)))?;

        match parsed {
            Ok(parsed) if self.is_usable_text(&parsed.text) => {
                debug!(pages = parsed.page_count, "using embedded text layer");
                Ok(PdfExtraction {
                    text: parsed.text.trim().to_string(),
                    page_count: parsed.page_count,
                    extraction_method: ExtractionMethod::Direct,
                    document_info: parsed.info,
                })
            }
            Ok(parsed) => {
                debug!(
                    chars = parsed.text.trim().chars().count(),
                    "embedded text insufficient, rendering pages for ocr"
                );
                let (text, rendered) = self.ocr_pages(pdf_path).await?;
                Ok(PdfExtraction {
                    text,
                    page_count: parsed.page_count.max(rendered),
                    extraction_method: ExtractionMethod::Ocr,
                    document_info: parsed.info,
                })
            }
            Err(e) => {
                warn!(error = %e, "text layer unreadable, rendering pages for ocr");
                let (text, rendered) = self.ocr_pages(pdf_path).await?;
                Ok(PdfExtraction {
                    text,
                    page_count: rendered,
                    extraction_method: ExtractionMethod::Ocr,
                    document_info: DocumentInfo::default(),
                })
            }
        }
    }

    /// Direct text is accepted when its whitespace-collapsed form is longer
    /// than the configured minimum and contains at least one alphanumeric.
    pub fn is_usable_text(&self, text: &str) -> bool {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().count() > self.min_direct_text_chars
            && collapsed.chars().any(char::is_alphanumeric)
    }

    /// Renders and OCRs every page in order. Returns the concatenated text
    /// and the number of rendered pages.
    async fn ocr_pages(&self, pdf_path: &Path) -> Result<(String, usize), PdfError> {
        let temp_dir = tempfile::Builder::new()
            .prefix("tallyscan-pages-")
            .tempdir()
            .map_err(|e| PdfError::Render(format!("Failed to create temp directory: {}", e)))?;

        let pages = self.renderer.render(pdf_path, temp_dir.path()).await?;
        if pages.is_empty() {
            return Err(PdfError::Render("Renderer produced no pages".to_string()));
        }

        let mut sections = Vec::with_capacity(pages.len());
        let mut last_error: Option<OcrError> = None;

        for page in &pages {
            match self.ocr.extract_text(&page.path).await {
                Ok(text) => sections.push(format!("--- Page {} ---\n{}", page.page_number, text)),
                Err(e) => {
                    warn!(page = page.page_number, error = %e, "page ocr failed, skipping");
                    last_error = Some(e);
                }
            }
            if let Err(e) = tokio::fs::remove_file(&page.path).await {
                debug!(page = page.page_number, error = %e, "failed to remove page image");
            }
        }

        if sections.is_empty() {
            if let Some(e) = last_error {
                return Err(PdfError::PageOcr(e));
            }
        }

        Ok((sections.join("\n\n"), pages.len()))
    }
}

/// Text-layer parser backed by `lopdf`.
pub struct LopdfParser;

impl PdfParser for LopdfParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedPdf, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        let pages = doc.get_pages();

        let mut text = String::new();
        for page_num in pages.keys() {
            if let Ok(page_text) = doc.extract_text(&[*page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        Ok(ParsedPdf {
            text,
            page_count: pages.len(),
            info: document_info(&doc),
        })
    }
}

fn document_info(doc: &Document) -> DocumentInfo {
    let Some(info) = info_dictionary(doc) else {
        return DocumentInfo::default();
    };

    DocumentInfo {
        title: info_string(info, b"Title"),
        author: info_string(info, b"Author"),
        subject: info_string(info, b"Subject"),
        creator: info_string(info, b"Creator"),
        producer: info_string(info, b"Producer"),
        creation_date: info_string(info, b"CreationDate"),
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    match info.get(key).ok()? {
        Object::String(bytes, _) => {
            let value = decode_pdf_string(bytes);
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE with BOM, otherwise byte-wise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Renders pages with poppler's `pdftoppm`.
pub struct PdftoppmRenderer {
    binary: String,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(config: &PdfConfig) -> Self {
        Self {
            binary: config.pdftoppm_path.clone(),
            dpi: config.render_dpi,
        }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, PdfError> {
        let prefix = out_dir.join("page");
        let output = tokio::process::Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PdfError::RendererUnavailable {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PdfError::Render(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        collect_rendered_pages(out_dir).await
    }
}

/// Finds `page-N.png` files (pdftoppm zero-pads N by page count).
async fn collect_rendered_pages(out_dir: &Path) -> Result<Vec<RenderedPage>, PdfError> {
    let mut entries = tokio::fs::read_dir(out_dir)
        .await
        .map_err(|e| PdfError::Render(format!("Failed to list rendered pages: {}", e)))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PdfError::Render(format!("Failed to list rendered pages: {}", e)))?
    {
        let path = entry.path();
        let page_number = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("page-"))
            .and_then(|n| n.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(page_number) = page_number {
            pages.push(RenderedPage { page_number, path });
        }
    }

    pages.sort_by_key(|p| p.page_number);
    Ok(pages)
}
