//! Plain-text extraction from source documents.
//!
//! - PDF: every page is rendered with `pdftoppm` and read back with
//!   `tesseract`. Any failing page aborts the whole extraction.
//! - DOCX: paragraphs of `word/document.xml` in order, blank ones skipped.
//!
//! Rendered page images live in a scoped temp dir that is removed on every
//! exit path.

use std::io::Read;
use std::path::{Path, PathBuf};

use ragdesk_core::config::IngestConfig;
use regex::Regex;
use tokio::process::Command;

use crate::error::{IngestError, Result};

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Detect by file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(IngestError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// External OCR toolchain settings.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    pub language: String,
    pub dpi: u32,
    pub tesseract_cmd: String,
    pub pdftoppm_cmd: String,
}

impl From<&IngestConfig> for OcrOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            language: config.ocr_language.clone(),
            dpi: config.ocr_dpi,
            tesseract_cmd: config.tesseract_cmd.clone(),
            pdftoppm_cmd: config.pdftoppm_cmd.clone(),
        }
    }
}

/// Extract plain text from a PDF or DOCX file.
pub async fn extract_text(path: &Path, ocr: &OcrOptions) -> Result<String> {
    match DocumentKind::from_path(path)? {
        DocumentKind::Pdf => extract_pdf(path, ocr).await,
        DocumentKind::Docx => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || extract_docx(&owned))
                .await
                .map_err(|e| IngestError::Io(std::io::Error::other(e)))?
        }
    }
}

// ============================================================================
// DOCX
// ============================================================================

pub fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| IngestError::Docx(e.to_string()))?;
    let mut body = archive
        .by_name(DOCX_BODY)
        .map_err(|e| IngestError::Docx(format!("{DOCX_BODY}: {e}")))?;

    let mut xml = String::new();
    body.read_to_string(&mut xml)?;

    let paragraphs = docx_paragraphs(&xml)?;
    let kept: Vec<String> = paragraphs.into_iter().filter(|p| !p.trim().is_empty()).collect();
    tracing::debug!(path = %path.display(), paragraphs = kept.len(), "Extracted DOCX text");
    Ok(kept.join("\n"))
}

/// Paragraph texts of a WordprocessingML body, in document order.
///
/// Runs are concatenated; `<w:tab/>` becomes a tab and `<w:br/>`/`<w:cr/>` a
/// line break.
pub fn docx_paragraphs(xml: &str) -> Result<Vec<String>> {
    let paragraph_re = Regex::new(r"(?s)<w:p(?:\s[^>]*)?>(.*?)</w:p>")?;
    let run_re = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab\s*/>|<w:(?:br|cr)(?:\s[^>]*)?/>")?;

    let paragraphs = paragraph_re
        .captures_iter(xml)
        .map(|para| {
            let inner = para.get(1).map_or("", |m| m.as_str());
            let mut text = String::new();
            for run in run_re.captures_iter(inner) {
                match run.get(1) {
                    Some(t) => text.push_str(&decode_xml_entities(t.as_str())),
                    None if run[0].starts_with("<w:tab") => text.push('\t'),
                    None => text.push('\n'),
                }
            }
            text
        })
        .collect();
    Ok(paragraphs)
}

fn decode_xml_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// PDF (OCR)
// ============================================================================

/// Number of pages in a PDF, read with `lopdf`.
pub fn pdf_page_count(path: &Path) -> Result<usize> {
    let document = lopdf::Document::load(path).map_err(|e| IngestError::PdfParse(e.to_string()))?;
    Ok(document.get_pages().len())
}

pub async fn extract_pdf(path: &Path, ocr: &OcrOptions) -> Result<String> {
    let owned = path.to_path_buf();
    let page_count = tokio::task::spawn_blocking(move || pdf_page_count(&owned))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e)))??;

    let scratch = tempfile::TempDir::new()?;
    let images = render_pages(path, scratch.path(), ocr).await?;
    if images.len() != page_count {
        tracing::warn!(
            path = %path.display(),
            expected = page_count,
            rendered = images.len(),
            "Rendered page count differs from PDF page tree"
        );
    }

    let mut text = String::new();
    for (index, image) in images.iter().enumerate() {
        let page_text = ocr_image(image, index + 1, ocr).await?;
        text.push_str(&page_text);
        text.push('\n');
    }

    tracing::info!(
        path = %path.display(),
        pages = images.len(),
        chars = text.chars().count(),
        "OCR extraction complete"
    );
    Ok(text)
}

async fn render_pages(pdf: &Path, out_dir: &Path, ocr: &OcrOptions) -> Result<Vec<PathBuf>> {
    let prefix = out_dir.join("page");
    let output = Command::new(&ocr.pdftoppm_cmd)
        .arg("-r")
        .arg(ocr.dpi.to_string())
        .arg("-png")
        .arg(pdf)
        .arg(&prefix)
        .output()
        .await
        .map_err(|source| IngestError::ToolLaunch {
            tool: ocr.pdftoppm_cmd.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(IngestError::RenderFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let mut pages: Vec<(usize, PathBuf)> = std::fs::read_dir(out_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| page_number(&path).map(|n| (n, path)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// Page number of a `pdftoppm` output file (`page-7.png`, `page-007.png`).
fn page_number(path: &Path) -> Option<usize> {
    if path.extension().and_then(|e| e.to_str()) != Some("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-')?.1.parse().ok()
}

async fn ocr_image(image: &Path, page: usize, ocr: &OcrOptions) -> Result<String> {
    let output = Command::new(&ocr.tesseract_cmd)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(&ocr.language)
        .arg("--dpi")
        .arg(ocr.dpi.to_string())
        .output()
        .await
        .map_err(|source| IngestError::ToolLaunch {
            tool: ocr.tesseract_cmd.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(IngestError::OcrFailed {
            page,
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(DocumentKind::from_path(Path::new("a/Приём.PDF")).unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("rules.docx")).unwrap(), DocumentKind::Docx);
        assert!(matches!(
            DocumentKind::from_path(Path::new("notes.txt")),
            Err(IngestError::UnsupportedFormat(_))
        ));
        assert!(DocumentKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_docx_paragraphs_join_runs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>Правила</w:t></w:r><w:r><w:t xml:space="preserve"> приёма</w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let paragraphs = docx_paragraphs(xml).unwrap();
        assert_eq!(paragraphs, vec!["Правила приёма", "a\tb\nc"]);
    }

    #[test]
    fn test_docx_paragraph_properties_not_mistaken_for_paragraphs() {
        let xml = "<w:p><w:pPr><w:pStyle w:val=\"Title\"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>";
        assert_eq!(docx_paragraphs(xml).unwrap(), vec!["Title"]);
    }

    #[test]
    fn test_decode_xml_entities() {
        assert_eq!(decode_xml_entities("a &lt;b&gt; &amp; &quot;c&quot;"), "a <b> & \"c\"");
        assert_eq!(decode_xml_entities("&#1046;&#x416;"), "ЖЖ");
        assert_eq!(decode_xml_entities("AT&T &unknown;"), "AT&T &unknown;");
    }

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number(Path::new("/tmp/x/page-007.png")), Some(7));
        assert_eq!(page_number(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/page-1.ppm")), None);
    }

    #[test]
    fn test_pdf_page_count_rejects_non_pdf() {
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a pdf").unwrap();
        assert!(matches!(pdf_page_count(file.path()), Err(IngestError::PdfParse(_))));
    }
}
