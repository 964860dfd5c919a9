//! End-to-end DOCX preparation on a generated document.

use std::io::Write;
use std::path::Path;

use ragdesk_core::config::IngestConfig;
use ragdesk_ingest::extractor::extract_docx;
use ragdesk_ingest::IngestPipeline;

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    );

    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[test]
fn test_docx_skips_blank_paragraphs() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("rules.docx");
    write_docx(&path, &["Правила приёма", "   ", "", "Сроки &amp; этапы"]);

    let text = extract_docx(&path).unwrap();
    assert_eq!(text, "Правила приёма\nСроки & этапы");
}

#[test]
fn test_docx_without_body_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("empty.docx");
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"nothing").unwrap();
    zip.finish().unwrap();

    assert!(extract_docx(&path).is_err());
}

// Both paths live in one test so no sibling test stages a file mid-count.
#[tokio::test]
async fn test_prepare_upload_chunks_docx_and_cleans_staging() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("Приём.DOCX");
    let paragraphs: Vec<String> = (1..=6)
        .map(|i| format!("Пункт {i}. Документы принимаются до июля, документы подаются лично."))
        .collect();
    let refs: Vec<&str> = paragraphs.iter().map(String::as_str).collect();
    write_docx(&path, &refs);

    let config = IngestConfig {
        chunk_size: 150,
        ..IngestConfig::default()
    };
    let pipeline = IngestPipeline::new(&config).unwrap();

    let staged_before = count_staged();
    let chunks = pipeline.prepare_upload(&path).await.unwrap();

    assert!(chunks.len() >= 3);
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 150);
        assert_eq!(chunk.keywords.first().map(String::as_str), Some("документы"));
        assert!(chunk.keywords.len() <= 5);
    }
    assert_eq!(count_staged(), staged_before, "staged upload must be removed");

    let broken = dir.path().join("broken.docx");
    std::fs::write(&broken, b"not a zip archive").unwrap();
    assert!(pipeline.prepare_upload(&broken).await.is_err());
    assert_eq!(count_staged(), staged_before, "staged upload must be removed on failure");
}

fn count_staged() -> usize {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("ragdesk-upload-"))
                .count()
        })
        .unwrap_or(0)
}
