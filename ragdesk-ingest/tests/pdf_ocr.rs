//! PDF OCR orchestration with stand-in `pdftoppm` / `tesseract` scripts.
//!
//! Kept in its own test binary so no other test forks while the scripts are
//! being written.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object};
use ragdesk_ingest::extractor::{extract_pdf, pdf_page_count, OcrOptions};
use ragdesk_ingest::IngestError;

fn write_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_pdf_ocr_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    let pdf = dir.path().join("приём.pdf");
    write_pdf(&pdf, 2);
    assert_eq!(pdf_page_count(&pdf).unwrap(), 2);

    // Renders two pages regardless of input; the last argument is the prefix.
    let pdftoppm = write_script(
        dir.path(),
        "fake-pdftoppm",
        "for last; do :; done\nprintf x > \"${last}-2.png\"\nprintf x > \"${last}-1.png\"",
    );
    let tesseract = write_script(
        dir.path(),
        "fake-tesseract",
        "case \"$1\" in *-1.png) echo 'Первая страница' ;; *) echo 'Вторая страница' ;; esac",
    );
    let failing_tesseract = write_script(
        dir.path(),
        "failing-tesseract",
        "echo 'Error opening data file rus.traineddata' >&2\nexit 1",
    );

    let ocr = OcrOptions {
        language: "rus".to_string(),
        dpi: 300,
        tesseract_cmd: tesseract.display().to_string(),
        pdftoppm_cmd: pdftoppm.display().to_string(),
    };

    let text = extract_pdf(&pdf, &ocr).await.unwrap();
    assert_eq!(text, "Первая страница\n\nВторая страница\n\n");

    let failing = OcrOptions {
        tesseract_cmd: failing_tesseract.display().to_string(),
        ..ocr.clone()
    };
    match extract_pdf(&pdf, &failing).await {
        Err(IngestError::OcrFailed { page, details }) => {
            assert_eq!(page, 1);
            assert!(details.contains("traineddata"));
        }
        other => panic!("Expected OcrFailed, got: {other:?}"),
    }

    let missing = OcrOptions {
        pdftoppm_cmd: dir.path().join("no-such-tool").display().to_string(),
        ..ocr
    };
    assert!(matches!(
        extract_pdf(&pdf, &missing).await,
        Err(IngestError::ToolLaunch { .. })
    ));
}
