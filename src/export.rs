//! PDF document export.
//!
//! Converts a finished documentation blob into a paginated text PDF on disk
//! and hands the path back to the HTTP layer, which serves the file as a
//! binary download. Naming and directory policy live here; callers only see
//! the returned path.

use anyhow::{bail, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::PathBuf;

use crate::config::ExportConfig;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 54;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 14;
const MAX_LINE_CHARS: usize = 92;
const LINES_PER_PAGE: usize = 52;

/// Write `text` as a PDF into the export directory and return its path.
///
/// Empty or whitespace-only input is refused before any file I/O.
pub fn write_pdf(config: &ExportConfig, text: &str) -> Result<PathBuf> {
    if text.trim().is_empty() {
        bail!("no documentation provided");
    }

    std::fs::create_dir_all(&config.dir)?;
    let path = config
        .dir
        .join(format!("docs-{}.pdf", uuid::Uuid::new_v4()));

    let lines = layout_lines(text);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_lines in lines.chunks(LINES_PER_PAGE) {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
        ];
        for line in page_lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(&path)?;

    Ok(path)
}

/// Flatten the text into printable, wrapped lines.
///
/// Helvetica with the default encoding only covers Latin-1, so anything
/// outside printable ASCII is replaced rather than emitted raw.
fn layout_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let sanitized: String = raw
            .chars()
            .map(|c| {
                if c == '\t' {
                    ' '
                } else if (' '..='~').contains(&c) {
                    c
                } else {
                    '?'
                }
            })
            .collect();

        if sanitized.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut rest = sanitized.as_str();
        while rest.len() > MAX_LINE_CHARS {
            // Break at the last space inside the limit when there is one.
            let cut = rest[..MAX_LINE_CHARS]
                .rfind(' ')
                .filter(|&i| i > 0)
                .unwrap_or(MAX_LINE_CHARS);
            lines.push(rest[..cut].to_string());
            rest = rest[cut..].trim_start();
        }
        lines.push(rest.to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export_config(dir: &std::path::Path) -> ExportConfig {
        ExportConfig {
            dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn empty_input_is_refused_before_any_io() {
        let tmp = tempfile::tempdir().unwrap();
        let config = export_config(&tmp.path().join("never-created"));

        assert!(write_pdf(&config, "").is_err());
        assert!(write_pdf(&config, "   \n\t ").is_err());
        // The export directory was not even created.
        assert!(!config.dir.exists());
    }

    #[test]
    fn writes_a_loadable_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let config = export_config(tmp.path());

        let path = write_pdf(&config, "# Title\n\nSome documentation body.").unwrap();
        assert!(path.exists());

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_text_paginates() {
        let tmp = tempfile::tempdir().unwrap();
        let config = export_config(tmp.path());

        let text = "line of documentation\n".repeat(LINES_PER_PAGE * 2 + 5);
        let path = write_pdf(&config, &text).unwrap();

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn wraps_long_lines_at_spaces() {
        let long = "word ".repeat(40);
        let lines = layout_lines(&long);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_CHARS));
    }

    #[test]
    fn non_ascii_is_replaced_not_dropped() {
        let lines = layout_lines("naïve café");
        assert_eq!(lines, vec!["na?ve caf?".to_string()]);
    }
}
