use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::{DocType, DocumentError, ParsedDocument, Section};

const PAGE_BREAK: char = '\u{c}';
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Extracts text from an uploaded file. The extension decides the parser.
///
/// CPU-bound; async callers should run it on the blocking pool.
pub fn parse_document(filename: &str, data: &[u8]) -> Result<ParsedDocument, DocumentError> {
    let doc_type = DocType::from_filename(filename)?;

    let sections = match doc_type {
        DocType::Pdf => parse_pdf(filename, data)?,
        DocType::Docx => parse_docx(filename, data)?,
        DocType::Pptx => parse_pptx(filename, data)?,
        DocType::Txt => parse_txt(data),
    };

    let sections: Vec<Section> = sections
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    if sections.is_empty() {
        return Err(DocumentError::NoText(filename.to_string()));
    }

    debug!(
        "Parsed {} ({}) into {} sections",
        filename,
        doc_type.as_str(),
        sections.len()
    );

    Ok(ParsedDocument { doc_type, sections })
}

/// One section per page; pdf-extract separates pages with form feeds.
fn parse_pdf(filename: &str, data: &[u8]) -> Result<Vec<Section>, DocumentError> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| DocumentError::parse(filename, e))?;

    Ok(split_pages(&text))
}

fn split_pages(text: &str) -> Vec<Section> {
    text.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, page)| Section {
            text: normalize_lines(&page.replace('\0', "")),
            page_number: Some(i as i32 + 1),
            slide_number: None,
        })
        .collect()
}

/// Paragraph text first, then each table row with its cells joined by ` | `.
fn parse_docx(filename: &str, data: &[u8]) -> Result<Vec<Section>, DocumentError> {
    let docx = docx_rs::read_docx(data).map_err(|e| DocumentError::parse(filename, e))?;

    let mut paragraphs = Vec::new();
    let mut table_rows = Vec::new();

    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                let text = paragraph_text(p);
                if !text.trim().is_empty() {
                    paragraphs.push(text.trim().to_string());
                }
            }
            docx_rs::DocumentChild::Table(table) => {
                for docx_rs::TableChild::TableRow(row) in &table.rows {
                    let cells: Vec<String> = row
                        .cells
                        .iter()
                        .map(|docx_rs::TableRowChild::TableCell(cell)| cell_text(cell))
                        .filter(|t| !t.is_empty())
                        .collect();
                    if !cells.is_empty() {
                        table_rows.push(cells.join(" | "));
                    }
                }
            }
            _ => {}
        }
    }

    paragraphs.extend(table_rows);
    Ok(vec![Section {
        text: paragraphs.join("\n\n"),
        page_number: None,
        slide_number: None,
    }])
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for rc in &run.children {
                match rc {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

fn cell_text(cell: &docx_rs::TableCell) -> String {
    cell.children
        .iter()
        .filter_map(|c| match c {
            docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
            _ => None,
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One section per slide, speaker notes appended as `Speaker Notes: ...`.
fn parse_pptx(filename: &str, data: &[u8]) -> Result<Vec<Section>, DocumentError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| DocumentError::parse(filename, e))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name, "ppt/slides/slide").map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(n, _)| *n);

    let mut sections = Vec::with_capacity(slides.len());
    for (position, (file_number, name)) in slides.into_iter().enumerate() {
        let xml = read_archive_entry(&mut archive, &name)
            .map_err(|e| DocumentError::parse(filename, e))?;
        let mut parts = Vec::new();
        let slide_text = extract_drawing_text(&xml);
        if !slide_text.is_empty() {
            parts.push(slide_text);
        }

        let notes_name = format!("ppt/notesSlides/notesSlide{file_number}.xml");
        if let Ok(notes_xml) = read_archive_entry(&mut archive, &notes_name) {
            let notes = extract_drawing_text(&notes_xml);
            if !notes.is_empty() {
                parts.push(format!("Speaker Notes: {notes}"));
            }
        }

        sections.push(Section {
            text: parts.join("\n\n"),
            page_number: None,
            slide_number: Some(position as i32 + 1),
        });
    }

    Ok(sections)
}

fn slide_number(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?
        .strip_suffix(".xml")?
        .parse::<u32>()
        .ok()
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, std::io::Error> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Collects `<a:t>` runs; each `<a:p>` becomes a line.
fn extract_drawing_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    if !current.is_empty() && !current.ends_with(' ') {
                        current.push(' ');
                    }
                    current.push_str(text.trim());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        lines.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }

    lines.join("\n")
}

/// UTF-8 with an optional BOM; anything else is read as Latin-1.
fn parse_txt(data: &[u8]) -> Vec<Section> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let text = match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    };
    vec![Section {
        text,
        page_number: None,
        slide_number: None,
    }]
}

fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_pptx(slides: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (i, (body, notes)) in slides.iter().enumerate() {
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
                .unwrap();
            write!(
                zip,
                r#"<p:sld xmlns:a="a" xmlns:p="p"><p:txBody><a:p><a:r><a:t>{body}</a:t></a:r></a:p></p:txBody></p:sld>"#
            )
            .unwrap();
            if let Some(notes) = notes {
                zip.start_file(format!("ppt/notesSlides/notesSlide{}.xml", i + 1), options)
                    .unwrap();
                write!(
                    zip,
                    r#"<p:notes xmlns:a="a" xmlns:p="p"><a:p><a:r><a:t>{notes}</a:t></a:r></a:p></p:notes>"#
                )
                .unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_txt_strips_bom() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice("Praise effort, not outcome.".as_bytes());
        let doc = parse_document("tips.txt", &data).unwrap();
        assert_eq!(doc.doc_type, DocType::Txt);
        assert_eq!(doc.sections[0].text, "Praise effort, not outcome.");
    }

    #[test]
    fn test_txt_falls_back_to_latin1() {
        let data = b"Caf\xe9 routines help";
        let doc = parse_document("notes.txt", data).unwrap();
        assert_eq!(doc.sections[0].text, "Café routines help");
    }

    #[test]
    fn test_blank_txt_is_no_text() {
        match parse_document("empty.txt", b"   \n  ") {
            Err(DocumentError::NoText(name)) => assert_eq!(name, "empty.txt"),
            other => panic!("expected NoText, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            parse_document("sheet.xlsx", b"data"),
            Err(DocumentError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_pdf_pages_split_on_form_feed() {
        let sections = split_pages("Page one text\n\u{c}  Page two\n\n text \u{c}");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].page_number, Some(1));
        assert_eq!(sections[1].text, "Page two\ntext");
        assert_eq!(sections[1].page_number, Some(2));
        assert!(sections[2].text.is_empty());
    }

    #[test]
    fn test_corrupt_pdf_is_parse_error() {
        assert!(matches!(
            parse_document("broken.pdf", b"not a pdf"),
            Err(DocumentError::Parse { .. })
        ));
    }

    #[test]
    fn test_pptx_slides_and_speaker_notes() {
        let data = build_pptx(&[
            ("Bedtime routine", Some("Keep lights dim")),
            ("Reward charts", None),
        ]);
        let doc = parse_document("deck.pptx", &data).unwrap();
        assert_eq!(doc.doc_type, DocType::Pptx);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(
            doc.sections[0].text,
            "Bedtime routine\n\nSpeaker Notes: Keep lights dim"
        );
        assert_eq!(doc.sections[0].slide_number, Some(1));
        assert_eq!(doc.sections[1].text, "Reward charts");
        assert_eq!(doc.sections[1].slide_number, Some(2));
    }

    #[test]
    fn test_docx_paragraphs_then_tables() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let cell = |t: &str| TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(t)));
        let mut buf = Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Use a visual schedule.")))
            .add_table(Table::new(vec![TableRow::new(vec![cell("Morning"), cell("Brush teeth")])]))
            .build()
            .pack(&mut buf)
            .unwrap();

        let doc = parse_document("plan.docx", buf.get_ref()).unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(
            doc.sections[0].text,
            "Use a visual schedule.\n\nMorning | Brush teeth"
        );
    }

    #[test]
    fn test_drawing_text_joins_runs_per_paragraph() {
        let xml = r#"<r xmlns:a="a"><a:p><a:r><a:t>Calm</a:t></a:r><a:r><a:t>voice</a:t></a:r></a:p><a:p><a:r><a:t>Short steps</a:t></a:r></a:p></r>"#;
        assert_eq!(extract_drawing_text(xml), "Calm voice\nShort steps");
    }
}
