use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use lopdf::{Document, Object};
use pdf_extract::PlainTextOutput;
use tracing::debug;

/// Characters of a page range handed to the summarizer.
pub const SUMMARY_INPUT_CHARS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to parse PDF: {0}")]
    ExtractionFailed(String),
}

/// Plain text pulled out of a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPdf {
    pub text: String,
    /// Always at least 1.
    pub page_count: u32,
    pub info: BTreeMap<String, String>,
}

/// Extract the text, page count and info dictionary of a PDF.
///
/// The text comes back as one blob with no page boundaries. The document is
/// parsed once and shared by the text pass and the page-tree lookup.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedPdf, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::ExtractionFailed("empty file".into()));
    }

    // The parser panics on some malformed inputs.
    panic::catch_unwind(AssertUnwindSafe(|| parse_document(bytes)))
        .map_err(|_| ExtractError::ExtractionFailed("parser panicked".into()))?
}

fn parse_document(bytes: &[u8]) -> Result<ExtractedPdf, ExtractError> {
    let mut doc =
        Document::load_mem(bytes).map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
    }

    let mut text = String::new();
    {
        let mut output = PlainTextOutput::new(&mut text);
        pdf_extract::output_doc(&doc, &mut output)
            .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
    }

    let pages = u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX);
    debug!(pages, chars = text.len(), "extracted PDF text");
    Ok(ExtractedPdf {
        text,
        page_count: pages.max(1),
        info: document_info(&doc),
    })
}

/// String entries of the trailer's /Info dictionary.
fn document_info(doc: &Document) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    let Ok(entry) = doc.trailer.get(b"Info") else {
        return info;
    };
    let dict = match entry {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    };
    let Some(dict) = dict else {
        return info;
    };

    for (key, value) in dict.iter() {
        if let Ok(raw) = value.as_str() {
            let value = decode_pdf_string(raw);
            if !value.is_empty() {
                info.insert(String::from_utf8_lossy(key).into_owned(), value);
            }
        }
    }
    info
}

/// PDF text strings are either UTF-16BE with a BOM or a byte encoding.
fn decode_pdf_string(raw: &[u8]) -> String {
    let decoded = match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    };
    decoded.trim().to_string()
}

/// Book title for an uploaded file name: the first ".pdf" is dropped.
pub fn title_from_filename(file_name: &str) -> String {
    file_name.replacen(".pdf", "", 1)
}

/// The slice of `text` assumed to hold pages `page_start..=page_end`.
///
/// Pages are treated as equal-sized runs of characters, which real
/// documents rarely are. Offsets clamp to the text and are swapped when
/// reversed, so out-of-range pages give an empty or partial slice.
pub fn page_chunk(text: &str, total_pages: u32, page_start: i64, page_end: i64) -> &str {
    let len = text.chars().count() as i64;
    let chunk_size = len / i64::from(total_pages.max(1));

    let start = page_start
        .saturating_sub(1)
        .saturating_mul(chunk_size)
        .clamp(0, len);
    let end = page_end.saturating_mul(chunk_size).clamp(0, len);
    let (start, end) = if start > end { (end, start) } else { (start, end) };

    let start = byte_offset(text, start as usize);
    let end = byte_offset(text, end as usize);
    &text[start..end]
}

/// At most the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    &text[..byte_offset(text, max_chars)]
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> String {
        format!("{}{}{}", "a".repeat(100), "b".repeat(100), "c".repeat(100))
    }

    #[test]
    fn test_page_chunk_uniform_division() {
        let text = three_pages();
        assert_eq!(page_chunk(&text, 3, 1, 1), &text[0..100]);
        assert_eq!(page_chunk(&text, 3, 2, 3), &text[100..300]);
        assert_eq!(page_chunk(&text, 3, 2, 2), "b".repeat(100));
    }

    #[test]
    fn test_page_chunk_is_pure() {
        let text = three_pages();
        assert_eq!(page_chunk(&text, 3, 2, 2), page_chunk(&text, 3, 2, 2));
    }

    #[test]
    fn test_page_chunk_out_of_range_never_fails() {
        let text = three_pages();
        assert_eq!(page_chunk(&text, 3, 5, 9), "");
        assert_eq!(page_chunk(&text, 3, 0, 1), &text[0..100]);
        assert_eq!(page_chunk(&text, 3, 3, 1), &text[100..200]);
        assert_eq!(page_chunk(&text, 3, i64::MIN, i64::MAX), text.as_str());
        assert_eq!(page_chunk("", 3, 1, 2), "");
    }

    #[test]
    fn test_page_chunk_zero_pages_is_one_page() {
        let text = three_pages();
        assert_eq!(page_chunk(&text, 0, 1, 1), text.as_str());
    }

    #[test]
    fn test_page_chunk_respects_char_boundaries() {
        let text = "éééééé";
        assert_eq!(page_chunk(text, 3, 2, 2), "éé");
        assert_eq!(truncate_chars(text, 4), "éééé");
        assert_eq!(truncate_chars(text, 100), text);
    }

    #[test]
    fn test_title_from_filename() {
        assert_eq!(title_from_filename("Dune.pdf"), "Dune");
        assert_eq!(title_from_filename("a.pdf.pdf"), "a.pdf");
        assert_eq!(title_from_filename("notes"), "notes");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(matches!(
            extract_pdf(b""),
            Err(ExtractError::ExtractionFailed(_))
        ));
        assert!(matches!(
            extract_pdf(b"this is not a pdf at all"),
            Err(ExtractError::ExtractionFailed(_))
        ));
        assert!(extract_pdf(b"%PDF-1.4\n%%EOF").is_err());
    }

    #[test]
    fn test_extract_reads_page_tree_and_info() {
        let bytes = sample_pdf(&["Page0", "Page1", "Page2"], "Walden");
        let extracted = extract_pdf(&bytes).unwrap();

        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.info["Title"], "Walden");
        assert!(extracted.text.contains("Page0"));
        assert!(extracted.text.contains("Page2"));
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"  Plain Title "), "Plain Title");
        assert_eq!(
            decode_pdf_string(&[0xFE, 0xFF, 0x00, b'H', 0x00, b'i']),
            "Hi"
        );
    }

    /// One Courier line per page plus an /Info dictionary with a title.
    fn sample_pdf(pages: &[&str], title: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Integer(24)]),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
