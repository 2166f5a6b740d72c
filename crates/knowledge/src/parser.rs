//! Text extraction for learned sources.
//!
//! Markdown and HTML are reduced to their prose, PDFs to the text of their
//! pages. Anything else must decode as UTF-8 without NUL bytes.

use crag_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    Pdf,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("pdf") => Self::Pdf,
            Some("txt") | Some("text") | Some("rst") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Classify a fetched page by its `Content-Type` header, falling back to
    /// the URL's extension.
    pub fn from_response(content_type: Option<&str>, url: &str) -> Self {
        let mime = content_type
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some("text/html") | Some("application/xhtml+xml") => Self::Html,
            Some("application/pdf") => Self::Pdf,
            Some("text/markdown") => Self::Markdown,
            _ => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                match Self::from_path(Path::new(path)) {
                    Self::Unknown if mime.as_deref() == Some("text/plain") => Self::PlainText,
                    other => other,
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// Read a file and extract its text.
pub fn parse_file(path: &Path) -> AppResult<(String, ContentType)> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;
    let content_type = ContentType::from_path(path);
    let text = extract_text(&bytes, content_type, &path.to_string_lossy())?;
    Ok((text, content_type))
}

/// Extract text from raw source bytes; `label` names the source in errors.
pub fn extract_text(bytes: &[u8], content_type: ContentType, label: &str) -> AppResult<String> {
    if content_type == ContentType::Pdf {
        return extract_pdf(bytes, label);
    }

    let raw = std::str::from_utf8(bytes)
        .map_err(|_| AppError::Knowledge(format!("Not UTF-8 text: {}", label)))?;

    match content_type {
        ContentType::Markdown => Ok(clean_markdown(raw)),
        ContentType::Html => Ok(clean_html(raw)),
        _ if is_likely_text(raw) => Ok(raw.to_string()),
        _ => Err(AppError::Knowledge(format!(
            "Binary file not supported: {}",
            label
        ))),
    }
}

fn extract_pdf(bytes: &[u8], label: &str) -> AppResult<String> {
    // pdf-extract panics on some malformed files
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| AppError::Knowledge(format!("Malformed PDF: {}", label)))?
        .map_err(|e| AppError::Knowledge(format!("Failed to read PDF {}: {}", label, e)))?;

    let text = extracted
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return Err(AppError::Knowledge(format!("PDF has no text layer: {}", label)));
    }
    Ok(text)
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        // Horizontal rules and code fences
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Clean HTML by stripping tags, scripts and styles.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;

            let rest = &text[i..];
            if starts_with_ignore_case(rest, "<script") {
                in_script = true;
            } else if starts_with_ignore_case(rest, "</script") {
                in_script = false;
            } else if starts_with_ignore_case(rest, "<style") {
                in_style = true;
            } else if starts_with_ignore_case(rest, "</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// Check if text is likely UTF-8 text (not binary).
fn is_likely_text(data: &str) -> bool {
    !data.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("file.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("page.HTML")),
            ContentType::Html
        );
        assert_eq!(
            ContentType::from_path(Path::new("file.txt")),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::from_path(Path::new("paper.PDF")),
            ContentType::Pdf
        );
        assert_eq!(
            ContentType::from_path(Path::new("Makefile")),
            ContentType::Unknown
        );
    }

    #[test]
    fn test_content_type_from_response() {
        assert_eq!(
            ContentType::from_response(Some("text/html; charset=utf-8"), "https://a.example/post"),
            ContentType::Html
        );
        assert_eq!(
            ContentType::from_response(Some("application/pdf"), "https://a.example/download"),
            ContentType::Pdf
        );
        assert_eq!(
            ContentType::from_response(None, "https://a.example/paper.pdf?v=2"),
            ContentType::Pdf
        );
        assert_eq!(
            ContentType::from_response(Some("text/plain"), "https://a.example/notes"),
            ContentType::PlainText
        );
    }

    /// A one-page PDF showing `text` in a standard font.
    fn pdf_with_text(text: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_pdf_text_is_extracted() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("agents.pdf");
        std::fs::write(&path, pdf_with_text("Agents plan with memory")).unwrap();

        let (text, content_type) = parse_file(&path).unwrap();
        assert_eq!(content_type, ContentType::Pdf);
        assert!(text.contains("Agents plan with memory"), "got {:?}", text);
    }

    #[test]
    fn test_malformed_pdf_is_an_error() {
        let err = extract_text(b"%PDF-1.5 truncated", ContentType::Pdf, "broken.pdf").unwrap_err();
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[test]
    fn test_extract_text_from_fetched_html() {
        let page = b"<html><head><style>p{}</style></head><body><p>Task decomposition</p></body></html>";
        assert_eq!(
            extract_text(page, ContentType::Html, "https://a.example").unwrap(),
            "Task decomposition"
        );
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Header\n\nSome text\n\n```rust\ncode\n```\n\nMore text";
        let output = clean_markdown(input);
        assert!(output.contains("Header"));
        assert!(output.contains("Some text"));
        assert!(output.contains("More text"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(clean_html(input), "Hello world");
    }

    #[test]
    fn test_clean_html_drops_scripts_and_handles_utf8() {
        let input = "<p>Café</p><SCRIPT>var x = 1;</SCRIPT><p>naïve</p>";
        assert_eq!(clean_html(input), "Café naïve");
    }

    #[test]
    fn test_binary_rejected() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "abc\0def").unwrap();
        assert!(parse_file(temp.path()).is_err());
    }
}
