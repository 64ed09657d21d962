//! Plain-text rendering of conversation content for enrichment.

use crate::defaults::ENRICH_MAX_INPUT_CHARS;
use crate::models::ContentMessage;

/// True when no message carries any visible text.
pub fn is_blank(content: &[ContentMessage]) -> bool {
    content.iter().all(|m| m.text.trim().is_empty())
}

/// Render messages as `author: text` lines with whitespace collapsed.
///
/// Blank messages are skipped.
pub fn normalize_content(content: &[ContentMessage]) -> String {
    content
        .iter()
        .filter_map(|m| {
            let text = m.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            let author = m.author.trim();
            Some(if author.is_empty() {
                text
            } else {
                format!("{}: {}", author, text)
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Provider input: title followed by normalized content, capped in length.
pub fn enrichment_input(title: &str, content: &[ContentMessage]) -> String {
    let text = format!("{}\n\n{}", title.trim(), normalize_content(content));
    truncate_chars(&text, ENRICH_MAX_INPUT_CHARS)
}

const TITLE_MAX_CHARS: usize = 80;

/// First line shortened to a title, with `...` when cut.
pub fn shorten_title(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= TITLE_MAX_CHARS {
        return line.to_string();
    }
    format!("{}...", truncate_chars(line, TITLE_MAX_CHARS).trim_end())
}

/// Title for untitled content: the first non-blank line of the first
/// message that has one. `None` when the content is blank.
pub fn derive_title(content: &[ContentMessage]) -> Option<String> {
    content
        .iter()
        .find_map(|m| m.text.lines().find(|l| !l.trim().is_empty()))
        .map(shorten_title)
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content() {
        let content = vec![
            ContentMessage::new("Ana", "  deploy\n\n freeze  "),
            ContentMessage::new("Bo", "   "),
            ContentMessage::new("", "ack"),
        ];
        assert_eq!(normalize_content(&content), "Ana: deploy freeze\nack");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&[]));
        assert!(is_blank(&[ContentMessage::new("a", " \n")]));
        assert!(!is_blank(&[ContentMessage::new("a", "x")]));
    }

    #[test]
    fn test_enrichment_input_prefixes_title() {
        let content = vec![ContentMessage::new("X", "Y")];
        assert_eq!(enrichment_input("T", &content), "T\n\nX: Y");
    }

    #[test]
    fn test_derive_title_skips_blank_messages() {
        let content = vec![
            ContentMessage::new("a", "  \n"),
            ContentMessage::new("b", "\n  Rollback plan for friday \nsecond line"),
        ];
        assert_eq!(derive_title(&content).as_deref(), Some("Rollback plan for friday"));
        assert_eq!(derive_title(&[ContentMessage::new("a", " ")]), None);
    }

    #[test]
    fn test_shorten_title() {
        let long = "x".repeat(120);
        let title = shorten_title(&long);
        assert_eq!(title.chars().count(), 83);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
