//! Prompt rendering for classification calls.
//!
//! The rubric is an opaque compiled prompt supplied by the caller; rendering
//! only attaches the document text and, in batched mode, the reply-shape
//! instruction.

use crate::types::document::Document;

/// Title characters included in a prompt.
const TITLE_CAP: usize = 500;

/// Body characters included in a prompt.
const BODY_CAP: usize = 2000;

/// Placeholder for the document title in a caller rubric.
const TITLE_SLOT: &str = "{title}";

/// Placeholder for the document body in a caller rubric.
const BODY_SLOT: &str = "{body}";

/// Render a rubric plus one batch of documents into a single prompt.
///
/// Documents are numbered 1..n and the model is instructed to answer with a
/// JSON array of exactly n objects in the same order.
pub fn render_batch_prompt(rubric: &str, docs: &[Document]) -> String {
    let mut articles = String::new();
    for (i, doc) in docs.iter().enumerate() {
        articles.push_str(&format!(
            "{}. Title: {}\n   Body: {}\n",
            i + 1,
            truncate_chars(&doc.title, TITLE_CAP),
            truncate_chars(&doc.body, BODY_CAP),
        ));
    }

    format!(
        "{}\n\nRespond with a JSON array of exactly {} objects, one per \
         article, in the same order as the articles below. Respond with the \
         JSON array only.\n\nArticles:\n{}",
        rubric.trim(),
        docs.len(),
        articles,
    )
}

/// Render a rubric plus one document into a single prompt.
///
/// If the rubric carries `{title}`/`{body}` placeholders they are
/// substituted in place; otherwise the article is appended as a block.
pub fn render_item_prompt(rubric: &str, doc: &Document) -> String {
    let title = truncate_chars(&doc.title, TITLE_CAP);
    let body = truncate_chars(&doc.body, BODY_CAP);

    if rubric.contains(TITLE_SLOT) || rubric.contains(BODY_SLOT) {
        rubric.replace(TITLE_SLOT, &title).replace(BODY_SLOT, &body)
    } else {
        format!(
            "{}\n\nArticle:\nTitle: {}\nBody: {}",
            rubric.trim(),
            title,
            body,
        )
    }
}

/// Truncate to at most `max` characters on a char boundary, appending an
/// ellipsis when anything was cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_prompt_numbers_articles() {
        let docs = vec![
            Document::new("a", "First", "Body one"),
            Document::new("b", "Second", "Body two"),
        ];
        let prompt = render_batch_prompt("Classify these.", &docs);

        assert!(prompt.starts_with("Classify these."));
        assert!(prompt.contains("exactly 2 objects"));
        assert!(prompt.contains("1. Title: First"));
        assert!(prompt.contains("2. Title: Second"));
    }

    #[test]
    fn test_item_prompt_substitutes_placeholders() {
        let doc = Document::new("a", "Headline", "Text");
        let prompt = render_item_prompt("Rate {title} against {body}.", &doc);
        assert_eq!(prompt, "Rate Headline against Text.");
    }

    #[test]
    fn test_item_prompt_appends_without_placeholders() {
        let doc = Document::new("a", "Headline", "Text");
        let prompt = render_item_prompt("Classify the article.", &doc);
        assert!(prompt.contains("Title: Headline"));
        assert!(prompt.contains("Body: Text"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let text = "한국어 기사 제목입니다";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "한국어 ...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
