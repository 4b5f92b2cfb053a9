//! Plain-text extraction from HTML
//!
//! Non-content subtrees (scripts, styles, embedded frames, vector graphics)
//! are skipped, whitespace is collapsed, and the result is capped.

use ego_tree::iter::Edge;
use scraper::{ElementRef, Html, Node};

/// Elements whose text never reaches the extracted content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "iframe", "svg"];

/// Elements that start a new run of text; inline elements join their neighbours
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td", "th",
    "tr", "ul",
];

/// Text extracted from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Document title, or the fallback when the page has none
    pub title: String,
    /// Whitespace-collapsed body text
    pub text: String,
}

/// Extract the title and visible body text of an HTML document
///
/// `fallback_title` is used when the document head has no non-blank
/// `<title>`. The text is truncated to `max_chars` characters without any
/// marker.
#[must_use]
pub fn extract_page(html: &str, fallback_title: &str, max_chars: usize) -> ExtractedPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = child_element(root, "head")
        .and_then(|head| child_element(head, "title"))
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    let body = child_element(root, "body").unwrap_or(root);
    let text = truncate_chars(collapse_whitespace(&visible_text(body)), max_chars);

    ExtractedPage { title, text }
}

/// Concatenate text nodes, separating block-level elements with a space
fn visible_text(root: ElementRef<'_>) -> String {
    let mut raw = String::new();
    let mut skip_depth = 0_usize;

    for edge in root.traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => skip_depth += 1,
                Node::Element(el) if skip_depth == 0 && BLOCK_ELEMENTS.contains(&el.name()) => {
                    raw.push(' ');
                }
                Node::Text(text) if skip_depth == 0 => raw.push_str(text),
                _ => {}
            },
            Edge::Close(node) => match node.value() {
                Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => {
                    skip_depth = skip_depth.saturating_sub(1);
                }
                Node::Element(el) if skip_depth == 0 && BLOCK_ELEMENTS.contains(&el.name()) => {
                    raw.push(' ');
                }
                _ => {}
            },
        }
    }

    raw
}

fn child_element<'a>(parent: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    parent.child_elements().find(|el| el.value().name() == name)
}

/// Collapse every whitespace run to a single space and trim the ends
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}
