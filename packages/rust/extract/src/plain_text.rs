//! Markup stripping: reduce an HTML/iXBRL filing to the text a reader sees.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};
use tracing::debug;

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "ix:header"];

/// Render `raw` as plain text.
///
/// Markup is parsed with `scraper` and every text node outside
/// [`SKIPPED_ELEMENTS`] is concatenated in document order, so entities are
/// decoded and tags vanish without inserting separators. Input that does not
/// look like markup is returned unchanged.
pub fn plain_text(raw: &str) -> String {
    if !looks_like_markup(raw) {
        return raw.to_string();
    }

    let doc = Html::parse_document(raw);
    let mut text = String::with_capacity(raw.len() / 2);

    for node in doc.tree.root().descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(chunk);
        }
    }

    debug!(raw_len = raw.len(), text_len = text.len(), "markup stripped");
    text
}

/// Cheap check for at least one tag-like token.
pub fn looks_like_markup(raw: &str) -> bool {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[A-Za-z!/][^>]*>").expect("valid regex"));
    TAG_RE.is_match(raw)
}
