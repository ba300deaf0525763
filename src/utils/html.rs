// src/utils/html.rs

//! HTML fragment to plain text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

/// Output length used when the caller passes `0`.
pub const DEFAULT_MAX_LEN: usize = 2048;

/// Space left in front of punctuation by tag stripping, e.g. `word <b>!</b>`.
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ([!?,.;:])").expect("valid punctuation pattern"));

/// Reduce an HTML fragment to whitespace-collapsed text of at most `max_len`
/// characters (`0` selects [`DEFAULT_MAX_LEN`]).
///
/// `script` and `style` contents are dropped. Text joined across an inline
/// element is concatenated as-is; a block element boundary becomes one space.
///
/// # Examples
/// ```
/// use courier::utils::html::clean;
///
/// assert_eq!(
///     clean("<p>Hello <strong>world</strong>!<script>bad()</script></p>", 2048),
///     "Hello world!"
/// );
/// ```
pub fn clean(fragment: &str, max_len: usize) -> String {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let max_len = if max_len == 0 { DEFAULT_MAX_LEN } else { max_len };

    let document = Html::parse_fragment(trimmed);
    let mut writer = TextWriter::default();
    writer.walk(document.root_element());

    let text = SPACE_BEFORE_PUNCT.replace_all(writer.out.trim(), "$1");
    truncate(&text, max_len)
}

#[derive(Default)]
struct TextWriter {
    out: String,
    pending_space: bool,
}

impl TextWriter {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(el) => {
                    let name = el.name();
                    if matches!(name, "script" | "style") {
                        continue;
                    }
                    let block = is_block_element(name);
                    if block {
                        self.pending_space = true;
                    }
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.walk(child_el);
                    }
                    if block {
                        self.pending_space = true;
                    }
                }
                _ => {}
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        let mut words = text.split_whitespace().peekable();
        if words.peek().is_none() {
            if !text.is_empty() {
                self.pending_space = true;
            }
            return;
        }

        let leading = text.starts_with(char::is_whitespace);
        if (self.pending_space || leading) && !self.out.is_empty() {
            self.out.push(' ');
        }
        for (i, word) in words.enumerate() {
            if i > 0 {
                self.out.push(' ');
            }
            self.out.push_str(word);
        }
        self.pending_space = text.ends_with(char::is_whitespace);
    }
}

fn is_block_element(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "br"
            | "div"
            | "dl"
            | "dt"
            | "dd"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "tbody"
            | "td"
            | "tfoot"
            | "th"
            | "thead"
            | "tr"
            | "ul"
    )
}

/// Cut to `max_len` chars, trimming the tail unless that would empty it.
fn truncate(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => {
            let slice = &text[..cut];
            let trimmed = slice.trim_end();
            if trimmed.is_empty() {
                slice.to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}
