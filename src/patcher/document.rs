//! In-memory task definition with a naive tag scanner.
//!
//! This is not an XML parser. It finds `<Tag>` / `<Tag attr="..">` openers
//! by name and the first `</Tag>` after them, which is all the flat,
//! tool-generated task files need.

use std::ops::Range;

use thiserror::Error;

/// Passes allowed for a substitution whose replacement is not shorter than
/// its needle. Shrinking substitutions always reach a fixed point.
pub const MAX_SUBSTITUTION_PASSES: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("empty search pattern")]
    EmptyNeedle,
    #[error("replacement {replacement:?} contains the pattern {needle:?}")]
    SelfRecreating {
        needle: String,
        replacement: String,
    },
    #[error("no fixed point for {needle:?} after {MAX_SUBSTITUTION_PASSES} passes")]
    PassLimit { needle: String },
}

/// Byte ranges of one element in the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// From `<` of the opening tag to just past `>` of the closing tag.
    pub outer: Range<usize>,
    /// The text between the two tags.
    pub content: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDocument {
    text: String,
}

impl TaskDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Locates the first `tag` element that has a closing tag.
    ///
    /// Self-closing `<Tag/>` elements are skipped. If the first real opener
    /// has no `</Tag>` after it, there is no element.
    pub fn find_element(&self, tag: &str) -> Option<Element> {
        self.find_element_from(tag, 0)
    }

    /// Like `find_element`, starting the scan at byte offset `from`.
    pub fn find_element_from(&self, tag: &str, mut from: usize) -> Option<Element> {
        let opener = format!("<{tag}");
        let closer = format!("</{tag}>");

        while let Some(rel) = self.text[from..].find(&opener) {
            let start = from + rel;
            let name_end = start + opener.len();
            let rest = &self.text[name_end..];

            let content_start = match rest.chars().next() {
                Some('>') => name_end + 1,
                Some(c) if c.is_whitespace() => {
                    let gt = rest.find('>')?;
                    if rest[..gt].ends_with('/') {
                        from = name_end + gt + 1;
                        continue;
                    }
                    name_end + gt + 1
                }
                // <Tag/>, or a longer name sharing our prefix (<UserIdType>).
                _ => {
                    from = name_end;
                    continue;
                }
            };

            let close_rel = self.text[content_start..].find(&closer)?;
            let content_end = content_start + close_rel;
            return Some(Element {
                outer: start..content_end + closer.len(),
                content: content_start..content_end,
            });
        }
        None
    }

    /// Returns the text of the first `tag` element.
    pub fn tag_value(&self, tag: &str) -> Option<&str> {
        self.find_element(tag).map(|e| &self.text[e.content])
    }

    /// Replaces the text of the first `tag` element with `value`.
    ///
    /// `&`, `<` and `>` in `value` are escaped. Returns `false`, leaving the
    /// document untouched, when there is no such element.
    pub fn set_tag(&mut self, tag: &str, value: &str) -> bool {
        let Some(element) = self.find_element(tag) else {
            return false;
        };
        self.text.replace_range(element.content, &escape_text(value));
        true
    }

    /// Clears and then removes the first `tag` element.
    ///
    /// When the element was alone on its line the whole line goes with it.
    pub fn remove_element(&mut self, tag: &str) -> bool {
        let Some(element) = self.find_element(tag) else {
            return false;
        };
        let range = self.line_span(element.outer.clone()).unwrap_or(element.outer);
        self.text.replace_range(range, "");
        true
    }

    /// Removes every `tag` element whose text is empty. Returns the count.
    pub fn remove_empty_elements(&mut self, tag: &str) -> usize {
        let mut removed = 0;
        let mut from = 0;
        while let Some(element) = self.find_element_from(tag, from) {
            if !element.content.is_empty() {
                from = element.outer.end;
                continue;
            }
            let range = self.line_span(element.outer.clone()).unwrap_or(element.outer);
            from = range.start;
            self.text.replace_range(range, "");
            removed += 1;
        }
        removed
    }

    /// Replaces `needle` with `replacement`, left to right, pass after pass,
    /// until no occurrence remains. Returns the number of replacements.
    ///
    /// The document is left unchanged on error.
    pub fn substitute(&mut self, needle: &str, replacement: &str) -> Result<usize, SubstitutionError> {
        if needle.is_empty() {
            return Err(SubstitutionError::EmptyNeedle);
        }
        if replacement.contains(needle) {
            return Err(SubstitutionError::SelfRecreating {
                needle: needle.to_string(),
                replacement: replacement.to_string(),
            });
        }

        let shrinking = replacement.len() < needle.len();
        let mut text = self.text.clone();
        let mut total = 0;
        let mut passes = 0;

        loop {
            let found = text.matches(needle).count();
            if found == 0 {
                break;
            }
            if !shrinking && passes == MAX_SUBSTITUTION_PASSES {
                return Err(SubstitutionError::PassLimit {
                    needle: needle.to_string(),
                });
            }
            text = text.replace(needle, replacement);
            total += found;
            passes += 1;
        }

        self.text = text;
        Ok(total)
    }

    /// Widens `range` to its full line if only whitespace surrounds it.
    fn line_span(&self, range: Range<usize>) -> Option<Range<usize>> {
        let line_start = self.text[..range.start].rfind('\n').map_or(0, |i| i + 1);
        if !self.text[line_start..range.start].trim().is_empty() {
            return None;
        }

        let tail = &self.text[range.end..];
        let line_end = match tail.find('\n') {
            Some(i) => range.end + i + 1,
            None => self.text.len(),
        };
        if !self.text[range.end..line_end].trim().is_empty() {
            return None;
        }
        Some(line_start..line_end)
    }
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
