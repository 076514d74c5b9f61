//! Keyword-context windowing.
//!
//! Every match of [`DISCONTINUATION_PATTERN`] is widened by a fixed number of
//! characters on each side. Windows are produced left to right; a window that
//! would start at or before the end of the previous one is snapped forward to
//! that end and coalesced with it, so no span of text is emitted twice.

use std::sync::LazyLock;

use regex::{Matches, Regex};
use tracing::{debug, trace};

/// Discontinuation verb, then (lazily, within one line) a drug, trial,
/// project, research or development noun.
pub static DISCONTINUATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:discontinue[ds]?|halt(?:ed|s)?|terminate[ds]?|stop(?:ped|s)?|suspend(?:ed|s)?|cancel(?:ed|s)?)\b.*?\b(?:drugs?|trials?|projects?|research|development)",
    )
    .expect("valid regex")
});

/// A contiguous excerpt of the plain text, `[start, end)` in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ContextWindow {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Context sizes for [`extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    /// Characters kept before each match.
    pub before: usize,
    /// Characters kept after each match.
    pub after: usize,
    /// Longest window coalescing may build. `None` lets windows grow freely.
    pub max_len: Option<usize>,
}

impl WindowOptions {
    /// Symmetric context with no length cap.
    pub fn symmetric(span: usize) -> Self {
        Self {
            before: span,
            after: span,
            max_len: None,
        }
    }
}

/// A window whose snapped start is not strictly before its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid window [{start}, {end})")]
pub struct InvalidWindow {
    pub start: usize,
    pub end: usize,
}

/// Snap a candidate `[start, end)` forward past `last_end`.
fn snap(last_end: usize, start: usize, end: usize) -> Result<(usize, usize), InvalidWindow> {
    let start = start.max(last_end);
    if start >= end {
        return Err(InvalidWindow { start, end });
    }
    Ok((start, end))
}

/// Lazily extract context windows from `text`.
///
/// Re-invoking with the same text and options yields the same sequence.
pub fn extract(text: &str, opts: WindowOptions) -> Windows<'_> {
    Windows {
        text,
        index: CharIndex::new(text),
        matches: DISCONTINUATION_PATTERN.find_iter(text),
        opts,
        pending: None,
    }
}

/// Iterator returned by [`extract`].
pub struct Windows<'a> {
    text: &'a str,
    index: CharIndex,
    matches: Matches<'static, 'a>,
    opts: WindowOptions,
    /// Window being grown, `[start, end)` in characters.
    pending: Option<(usize, usize)>,
}

impl Windows<'_> {
    fn window(&self, (start, end): (usize, usize)) -> ContextWindow {
        let text = &self.text[self.index.byte_of(start)..self.index.byte_of(end)];
        ContextWindow {
            start,
            end,
            text: text.to_string(),
        }
    }
}

impl Iterator for Windows<'_> {
    type Item = ContextWindow;

    fn next(&mut self) -> Option<ContextWindow> {
        loop {
            let Some(m) = self.matches.next() else {
                let last = self.pending.take()?;
                return Some(self.window(last));
            };

            let m_start = self.index.char_of(m.start());
            let m_end = self.index.char_of(m.end());
            let start = m_start.saturating_sub(self.opts.before);
            let end = (m_end + self.opts.after).min(self.index.char_len());
            trace!(m_start, m_end, start, end, "keyword match");

            let Some((pending_start, pending_end)) = self.pending else {
                self.pending = Some(snap(0, start, end).unwrap_or((start, end)));
                continue;
            };

            if start > pending_end {
                let done = (pending_start, pending_end);
                self.pending = Some((start, end));
                return Some(self.window(done));
            }

            let (snapped_start, snapped_end) = match snap(pending_end, start, end) {
                Ok(span) => span,
                Err(invalid) => {
                    debug!(%invalid, "dropping window already covered by its predecessor");
                    continue;
                }
            };

            let too_long = self
                .opts
                .max_len
                .is_some_and(|max| snapped_end - pending_start > max);
            if too_long {
                let done = (pending_start, pending_end);
                self.pending = Some((snapped_start, snapped_end));
                return Some(self.window(done));
            }

            self.pending = Some((pending_start, snapped_end));
        }
    }
}

/// Maps between character offsets and byte offsets of one text.
struct CharIndex {
    /// Byte offset of every char boundary, including the end of the text.
    /// Empty when the text is ASCII and the two offsets coincide.
    boundaries: Vec<usize>,
    byte_len: usize,
}

impl CharIndex {
    fn new(text: &str) -> Self {
        let boundaries = if text.is_ascii() {
            Vec::new()
        } else {
            text.char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect()
        };
        Self {
            boundaries,
            byte_len: text.len(),
        }
    }

    fn char_len(&self) -> usize {
        if self.boundaries.is_empty() {
            self.byte_len
        } else {
            self.boundaries.len() - 1
        }
    }

    /// Character offset of a byte offset that lies on a char boundary.
    fn char_of(&self, byte: usize) -> usize {
        if self.boundaries.is_empty() {
            return byte;
        }
        self.boundaries
            .binary_search(&byte)
            .unwrap_or_else(|insert_at| insert_at)
    }

    fn byte_of(&self, char_offset: usize) -> usize {
        if self.boundaries.is_empty() {
            char_offset
        } else {
            self.boundaries[char_offset]
        }
    }
}
