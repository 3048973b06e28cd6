use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;
use tracing::warn;

const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";
const BASE_REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);
const REGEX_BYTES_PER_TERM_BYTE: usize = 512;
const MAX_REGEX_SIZE_LIMIT: usize = 64 * (1 << 20);

/// Escapes the HTML metacharacters `&`, `<` and `>`.
///
/// The ampersand is replaced first so entities produced for `<` and `>`
/// are not escaped a second time.
pub fn escape_html(unsafe_text: &str) -> String {
    unsafe_text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Number of whitespace-separated tokens in `text`. The byte order mark
/// counts as whitespace.
pub fn word_count(text: &str) -> usize {
    text.split(is_word_separator)
        .filter(|token| !token.is_empty())
        .count()
}

fn is_word_separator(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// Markup that is safe to embed in an HTML document without escaping.
///
/// The only way to obtain one is through [`Highlighter::highlight`], which
/// escapes the source text and inserts nothing but the fixed `<mark>` wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightedHtml(String);

impl HighlightedHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of highlight markers in the markup.
    pub fn marker_count(&self) -> usize {
        self.0.matches(MARK_OPEN).count()
    }
}

impl fmt::Display for HighlightedHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for HighlightedHtml {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A piece of text produced by [`Highlighter::segments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub matched: bool,
}

#[derive(Debug, Clone)]
enum Matcher {
    Nothing,
    Pattern(Regex),
    /// Char-by-char scan, used when the term is too large to compile.
    Literal(Vec<char>),
}

impl Matcher {
    fn ranges(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            Matcher::Nothing => Vec::new(),
            Matcher::Pattern(pattern) => pattern
                .find_iter(text)
                .map(|found| found.range())
                .collect(),
            Matcher::Literal(needle) => literal_ranges(needle, text),
        }
    }
}

fn literal_ranges(needle: &[char], text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < text.len() {
        match match_len_at(needle, &text[start..]) {
            Some(len) => {
                ranges.push(start..start + len);
                start += len;
            }
            None => start += text[start..].chars().next().map_or(1, char::len_utf8),
        }
    }
    ranges
}

fn match_len_at(needle: &[char], hay: &str) -> Option<usize> {
    let mut chars = hay.char_indices();
    for &expected in needle {
        let (_, found) = chars.next()?;
        if !same_ignoring_case(expected, found) {
            return None;
        }
    }
    Some(chars.next().map_or(hay.len(), |(offset, _)| offset))
}

fn same_ignoring_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Case-insensitive literal matcher for a single search term.
#[derive(Debug, Clone)]
pub struct Highlighter {
    matcher: Matcher,
}

impl Highlighter {
    /// Builds a matcher for `term`. An empty term matches nothing.
    pub fn new(term: &str) -> Self {
        if term.is_empty() {
            return Self {
                matcher: Matcher::Nothing,
            };
        }
        let size_limit = term
            .len()
            .saturating_mul(REGEX_BYTES_PER_TERM_BYTE)
            .clamp(BASE_REGEX_SIZE_LIMIT, MAX_REGEX_SIZE_LIMIT);
        let matcher = match RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .size_limit(size_limit)
            .build()
        {
            Ok(pattern) => Matcher::Pattern(pattern),
            Err(err) => {
                warn!(
                    term_len = term.len(),
                    error = %err,
                    "highlight term too large for regex; using literal scan"
                );
                Matcher::Literal(term.chars().collect())
            }
        };
        Self { matcher }
    }

    /// Escapes `raw` and wraps every occurrence of the term in `<mark>`.
    ///
    /// Matching runs against the escaped text, so a term such as `amp`
    /// also hits the entities introduced by escaping.
    pub fn highlight(&self, raw: &str) -> HighlightedHtml {
        let escaped = escape_html(raw);
        let mut out = String::with_capacity(escaped.len() + 16);
        let mut last = 0;
        for found in self.matcher.ranges(&escaped) {
            out.push_str(&escaped[last..found.start]);
            out.push_str(MARK_OPEN);
            out.push_str(&escaped[found.clone()]);
            out.push_str(MARK_CLOSE);
            last = found.end;
        }
        out.push_str(&escaped[last..]);
        HighlightedHtml(out)
    }

    /// Splits unescaped `text` into matched and unmatched runs, for
    /// renderers that emphasise matches without HTML.
    pub fn segments<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut last = 0;
        for found in self.matcher.ranges(text) {
            if found.start > last {
                segments.push(Segment {
                    text: &text[last..found.start],
                    matched: false,
                });
            }
            last = found.end;
            segments.push(Segment {
                text: &text[found],
                matched: true,
            });
        }
        if last < text.len() || segments.is_empty() {
            segments.push(Segment {
                text: &text[last..],
                matched: false,
            });
        }
        segments
    }
}
