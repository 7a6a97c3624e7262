//! Source text preparation shared by the parsers.
//!
//! Both transformations here keep byte offsets stable (replaced bytes become
//! spaces, newlines survive) so line numbers computed on the prepared text
//! point at the original file.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").expect("valid script block pattern")
});

/// Blank everything outside `<script>` block bodies.
pub fn extract_script_blocks(content: &str) -> String {
    let mut keep = vec![false; content.len()];
    for caps in SCRIPT_BLOCK.captures_iter(content) {
        if let Some(body) = caps.get(1) {
            keep[body.range()].iter_mut().for_each(|k| *k = true);
        }
    }
    let bytes: Vec<u8> = content
        .bytes()
        .zip(keep)
        .map(|(b, kept)| if kept || b == b'\n' { b } else { b' ' })
        .collect();
    into_string(bytes)
}

/// A JS/TS source with comments blanked and string literal spans recorded.
#[derive(Debug, Clone)]
pub struct MaskedSource {
    pub text: String,
    strings: Vec<Range<usize>>,
}

impl MaskedSource {
    /// True when `offset` falls inside a string or template literal.
    pub fn in_string(&self, offset: usize) -> bool {
        let idx = self.strings.partition_point(|r| r.end <= offset);
        self.strings
            .get(idx)
            .is_some_and(|r| r.start <= offset && offset < r.end)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(u8),
    Regex { in_class: bool },
}

/// Keywords after which `/` opens a regex literal rather than dividing.
const REGEX_KEYWORDS: &[&[u8]] = &[
    b"return", b"typeof", b"instanceof", b"case", b"do", b"else", b"in", b"of", b"void",
    b"yield", b"await", b"delete", b"throw", b"new",
];

/// Blank `//` and `/* */` comments and record string literal spans.
/// Regex literals are recorded as string spans too.
pub fn mask_js_source(content: &str) -> MaskedSource {
    let src = content.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut strings = Vec::new();
    let mut state = State::Code;
    let mut string_start = 0;
    let mut i = 0;

    while i < src.len() {
        let b = src[i];
        let next = src.get(i + 1).copied();
        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::LineComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'\'' | b'"' | b'`', _) => {
                    state = State::Str(b);
                    string_start = i;
                    out.push(b);
                }
                (b'/', _) if regex_allowed(&out) => {
                    state = State::Regex { in_class: false };
                    string_start = i;
                    out.push(b);
                }
                _ => out.push(b),
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                    out.push(b'\n');
                } else {
                    out.push(b' ');
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    state = State::Code;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                out.push(if b == b'\n' { b'\n' } else { b' ' });
            }
            State::Str(quote) => {
                out.push(b);
                if b == b'\\' {
                    if let Some(n) = next {
                        out.push(n);
                        i += 2;
                        continue;
                    }
                } else if b == quote || (b == b'\n' && quote != b'`') {
                    strings.push(string_start..i + 1);
                    state = State::Code;
                }
            }
            State::Regex { in_class } => {
                out.push(b);
                match b {
                    b'\\' => {
                        if let Some(n) = next {
                            out.push(n);
                            i += 2;
                            continue;
                        }
                    }
                    b'[' => state = State::Regex { in_class: true },
                    b']' => state = State::Regex { in_class: false },
                    b'/' if !in_class => {
                        strings.push(string_start..i + 1);
                        state = State::Code;
                    }
                    // Unterminated: a regex literal never spans lines.
                    b'\n' => {
                        strings.push(string_start..i + 1);
                        state = State::Code;
                    }
                    _ => {}
                }
            }
        }
        i += 1;
    }
    if let State::Str(_) | State::Regex { .. } = state {
        strings.push(string_start..src.len());
    }

    MaskedSource {
        text: into_string(out),
        strings,
    }
}

/// A `/` opens a regex literal where an operand is expected: at the start,
/// after an operator or opening punctuation, or after a keyword such as
/// `return`. After an identifier, a literal or a closing bracket it divides.
fn regex_allowed(before: &[u8]) -> bool {
    let Some(end) = before.iter().rposition(|b| !b.is_ascii_whitespace()) else {
        return true;
    };
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    let last = before[end];
    if is_word(last) {
        let start = before[..end]
            .iter()
            .rposition(|&b| !is_word(b))
            .map_or(0, |p| p + 1);
        return REGEX_KEYWORDS.contains(&&before[start..=end]);
    }
    // `<` as well: a closing JSX tag is far more common than `x < /re/`.
    !matches!(last, b')' | b']' | b'}' | b'\'' | b'"' | b'`' | b'.' | b'<')
}

/// Maps byte offsets to 1-indexed line numbers.
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        Self {
            newlines: text
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}

fn into_string(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
