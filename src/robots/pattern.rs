//! robots.txt path patterns
//!
//! Grammar: `*` matches any (possibly empty) sequence, a `$` in last
//! position anchors the match at the end of the path, and `\*` / `\$`
//! stand for the literal characters. Anything else is literal, and an
//! unanchored pattern matches as a path prefix.
//!
//! Literals are compared in the percent-encoded form URLs carry:
//! non-ASCII characters and the characters a URL path escapes are
//! encoded at compile time, and escapes are compared with uppercase hex.

use std::cmp::Ordering;

/// Verdict carried by an Allow or Disallow line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    Allow,
    Disallow,
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    /// Literal pieces separated by wildcards
    segments: Vec<String>,
    /// Pattern ended with an unescaped `$`
    anchored: bool,
}

impl PathPattern {
    /// Compiles a pattern as written in robots.txt
    pub fn compile(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut anchored = false;

        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                '\\' if matches!(chars.get(i + 1), Some('*') | Some('$')) => {
                    current.push(chars[i + 1]);
                    i += 1;
                }
                '*' => segments.push(normalize_escapes(&std::mem::take(&mut current))),
                '$' if i == chars.len() - 1 => anchored = true,
                _ => push_encoded(&mut current, c),
            }
            i += 1;
        }
        segments.push(normalize_escapes(&current));

        Self {
            raw: raw.to_string(),
            segments,
            anchored,
        }
    }

    /// The pattern text as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Pattern length used for precedence between rules
    pub fn len(&self) -> usize {
        self.raw.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Tests a path (with query, if any) against the pattern
    ///
    /// An empty pattern matches nothing: `Disallow:` with no value
    /// disallows nothing.
    pub fn matches(&self, path: &str) -> bool {
        if self.raw.is_empty() {
            return false;
        }

        let Some((first, rest)) = self.segments.split_first() else {
            return false;
        };

        if !path.starts_with(first.as_str()) {
            return false;
        }
        let mut pos = first.len();

        let Some((last, middle)) = rest.split_last() else {
            // No wildcard: prefix match, or exact match when anchored
            return !self.anchored || pos == path.len();
        };

        for segment in middle {
            match path[pos..].find(segment.as_str()) {
                Some(index) => pos += index + segment.len(),
                None => return false,
            }
        }

        if self.anchored {
            path[pos..].ends_with(last.as_str())
        } else {
            path[pos..].contains(last.as_str())
        }
    }
}

/// Characters the `url` crate percent-encodes in a path
const PATH_ESCAPED: &[char] = &[' ', '"', '<', '>', '`', '{', '}'];

fn push_encoded(out: &mut String, c: char) {
    if c.is_ascii() && !PATH_ESCAPED.contains(&c) {
        out.push(c);
        return;
    }

    let mut buf = [0u8; 4];
    for byte in c.encode_utf8(&mut buf).bytes() {
        out.push_str(&format!("%{:02X}", byte));
    }
}

/// Uppercases the hex digits of every `%XX` escape
pub(crate) fn normalize_escapes(text: &str) -> String {
    if !text.contains('%') {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push('%');
            out.push(bytes[i + 1].to_ascii_uppercase() as char);
            out.push(bytes[i + 2].to_ascii_uppercase() as char);
            i += 3;
            continue;
        }

        let c = text[i..].chars().next().unwrap_or_default();
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// One Allow or Disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub verdict: RuleVerdict,
    pub pattern: PathPattern,
}

impl PathRule {
    pub fn new(verdict: RuleVerdict, pattern: &str) -> Self {
        Self {
            verdict,
            pattern: PathPattern::compile(pattern),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    /// Precedence order: longer patterns first, then lexical order
    ///
    /// Rules that compare equal keep their declaration order when sorted
    /// stably, so neither Allow nor Disallow wins a tie by kind.
    pub fn precedence(&self, other: &Self) -> Ordering {
        other
            .pattern
            .len()
            .cmp(&self.pattern.len())
            .then_with(|| self.pattern.as_str().cmp(other.pattern.as_str()))
    }
}
