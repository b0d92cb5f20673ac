//! Balanced-brace grammar
//!
//! Every capture of a macro body, macro argument or environment body goes
//! through these helpers, so a nested group never truncates the capture at
//! the first inner `}`. Escaped delimiters (`\{`, `\}`, `\[`, `\]`) never
//! change the nesting depth.
//!
//! All indices are byte offsets. Delimiters are ASCII, so every index
//! returned here lies on a UTF-8 character boundary.

/// A delimited group: positions of the opening and closing delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub open: usize,
    pub close: usize,
}

impl Group {
    /// Text strictly between the delimiters
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open + 1..self.close]
    }

    /// Byte index just past the closing delimiter
    pub fn end(&self) -> usize {
        self.close + 1
    }
}

/// Find the `}` matching an opening brace.
///
/// `after_open` is the index just after the `{`. Returns the index of the
/// matching `}`, or `None` when the text ends first.
pub fn find_matching_brace(text: &str, after_open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = after_open;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Find the `]` matching an opening bracket.
///
/// Brace groups inside the brackets are skipped as a whole, so
/// `[{a]b}]` closes at the last bracket.
pub fn find_matching_bracket(text: &str, after_open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = after_open;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => {
                i = find_matching_brace(text, i + 1)?;
            }
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Skip whitespace starting at `pos`
pub fn skip_whitespace(text: &str, pos: usize) -> usize {
    let rest = match text.get(pos..) {
        Some(rest) => rest,
        None => return text.len(),
    };
    pos + (rest.len() - rest.trim_start().len())
}

/// Result of [`braced_group`] when a brace opens but never closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unterminated {
    pub open: usize,
}

/// Capture the `{...}` group starting at `pos` (leading whitespace allowed).
///
/// Returns `Ok(None)` when the next token is not a brace and
/// `Err(Unterminated)` when the brace has no partner.
pub fn braced_group(text: &str, pos: usize) -> Result<Option<Group>, Unterminated> {
    let open = skip_whitespace(text, pos);
    if text.as_bytes().get(open) != Some(&b'{') {
        return Ok(None);
    }
    match find_matching_brace(text, open + 1) {
        Some(close) => Ok(Some(Group { open, close })),
        None => Err(Unterminated { open }),
    }
}

/// Capture the `[...]` group starting at `pos` (leading whitespace allowed).
pub fn bracketed_group(text: &str, pos: usize) -> Result<Option<Group>, Unterminated> {
    let open = skip_whitespace(text, pos);
    if text.as_bytes().get(open) != Some(&b'[') {
        return Ok(None);
    }
    match find_matching_bracket(text, open + 1) {
        Some(close) => Ok(Some(Group { open, close })),
        None => Err(Unterminated { open }),
    }
}

/// Letters of a control word (`@` included, as in package internals)
pub fn is_control_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '@'
}

/// Read the control sequence whose backslash sits at `pos`.
///
/// Returns the name without the backslash and the index just past it. A
/// control word is a maximal run of letters; anything else is a one-character
/// control symbol.
pub fn control_sequence(text: &str, pos: usize) -> Option<(&str, usize)> {
    if text.as_bytes().get(pos) != Some(&b'\\') {
        return None;
    }
    let rest = &text[pos + 1..];
    let first = rest.chars().next()?;

    if is_control_letter(first) {
        let len = rest
            .find(|c: char| !is_control_letter(c))
            .unwrap_or(rest.len());
        Some((&rest[..len], pos + 1 + len))
    } else {
        let len = first.len_utf8();
        Some((&rest[..len], pos + 1 + len))
    }
}

/// Whether the control word `\name` ends at `end` (next char is not a letter)
pub fn ends_control_word(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .map_or(true, |c| !is_control_letter(c))
}
