//! Tag grammar: building, scanning, and attribute lookup.
//!
//! A dpip tag is a self-delimited text record:
//!
//! ```text
//! <cmd='check_server' msg='proto.http' '>
//! ```
//!
//! Every attribute is written as `name='value'`. Quotes inside a value are
//! doubled, so the terminator (space, quote, `>`) can never occur inside a
//! value and a reader may locate the end of a tag with a plain substring
//! search.

use crate::error::DpipError;

/// Terminator closing every tag.
pub const TAG_END: &str = " '>";

/// Fragment identifying the tag after which a stream switches to raw mode.
pub const MODE_SWITCH_TAG: &str = "cmd='start_send_page' ";

const QUOTE: char = '\'';

/// Builds a tag from `(name, value)` pairs.
///
/// Values are escaped by doubling embedded quotes.
///
/// # Errors
///
/// Returns [`DpipError::QuoteInName`] or [`DpipError::InvalidName`] when an
/// attribute name cannot be represented, and [`DpipError::EmptyTag`] when no
/// attributes are supplied.
///
/// # Examples
///
/// ```
/// let tag = dpip::build_cmd(&[("cmd", "check_server"), ("msg", "it's")]).unwrap();
/// assert_eq!(tag, "<cmd='check_server' msg='it''s' '>");
/// ```
pub fn build_cmd(pairs: &[(&str, &str)]) -> Result<String, DpipError> {
    if pairs.is_empty() {
        return Err(DpipError::EmptyTag);
    }
    let mut tag = String::from("<");
    for (index, (name, value)) in pairs.iter().enumerate() {
        validate_name(name)?;
        if index > 0 {
            tag.push(' ');
        }
        tag.push_str(name);
        tag.push('=');
        push_quoted(&mut tag, value);
    }
    tag.push_str(TAG_END);
    Ok(tag)
}

/// Builds a tag from a template whose only conversions are `%s`.
///
/// Each `%s` is replaced by the matching value, quoted and escaped. The
/// literal text of the template supplies the attribute names and must not
/// contain quotes.
///
/// # Errors
///
/// Returns [`DpipError::UnsupportedConversion`] for any conversion other than
/// `%s`, [`DpipError::QuoteInName`] when the template contains a quote, and
/// [`DpipError::ArgumentCount`] when placeholders and values disagree.
///
/// # Examples
///
/// ```
/// let tag = dpip::build_cmd_fmt("cmd=%s msg=%s", &["auth", "c0ffee"]).unwrap();
/// assert_eq!(tag, "<cmd='auth' msg='c0ffee' '>");
/// ```
pub fn build_cmd_fmt(template: &str, values: &[&str]) -> Result<String, DpipError> {
    let expected = template.matches("%s").count();
    if expected != values.len() {
        return Err(DpipError::ArgumentCount {
            expected,
            supplied: values.len(),
        });
    }
    if template.contains(QUOTE) {
        return Err(DpipError::QuoteInName {
            name: template.to_owned(),
        });
    }

    let mut tag = String::from("<");
    let mut values = values.iter();
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            tag.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let value = values.next().ok_or(DpipError::ArgumentCount {
                    expected,
                    supplied: 0,
                })?;
                push_quoted(&mut tag, value);
            }
            Some(conversion) => return Err(DpipError::UnsupportedConversion { conversion }),
            None => return Err(DpipError::UnsupportedConversion { conversion: '%' }),
        }
    }
    tag.push_str(TAG_END);
    Ok(tag)
}

/// Escapes a value by doubling its quotes.
#[must_use]
pub fn escape(value: &str) -> String {
    value.replace(QUOTE, "''")
}

/// Looks up an attribute in a tag, returning the unescaped value.
///
/// Returns `None` when the attribute is absent or the tag is malformed.
///
/// # Examples
///
/// ```
/// let tag = "<cmd='send_data' msg='/tmp/sock' '>";
/// assert_eq!(dpip::get_attr(tag, "msg").as_deref(), Some("/tmp/sock"));
/// assert_eq!(dpip::get_attr(tag, "url"), None);
/// ```
#[must_use]
pub fn get_attr(tag: &str, name: &str) -> Option<String> {
    get_attr_bytes(tag.as_bytes(), name)
}

/// Byte-slice variant of [`get_attr`] for tags read straight off the wire.
#[must_use]
pub fn get_attr_bytes(tag: &[u8], name: &str) -> Option<String> {
    parse_attrs(tag)?
        .into_iter()
        .find(|(attr, _)| attr == name)
        .map(|(_, value)| value)
}

/// Splits a tag into its attributes in order of appearance.
///
/// Returns `None` when the tag does not follow the grammar.
#[must_use]
pub fn parse_attrs(tag: &[u8]) -> Option<Vec<(String, String)>> {
    let mut scanner = Scanner::new(tag);
    scanner.expect(b'<')?;
    let mut attrs = Vec::new();
    loop {
        scanner.skip_spaces();
        if scanner.at_close() {
            return Some(attrs);
        }
        let name = scanner.name()?;
        scanner.expect(b'=')?;
        let value = scanner.quoted_value()?;
        attrs.push((name, value));
    }
}

/// Returns the length of the first complete tag in `buf`, terminator
/// included.
#[must_use]
pub fn find_tag_end(buf: &[u8]) -> Option<usize> {
    let end = TAG_END.as_bytes();
    buf.windows(end.len())
        .position(|window| window == end)
        .map(|pos| pos + end.len())
}

fn validate_name(name: &str) -> Result<(), DpipError> {
    if name.contains(QUOTE) {
        return Err(DpipError::QuoteInName {
            name: name.to_owned(),
        });
    }
    if name.is_empty() || name.contains(|ch: char| ch.is_whitespace() || ch == '=' || ch == '>') {
        return Err(DpipError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

fn push_quoted(tag: &mut String, value: &str) {
    tag.push(QUOTE);
    tag.push_str(&escape(value));
    tag.push(QUOTE);
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        (self.peek()? == byte).then(|| self.pos += 1)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// The closing `'>` once the separating space has been consumed.
    fn at_close(&self) -> bool {
        self.peek() == Some(b'\'') && self.peek_at(1) == Some(b'>')
    }

    fn name(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte == b'=' {
                break;
            }
            if byte == b' ' || byte == b'\'' || byte == b'>' {
                return None;
            }
            self.pos += 1;
        }
        let raw = self.bytes.get(start..self.pos)?;
        if raw.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(raw).into_owned())
    }

    fn quoted_value(&mut self) -> Option<String> {
        self.expect(b'\'')?;
        let mut value = Vec::new();
        loop {
            let byte = self.peek()?;
            self.pos += 1;
            if byte != b'\'' {
                value.push(byte);
                continue;
            }
            if self.peek() == Some(b'\'') {
                value.push(b'\'');
                self.pos += 1;
                continue;
            }
            return Some(String::from_utf8_lossy(&value).into_owned());
        }
    }
}
