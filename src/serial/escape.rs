//! Context-sensitive escaping of character data.
//!
//! [`Escaper`] combines the character classifier, the output encoding and
//! the line separator. Its methods append to a `String` that the serializer
//! then hands to the encoder in one write.

use std::fmt::Write as _;

use super::char_info::CharInfo;
use crate::encoding::EncodingInfo;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
const CDATA_CONTINUE: &str = "]]]]><![CDATA[>";

/// Writes `&#N;` for `ch`, with `N` the full code point in decimal.
pub(crate) fn write_char_ref(out: &mut String, ch: char) {
    let _ = write!(out, "&#{};", u32::from(ch));
}

/// C0 controls other than the three whitespace characters, DEL, and the C1
/// range (which includes NEL).
fn is_escaped_control(ch: char) -> bool {
    matches!(ch, '\0'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{7F}'..='\u{9F}')
}

/// Returns `true` if a text node holds nothing but XML whitespace.
pub(crate) fn is_whitespace_only(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

/// Escapes text and attribute values for one serializer configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Escaper<'a> {
    char_info: &'a CharInfo,
    encoding: &'a EncodingInfo,
    line_separator: &'a str,
}

impl<'a> Escaper<'a> {
    pub(crate) fn new(
        char_info: &'a CharInfo,
        encoding: &'a EncodingInfo,
        line_separator: &'a str,
    ) -> Self {
        Self {
            char_info,
            encoding,
            line_separator,
        }
    }

    /// Whether the classifier must be consulted for `ch`. With only the
    /// four built-in XML mappings defined, nothing outside ASCII is mapped.
    fn needs_lookup(&self, ch: char, only_builtin: bool) -> bool {
        ch.is_ascii() || !only_builtin
    }

    /// Appends `text` escaped for a text node.
    pub(crate) fn write_text(&self, out: &mut String, text: &str) {
        let only_builtin = self.char_info.only_quot_amp_lt_gt();
        for ch in text.chars() {
            if self.needs_lookup(ch, only_builtin) && self.char_info.should_map_text_char(ch) {
                match self.char_info.output_string_for_char(ch) {
                    Some(replacement) => out.push_str(replacement),
                    None => write_char_ref(out, ch),
                }
                continue;
            }
            match ch {
                '\n' => out.push_str(self.line_separator),
                '\r' => out.push_str("&#13;"),
                '\t' | ' ' => out.push(ch),
                c if is_escaped_control(c) => write_char_ref(out, c),
                '\u{2028}' => out.push_str("&#8232;"),
                c if self.encoding.is_in_encoding(c) => out.push(c),
                c => write_char_ref(out, c),
            }
        }
    }

    /// Appends `value` escaped for a double-quoted attribute value.
    pub(crate) fn write_attribute(&self, out: &mut String, value: &str) {
        let only_builtin = self.char_info.only_quot_amp_lt_gt();
        for ch in value.chars() {
            if self.needs_lookup(ch, only_builtin) && self.char_info.should_map_attr_char(ch) {
                match self.char_info.output_string_for_char(ch) {
                    Some(replacement) => out.push_str(replacement),
                    None => write_char_ref(out, ch),
                }
                continue;
            }
            match ch {
                '\t' => out.push_str("&#9;"),
                '\n' => out.push_str("&#10;"),
                '\r' => out.push_str("&#13;"),
                c if is_escaped_control(c) => write_char_ref(out, c),
                '\u{2028}' => out.push_str("&#8232;"),
                c if self.encoding.is_in_encoding(c) => out.push(c),
                c => write_char_ref(out, c),
            }
        }
    }

    /// Appends `text` with only line feeds rewritten.
    pub(crate) fn write_raw(&self, out: &mut String, text: &str) {
        if self.line_separator == "\n" {
            out.push_str(text);
        } else {
            out.push_str(&text.replace('\n', self.line_separator));
        }
    }

    /// Characters that may appear inside a CDATA section as-is.
    fn cdata_can_hold(&self, ch: char) -> bool {
        if u32::from(ch) < 0x7F {
            ch >= ' ' || matches!(ch, '\n' | '\r' | '\t')
        } else {
            self.encoding.is_in_encoding(ch)
        }
    }

    /// Appends `text` as CDATA, merging with a section already open.
    ///
    /// `open` tracks whether a `<![CDATA[` has been written and not yet
    /// closed. A character the section cannot hold closes it and is written
    /// as a character reference; `]]>` is split across two sections; and a
    /// chunk ending in `]` closes the section so the next chunk cannot
    /// complete a `]]>`. With `raw` set, every character is written inside
    /// the section unchanged.
    pub(crate) fn write_cdata(&self, out: &mut String, text: &str, open: &mut bool, raw: bool) {
        let mut chars = text.char_indices();
        while let Some((i, ch)) = chars.next() {
            if !raw && !self.cdata_can_hold(ch) {
                if *open {
                    out.push_str(CDATA_CLOSE);
                    *open = false;
                }
                write_char_ref(out, ch);
                continue;
            }
            if !*open {
                out.push_str(CDATA_OPEN);
                *open = true;
            }
            if ch == '\n' {
                out.push_str(self.line_separator);
            } else if ch == ']' && text[i..].starts_with(CDATA_CLOSE) {
                out.push_str(CDATA_CONTINUE);
                chars.nth(1);
            } else {
                out.push(ch);
            }
        }
        if *open && text.ends_with(']') {
            out.push_str(CDATA_CLOSE);
            *open = false;
        }
    }
}

/// Rewrites comment text so it cannot contain `--` or end in `-`.
pub(crate) fn write_comment_text(out: &mut String, text: &str) {
    let mut previous_dash = false;
    for ch in text.chars() {
        if ch == '-' && previous_dash {
            out.push_str(" -");
        } else {
            out.push(ch);
        }
        previous_dash = ch == '-';
    }
    if text.ends_with('-') {
        out.push(' ');
    }
}

/// Closes an open CDATA section.
pub(crate) fn close_cdata(out: &mut String, open: &mut bool) {
    if *open {
        out.push_str(CDATA_CLOSE);
        *open = false;
    }
}
