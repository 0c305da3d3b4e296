//! Character classification for escaping.
//!
//! A [`CharInfo`] answers, for every code point the serializer writes, "does
//! this need a replacement in a text node?" and "does it need one in an
//! attribute value?", and supplies the replacement string (`&` becomes
//! `&amp;`). ASCII is answered from two 128-entry tables; the rest of the
//! Basic Multilingual Plane from a bitset; supplementary characters from the
//! replacement map itself.
//!
//! Tables for the built-in entity sets are built once per process and shared.
//! A serializer that defines extra mappings gets its own copy on first write,
//! leaving the shared template untouched.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::entities::{HTML_ENTITIES, XML_ENTITIES};
use super::options::OutputMethod;

const ASCII_MAX: usize = 128;
const SHIFT_PER_WORD: u32 = 6;
const LOW_ORDER_BITMASK: u32 = 0x3F;
const BMP_WORDS: usize = 0x1_0000 >> SHIFT_PER_WORD;

#[derive(Debug, Clone)]
struct CharTable {
    char_to_string: HashMap<char, String>,
    bits: Box<[u64; BMP_WORDS]>,
    /// One past the highest word with any bit set.
    first_word_not_used: usize,
    has_supplementary: bool,
    attr_ascii: [bool; ASCII_MAX],
    text_ascii: [bool; ASCII_MAX],
    only_quot_amp_lt_gt: bool,
}

impl CharTable {
    fn empty() -> Self {
        Self {
            char_to_string: HashMap::new(),
            bits: Box::new([0; BMP_WORDS]),
            first_word_not_used: 0,
            has_supplementary: false,
            attr_ascii: [false; ASCII_MAX],
            text_ascii: [false; ASCII_MAX],
            only_quot_amp_lt_gt: true,
        }
    }

    fn set(&mut self, ch: char) {
        let code = u32::from(ch);
        if let Some(slot) = self.attr_ascii.get_mut(code as usize) {
            *slot = true;
            self.text_ascii[code as usize] = true;
        }
        if code > 0xFFFF {
            self.has_supplementary = true;
            return;
        }
        let word = (code >> SHIFT_PER_WORD) as usize;
        self.first_word_not_used = self.first_word_not_used.max(word + 1);
        self.bits[word] |= 1 << (code & LOW_ORDER_BITMASK);
    }

    fn get(&self, ch: char) -> bool {
        let code = u32::from(ch);
        if code > 0xFFFF {
            return self.has_supplementary && self.char_to_string.contains_key(&ch);
        }
        let word = (code >> SHIFT_PER_WORD) as usize;
        word < self.first_word_not_used && self.bits[word] & (1 << (code & LOW_ORDER_BITMASK)) != 0
    }

    fn define(&mut self, replacement: &str, ch: char) -> bool {
        self.char_to_string.insert(ch, replacement.to_string());
        self.set(ch);
        let extra = !is_builtin_mapping(replacement, ch);
        if extra {
            self.only_quot_amp_lt_gt = false;
        }
        extra
    }

    fn build(entities: &[(&str, u32)], method: OutputMethod) -> Self {
        let mut table = Self::empty();
        for &(name, code) in entities {
            if let Some(ch) = char::from_u32(code) {
                table.define(&format!("&{name};"), ch);
            }
        }
        // The quotation mark is never escaped in text nodes, and the HTML
        // output method leaves `<` alone inside attribute values.
        table.text_ascii[usize::from(b'"')] = false;
        if method == OutputMethod::Html {
            table.attr_ascii[usize::from(b'<')] = false;
        }
        table
    }
}

/// Returns `true` for the four mappings every XML serializer uses.
fn is_builtin_mapping(replacement: &str, ch: char) -> bool {
    matches!(
        (ch, replacement),
        ('"', "&quot;") | ('&', "&amp;") | ('<', "&lt;") | ('>', "&gt;")
    )
}

/// The escaping context a character appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharContext {
    /// Character data of a text node.
    Text,
    /// The value of an attribute.
    Attribute,
}

/// Character-to-entity classification for one serializer.
///
/// Cloning is cheap: clones share the table until one of them defines a new
/// mapping.
///
/// # Examples
///
/// ```
/// use xmlstream::serial::char_info::CharInfo;
/// use xmlstream::serial::OutputMethod;
///
/// let info = CharInfo::for_method(OutputMethod::Xml);
/// assert!(info.should_map_text_char('&'));
/// assert!(!info.should_map_text_char('"'));
/// assert!(info.should_map_attr_char('"'));
/// assert_eq!(info.output_string_for_char('<'), Some("&lt;"));
/// ```
#[derive(Debug, Clone)]
pub struct CharInfo {
    table: Arc<CharTable>,
}

impl CharInfo {
    /// Returns the shared classifier for an output method's built-in entity
    /// table. The `text` method uses the XML table.
    #[must_use]
    pub fn for_method(method: OutputMethod) -> Self {
        static XML_TABLE: OnceLock<Arc<CharTable>> = OnceLock::new();
        static HTML_TABLE: OnceLock<Arc<CharTable>> = OnceLock::new();

        let table = match method {
            OutputMethod::Html => HTML_TABLE
                .get_or_init(|| Arc::new(CharTable::build(HTML_ENTITIES, OutputMethod::Html))),
            OutputMethod::Xml | OutputMethod::Text => XML_TABLE
                .get_or_init(|| Arc::new(CharTable::build(XML_ENTITIES, OutputMethod::Xml))),
        };
        Self {
            table: Arc::clone(table),
        }
    }

    /// Builds a classifier from a caller-supplied `(name, code point)` table.
    /// Code points that are not Unicode scalar values are skipped. The result
    /// is not cached.
    #[must_use]
    pub fn from_entities(entities: &[(&str, u32)], method: OutputMethod) -> Self {
        Self {
            table: Arc::new(CharTable::build(entities, method)),
        }
    }

    /// Returns `true` if `ch` has special treatment inside an attribute value.
    #[inline]
    #[must_use]
    pub fn should_map_attr_char(&self, ch: char) -> bool {
        match self.table.attr_ascii.get(u32::from(ch) as usize) {
            Some(&mapped) => mapped,
            None => self.table.get(ch),
        }
    }

    /// Returns `true` if `ch` has special treatment inside a text node.
    #[inline]
    #[must_use]
    pub fn should_map_text_char(&self, ch: char) -> bool {
        match self.table.text_ascii.get(u32::from(ch) as usize) {
            Some(&mapped) => mapped,
            None => self.table.get(ch),
        }
    }

    /// Dispatches to the text or attribute lookup.
    #[inline]
    #[must_use]
    pub fn should_map(&self, ch: char, context: CharContext) -> bool {
        match context {
            CharContext::Text => self.should_map_text_char(ch),
            CharContext::Attribute => self.should_map_attr_char(ch),
        }
    }

    /// Returns `true` if `ch` is in the full mapping set, bypassing the ASCII
    /// tables and their output-method adjustments.
    #[must_use]
    pub fn is_mapped(&self, ch: char) -> bool {
        self.table.get(ch)
    }

    /// The replacement string for `ch`, if one is defined.
    #[must_use]
    pub fn output_string_for_char(&self, ch: char) -> Option<&str> {
        self.table.char_to_string.get(&ch).map(String::as_str)
    }

    /// Maps `ch` to `replacement` for this classifier only.
    ///
    /// The code point is marked in both the text and the attribute table, so
    /// whichever context the caller escapes in will see it. Returns `true`
    /// when the mapping is anything other than one of the four built-in XML
    /// mappings (`<`, `>`, `&`, `"` to their usual entities).
    pub fn define_char_to_string_mapping(&mut self, replacement: &str, ch: char) -> bool {
        Arc::make_mut(&mut self.table).define(replacement, ch)
    }

    /// Maps `ch` to the entity reference `&name;`.
    pub fn define_entity(&mut self, name: &str, ch: char) -> bool {
        self.define_char_to_string_mapping(&format!("&{name};"), ch)
    }

    /// Returns `true` while only the four built-in XML mappings are defined.
    /// The escaper then skips the table for every non-ASCII character.
    #[must_use]
    pub fn only_quot_amp_lt_gt(&self) -> bool {
        self.table.only_quot_amp_lt_gt
    }
}
