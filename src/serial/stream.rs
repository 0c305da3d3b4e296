//! The streaming serializer.
//!
//! [`StreamSerializer`] turns handler callbacks into markup as they arrive.
//! Nothing is buffered except the start tag of the innermost element: its
//! attributes and namespace declarations may still change until the next
//! event that needs the tag written (child content, a comment, the end of
//! the element).
//!
//! # Examples
//!
//! ```
//! use xmlstream::sax::ContentHandler;
//! use xmlstream::serial::{OutputOptions, StreamSerializer};
//!
//! let mut ser = StreamSerializer::new(Vec::new(), OutputOptions::default());
//! ser.start_element("", "p", "p", &[]).unwrap();
//! ser.characters("1 < 2 & 3").unwrap();
//! ser.end_element("", "p", "p").unwrap();
//! assert_eq!(ser.into_inner(), b"<p>1 &lt; 2 &amp; 3</p>");
//! ```

use std::io::Write;

use super::char_info::CharInfo;
use super::escape::{close_cdata, is_whitespace_only, write_comment_text, Escaper};
use super::namespaces::{NamespaceMappings, XMLNS_NAMESPACE};
use super::options::{is_xhtml_public_id, OutputMethod, OutputOptions};
use crate::encoding::{EncodingInfo, OutputEncoder};
use crate::error::{Result, SerializeError};
use crate::sax::{Attribute, ContentHandler, DeclHandler, DtdHandler, LexicalHandler};
use crate::util::qname::{join_qname, prefix_of};

/// Processing-instruction target that switches output escaping off.
pub const PI_DISABLE_OUTPUT_ESCAPING: &str = "javax.xml.transform.disable-output-escaping";
/// Processing-instruction target that switches output escaping back on.
pub const PI_ENABLE_OUTPUT_ESCAPING: &str = "javax.xml.transform.enable-output-escaping";

/// HTML elements written without an end tag.
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "br", "col", "embed", "frame", "hr", "img", "input", "isindex",
    "link", "meta", "param",
];

/// HTML elements whose text content is written unescaped.
const HTML_RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, Default)]
struct PendingStartTag {
    attributes: Vec<Attribute>,
}

impl PendingStartTag {
    /// Adds an attribute, or replaces the value of an earlier one with the
    /// same name in place.
    fn set(&mut self, attr: Attribute) {
        let existing = self.attributes.iter_mut().find(|a| {
            if attr.namespace_uri.is_empty() {
                a.qname == attr.qname
            } else {
                a.namespace_uri == attr.namespace_uri && a.local_name == attr.local_name
            }
        });
        match existing {
            Some(slot) => *slot = attr,
            None => self.attributes.push(attr),
        }
    }
}

#[derive(Debug, Clone)]
enum ElementState {
    /// The start tag has not been written yet.
    Open(PendingStartTag),
    Closed,
}

#[derive(Debug, Clone)]
struct ElementFrame {
    namespace_uri: String,
    local_name: String,
    qname: String,
    depth: i32,
    state: ElementState,
    is_cdata_section: bool,
    /// Set once non-whitespace text appears; disables indentation.
    preserve_space: bool,
    has_content: bool,
}

impl ElementFrame {
    fn is_html_named(&self, names: &[&str]) -> bool {
        self.namespace_uri.is_empty()
            && names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&self.local_name))
    }
}

/// A streaming XML, HTML or text serializer writing to `W`.
///
/// Drive it through the [`ContentHandler`], [`LexicalHandler`],
/// [`DeclHandler`] and [`DtdHandler`] traits, plus the inherent methods for
/// operations with no handler equivalent: [`add_attribute`], namespace
/// retrofits, escaping control and UTF-16 input.
///
/// [`add_attribute`]: Self::add_attribute
#[derive(Debug)]
pub struct StreamSerializer<W: Write> {
    out: OutputEncoder<W>,
    options: OutputOptions,
    encoding: EncodingInfo,
    char_info: CharInfo,
    namespaces: NamespaceMappings,
    elements: Vec<ElementFrame>,
    /// Bindings announced by `start_prefix_mapping` for the next element.
    pending_mappings: Vec<(String, String)>,
    cdata_open: bool,
    cdata_start_called: bool,
    disable_escaping: Vec<bool>,
    escaping: bool,
    start_new_line: bool,
    last_was_text: bool,
    in_entity_ref: bool,
    in_external_dtd: bool,
    doctype_name: Option<String>,
    doctype_public: Option<String>,
    doctype_system: Option<String>,
    need_doctype: bool,
    /// Between `start_dtd` and the first declaration.
    in_doctype: bool,
    internal_subset_open: bool,
    document_started: bool,
}

impl<W: Write> StreamSerializer<W> {
    /// Creates a serializer writing to `writer`.
    ///
    /// An unrecognized encoding label is logged and output falls back to
    /// UTF-8.
    pub fn new(writer: W, options: OutputOptions) -> Self {
        let encoding = options.encoding_info();
        let char_info = CharInfo::for_method(options.method);
        Self::with_parts(writer, options, encoding, char_info, NamespaceMappings::new())
    }

    fn with_parts(
        writer: W,
        options: OutputOptions,
        encoding: EncodingInfo,
        char_info: CharInfo,
        namespaces: NamespaceMappings,
    ) -> Self {
        let out = encoding.new_encoder(writer);
        let need_doctype = Self::owes_doctype(&options);
        Self {
            out,
            encoding,
            char_info,
            namespaces,
            elements: Vec::new(),
            pending_mappings: Vec::new(),
            cdata_open: false,
            cdata_start_called: false,
            disable_escaping: Vec::new(),
            escaping: true,
            start_new_line: false,
            last_was_text: false,
            in_entity_ref: false,
            in_external_dtd: false,
            doctype_name: None,
            doctype_public: options.doctype_public.clone(),
            doctype_system: options.doctype_system.clone(),
            need_doctype,
            in_doctype: false,
            internal_subset_open: false,
            document_started: false,
            options,
        }
    }

    fn owes_doctype(options: &OutputOptions) -> bool {
        options.doctype_system.is_some()
            || (options.method == OutputMethod::Html && options.doctype_public.is_some())
    }

    /// The options this serializer was created with.
    pub fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// The current namespace scope.
    pub fn namespaces(&self) -> &NamespaceMappings {
        &self.namespaces
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }

    /// Consumes the serializer, returning the underlying writer. Nothing is
    /// flushed; call `end_document` first for a complete document.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    /// Clears all document state so the serializer can write another
    /// document to the same writer. Options and locally defined character
    /// mappings are kept.
    pub fn reset(&mut self) {
        self.namespaces.reset();
        self.elements.clear();
        self.pending_mappings.clear();
        self.cdata_open = false;
        self.cdata_start_called = false;
        self.disable_escaping.clear();
        self.escaping = true;
        self.start_new_line = false;
        self.last_was_text = false;
        self.in_entity_ref = false;
        self.in_external_dtd = false;
        self.doctype_name = None;
        self.doctype_public = self.options.doctype_public.clone();
        self.doctype_system = self.options.doctype_system.clone();
        self.need_doctype = Self::owes_doctype(&self.options);
        self.in_doctype = false;
        self.internal_subset_open = false;
        self.document_started = false;
    }

    /// Creates a serializer for another writer that shares this one's
    /// options, character mappings and namespace scope, with no open
    /// elements.
    pub fn clone_with_writer<W2: Write>(&self, writer: W2) -> StreamSerializer<W2> {
        StreamSerializer::with_parts(
            writer,
            self.options.clone(),
            self.encoding.clone(),
            self.char_info.clone(),
            self.namespaces.clone(),
        )
    }

    /// Maps `ch` to `replacement` for this serializer only. See
    /// [`CharInfo::define_char_to_string_mapping`].
    pub fn define_char_to_string_mapping(&mut self, replacement: &str, ch: char) -> bool {
        self.char_info.define_char_to_string_mapping(replacement, ch)
    }

    /// Switches escaping of character data on or off, returning the
    /// previous setting.
    pub fn set_escaping(&mut self, escape: bool) -> bool {
        std::mem::replace(&mut self.escaping, escape)
    }

    /// Starts a region where character data is written unescaped.
    pub fn start_non_escaping(&mut self) {
        self.disable_escaping.push(true);
    }

    /// Ends the region begun by the matching
    /// [`start_non_escaping`](Self::start_non_escaping).
    pub fn end_non_escaping(&mut self) {
        self.disable_escaping.pop();
    }

    fn is_escaping_disabled(&self) -> bool {
        !self.escaping || self.disable_escaping.last() == Some(&true)
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::Io` if the writer fails.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }

    // ------------------------------------------------------------------
    // Output helpers
    // ------------------------------------------------------------------

    fn write(&mut self, s: &str) -> Result<()> {
        Ok(self.out.write_str(s)?)
    }

    fn current_depth(&self) -> i32 {
        i32::try_from(self.elements.len()).unwrap_or(i32::MAX) - 1
    }

    fn is_markup_method(&self) -> bool {
        self.options.method != OutputMethod::Text
    }

    fn mark_parent_content(&mut self) {
        if let Some(parent) = self.elements.last_mut() {
            parent.has_content = true;
        }
    }

    /// Writes the pending start tag of the innermost element, ending it with
    /// `>`.
    fn close_start_tag(&mut self) -> Result<()> {
        let Some(frame) = self.elements.last_mut() else {
            return Ok(());
        };
        let ElementState::Open(tag) = &frame.state else {
            return Ok(());
        };
        let escaper = Escaper::new(&self.char_info, &self.encoding, &self.options.line_separator);
        let mut buf = String::new();
        push_start_tag(&mut buf, &escaper, &frame.qname, tag);
        buf.push('>');
        self.out.write_str(&buf)?;
        frame.state = ElementState::Closed;
        Ok(())
    }

    fn close_cdata(&mut self) -> Result<()> {
        if self.cdata_open {
            let mut buf = String::new();
            let mut open = true;
            close_cdata(&mut buf, &mut open);
            self.write(&buf)?;
            self.cdata_open = false;
        }
        Ok(())
    }

    fn write_indent(&mut self, depth: i32) -> Result<()> {
        let mut buf = String::new();
        if self.start_new_line {
            buf.push_str(&self.options.line_separator);
        }
        let depth = usize::try_from(depth).unwrap_or(0);
        buf.extend(std::iter::repeat(' ').take(self.options.indent_amount * depth));
        self.write(&buf)
    }

    /// Indents before a child start tag, comment or processing instruction.
    fn indent_for_child(&mut self) -> Result<()> {
        if !self.options.indent || self.last_was_text {
            return Ok(());
        }
        match self.elements.last() {
            Some(parent) if !parent.preserve_space => self.write_indent(parent.depth + 1),
            _ => Ok(()),
        }
    }

    /// Shared prologue of every event that produces markup inside the
    /// document: start tag and CDATA section closed, parent marked non-empty.
    fn prepare_markup(&mut self) -> Result<()> {
        self.document_started = true;
        self.close_start_tag()?;
        self.close_cdata()?;
        self.mark_parent_content();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Document prolog
    // ------------------------------------------------------------------

    fn write_xml_declaration(&mut self) -> Result<()> {
        let encoding = if self.encoding.is_known() {
            self.encoding.name()
        } else {
            "UTF-8"
        };
        let mut buf = format!(
            "<?xml version=\"{}\" encoding=\"{}\"",
            self.options.version, encoding
        );
        if let Some(standalone) = self.options.standalone {
            buf.push_str(if standalone {
                " standalone=\"yes\""
            } else {
                " standalone=\"no\""
            });
        }
        buf.push_str("?>");
        buf.push_str(&self.options.line_separator);
        self.write(&buf)
    }

    /// `<!DOCTYPE name PUBLIC "p" "s"`, without the closing `>`.
    fn doctype_head(&self, name: &str) -> String {
        let mut buf = format!("<!DOCTYPE {name}");
        buf.push_str(&external_id(
            self.doctype_public.as_deref(),
            self.doctype_system.as_deref(),
        ));
        buf
    }

    /// Makes sure the DOCTYPE head and the ` [` of the internal subset are
    /// written before a declaration. Returns `false` when declarations are
    /// being read from the external subset and must not be echoed.
    fn dtd_prolog(&mut self) -> Result<bool> {
        if self.in_external_dtd || !self.is_markup_method() {
            return Ok(false);
        }
        if self.need_doctype {
            let name = self.doctype_name.clone().unwrap_or_default();
            let head = self.doctype_head(&name);
            self.write(&head)?;
            self.need_doctype = false;
        }
        if self.in_doctype {
            let open = format!(" [{}", self.options.line_separator);
            self.write(&open)?;
            self.in_doctype = false;
            self.internal_subset_open = true;
        }
        Ok(true)
    }

    fn write_decl(&mut self, decl: &str) -> Result<()> {
        if !self.dtd_prolog()? {
            return Ok(());
        }
        let line = format!("{decl}{}", self.options.line_separator);
        self.write(&line)
    }

    // ------------------------------------------------------------------
    // Namespaces and attributes
    // ------------------------------------------------------------------

    fn open_tag_mut(&mut self) -> Option<(&mut PendingStartTag, i32)> {
        match self.elements.last_mut() {
            Some(ElementFrame {
                state: ElementState::Open(tag),
                depth,
                ..
            }) => Some((tag, *depth)),
            _ => None,
        }
    }

    /// Adds `xmlns` or `xmlns:prefix` to the open start tag.
    fn queue_xmlns(&mut self, prefix: &str, uri: &str) {
        // XML 1.0 has no way to undeclare a non-default prefix.
        if !prefix.is_empty() && uri.is_empty() {
            return;
        }
        if let Some((tag, _)) = self.open_tag_mut() {
            let local = if prefix.is_empty() { "xmlns" } else { prefix };
            tag.set(Attribute {
                namespace_uri: XMLNS_NAMESPACE.to_string(),
                local_name: local.to_string(),
                qname: xmlns_qname(prefix),
                attr_type: "CDATA".to_string(),
                value: uri.to_string(),
            });
        }
    }

    /// Makes `uri` reachable through `prefix` on the element at `depth` and
    /// returns the prefix to use. When `prefix` is already bound to another
    /// URI at this depth, a prefix known for `uri` or a generated one is
    /// substituted.
    fn bind_prefix(&mut self, prefix: &str, uri: &str, depth: i32, allow_default: bool) -> String {
        if allow_default || !prefix.is_empty() {
            if self.namespaces.lookup_namespace(prefix) == Some(uri) {
                return prefix.to_string();
            }
            if self.namespaces.push_namespace(prefix, uri, depth) {
                self.queue_xmlns(prefix, uri);
                return prefix.to_string();
            }
        }
        if let Some(known) = self.namespaces.lookup_declared_prefix(uri) {
            return known.to_string();
        }
        let generated = loop {
            let candidate = self.namespaces.generate_next_prefix();
            if self.namespaces.push_namespace(&candidate, uri, depth) {
                break candidate;
            }
        };
        self.queue_xmlns(&generated, uri);
        if !prefix.is_empty() {
            log::debug!("prefix '{prefix}' is taken at depth {depth}; using '{generated}' for {uri}");
        }
        generated
    }

    fn xmlns_prefix(qname: &str) -> Option<&str> {
        if qname == "xmlns" {
            Some("")
        } else {
            qname.strip_prefix("xmlns:")
        }
    }

    /// Declares `prefix` on the element at `depth` unless it is already bound
    /// there.
    fn declare_in_open_tag(&mut self, prefix: &str, uri: &str, depth: i32) -> bool {
        let pushed = self.namespaces.push_namespace(prefix, uri, depth);
        if pushed {
            self.queue_xmlns(prefix, uri);
        }
        pushed
    }

    fn add_attribute_internal(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attr_type: &str,
        value: &str,
    ) -> Result<()> {
        let Some((_, depth)) = self.open_tag_mut() else {
            return Err(SerializeError::NoOpenStartTag {
                name: qname.to_string(),
            });
        };
        if let Some(prefix) = Self::xmlns_prefix(qname) {
            self.declare_in_open_tag(prefix, value, depth);
            return Ok(());
        }
        let qname = if namespace_uri.is_empty() {
            qname.to_string()
        } else {
            let requested = prefix_of(qname);
            let prefix = self.bind_prefix(requested, namespace_uri, depth, false);
            if prefix == requested {
                qname.to_string()
            } else {
                join_qname(&prefix, local_name)
            }
        };
        if let Some((tag, _)) = self.open_tag_mut() {
            tag.set(Attribute {
                namespace_uri: namespace_uri.to_string(),
                local_name: local_name.to_string(),
                qname,
                attr_type: attr_type.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Adds an attribute to the start tag that is still open.
    ///
    /// A later attribute with the same name replaces the value of an earlier
    /// one. `xmlns` and `xmlns:*` names are treated as namespace
    /// declarations.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::NoOpenStartTag` when no start tag is open.
    pub fn add_attribute(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attr_type: &str,
        value: &str,
    ) -> Result<()> {
        if self.in_entity_ref || !self.is_markup_method() {
            return Ok(());
        }
        self.add_attribute_internal(namespace_uri, local_name, qname, attr_type, value)
    }

    /// [`add_attribute`](Self::add_attribute) with a UTF-16 value.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::MalformedSurrogate` for invalid UTF-16, in
    /// which case the attribute is not added.
    pub fn add_attribute_utf16(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attr_type: &str,
        value: &[u16],
    ) -> Result<()> {
        let value = decode_utf16(value)?;
        self.add_attribute(namespace_uri, local_name, qname, attr_type, &value)
    }

    /// Declares `prefix` on the start tag that is still open.
    ///
    /// Returns `false` if the binding was already in effect or the prefix is
    /// already declared on this element.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::NoOpenStartTag` when no start tag is open.
    pub fn add_namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<bool> {
        let Some((_, depth)) = self.open_tag_mut() else {
            return Err(SerializeError::NoOpenStartTag {
                name: xmlns_qname(prefix),
            });
        };
        Ok(self.declare_in_open_tag(prefix, uri, depth))
    }

    /// Announces a binding for the next element, as
    /// [`ContentHandler::start_prefix_mapping`] does, and reports whether it
    /// was new.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::Io` if flushing the open start tag fails.
    pub fn push_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<bool> {
        self.close_start_tag()?;
        let depth = self.current_depth() + 1;
        let pushed = self.namespaces.push_namespace(prefix, uri, depth);
        if pushed {
            self.pending_mappings
                .push((prefix.to_string(), uri.to_string()));
        }
        Ok(pushed)
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// [`ContentHandler::characters`] for UTF-16 input.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::MalformedSurrogate` for invalid UTF-16, in
    /// which case nothing is written.
    pub fn characters_utf16(&mut self, units: &[u16]) -> Result<()> {
        let text = decode_utf16(units)?;
        self.characters(&text)
    }

    /// Writes `text` as one CDATA section.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::Io` if the writer fails.
    pub fn cdata(&mut self, text: &str) -> Result<()> {
        self.start_cdata()?;
        self.characters(text)?;
        self.end_cdata()
    }

    /// Writes the entity reference `&name;`.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::Io` if the writer fails.
    pub fn entity_reference(&mut self, name: &str) -> Result<()> {
        if !self.is_markup_method() {
            return Ok(());
        }
        self.prepare_markup()?;
        let reference = format!("&{name};");
        self.write(&reference)?;
        self.last_was_text = true;
        Ok(())
    }

    fn write_characters(&mut self, text: &str) -> Result<()> {
        let raw = self.is_escaping_disabled();
        let escaper = Escaper::new(&self.char_info, &self.encoding, &self.options.line_separator);
        let mut buf = String::with_capacity(text.len());

        if !self.is_markup_method() {
            escaper.write_raw(&mut buf, text);
            return Ok(self.out.write_str(&buf)?);
        }

        let in_cdata = self.cdata_start_called
            || self.elements.last().is_some_and(|e| e.is_cdata_section);
        let html_raw = self.options.method == OutputMethod::Html
            && self
                .elements
                .last()
                .is_some_and(|e| e.is_html_named(HTML_RAW_TEXT_ELEMENTS));

        let mut cdata_open = self.cdata_open;
        if in_cdata {
            escaper.write_cdata(&mut buf, text, &mut cdata_open, raw);
        } else {
            close_cdata(&mut buf, &mut cdata_open);
            if raw || html_raw {
                buf.push_str(text);
            } else {
                escaper.write_text(&mut buf, text);
            }
        }
        self.out.write_str(&buf)?;
        self.cdata_open = cdata_open;
        Ok(())
    }
}

/// `xmlns` for the default namespace, `xmlns:prefix` otherwise.
fn xmlns_qname(prefix: &str) -> String {
    if prefix.is_empty() {
        "xmlns".to_string()
    } else {
        format!("xmlns:{prefix}")
    }
}

/// Appends `<qname attr="value" ...` for a pending start tag.
fn push_start_tag(buf: &mut String, escaper: &Escaper<'_>, qname: &str, tag: &PendingStartTag) {
    buf.push('<');
    buf.push_str(qname);
    for attr in &tag.attributes {
        buf.push(' ');
        buf.push_str(&attr.qname);
        buf.push_str("=\"");
        escaper.write_attribute(buf, &attr.value);
        buf.push('"');
    }
}

/// Decodes UTF-16, reporting the first malformed surrogate.
fn decode_utf16(units: &[u16]) -> Result<String> {
    let mut text = String::with_capacity(units.len());
    let mut position = 0;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(ch) => {
                text.push(ch);
                position += ch.len_utf16();
            }
            Err(e) => {
                let high = e.unpaired_surrogate();
                let low = if (0xD800..=0xDBFF).contains(&high) {
                    units.get(position + 1).copied()
                } else {
                    None
                };
                return Err(SerializeError::MalformedSurrogate { high, low });
            }
        }
    }
    Ok(text)
}

impl<W: Write> ContentHandler for StreamSerializer<W> {
    fn start_document(&mut self) -> Result<()> {
        if self.document_started {
            return Ok(());
        }
        self.document_started = true;
        log::debug!(
            "start document: method={} encoding={}",
            self.options.method,
            self.encoding.name()
        );
        if self.options.method == OutputMethod::Xml && !self.options.omit_xml_declaration {
            self.write_xml_declaration()?;
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        if self.is_markup_method() {
            self.close_start_tag()?;
            self.close_cdata()?;
            if self.doctype_name.is_some()
                && (self.need_doctype || self.in_doctype || self.internal_subset_open)
            {
                self.end_dtd()?;
            }
            if self.options.indent && self.start_new_line && !self.last_was_text {
                let separator = self.options.line_separator.clone();
                self.write(&separator)?;
            }
        }
        self.out.finish()?;
        log::debug!("end document");
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.push_prefix_mapping(prefix, uri).map(|_| ())
    }

    fn start_element(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &[Attribute],
    ) -> Result<()> {
        if self.in_entity_ref {
            return Ok(());
        }
        let depth = self.current_depth() + 1;
        if !self.is_markup_method() {
            self.elements.push(ElementFrame {
                namespace_uri: namespace_uri.to_string(),
                local_name: local_name.to_string(),
                qname: qname.to_string(),
                depth,
                state: ElementState::Closed,
                is_cdata_section: false,
                preserve_space: true,
                has_content: false,
            });
            return Ok(());
        }

        self.document_started = true;
        self.close_cdata()?;
        if self.need_doctype && self.elements.is_empty() {
            if self.doctype_system.is_some() || self.options.method == OutputMethod::Html {
                let mut doctype = self.doctype_head(qname);
                doctype.push('>');
                doctype.push_str(&self.options.line_separator);
                self.write(&doctype)?;
            }
            self.need_doctype = false;
        }
        self.close_start_tag()?;
        self.mark_parent_content();
        self.indent_for_child()?;
        self.start_new_line = true;
        self.last_was_text = false;

        self.elements.push(ElementFrame {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
            depth,
            state: ElementState::Open(PendingStartTag::default()),
            is_cdata_section: self
                .options
                .is_cdata_section_element(namespace_uri, local_name),
            preserve_space: false,
            has_content: false,
        });

        for (prefix, uri) in std::mem::take(&mut self.pending_mappings) {
            self.queue_xmlns(&prefix, &uri);
        }

        let requested = prefix_of(qname);
        if namespace_uri.is_empty() {
            if requested.is_empty() && !self.namespaces.lookup_uri("").is_empty() {
                self.declare_in_open_tag("", "", depth);
            }
        } else {
            let prefix = self.bind_prefix(requested, namespace_uri, depth, true);
            if prefix != requested {
                if let Some(frame) = self.elements.last_mut() {
                    frame.qname = join_qname(&prefix, local_name);
                }
            }
        }

        for attr in attributes {
            self.add_attribute_internal(
                &attr.namespace_uri,
                &attr.local_name,
                &attr.qname,
                &attr.attr_type,
                &attr.value,
            )?;
        }
        Ok(())
    }

    fn end_element(&mut self, _namespace_uri: &str, _local_name: &str, qname: &str) -> Result<()> {
        if self.in_entity_ref {
            return Ok(());
        }
        let Some(frame) = self.elements.last() else {
            return Err(SerializeError::UnbalancedEndElement {
                name: qname.to_string(),
            });
        };
        let depth = frame.depth;

        let mut cdata_open = self.cdata_open;
        if self.is_markup_method() {
            let mut buf = String::new();
            match &frame.state {
                ElementState::Open(tag) => {
                    let escaper =
                        Escaper::new(&self.char_info, &self.encoding, &self.options.line_separator);
                    push_start_tag(&mut buf, &escaper, &frame.qname, tag);
                    match self.options.method {
                        OutputMethod::Html if frame.is_html_named(HTML_VOID_ELEMENTS) => {
                            buf.push('>');
                        }
                        OutputMethod::Html => {
                            buf.push_str("></");
                            buf.push_str(&frame.qname);
                            buf.push('>');
                        }
                        _ if self.doctype_public.as_deref().is_some_and(is_xhtml_public_id) => {
                            buf.push_str(" />");
                        }
                        _ => buf.push_str("/>"),
                    }
                }
                ElementState::Closed => {
                    close_cdata(&mut buf, &mut cdata_open);
                    if self.options.indent
                        && frame.has_content
                        && !frame.preserve_space
                        && !self.last_was_text
                    {
                        if self.start_new_line {
                            buf.push_str(&self.options.line_separator);
                        }
                        let spaces = self.options.indent_amount * usize::try_from(depth).unwrap_or(0);
                        buf.extend(std::iter::repeat(' ').take(spaces));
                    }
                    buf.push_str("</");
                    buf.push_str(&frame.qname);
                    buf.push('>');
                }
            }
            self.out.write_str(&buf)?;
        }

        self.cdata_open = cdata_open;
        self.elements.pop();
        self.namespaces.pop_namespaces(depth, |_| {});
        // Mappings announced inside this element but never used by a child.
        self.pending_mappings.clear();
        self.last_was_text = false;
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() || (self.in_entity_ref && !self.options.expand_dtd_entities) {
            return Ok(());
        }
        self.document_started = true;
        if self.is_markup_method() {
            self.close_start_tag()?;
        }
        self.write_characters(text)?;
        if let Some(parent) = self.elements.last_mut() {
            parent.has_content = true;
            if !is_whitespace_only(text) {
                parent.preserve_space = true;
            }
        }
        self.last_was_text = true;
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        self.characters(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        if self.in_entity_ref || !self.is_markup_method() {
            return Ok(());
        }
        if target == PI_DISABLE_OUTPUT_ESCAPING {
            self.start_non_escaping();
            return Ok(());
        }
        if target == PI_ENABLE_OUTPUT_ESCAPING {
            self.end_non_escaping();
            return Ok(());
        }
        self.prepare_markup()?;
        self.indent_for_child()?;

        let mut buf = format!("<?{target}");
        if !data.is_empty() && !data.starts_with(char::is_whitespace) {
            buf.push(' ');
        }
        buf.push_str(data);
        buf.push_str(if self.options.method == OutputMethod::Html {
            ">"
        } else {
            "?>"
        });
        self.write(&buf)?;
        self.start_new_line = true;
        self.last_was_text = false;
        Ok(())
    }

    fn skipped_entity(&mut self, name: &str) -> Result<()> {
        self.entity_reference(name)
    }
}

impl<W: Write> LexicalHandler for StreamSerializer<W> {
    fn comment(&mut self, text: &str) -> Result<()> {
        if self.in_entity_ref || !self.is_markup_method() {
            return Ok(());
        }
        self.prepare_markup()?;
        self.indent_for_child()?;

        let mut buf = String::from("<!--");
        write_comment_text(&mut buf, text);
        buf.push_str("-->");
        self.write(&buf)?;
        self.start_new_line = true;
        self.last_was_text = false;
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.cdata_start_called = true;
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.close_cdata()?;
        self.cdata_start_called = false;
        Ok(())
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        if name == "[dtd]" {
            self.in_external_dtd = true;
        }
        if !self.options.expand_dtd_entities && !self.in_external_dtd {
            self.start_non_escaping();
            let reference = format!("&{name};");
            let written = self.characters(&reference);
            self.end_non_escaping();
            written?;
        }
        self.in_entity_ref = true;
        Ok(())
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        if name == "[dtd]" {
            self.in_external_dtd = false;
        }
        self.in_entity_ref = false;
        Ok(())
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Result<()> {
        if !self.is_markup_method() {
            return Ok(());
        }
        self.document_started = true;
        if let Some(public) = public_id {
            self.doctype_public = Some(public.to_string());
        }
        if let Some(system) = system_id {
            self.doctype_system = Some(system.to_string());
        }
        log::debug!("start DTD for <{name}>");
        self.doctype_name = Some(name.to_string());
        self.need_doctype = true;
        self.in_doctype = true;
        Ok(())
    }

    fn end_dtd(&mut self) -> Result<()> {
        if !self.is_markup_method() {
            return Ok(());
        }
        let mut buf = String::new();
        if self.need_doctype {
            let name = self.doctype_name.clone().unwrap_or_default();
            buf.push_str(&self.doctype_head(&name));
        }
        buf.push_str(if self.internal_subset_open { "]>" } else { ">" });
        buf.push_str(&self.options.line_separator);
        self.write(&buf)?;
        self.need_doctype = false;
        self.in_doctype = false;
        self.internal_subset_open = false;
        Ok(())
    }
}

fn external_id(public_id: Option<&str>, system_id: Option<&str>) -> String {
    match (public_id, system_id) {
        (Some(public), Some(system)) => format!(" PUBLIC \"{public}\" \"{system}\""),
        (Some(public), None) => format!(" PUBLIC \"{public}\""),
        (None, Some(system)) => format!(" SYSTEM \"{system}\""),
        (None, None) => String::new(),
    }
}

impl<W: Write> DeclHandler for StreamSerializer<W> {
    fn element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        self.write_decl(&format!("<!ELEMENT {name} {model}>"))
    }

    fn attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        attr_type: &str,
        mode: Option<&str>,
        value: Option<&str>,
    ) -> Result<()> {
        let mut decl = format!("<!ATTLIST {element} {attribute} {attr_type}");
        if let Some(mode) = mode {
            decl.push(' ');
            decl.push_str(mode);
        }
        if let Some(value) = value {
            decl.push_str(&format!(" \"{value}\""));
        }
        decl.push('>');
        self.write_decl(&decl)
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_decl(&format!("<!ENTITY {name} \"{value}\">"))
    }

    fn external_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<()> {
        let id = external_id(public_id, Some(system_id));
        self.write_decl(&format!("<!ENTITY {name}{id}>"))
    }
}

impl<W: Write> DtdHandler for StreamSerializer<W> {
    fn notation_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        let id = external_id(public_id, system_id);
        self.write_decl(&format!("<!NOTATION {name}{id}>"))
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation: &str,
    ) -> Result<()> {
        let id = external_id(public_id, Some(system_id));
        self.write_decl(&format!("<!ENTITY {name}{id} NDATA {notation}>"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn serializer(options: OutputOptions) -> StreamSerializer<Vec<u8>> {
        StreamSerializer::new(Vec::new(), options)
    }

    fn output(ser: StreamSerializer<Vec<u8>>) -> String {
        String::from_utf8(ser.into_inner()).unwrap()
    }

    // --------------------------------------------------------------
    // Start tags and attributes
    // --------------------------------------------------------------

    #[test]
    fn test_empty_element_self_closes() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[Attribute::new("x", "1")]).unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a x=\"1\"/>");
    }

    #[test]
    fn test_xhtml_doctype_self_close_has_space() {
        let options = OutputOptions::default()
            .omit_xml_declaration(true)
            .doctype_public("-//W3C//DTD XHTML 1.0 Strict//EN")
            .doctype_system("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd");
        let mut ser = serializer(options);
        ser.start_element("", "br", "br", &[]).unwrap();
        ser.end_element("", "br", "br").unwrap();
        assert_eq!(
            output(ser),
            "<!DOCTYPE br PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
             \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\n<br />"
        );
    }

    #[test]
    fn test_add_attribute_dedupes_in_place() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.add_attribute("", "x", "x", "CDATA", "1").unwrap();
        ser.add_attribute("", "y", "y", "CDATA", "2").unwrap();
        ser.add_attribute("", "x", "x", "CDATA", "3").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a x=\"3\" y=\"2\"/>");
    }

    #[test]
    fn test_add_attribute_without_open_tag_fails() {
        let mut ser = serializer(OutputOptions::default());
        let err = ser.add_attribute("", "x", "x", "CDATA", "1").unwrap_err();
        assert!(matches!(err, SerializeError::NoOpenStartTag { name } if name == "x"));

        ser.start_element("", "a", "a", &[]).unwrap();
        ser.characters("t").unwrap();
        assert!(ser.add_attribute("", "x", "x", "CDATA", "1").is_err());
    }

    #[test]
    fn test_attribute_value_escaping() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[Attribute::new("v", "\"<&>\"\n")]).unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a v=\"&quot;&lt;&amp;&gt;&quot;&#10;\"/>");
    }

    #[test]
    fn test_unbalanced_end_element() {
        let mut ser = serializer(OutputOptions::default());
        let err = ser.end_element("", "a", "a").unwrap_err();
        assert!(matches!(err, SerializeError::UnbalancedEndElement { name } if name == "a"));
    }

    // --------------------------------------------------------------
    // Namespaces
    // --------------------------------------------------------------

    #[test]
    fn test_element_prefix_is_declared() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("urn:x", "a", "x:a", &[]).unwrap();
        ser.start_element("urn:x", "b", "x:b", &[]).unwrap();
        ser.end_element("urn:x", "b", "x:b").unwrap();
        ser.end_element("urn:x", "a", "x:a").unwrap();
        assert_eq!(output(ser), "<x:a xmlns:x=\"urn:x\"><x:b/></x:a>");
    }

    #[test]
    fn test_default_namespace_declared_once() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("urn:d", "a", "a", &[]).unwrap();
        ser.start_element("urn:d", "b", "b", &[]).unwrap();
        ser.end_element("urn:d", "b", "b").unwrap();
        ser.end_element("urn:d", "a", "a").unwrap();
        assert_eq!(output(ser), "<a xmlns=\"urn:d\"><b/></a>");
    }

    #[test]
    fn test_no_namespace_child_undeclares_default() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("urn:d", "a", "a", &[]).unwrap();
        ser.start_element("", "b", "b", &[]).unwrap();
        ser.end_element("", "b", "b").unwrap();
        ser.end_element("urn:d", "a", "a").unwrap();
        assert_eq!(output(ser), "<a xmlns=\"urn:d\"><b xmlns=\"\"/></a>");
    }

    #[test]
    fn test_start_prefix_mapping_applies_to_next_element() {
        let mut ser = serializer(OutputOptions::default());
        assert!(ser.push_prefix_mapping("p", "urn:p").unwrap());
        ser.start_element("urn:p", "a", "p:a", &[]).unwrap();
        ser.end_element("urn:p", "a", "p:a").unwrap();
        assert_eq!(output(ser), "<p:a xmlns:p=\"urn:p\"/>");
    }

    #[test]
    fn test_add_namespace_declaration_retrofits() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        assert!(ser.add_namespace_declaration("q", "urn:q").unwrap());
        assert!(!ser.add_namespace_declaration("q", "urn:q").unwrap());
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a xmlns:q=\"urn:q\"/>");
    }

    #[test]
    fn test_attribute_prefix_conflict_is_renamed() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("urn:one", "a", "p:a", &[]).unwrap();
        ser.add_attribute("urn:two", "x", "p:x", "CDATA", "v").unwrap();
        ser.end_element("urn:one", "a", "p:a").unwrap();
        assert_eq!(
            output(ser),
            "<p:a xmlns:p=\"urn:one\" xmlns:ns0=\"urn:two\" ns0:x=\"v\"/>"
        );
    }

    #[test]
    fn test_unprefixed_namespaced_attribute_gets_prefix() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.add_attribute("urn:t", "x", "x", "CDATA", "v").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a xmlns:ns0=\"urn:t\" ns0:x=\"v\"/>");
    }

    #[test]
    fn test_namespaces_go_out_of_scope() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "r", "r", &[]).unwrap();
        ser.start_element("urn:x", "a", "x:a", &[]).unwrap();
        ser.end_element("urn:x", "a", "x:a").unwrap();
        ser.start_element("urn:x", "b", "x:b", &[]).unwrap();
        ser.end_element("urn:x", "b", "x:b").unwrap();
        ser.end_element("", "r", "r").unwrap();
        assert_eq!(
            output(ser),
            "<r><x:a xmlns:x=\"urn:x\"/><x:b xmlns:x=\"urn:x\"/></r>"
        );
    }

    // --------------------------------------------------------------
    // Text, CDATA and escaping control
    // --------------------------------------------------------------

    #[test]
    fn test_cdata_section_elements() {
        let options = OutputOptions::default().cdata_section_elements_list("script");
        let mut ser = serializer(options);
        ser.start_element("", "script", "script", &[]).unwrap();
        ser.characters("a < b").unwrap();
        ser.characters(" && c").unwrap();
        ser.end_element("", "script", "script").unwrap();
        assert_eq!(output(ser), "<script><![CDATA[a < b && c]]></script>");
    }

    #[test]
    fn test_disable_output_escaping_pi() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.processing_instruction(PI_DISABLE_OUTPUT_ESCAPING, "").unwrap();
        ser.characters("<b/>").unwrap();
        ser.processing_instruction(PI_ENABLE_OUTPUT_ESCAPING, "").unwrap();
        ser.characters("<").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a><b/>&lt;</a>");
    }

    #[test]
    fn test_set_escaping_returns_previous() {
        let mut ser = serializer(OutputOptions::default());
        assert!(ser.set_escaping(false));
        ser.characters("&").unwrap();
        assert!(!ser.set_escaping(true));
        ser.characters("&").unwrap();
        assert_eq!(output(ser), "&&amp;");
    }

    #[test]
    fn test_characters_utf16() {
        let mut ser = serializer(OutputOptions::default().encoding("US-ASCII"));
        let units: Vec<u16> = "a\u{10348}<".encode_utf16().collect();
        ser.characters_utf16(&units).unwrap();
        assert_eq!(output(ser), "a&#66376;&lt;");
    }

    #[test]
    fn test_characters_utf16_malformed() {
        let mut ser = serializer(OutputOptions::default());
        let err = ser.characters_utf16(&[0x61, 0xD800, 0x62]).unwrap_err();
        assert!(matches!(
            err,
            SerializeError::MalformedSurrogate {
                high: 0xD800,
                low: Some(0x62)
            }
        ));
        let err = ser.characters_utf16(&[0xDC00]).unwrap_err();
        assert!(matches!(
            err,
            SerializeError::MalformedSurrogate {
                high: 0xDC00,
                low: None
            }
        ));
        let err = ser.characters_utf16(&[0xD800]).unwrap_err();
        assert!(matches!(
            err,
            SerializeError::MalformedSurrogate {
                high: 0xD800,
                low: None
            }
        ));
        assert_eq!(output(ser), "");
    }

    #[test]
    fn test_add_attribute_utf16() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        let value: Vec<u16> = "\u{E9}".encode_utf16().collect();
        ser.add_attribute_utf16("", "v", "v", "CDATA", &value).unwrap();
        assert!(ser.add_attribute_utf16("", "w", "w", "CDATA", &[0xDFFF]).is_err());
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a v=\"\u{E9}\"/>");
    }

    #[test]
    fn test_local_mapping() {
        let mut ser = serializer(OutputOptions::default());
        assert!(ser.define_char_to_string_mapping("&copy;", '\u{A9}'));
        ser.characters("\u{A9} 2024").unwrap();
        assert_eq!(output(ser), "&copy; 2024");
    }

    // --------------------------------------------------------------
    // Entities, comments, processing instructions
    // --------------------------------------------------------------

    #[test]
    fn test_unexpanded_entity_reference() {
        let mut ser = serializer(OutputOptions::default().expand_dtd_entities(false));
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.start_entity("ent").unwrap();
        ser.characters("replacement").unwrap();
        ser.start_element("", "b", "b", &[]).unwrap();
        ser.end_element("", "b", "b").unwrap();
        ser.end_entity("ent").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a>&ent;</a>");
    }

    #[test]
    fn test_expanded_entity_keeps_text() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.start_entity("ent").unwrap();
        ser.characters("x&y").unwrap();
        ser.end_entity("ent").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a>x&amp;y</a>");
    }

    #[test]
    fn test_comment_and_pi() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.comment("x--y-").unwrap();
        ser.processing_instruction("php", "echo 1;").unwrap();
        ser.processing_instruction("empty", "").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a><!--x- -y- --><?php echo 1;?><?empty?></a>");
    }

    #[test]
    fn test_entity_reference() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.entity_reference("nbsp").unwrap();
        ser.end_element("", "a", "a").unwrap();
        assert_eq!(output(ser), "<a>&nbsp;</a>");
    }

    // --------------------------------------------------------------
    // Reuse
    // --------------------------------------------------------------

    #[test]
    fn test_reset_allows_second_document() {
        let mut ser = serializer(OutputOptions::default());
        ser.start_document().unwrap();
        ser.start_element("", "a", "a", &[]).unwrap();
        ser.end_element("", "a", "a").unwrap();
        ser.end_document().unwrap();
        ser.reset();
        ser.start_document().unwrap();
        ser.start_element("", "b", "b", &[]).unwrap();
        ser.end_element("", "b", "b").unwrap();
        ser.end_document().unwrap();
        assert_eq!(
            output(ser),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>\
             <?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<b/>"
        );
    }

    #[test]
    fn test_clone_with_writer_keeps_mappings() {
        let mut ser = serializer(OutputOptions::default());
        ser.define_char_to_string_mapping("&check;", '\u{2713}');
        let mut copy = ser.clone_with_writer(Vec::new());
        copy.characters("\u{2713}").unwrap();
        assert_eq!(copy.into_inner(), b"&check;");
    }

    #[test]
    fn test_start_document_is_idempotent() {
        let mut ser = serializer(OutputOptions::default().standalone(true));
        ser.start_document().unwrap();
        ser.start_document().unwrap();
        assert_eq!(
            output(ser),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n"
        );
    }
}
