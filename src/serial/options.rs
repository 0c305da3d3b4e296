//! Output configuration.

use std::fmt;

use crate::encoding::{is_utf8_label, EncodingInfo};

/// The kind of markup the serializer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMethod {
    /// Well-formed XML.
    #[default]
    Xml,
    /// HTML 4.01: no XML declaration, HTML entities, void elements written
    /// without an end tag.
    Html,
    /// Character data only; markup events are dropped.
    Text,
}

impl fmt::Display for OutputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Xml => "xml",
            Self::Html => "html",
            Self::Text => "text",
        })
    }
}

/// An expanded element name, `{namespace}local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    /// The namespace URI, empty for no namespace.
    pub namespace: String,
    /// The local part of the name.
    pub local: String,
}

impl ExpandedName {
    /// Creates an expanded name.
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            local: local.to_string(),
        }
    }

    /// Parses Clark notation: `{uri}local` or a bare `local`.
    ///
    /// Returns `None` for an unterminated `{` or an empty local part.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlstream::serial::ExpandedName;
    ///
    /// let name = ExpandedName::parse("{urn:x}script").unwrap();
    /// assert_eq!(name.namespace, "urn:x");
    /// assert_eq!(name.local, "script");
    /// assert_eq!(ExpandedName::parse("pre").unwrap().namespace, "");
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => rest.split_once('}')?,
            None => ("", s),
        };
        if local.is_empty() {
            return None;
        }
        Some(Self::new(namespace, local))
    }

    /// Parses a whitespace-separated list of Clark names, skipping entries
    /// that do not parse.
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split_whitespace().filter_map(Self::parse).collect()
    }

    /// Returns `true` if this is the name `(namespace, local)`.
    pub fn matches(&self, namespace: &str, local: &str) -> bool {
        self.namespace == namespace && self.local == local
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

pub(crate) fn is_xhtml_public_id(public_id: &str) -> bool {
    public_id.starts_with("-//W3C//DTD XHTML")
}

/// Options controlling serializer output.
///
/// # Examples
///
/// ```
/// use xmlstream::serial::{OutputMethod, OutputOptions};
///
/// let options = OutputOptions::default()
///     .method(OutputMethod::Xml)
///     .indent(true)
///     .indent_amount(4)
///     .cdata_section_elements_list("script {urn:x}code");
/// assert_eq!(options.cdata_section_elements.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Output method. Defaults to XML.
    pub method: OutputMethod,
    /// Whether to pretty-print element content. Defaults to `false`.
    pub indent: bool,
    /// Spaces per nesting level when indenting. Defaults to `0`, which
    /// still breaks lines but adds no leading spaces.
    pub indent_amount: usize,
    /// Written wherever the input has a line feed. Defaults to `"\n"`.
    pub line_separator: String,
    /// Output encoding label. Defaults to `UTF-8`.
    pub encoding: String,
    /// XML version written in the declaration. Defaults to `1.0`.
    pub version: String,
    /// `standalone` pseudo-attribute of the declaration, if any.
    pub standalone: Option<bool>,
    /// Suppresses the XML declaration. Defaults to `false`.
    pub omit_xml_declaration: bool,
    /// Public identifier written in the DOCTYPE.
    pub doctype_public: Option<String>,
    /// System identifier written in the DOCTYPE.
    pub doctype_system: Option<String>,
    /// Elements whose text content is written as CDATA sections.
    pub cdata_section_elements: Vec<ExpandedName>,
    /// When `false`, entity references reported by `start_entity` are
    /// written as `&name;` instead of expecting their replacement text.
    /// Defaults to `true`.
    pub expand_dtd_entities: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            method: OutputMethod::Xml,
            indent: false,
            indent_amount: 0,
            line_separator: "\n".to_string(),
            encoding: "UTF-8".to_string(),
            version: "1.0".to_string(),
            standalone: None,
            omit_xml_declaration: false,
            doctype_public: None,
            doctype_system: None,
            cdata_section_elements: Vec::new(),
            expand_dtd_entities: true,
        }
    }
}

impl OutputOptions {
    /// Defaults for `method`. HTML omits the XML declaration.
    #[must_use]
    pub fn for_method(method: OutputMethod) -> Self {
        Self::default()
            .method(method)
            .omit_xml_declaration(method != OutputMethod::Xml)
    }

    /// Sets the output method.
    #[must_use]
    pub fn method(mut self, method: OutputMethod) -> Self {
        self.method = method;
        self
    }

    /// Enables or disables indentation.
    #[must_use]
    pub fn indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Sets the number of spaces per nesting level.
    #[must_use]
    pub fn indent_amount(mut self, amount: usize) -> Self {
        self.indent_amount = amount;
        self
    }

    /// Sets the line separator, for example `"\r\n"`.
    #[must_use]
    pub fn line_separator(mut self, separator: &str) -> Self {
        self.line_separator = separator.to_string();
        self
    }

    /// Sets the output encoding label.
    #[must_use]
    pub fn encoding(mut self, label: &str) -> Self {
        self.encoding = label.to_string();
        self
    }

    /// Sets the XML version written in the declaration.
    #[must_use]
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Sets the `standalone` pseudo-attribute.
    #[must_use]
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.standalone = Some(standalone);
        self
    }

    /// Suppresses or restores the XML declaration.
    #[must_use]
    pub fn omit_xml_declaration(mut self, omit: bool) -> Self {
        self.omit_xml_declaration = omit;
        self
    }

    /// Sets the DOCTYPE public identifier.
    #[must_use]
    pub fn doctype_public(mut self, public_id: &str) -> Self {
        self.doctype_public = Some(public_id.to_string());
        self
    }

    /// Sets the DOCTYPE system identifier.
    #[must_use]
    pub fn doctype_system(mut self, system_id: &str) -> Self {
        self.doctype_system = Some(system_id.to_string());
        self
    }

    /// Adds one element to the CDATA section list.
    #[must_use]
    pub fn cdata_section_element(mut self, namespace: &str, local: &str) -> Self {
        self.cdata_section_elements
            .push(ExpandedName::new(namespace, local));
        self
    }

    /// Adds every element of a whitespace-separated Clark-notation list,
    /// e.g. `"script {http://example.com/ns}code"`.
    #[must_use]
    pub fn cdata_section_elements_list(mut self, list: &str) -> Self {
        self.cdata_section_elements
            .extend(ExpandedName::parse_list(list));
        self
    }

    /// Enables or disables expansion of DTD entity references.
    #[must_use]
    pub fn expand_dtd_entities(mut self, expand: bool) -> Self {
        self.expand_dtd_entities = expand;
        self
    }

    /// Returns `true` if text inside `{namespace}local` goes into CDATA
    /// sections.
    pub fn is_cdata_section_element(&self, namespace: &str, local: &str) -> bool {
        self.cdata_section_elements
            .iter()
            .any(|name| name.matches(namespace, local))
    }

    /// Returns `true` when the DOCTYPE public id names an XHTML DTD, which
    /// calls for `<br />` rather than `<br/>`.
    pub fn is_xhtml_doctype(&self) -> bool {
        self.doctype_public.as_deref().is_some_and(is_xhtml_public_id)
    }

    /// Resolves the configured encoding.
    ///
    /// An unrecognized label is not an error: the returned oracle treats
    /// every character as representable and a warning is logged.
    pub fn encoding_info(&self) -> EncodingInfo {
        if is_utf8_label(&self.encoding) {
            return EncodingInfo::utf8();
        }
        EncodingInfo::for_label(&self.encoding).unwrap_or_else(|e| {
            log::warn!("{e}; writing UTF-8 and treating every character as representable");
            EncodingInfo::unknown(&self.encoding)
        })
    }
}
