//! SAX2-style event protocol.
//!
//! A producer drives a consumer by calling handler methods in document
//! order. The callbacks are split the way SAX2 splits them:
//! [`ContentHandler`] for the document content, [`LexicalHandler`] for
//! comments, CDATA boundaries, entity boundaries and the DOCTYPE,
//! [`DeclHandler`] and [`DtdHandler`] for declarations in the internal
//! subset.
//!
//! Every method has a no-op default and returns a [`Result`], so a handler
//! that writes somewhere can fail the producer.
//!
//! [`SaxEvent`] is the owned form of one callback. A recorded list of events
//! can be fed back through any handler with [`replay`].
//!
//! # Examples
//!
//! ```
//! use xmlstream::sax::{replay, Attribute, EventRecorder, SaxEvent};
//!
//! let events = vec![
//!     SaxEvent::StartElement {
//!         namespace_uri: String::new(),
//!         local_name: "a".to_string(),
//!         qname: "a".to_string(),
//!         attributes: vec![Attribute::new("id", "1")],
//!     },
//!     SaxEvent::Characters("hi".to_string()),
//!     SaxEvent::EndElement {
//!         namespace_uri: String::new(),
//!         local_name: "a".to_string(),
//!         qname: "a".to_string(),
//!     },
//! ];
//!
//! let mut recorder = EventRecorder::default();
//! replay(&events, &mut recorder).unwrap();
//! assert_eq!(recorder.events, events);
//! ```

use crate::error::Result;
use crate::util::qname::split_qname;

/// One attribute of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace URI, empty for none.
    pub namespace_uri: String,
    /// Local part of the name.
    pub local_name: String,
    /// Qualified name as written, `prefix:local` or `local`.
    pub qname: String,
    /// DTD attribute type, `CDATA` when undeclared.
    pub attr_type: String,
    /// The unescaped value.
    pub value: String,
}

impl Attribute {
    /// An un-namespaced `CDATA` attribute.
    pub fn new(qname: &str, value: &str) -> Self {
        let (_, local) = split_qname(qname);
        Self {
            namespace_uri: String::new(),
            local_name: local.to_string(),
            qname: qname.to_string(),
            attr_type: "CDATA".to_string(),
            value: value.to_string(),
        }
    }

    /// A namespaced `CDATA` attribute. The local name is taken from `qname`.
    pub fn with_namespace(namespace_uri: &str, qname: &str, value: &str) -> Self {
        Self {
            namespace_uri: namespace_uri.to_string(),
            ..Self::new(qname, value)
        }
    }
}

/// Receives the logical content of a document.
#[allow(unused_variables)]
pub trait ContentHandler {
    /// Called once, before any other event.
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, after every other event.
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    /// Announces a prefix binding that takes effect on the next element.
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        Ok(())
    }

    /// Announces that a prefix binding went out of scope.
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        Ok(())
    }

    /// Called for every start tag.
    fn start_element(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &[Attribute],
    ) -> Result<()> {
        Ok(())
    }

    /// Called for every end tag, including the implied end of an empty
    /// element.
    fn end_element(&mut self, namespace_uri: &str, local_name: &str, qname: &str) -> Result<()> {
        Ok(())
    }

    /// Character data. A single text node may arrive in several calls.
    fn characters(&mut self, text: &str) -> Result<()> {
        Ok(())
    }

    /// Whitespace in element content.
    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        Ok(())
    }

    /// A processing instruction. `data` is empty when there is none.
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        Ok(())
    }

    /// An entity the producer did not expand.
    fn skipped_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }
}

/// Receives lexical detail a content-only consumer can ignore.
#[allow(unused_variables)]
pub trait LexicalHandler {
    /// A comment's text, without the `<!--` and `-->` delimiters.
    fn comment(&mut self, text: &str) -> Result<()> {
        Ok(())
    }

    /// Start of a CDATA section. Its content arrives via `characters`.
    fn start_cdata(&mut self) -> Result<()> {
        Ok(())
    }

    /// End of a CDATA section.
    fn end_cdata(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of an entity's replacement text. `[dtd]` names the external
    /// DTD subset.
    fn start_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }

    /// End of an entity's replacement text.
    fn end_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }

    /// Start of the DOCTYPE.
    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// End of the DOCTYPE.
    fn end_dtd(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives element, attribute and entity declarations.
#[allow(unused_variables)]
pub trait DeclHandler {
    /// `<!ELEMENT name model>`.
    fn element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        Ok(())
    }

    /// `<!ATTLIST element attribute type mode value>`.
    fn attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        attr_type: &str,
        mode: Option<&str>,
        value: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    /// `<!ENTITY name "value">`.
    fn internal_entity_decl(&mut self, name: &str, value: &str) -> Result<()> {
        Ok(())
    }

    /// `<!ENTITY name PUBLIC "public" "system">` or the `SYSTEM` form.
    fn external_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Receives notations and unparsed entities.
#[allow(unused_variables)]
pub trait DtdHandler {
    /// `<!NOTATION name PUBLIC "public" "system">` or the `SYSTEM` form.
    fn notation_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    /// `<!ENTITY name SYSTEM "system" NDATA notation>`.
    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// A handler for every kind of event.
pub trait EventHandler: ContentHandler + LexicalHandler + DeclHandler + DtdHandler {}

impl<T: ContentHandler + LexicalHandler + DeclHandler + DtdHandler + ?Sized> EventHandler for T {}

/// A handler that ignores everything.
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl ContentHandler for DefaultHandler {}
impl LexicalHandler for DefaultHandler {}
impl DeclHandler for DefaultHandler {}
impl DtdHandler for DefaultHandler {}

/// The owned form of one handler callback.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SaxEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping {
        prefix: String,
        uri: String,
    },
    EndPrefixMapping {
        prefix: String,
    },
    StartElement {
        namespace_uri: String,
        local_name: String,
        qname: String,
        attributes: Vec<Attribute>,
    },
    EndElement {
        namespace_uri: String,
        local_name: String,
        qname: String,
    },
    Characters(String),
    IgnorableWhitespace(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    SkippedEntity(String),
    Comment(String),
    StartCdata,
    EndCdata,
    StartEntity(String),
    EndEntity(String),
    StartDtd {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    EndDtd,
    ElementDecl {
        name: String,
        model: String,
    },
    AttributeDecl {
        element: String,
        attribute: String,
        attr_type: String,
        mode: Option<String>,
        value: Option<String>,
    },
    InternalEntityDecl {
        name: String,
        value: String,
    },
    ExternalEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: String,
    },
    NotationDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    UnparsedEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: String,
        notation: String,
    },
}

impl SaxEvent {
    /// Shorthand for an un-namespaced start tag.
    pub fn start(qname: &str, attributes: Vec<Attribute>) -> Self {
        let (_, local) = split_qname(qname);
        Self::StartElement {
            namespace_uri: String::new(),
            local_name: local.to_string(),
            qname: qname.to_string(),
            attributes,
        }
    }

    /// Shorthand for an un-namespaced end tag.
    pub fn end(qname: &str) -> Self {
        let (_, local) = split_qname(qname);
        Self::EndElement {
            namespace_uri: String::new(),
            local_name: local.to_string(),
            qname: qname.to_string(),
        }
    }

    /// Shorthand for character data.
    pub fn text(text: &str) -> Self {
        Self::Characters(text.to_string())
    }

    /// Calls the handler method this event stands for.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler returns.
    pub fn dispatch<H: EventHandler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        match self {
            Self::StartDocument => handler.start_document(),
            Self::EndDocument => handler.end_document(),
            Self::StartPrefixMapping { prefix, uri } => handler.start_prefix_mapping(prefix, uri),
            Self::EndPrefixMapping { prefix } => handler.end_prefix_mapping(prefix),
            Self::StartElement {
                namespace_uri,
                local_name,
                qname,
                attributes,
            } => handler.start_element(namespace_uri, local_name, qname, attributes),
            Self::EndElement {
                namespace_uri,
                local_name,
                qname,
            } => handler.end_element(namespace_uri, local_name, qname),
            Self::Characters(text) => handler.characters(text),
            Self::IgnorableWhitespace(text) => handler.ignorable_whitespace(text),
            Self::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data)
            }
            Self::SkippedEntity(name) => handler.skipped_entity(name),
            Self::Comment(text) => handler.comment(text),
            Self::StartCdata => handler.start_cdata(),
            Self::EndCdata => handler.end_cdata(),
            Self::StartEntity(name) => handler.start_entity(name),
            Self::EndEntity(name) => handler.end_entity(name),
            Self::StartDtd {
                name,
                public_id,
                system_id,
            } => handler.start_dtd(name, public_id.as_deref(), system_id.as_deref()),
            Self::EndDtd => handler.end_dtd(),
            Self::ElementDecl { name, model } => handler.element_decl(name, model),
            Self::AttributeDecl {
                element,
                attribute,
                attr_type,
                mode,
                value,
            } => handler.attribute_decl(
                element,
                attribute,
                attr_type,
                mode.as_deref(),
                value.as_deref(),
            ),
            Self::InternalEntityDecl { name, value } => handler.internal_entity_decl(name, value),
            Self::ExternalEntityDecl {
                name,
                public_id,
                system_id,
            } => handler.external_entity_decl(name, public_id.as_deref(), system_id),
            Self::NotationDecl {
                name,
                public_id,
                system_id,
            } => handler.notation_decl(name, public_id.as_deref(), system_id.as_deref()),
            Self::UnparsedEntityDecl {
                name,
                public_id,
                system_id,
                notation,
            } => handler.unparsed_entity_decl(name, public_id.as_deref(), system_id, notation),
        }
    }
}

/// Feeds `events` to `handler` in order, stopping at the first error.
///
/// # Errors
///
/// Returns the first error a handler method returns.
pub fn replay<H: EventHandler + ?Sized>(events: &[SaxEvent], handler: &mut H) -> Result<()> {
    for event in events {
        event.dispatch(handler)?;
    }
    Ok(())
}

/// A handler that records every event it receives.
#[derive(Debug, Default)]
pub struct EventRecorder {
    /// The events received so far.
    pub events: Vec<SaxEvent>,
}

impl EventRecorder {
    fn push(&mut self, event: SaxEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

fn owned(s: Option<&str>) -> Option<String> {
    s.map(str::to_string)
}

impl ContentHandler for EventRecorder {
    fn start_document(&mut self) -> Result<()> {
        self.push(SaxEvent::StartDocument)
    }

    fn end_document(&mut self) -> Result<()> {
        self.push(SaxEvent::EndDocument)
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.push(SaxEvent::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.push(SaxEvent::EndPrefixMapping {
            prefix: prefix.to_string(),
        })
    }

    fn start_element(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &str,
        attributes: &[Attribute],
    ) -> Result<()> {
        self.push(SaxEvent::StartElement {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
            attributes: attributes.to_vec(),
        })
    }

    fn end_element(&mut self, namespace_uri: &str, local_name: &str, qname: &str) -> Result<()> {
        self.push(SaxEvent::EndElement {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
            qname: qname.to_string(),
        })
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.push(SaxEvent::Characters(text.to_string()))
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        self.push(SaxEvent::IgnorableWhitespace(text.to_string()))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.push(SaxEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn skipped_entity(&mut self, name: &str) -> Result<()> {
        self.push(SaxEvent::SkippedEntity(name.to_string()))
    }
}

impl LexicalHandler for EventRecorder {
    fn comment(&mut self, text: &str) -> Result<()> {
        self.push(SaxEvent::Comment(text.to_string()))
    }

    fn start_cdata(&mut self) -> Result<()> {
        self.push(SaxEvent::StartCdata)
    }

    fn end_cdata(&mut self) -> Result<()> {
        self.push(SaxEvent::EndCdata)
    }

    fn start_entity(&mut self, name: &str) -> Result<()> {
        self.push(SaxEvent::StartEntity(name.to_string()))
    }

    fn end_entity(&mut self, name: &str) -> Result<()> {
        self.push(SaxEvent::EndEntity(name.to_string()))
    }

    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> Result<()> {
        self.push(SaxEvent::StartDtd {
            name: name.to_string(),
            public_id: owned(public_id),
            system_id: owned(system_id),
        })
    }

    fn end_dtd(&mut self) -> Result<()> {
        self.push(SaxEvent::EndDtd)
    }
}

impl DeclHandler for EventRecorder {
    fn element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        self.push(SaxEvent::ElementDecl {
            name: name.to_string(),
            model: model.to_string(),
        })
    }

    fn attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        attr_type: &str,
        mode: Option<&str>,
        value: Option<&str>,
    ) -> Result<()> {
        self.push(SaxEvent::AttributeDecl {
            element: element.to_string(),
            attribute: attribute.to_string(),
            attr_type: attr_type.to_string(),
            mode: owned(mode),
            value: owned(value),
        })
    }

    fn internal_entity_decl(&mut self, name: &str, value: &str) -> Result<()> {
        self.push(SaxEvent::InternalEntityDecl {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn external_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<()> {
        self.push(SaxEvent::ExternalEntityDecl {
            name: name.to_string(),
            public_id: owned(public_id),
            system_id: system_id.to_string(),
        })
    }
}

impl DtdHandler for EventRecorder {
    fn notation_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        self.push(SaxEvent::NotationDecl {
            name: name.to_string(),
            public_id: owned(public_id),
            system_id: owned(system_id),
        })
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation: &str,
    ) -> Result<()> {
        self.push(SaxEvent::UnparsedEntityDecl {
            name: name.to_string(),
            public_id: owned(public_id),
            system_id: system_id.to_string(),
            notation: notation.to_string(),
        })
    }
}
