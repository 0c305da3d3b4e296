//! # xmlstream
//!
//! A streaming XML/HTML serializer. Structural events go in through
//! SAX2-style handler traits; correctly escaped, namespace-scoped markup
//! comes out, written incrementally to any [`std::io::Write`].
//!
//! ## Quick Start
//!
//! ```
//! use xmlstream::sax::{Attribute, ContentHandler, LexicalHandler};
//! use xmlstream::{OutputOptions, StreamSerializer};
//!
//! let options = OutputOptions::default().indent(true).indent_amount(2);
//! let mut ser = StreamSerializer::new(Vec::new(), options);
//!
//! ser.start_document().unwrap();
//! ser.start_element("urn:books", "shelf", "b:shelf", &[]).unwrap();
//! ser.start_element("urn:books", "book", "b:book", &[Attribute::new("title", "Q&A")]).unwrap();
//! ser.end_element("urn:books", "book", "b:book").unwrap();
//! ser.comment("more soon").unwrap();
//! ser.end_element("urn:books", "shelf", "b:shelf").unwrap();
//! ser.end_document().unwrap();
//!
//! let xml = String::from_utf8(ser.into_inner()).unwrap();
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
//!      <b:shelf xmlns:b=\"urn:books\">\n  \
//!      <b:book title=\"Q&amp;A\"/>\n  \
//!      <!--more soon-->\n\
//!      </b:shelf>\n"
//! );
//! ```

pub mod encoding;
pub mod error;
pub mod sax;
pub mod serial;
pub mod util;

pub use error::{Result, SerializeError};
pub use serial::{CharInfo, NamespaceMappings, OutputMethod, OutputOptions, StreamSerializer};
