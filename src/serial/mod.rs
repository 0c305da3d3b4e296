//! XML, HTML and text serialization.
//!
//! The serializer is assembled from three parts: the character classifier
//! ([`char_info`]), the namespace scope ([`namespaces`]) and the streaming
//! state machine ([`stream`]) that drives both against the output. The
//! [`xml`] module has one-call entry points for recorded event lists.

pub mod char_info;
pub mod entities;
mod escape;
pub mod namespaces;
pub mod options;
pub mod stream;
pub mod xml;

pub use char_info::CharInfo;
pub use namespaces::NamespaceMappings;
pub use options::{ExpandedName, OutputMethod, OutputOptions};
pub use stream::StreamSerializer;
pub use xml::{serialize_events, serialize_events_to_string};
