//! Error types for serialization.
//!
//! Only structural failures surface here: a sink that refuses a write, a
//! malformed UTF-16 surrogate pair, or an event that arrives when the
//! serializer has nowhere to put it. Escaping problems never become errors;
//! they are recovered locally by writing a numeric character reference.

use std::fmt;
use std::io;

use crate::encoding::EncodingError;

/// The error type returned by every serializer event method.
#[derive(Debug)]
pub enum SerializeError {
    /// The underlying sink failed. The serializer's own state (open tags,
    /// namespace scope) is left as it was before the failing write.
    Io(io::Error),
    /// A high surrogate was not followed by a low surrogate, or a low
    /// surrogate appeared on its own.
    MalformedSurrogate {
        /// The offending lead (or stray trail) code unit.
        high: u16,
        /// The unit that followed it, if there was one.
        low: Option<u16>,
    },
    /// An attribute or namespace declaration arrived with no start tag open
    /// to receive it.
    NoOpenStartTag {
        /// The qualified name of the attribute or `xmlns` declaration.
        name: String,
    },
    /// `end_element` was called with no element open.
    UnbalancedEndElement {
        /// The qualified name passed to `end_element`.
        name: String,
    },
    /// The output encoder could not be set up.
    ///
    /// Reserved for encodings that cannot fall back. The serializer itself
    /// never returns it: an unrecognized label is logged and output falls
    /// back to UTF-8. It exists so callers that resolve labels with
    /// [`EncodingInfo::for_label`](crate::encoding::EncodingInfo::for_label)
    /// can propagate the failure with `?`.
    Encoding(EncodingError),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedSurrogate {
                high,
                low: Some(low),
            } => write!(f, "invalid UTF-16 surrogate pair: {high:x} {low:x}"),
            Self::MalformedSurrogate { high, low: None } => {
                write!(f, "invalid UTF-16 surrogate: {high:x}")
            }
            Self::NoOpenStartTag { name } => {
                write!(f, "no open start tag to receive '{name}'")
            }
            Self::UnbalancedEndElement { name } => {
                write!(f, "end tag '{name}' has no matching start tag")
            }
            Self::Encoding(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<EncodingError> for SerializeError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

/// Shorthand for results produced by the serializer.
pub type Result<T> = std::result::Result<T, SerializeError>;
