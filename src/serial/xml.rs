//! One-call serialization of a recorded event list.

use std::io::Write;

use super::options::OutputOptions;
use super::stream::StreamSerializer;
use crate::error::Result;
use crate::sax::{replay, SaxEvent};

/// Serializes `events` to `writer` and returns the writer.
///
/// The events are replayed as recorded; a list without
/// [`SaxEvent::StartDocument`] produces a fragment with no XML declaration.
/// The writer is flushed.
///
/// # Errors
///
/// Returns the first error the serializer reports.
///
/// # Examples
///
/// ```
/// use xmlstream::sax::{Attribute, SaxEvent};
/// use xmlstream::serial::{serialize_events, OutputOptions};
///
/// let events = [
///     SaxEvent::start("a", vec![Attribute::new("href", "?x=1&y=2")]),
///     SaxEvent::end("a"),
/// ];
/// let bytes = serialize_events(&events, Vec::new(), &OutputOptions::default()).unwrap();
/// assert_eq!(bytes, b"<a href=\"?x=1&amp;y=2\"/>");
/// ```
pub fn serialize_events<W: Write>(
    events: &[SaxEvent],
    writer: W,
    options: &OutputOptions,
) -> Result<W> {
    let mut serializer = StreamSerializer::new(writer, options.clone());
    replay(events, &mut serializer)?;
    serializer.flush()?;
    Ok(serializer.into_inner())
}

/// Serializes `events` to a string.
///
/// Escaping still follows `options.encoding`: a character the encoding
/// cannot represent comes out as a numeric character reference.
///
/// # Errors
///
/// Returns the first error the serializer reports.
///
/// # Examples
///
/// ```
/// use xmlstream::sax::SaxEvent;
/// use xmlstream::serial::{serialize_events_to_string, OutputOptions};
///
/// let events = [
///     SaxEvent::StartDocument,
///     SaxEvent::start("p", Vec::new()),
///     SaxEvent::text("caf\u{e9}"),
///     SaxEvent::end("p"),
///     SaxEvent::EndDocument,
/// ];
/// let options = OutputOptions::default().encoding("US-ASCII");
/// let xml = serialize_events_to_string(&events, &options).unwrap();
/// assert_eq!(xml, "<?xml version=\"1.0\" encoding=\"US-ASCII\"?>\n<p>caf&#233;</p>");
/// ```
pub fn serialize_events_to_string(events: &[SaxEvent], options: &OutputOptions) -> Result<String> {
    let bytes = serialize_events(events, Vec::new(), options)?;
    Ok(options.encoding_info().decode(&bytes))
}
