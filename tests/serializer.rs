//! End-to-end tests for the streaming serializer.
//!
//! Each test drives a `StreamSerializer` through the handler traits and
//! checks the exact bytes written.

#![allow(clippy::unwrap_used)]

use std::cell::Cell;
use std::io::{self, Write};
use std::rc::Rc;

use xmlstream::sax::{
    replay, Attribute, ContentHandler, DeclHandler, DtdHandler, LexicalHandler, SaxEvent,
};
use xmlstream::serial::stream::PI_DISABLE_OUTPUT_ESCAPING;
use xmlstream::{OutputMethod, OutputOptions, SerializeError, StreamSerializer};

fn fragment_options() -> OutputOptions {
    OutputOptions::default().omit_xml_declaration(true)
}

fn run(options: OutputOptions, events: &[SaxEvent]) -> String {
    let mut ser = StreamSerializer::new(Vec::new(), options);
    replay(events, &mut ser).unwrap();
    String::from_utf8(ser.into_inner()).unwrap()
}

fn element(name: &str, body: Vec<SaxEvent>) -> Vec<SaxEvent> {
    let mut events = vec![SaxEvent::start(name, Vec::new())];
    events.extend(body);
    events.push(SaxEvent::end(name));
    events
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

#[test]
fn test_text_escaping_fragment() {
    let mut ser = StreamSerializer::new(Vec::new(), OutputOptions::default());
    ser.start_element("", "p", "p", &[]).unwrap();
    ser.characters("1 < 2 & 3").unwrap();
    ser.end_element("", "p", "p").unwrap();
    assert_eq!(ser.into_inner(), b"<p>1 &lt; 2 &amp; 3</p>");
}

#[test]
fn test_attribute_never_contains_raw_quote() {
    let events = [
        SaxEvent::start("a", vec![Attribute::new("t", "\"quoted\" 'single'")]),
        SaxEvent::end("a"),
    ];
    let xml = run(fragment_options(), &events);
    assert_eq!(xml, "<a t=\"&quot;quoted&quot; 'single'\"/>");
}

#[test]
fn test_quote_in_text_is_literal() {
    let xml = run(fragment_options(), &element("q", vec![SaxEvent::text("\"hi\"")]));
    assert_eq!(xml, "<q>\"hi\"</q>");
}

#[test]
fn test_ascii_output_uses_char_refs() {
    let options = fragment_options().encoding("US-ASCII");
    let events = element(
        "p",
        vec![SaxEvent::text("\u{E9}\u{20AC}\u{1D11E}")],
    );
    assert_eq!(run(options, &events), "<p>&#233;&#8364;&#119070;</p>");
}

#[test]
fn test_latin1_output_bytes() {
    let options = fragment_options().encoding("ISO-8859-1");
    let mut ser = StreamSerializer::new(Vec::new(), options);
    replay(&element("p", vec![SaxEvent::text("\u{E9}\u{20AC}")]), &mut ser).unwrap();
    assert_eq!(ser.into_inner(), b"<p>\xE9&#8364;</p>");
}

#[test]
fn test_unknown_encoding_passes_everything() {
    let options = OutputOptions::default().encoding("x-made-up");
    let events = [
        SaxEvent::StartDocument,
        SaxEvent::start("p", Vec::new()),
        SaxEvent::text("\u{E9}"),
        SaxEvent::end("p"),
        SaxEvent::EndDocument,
    ];
    assert_eq!(
        run(options, &events),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<p>\u{E9}</p>"
    );
}

#[test]
fn test_crlf_line_separator() {
    let options = fragment_options().line_separator("\r\n");
    let xml = run(options, &element("p", vec![SaxEvent::text("a\nb\rc")]));
    assert_eq!(xml, "<p>a\r\nb&#13;c</p>");
}

#[test]
fn test_control_characters() {
    let xml = run(
        fragment_options(),
        &element("p", vec![SaxEvent::text("\u{0}\u{7}\u{7F}\u{85}\u{2028}")]),
    );
    assert_eq!(xml, "<p>&#0;&#7;&#127;&#133;&#8232;</p>");
}

// ---------------------------------------------------------------------------
// CDATA
// ---------------------------------------------------------------------------

#[test]
fn test_cdata_chunks_merge() {
    let events = element(
        "c",
        vec![
            SaxEvent::StartCdata,
            SaxEvent::text("ab"),
            SaxEvent::text("cd"),
            SaxEvent::EndCdata,
        ],
    );
    assert_eq!(run(fragment_options(), &events), "<c><![CDATA[abcd]]></c>");
}

#[test]
fn test_cdata_never_contains_terminator() {
    let events = element(
        "c",
        vec![
            SaxEvent::StartCdata,
            SaxEvent::text("ab"),
            SaxEvent::text("]]"),
            SaxEvent::text(">cd"),
            SaxEvent::EndCdata,
        ],
    );
    let xml = run(fragment_options(), &events);
    assert_eq!(xml, "<c><![CDATA[ab]]]]><![CDATA[>cd]]></c>");
    for section in xml.split("<![CDATA[").skip(1) {
        let body = section.split("]]>").next().unwrap();
        assert!(!body.contains("]]>"));
    }
}

#[test]
fn test_comment_closes_cdata() {
    let events = element(
        "c",
        vec![
            SaxEvent::StartCdata,
            SaxEvent::text("x"),
            SaxEvent::Comment("note".to_string()),
            SaxEvent::text("y"),
            SaxEvent::EndCdata,
        ],
    );
    assert_eq!(
        run(fragment_options(), &events),
        "<c><![CDATA[x]]><!--note--><![CDATA[y]]></c>"
    );
}

#[test]
fn test_cdata_section_elements_by_namespace() {
    let options = fragment_options().cdata_section_elements_list("{urn:s}code");
    let mut ser = StreamSerializer::new(Vec::new(), options);
    ser.start_element("urn:s", "code", "s:code", &[]).unwrap();
    ser.characters("if a<b").unwrap();
    ser.end_element("urn:s", "code", "s:code").unwrap();
    ser.start_element("", "code", "code", &[]).unwrap();
    ser.characters("a<b").unwrap();
    ser.end_element("", "code", "code").unwrap();
    assert_eq!(
        String::from_utf8(ser.into_inner()).unwrap(),
        "<s:code xmlns:s=\"urn:s\"><![CDATA[if a<b]]></s:code><code>a&lt;b</code>"
    );
}

// ---------------------------------------------------------------------------
// Indentation
// ---------------------------------------------------------------------------

fn indented(amount: usize) -> OutputOptions {
    fragment_options().indent(true).indent_amount(amount)
}

#[test]
fn test_indent_is_deterministic() {
    let events = element(
        "a",
        vec![
            SaxEvent::start("b", Vec::new()),
            SaxEvent::end("b"),
            SaxEvent::start("b", Vec::new()),
            SaxEvent::end("b"),
        ],
    );
    let first = run(indented(2), &events);
    let second = run(indented(2), &events);
    assert_eq!(first, "<a>\n  <b/>\n  <b/>\n</a>");
    assert_eq!(first, second);
}

#[test]
fn test_mixed_content_is_not_indented() {
    let events = element(
        "a",
        vec![
            SaxEvent::text("text"),
            SaxEvent::start("b", Vec::new()),
            SaxEvent::end("b"),
        ],
    );
    assert_eq!(run(indented(2), &events), "<a>text<b/></a>");
}

#[test]
fn test_whitespace_text_suppresses_next_indent_only() {
    let events = element(
        "a",
        vec![
            SaxEvent::text("  "),
            SaxEvent::start("b", Vec::new()),
            SaxEvent::end("b"),
            SaxEvent::start("c", Vec::new()),
            SaxEvent::end("c"),
        ],
    );
    assert_eq!(run(indented(1), &events), "<a>  <b/>\n <c/>\n</a>");
}

#[test]
fn test_nested_indentation() {
    let events = element(
        "a",
        element("b", element("c", vec![SaxEvent::text("t")])),
    );
    assert_eq!(
        run(indented(2), &events),
        "<a>\n  <b>\n    <c>t</c>\n  </b>\n</a>"
    );
}

// ---------------------------------------------------------------------------
// DOCTYPE and declarations
// ---------------------------------------------------------------------------

#[test]
fn test_doctype_from_options() {
    let options = OutputOptions::default().doctype_system("doc.dtd");
    let events = [
        SaxEvent::StartDocument,
        SaxEvent::start("doc", Vec::new()),
        SaxEvent::end("doc"),
        SaxEvent::EndDocument,
    ];
    assert_eq!(
        run(options, &events),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE doc SYSTEM \"doc.dtd\">\n<doc/>"
    );
}

#[test]
fn test_internal_subset() {
    let mut ser = StreamSerializer::new(Vec::new(), fragment_options());
    ser.start_document().unwrap();
    ser.start_dtd("doc", None, Some("doc.dtd")).unwrap();
    ser.element_decl("doc", "(#PCDATA)").unwrap();
    ser.attribute_decl("doc", "id", "ID", Some("#IMPLIED"), None).unwrap();
    ser.attribute_decl("doc", "kind", "CDATA", None, Some("plain")).unwrap();
    ser.internal_entity_decl("who", "world").unwrap();
    ser.external_entity_decl("chap", Some("-//X//Chapter"), "chap.xml").unwrap();
    ser.notation_decl("gif", None, Some("image/gif")).unwrap();
    ser.unparsed_entity_decl("logo", None, "logo.gif", "gif").unwrap();
    ser.end_dtd().unwrap();
    ser.start_element("", "doc", "doc", &[]).unwrap();
    ser.end_element("", "doc", "doc").unwrap();
    ser.end_document().unwrap();
    assert_eq!(
        String::from_utf8(ser.into_inner()).unwrap(),
        "<!DOCTYPE doc SYSTEM \"doc.dtd\" [\n\
         <!ELEMENT doc (#PCDATA)>\n\
         <!ATTLIST doc id ID #IMPLIED>\n\
         <!ATTLIST doc kind CDATA \"plain\">\n\
         <!ENTITY who \"world\">\n\
         <!ENTITY chap PUBLIC \"-//X//Chapter\" \"chap.xml\">\n\
         <!NOTATION gif SYSTEM \"image/gif\">\n\
         <!ENTITY logo SYSTEM \"logo.gif\" NDATA gif>\n\
         ]>\n<doc/>"
    );
}

#[test]
fn test_dtd_without_declarations() {
    let events = [
        SaxEvent::StartDtd {
            name: "html".to_string(),
            public_id: Some("-//W3C//DTD XHTML 1.0 Strict//EN".to_string()),
            system_id: Some("strict.dtd".to_string()),
        },
        SaxEvent::EndDtd,
        SaxEvent::start("br", Vec::new()),
        SaxEvent::end("br"),
    ];
    assert_eq!(
        run(fragment_options(), &events),
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \"strict.dtd\">\n<br />"
    );
}

#[test]
fn test_external_subset_declarations_are_skipped() {
    let mut ser = StreamSerializer::new(Vec::new(), fragment_options());
    ser.start_dtd("doc", None, Some("doc.dtd")).unwrap();
    ser.start_entity("[dtd]").unwrap();
    ser.element_decl("doc", "EMPTY").unwrap();
    ser.end_entity("[dtd]").unwrap();
    ser.end_dtd().unwrap();
    assert_eq!(
        String::from_utf8(ser.into_inner()).unwrap(),
        "<!DOCTYPE doc SYSTEM \"doc.dtd\">\n"
    );
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

#[test]
fn test_html_script_is_raw() {
    let options = OutputOptions::for_method(OutputMethod::Html);
    let events = element("script", vec![SaxEvent::text("if (a < b && c) {}")]);
    assert_eq!(run(options, &events), "<script>if (a < b && c) {}</script>");
}

#[test]
fn test_html_doctype_and_pi() {
    let options = OutputOptions::for_method(OutputMethod::Html)
        .doctype_public("-//W3C//DTD HTML 4.01//EN");
    let events = [
        SaxEvent::StartDocument,
        SaxEvent::start("HTML", Vec::new()),
        SaxEvent::ProcessingInstruction {
            target: "pi".to_string(),
            data: "x".to_string(),
        },
        SaxEvent::start("HR", Vec::new()),
        SaxEvent::end("HR"),
        SaxEvent::end("HTML"),
        SaxEvent::EndDocument,
    ];
    assert_eq!(
        run(options, &events),
        "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01//EN\">\n<HTML><?pi x><HR></HTML>"
    );
}

// ---------------------------------------------------------------------------
// Escaping control and entities
// ---------------------------------------------------------------------------

#[test]
fn test_non_escaping_region_keeps_structure() {
    let mut ser = StreamSerializer::new(Vec::new(), fragment_options());
    ser.start_element("", "a", "a", &[]).unwrap();
    ser.start_non_escaping();
    ser.characters("<raw/>").unwrap();
    ser.end_non_escaping();
    ser.end_element("", "a", "a").unwrap();
    assert_eq!(ser.into_inner(), b"<a><raw/></a>");
}

#[test]
fn test_disable_output_escaping_pi_is_not_written() {
    let events = element(
        "a",
        vec![
            SaxEvent::ProcessingInstruction {
                target: PI_DISABLE_OUTPUT_ESCAPING.to_string(),
                data: String::new(),
            },
            SaxEvent::text("&amp;"),
        ],
    );
    assert_eq!(run(fragment_options(), &events), "<a>&amp;</a>");
}

#[test]
fn test_skipped_entity_is_written_as_reference() {
    let events = element("a", vec![SaxEvent::SkippedEntity("ext".to_string())]);
    assert_eq!(run(fragment_options(), &events), "<a>&ext;</a>");
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A sink that fails while its shared switch is set.
struct SwitchableWriter {
    failing: Rc<Cell<bool>>,
    bytes: Vec<u8>,
}

impl Write for SwitchableWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.get() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "sink busy"));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_sink_failure_is_propagated() {
    let mut ser = StreamSerializer::new(FailingWriter, OutputOptions::default());
    let err = ser.start_document().unwrap_err();
    match err {
        SerializeError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected an I/O error, got {other}"),
    }
}

#[test]
fn test_sink_failure_leaves_start_tag_open() {
    let mut ser = StreamSerializer::new(FailingWriter, fragment_options());
    ser.start_element("", "a", "a", &[]).unwrap();
    assert!(ser.characters("x").is_err());
    // The start tag was never written, so attributes can still be added.
    ser.add_attribute("", "id", "id", "CDATA", "1").unwrap();
}

#[test]
fn test_unbalanced_end_element() {
    let events = [SaxEvent::start("a", Vec::new()), SaxEvent::end("a"), SaxEvent::end("a")];
    let mut ser = StreamSerializer::new(Vec::new(), fragment_options());
    let err = replay(&events, &mut ser).unwrap_err();
    assert_eq!(err.to_string(), "end tag 'a' has no matching start tag");
}

#[test]
fn test_cdata_helper_splits_terminator() {
    let mut ser = StreamSerializer::new(Vec::new(), fragment_options());
    ser.start_element("", "a", "a", &[]).unwrap();
    ser.cdata("a]]>b").unwrap();
    ser.end_element("", "a", "a").unwrap();
    assert_eq!(
        String::from_utf8(ser.into_inner()).unwrap(),
        "<a><![CDATA[a]]]]><![CDATA[>b]]></a>"
    );
}

#[test]
fn test_failed_end_tag_keeps_cdata_open() {
    let failing = Rc::new(Cell::new(false));
    let writer = SwitchableWriter {
        failing: Rc::clone(&failing),
        bytes: Vec::new(),
    };
    let mut ser = StreamSerializer::new(writer, fragment_options());
    ser.start_element("", "a", "a", &[]).unwrap();
    ser.start_cdata().unwrap();
    ser.characters("x").unwrap();

    failing.set(true);
    assert!(ser.end_element("", "a", "a").is_err());
    failing.set(false);
    ser.end_element("", "a", "a").unwrap();

    let bytes = ser.into_inner().bytes;
    assert_eq!(String::from_utf8(bytes).unwrap(), "<a><![CDATA[x]]></a>");
}
