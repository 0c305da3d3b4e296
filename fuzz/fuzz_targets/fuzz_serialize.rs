#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlstream::sax::{Attribute, SaxEvent};
use xmlstream::serial::{serialize_events_to_string, OutputMethod, OutputOptions};

// Each input byte picks an event; the text between picks feeds the payloads.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let mut events = Vec::new();
    let mut open = Vec::new();
    for (i, chunk) in text.split('|').enumerate() {
        match chunk.bytes().next().unwrap_or(0) % 8 {
            0 => {
                let name = format!("e{}", i % 5);
                events.push(SaxEvent::start(&name, vec![Attribute::new("a", chunk)]));
                open.push(name);
            }
            1 => {
                if let Some(name) = open.pop() {
                    events.push(SaxEvent::end(&name));
                }
            }
            2 => events.push(SaxEvent::StartCdata),
            3 => events.push(SaxEvent::EndCdata),
            4 => events.push(SaxEvent::Comment(chunk.to_string())),
            5 => events.push(SaxEvent::ProcessingInstruction {
                target: "pi".to_string(),
                data: chunk.to_string(),
            }),
            _ => events.push(SaxEvent::text(chunk)),
        }
    }
    while let Some(name) = open.pop() {
        events.push(SaxEvent::end(&name));
    }

    let method = match selector % 3 {
        0 => OutputMethod::Xml,
        1 => OutputMethod::Html,
        _ => OutputMethod::Text,
    };
    let encoding = if selector & 0x10 == 0 { "UTF-8" } else { "US-ASCII" };
    let options = OutputOptions::for_method(method)
        .indent(selector & 0x20 != 0)
        .encoding(encoding);
    // Balanced events never fail to serialize into memory.
    let output = serialize_events_to_string(&events, &options).unwrap();
    if encoding == "US-ASCII" {
        assert!(output.is_ascii());
    }
});
