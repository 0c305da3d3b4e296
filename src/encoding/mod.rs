//! Output encodings.
//!
//! Two pieces live here. [`EncodingInfo`] is the oracle the serializer asks
//! "can this character be written as-is in the target encoding?"; anything it
//! rejects is escaped as a numeric character reference. [`OutputEncoder`] is
//! the sink adapter that turns the serializer's UTF-8 text into bytes of the
//! target encoding, bridging to `encoding_rs` for the legacy encodings.
//!
//! `encoding_rs` follows the WHATWG Encoding Standard, which maps the labels
//! `US-ASCII` and `ISO-8859-1` onto windows-1252. An XML serializer must not
//! emit bytes 0x80-0x9F for a document that declares `US-ASCII`, so those two
//! repertoires are handled here directly.

use std::fmt;
use std::io::{self, Write};

use encoding_rs::{CoderResult, Encoder, Encoding};

/// An error that occurs while resolving an output encoding.
#[derive(Debug, Clone)]
pub struct EncodingError {
    /// A human-readable description of the encoding error.
    pub message: String,
}

impl EncodingError {
    /// Creates a new `EncodingError` with the given message.
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error: {}", self.message)
    }
}

impl std::error::Error for EncodingError {}

/// The set of characters an encoding can represent.
#[derive(Debug, Clone, Copy)]
enum Repertoire {
    /// Every Unicode scalar value (UTF-8, UTF-16).
    Unicode,
    /// U+0000..=U+007F.
    Ascii,
    /// U+0000..=U+00FF.
    Latin1,
    /// Whatever the `encoding_rs` encoder can map.
    Table(&'static Encoding),
    /// The encoding was not recognized; everything is assumed representable.
    Unknown,
}

/// Answers whether a character is representable in the output encoding.
///
/// # Examples
///
/// ```
/// use xmlstream::encoding::EncodingInfo;
///
/// let ascii = EncodingInfo::for_label("US-ASCII").unwrap();
/// assert!(ascii.is_in_encoding('a'));
/// assert!(!ascii.is_in_encoding('é'));
///
/// let utf8 = EncodingInfo::for_label("utf-8").unwrap();
/// assert!(utf8.is_in_encoding('é'));
/// ```
#[derive(Debug, Clone)]
pub struct EncodingInfo {
    name: String,
    repertoire: Repertoire,
}

impl EncodingInfo {
    /// Resolves an encoding label (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the label names no known encoding.
    pub fn for_label(label: &str) -> Result<Self, EncodingError> {
        let upper = label.trim().to_ascii_uppercase();
        let repertoire = match upper.as_str() {
            "UTF-8" | "UTF8" | "UTF-16" | "UTF-16BE" | "UTF-16LE" => Repertoire::Unicode,
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" => Repertoire::Ascii,
            "ISO-8859-1" | "ISO8859-1" | "ISO_8859-1" | "LATIN1" | "L1" => Repertoire::Latin1,
            _ => {
                let encoding = Encoding::for_label(upper.as_bytes())
                    .filter(|e| *e != encoding_rs::REPLACEMENT)
                    .ok_or_else(|| {
                        EncodingError::new(format!("unsupported encoding: {label}"))
                    })?;
                if encoding == encoding_rs::UTF_8
                    || encoding == encoding_rs::UTF_16BE
                    || encoding == encoding_rs::UTF_16LE
                {
                    Repertoire::Unicode
                } else {
                    Repertoire::Table(encoding)
                }
            }
        };
        Ok(Self {
            name: upper,
            repertoire,
        })
    }

    /// UTF-8, the default output encoding.
    #[must_use]
    pub fn utf8() -> Self {
        Self {
            name: "UTF-8".to_string(),
            repertoire: Repertoire::Unicode,
        }
    }

    /// An encoding that could not be resolved. Every character is treated as
    /// representable; only the fixed control-character rules still apply.
    #[must_use]
    pub fn unknown(label: &str) -> Self {
        Self {
            name: label.to_string(),
            repertoire: Repertoire::Unknown,
        }
    }

    /// The normalized (upper-case) name, as written in the XML declaration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `false` for an encoding built with [`EncodingInfo::unknown`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self.repertoire, Repertoire::Unknown)
    }

    /// Returns `true` if `ch` can be written verbatim.
    #[must_use]
    pub fn is_in_encoding(&self, ch: char) -> bool {
        match self.repertoire {
            Repertoire::Unicode | Repertoire::Unknown => true,
            Repertoire::Ascii => ch.is_ascii(),
            Repertoire::Latin1 => u32::from(ch) <= 0xFF,
            Repertoire::Table(encoding) => {
                if ch.is_ascii() {
                    return true;
                }
                let mut buf = [0u8; 4];
                let (_, _, unmappable) = encoding.encode(ch.encode_utf8(&mut buf));
                !unmappable
            }
        }
    }

    /// Builds the byte-level encoder for this encoding around `writer`.
    pub fn new_encoder<W: Write>(&self, writer: W) -> OutputEncoder<W> {
        let kind = match self.repertoire {
            Repertoire::Unicode if self.name == "UTF-16" || self.name == "UTF-16BE" => {
                EncoderKind::Utf16 { big_endian: true }
            }
            Repertoire::Unicode if self.name == "UTF-16LE" => {
                EncoderKind::Utf16 { big_endian: false }
            }
            Repertoire::Unicode | Repertoire::Unknown => EncoderKind::Utf8,
            Repertoire::Ascii => EncoderKind::SingleByte { max: 0x7F },
            Repertoire::Latin1 => EncoderKind::SingleByte { max: 0xFF },
            Repertoire::Table(encoding) => EncoderKind::Legacy(encoding.new_encoder()),
        };
        OutputEncoder {
            writer,
            kind,
            buf: Vec::new(),
        }
    }
}

impl EncodingInfo {
    /// Decodes bytes produced by this encoding's [`OutputEncoder`] back into
    /// text.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        let encoding = match self.repertoire {
            Repertoire::Table(encoding) => encoding,
            Repertoire::Unicode if self.name == "UTF-16" || self.name == "UTF-16BE" => {
                encoding_rs::UTF_16BE
            }
            Repertoire::Unicode if self.name == "UTF-16LE" => encoding_rs::UTF_16LE,
            // Output never holds bytes 0x80-0x9F, where windows-1252 and
            // ISO-8859-1 differ.
            Repertoire::Ascii | Repertoire::Latin1 => encoding_rs::WINDOWS_1252,
            Repertoire::Unicode | Repertoire::Unknown => encoding_rs::UTF_8,
        };
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

impl Default for EncodingInfo {
    fn default() -> Self {
        Self::utf8()
    }
}

enum EncoderKind {
    Utf8,
    Utf16 { big_endian: bool },
    SingleByte { max: u32 },
    Legacy(Encoder),
}

/// A sink adapter that encodes UTF-8 text into the output encoding.
///
/// Characters the target encoding cannot represent are written as decimal
/// numeric character references, so encoding never fails. The serializer
/// escapes text and attribute content before it reaches the encoder; this
/// fallback only matters for names, comments and processing instructions.
pub struct OutputEncoder<W: Write> {
    writer: W,
    kind: EncoderKind,
    buf: Vec<u8>,
}

impl<W: Write> fmt::Debug for OutputEncoder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            EncoderKind::Utf8 => "UTF-8",
            EncoderKind::Utf16 { big_endian: true } => "UTF-16BE",
            EncoderKind::Utf16 { big_endian: false } => "UTF-16LE",
            EncoderKind::SingleByte { max: 0x7F } => "US-ASCII",
            EncoderKind::SingleByte { .. } => "ISO-8859-1",
            EncoderKind::Legacy(encoder) => encoder.encoding().name(),
        };
        f.debug_struct("OutputEncoder").field("kind", &kind).finish()
    }
}

impl<W: Write> OutputEncoder<W> {
    /// Encodes and writes `s`.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying writer.
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        match &mut self.kind {
            EncoderKind::Utf8 => return self.writer.write_all(s.as_bytes()),
            EncoderKind::Utf16 { big_endian } => {
                let big_endian = *big_endian;
                self.buf.clear();
                for unit in s.encode_utf16() {
                    let bytes = if big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    self.buf.extend_from_slice(&bytes);
                }
            }
            EncoderKind::SingleByte { max } => {
                let max = *max;
                self.buf.clear();
                for ch in s.chars() {
                    let code = u32::from(ch);
                    match u8::try_from(code) {
                        Ok(byte) if code <= max => self.buf.push(byte),
                        _ => {
                            let _ = write!(self.buf, "&#{code};");
                        }
                    }
                }
            }
            EncoderKind::Legacy(encoder) => {
                self.buf.clear();
                encode_legacy(encoder, s, &mut self.buf, false);
            }
        }
        self.writer.write_all(&self.buf)
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Emits any trailing bytes a stateful encoding still owes (for example
    /// the shift back to ASCII in ISO-2022-JP) and flushes.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying writer.
    pub fn finish(&mut self) -> io::Result<()> {
        if let EncoderKind::Legacy(encoder) = &mut self.kind {
            self.buf.clear();
            encode_legacy(encoder, "", &mut self.buf, true);
            self.writer.write_all(&self.buf)?;
        }
        self.writer.flush()
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consumes the encoder, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Runs the `encoding_rs` encoder over `src`, growing `dst` until all input
/// is consumed.
fn encode_legacy(encoder: &mut Encoder, src: &str, dst: &mut Vec<u8>, last: bool) {
    let mut consumed = 0;
    loop {
        let remaining = src.len() - consumed;
        let needed = encoder
            .max_buffer_length_from_utf8_if_no_unmappables(remaining)
            .unwrap_or(remaining * 4);
        // Room for one numeric character reference on top of the estimate.
        dst.reserve(needed + 16);
        let (result, read, _) = encoder.encode_from_utf8_to_vec(&src[consumed..], dst, last);
        consumed += read;
        match result {
            CoderResult::InputEmpty => break,
            CoderResult::OutputFull => {}
        }
    }
}

/// Returns `true` if the label is a recognized alias for UTF-8.
pub(crate) fn is_utf8_label(label: &str) -> bool {
    matches!(label.to_ascii_uppercase().as_str(), "UTF-8" | "UTF8")
}
