//! Lyngdorf line protocol
//!
//! Commands go out as `!NAME(args)` terminated by a carriage return. The
//! processor answers with status lines such as `!VOL(-405)` or
//! `!SRC(1,"TV")` and, in verbose mode 2, echoes every accepted command back
//! as `#NAME(args)`. Inbound lines may be terminated by `\r`, `\n` or both.

pub mod commands;

use std::sync::LazyLock;

use regex::Regex;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};
use tracing::warn;

use crate::error::{LyngdorfError, Result};

/// TCP port the processors listen on for network control.
pub const DEFAULT_PORT: u16 = 84;

/// Prefix of outbound commands and inbound status notifications.
pub const COMMAND_PREFIX: char = '!';

/// Prefix of inbound command echoes.
pub const ECHO_PREFIX: char = '#';

/// Longest inbound line accepted. Longer lines are dropped up to the next
/// terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

static MESSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[!#](?P<cmd>\w+)\??(?:\((?P<params>[^)]*)\))?(?:"(?P<string>[^"]*)")?"#)
        .expect("message pattern is valid")
});

static PARAM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*?)"|([^,]+)"#).expect("param pattern is valid"));

/// Whether a line is a status notification or a command echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Status,
    Echo,
}

/// One parsed inbound line
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Event name, e.g. `VOL` for `!VOL(-405)`
    pub name: String,
    /// Parenthesised parameters followed by the trailing quoted string, if any
    pub params: Vec<String>,
    /// The line as received, without terminator
    pub raw: String,
}

impl Message {
    /// Parse a single line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let caps = MESSAGE_PATTERN
            .captures(line)
            .ok_or_else(|| LyngdorfError::ProtocolError(format!("unparseable line: {:?}", line)))?;

        let kind = if line.starts_with(ECHO_PREFIX) {
            MessageKind::Echo
        } else {
            MessageKind::Status
        };

        let mut params = caps
            .name("params")
            .map(|m| split_params(m.as_str()))
            .unwrap_or_default();
        if let Some(trailing) = caps.name("string") {
            params.push(trailing.as_str().to_string());
        }

        Ok(Self {
            kind,
            name: caps["cmd"].to_string(),
            params,
            raw: line.to_string(),
        })
    }

    pub fn is_status(&self) -> bool {
        self.kind == MessageKind::Status
    }

    /// The command text an echo line confirms (`#VOL(-300)` confirms `VOL(-300)`).
    pub fn echoed_command(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Echo => self.raw.strip_prefix(ECHO_PREFIX),
            MessageKind::Status => None,
        }
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn split_params(raw: &str) -> Vec<String> {
    PARAM_PATTERN
        .captures_iter(raw)
        .map(|c| match c.get(1) {
            Some(quoted) => quoted.as_str().to_string(),
            None => c
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

/// Render a command for the wire, without terminator.
pub fn format_command(command: &str) -> String {
    format!("{}{}", COMMAND_PREFIX, command)
}

/// Line framing used on both halves of the socket.
///
/// Reads split on any of `\r` or `\n`; writes terminate with `\r`. A `\r\n`
/// pair yields an empty chunk which callers skip. An overlong line is
/// discarded and also surfaces as an empty chunk, so only I/O errors end the
/// stream.
#[derive(Debug, Clone)]
pub struct LineCodec {
    inner: AnyDelimiterCodec,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\r\n".to_vec(),
                b"\r".to_vec(),
                MAX_LINE_LENGTH,
            ),
        }
    }

    fn skip_overlong(
        result: std::result::Result<Option<Bytes>, AnyDelimiterCodecError>,
    ) -> std::result::Result<Option<Bytes>, AnyDelimiterCodecError> {
        match result {
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                warn!("Dropping inbound line longer than {} bytes", MAX_LINE_LENGTH);
                Ok(Some(Bytes::new()))
            }
            other => other,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, Self::Error> {
        Self::skip_overlong(self.inner.decode(buf))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Bytes>, Self::Error> {
        Self::skip_overlong(self.inner.decode_eof(buf))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = AnyDelimiterCodecError;

    fn encode(&mut self, line: T, buf: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        self.inner.encode(line, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<String> {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Ok(Some(chunk)) = codec.decode(&mut buf) {
            if !chunk.is_empty() {
                out.push(String::from_utf8_lossy(&chunk).to_string());
            }
        }
        out
    }

    #[test]
    fn test_parse_status_with_param() {
        let msg = Message::parse("!VOL(-405)").unwrap();
        assert_eq!(msg.kind, MessageKind::Status);
        assert_eq!(msg.name, "VOL");
        assert_eq!(msg.params, vec!["-405"]);
    }

    #[test]
    fn test_parse_indexed_entry() {
        let msg = Message::parse(r#"!SRC(3,"Blu-ray player")"#).unwrap();
        assert_eq!(msg.name, "SRC");
        assert_eq!(msg.params, vec!["3", "Blu-ray player"]);
    }

    #[test]
    fn test_parse_trailing_string() {
        let msg = Message::parse(r#"!DEVICE"MP-60""#).unwrap();
        assert_eq!(msg.name, "DEVICE");
        assert_eq!(msg.params, vec!["MP-60"]);

        let msg = Message::parse(r#"!SRCNAME(2)"Spotify""#).unwrap();
        assert_eq!(msg.params, vec!["2", "Spotify"]);
    }

    #[test]
    fn test_parse_list_params_are_trimmed() {
        let msg = Message::parse("!AUDTYPE(PCM, 2.0, 48kHz)").unwrap();
        assert_eq!(msg.params, vec!["PCM", "2.0", "48kHz"]);
    }

    #[test]
    fn test_parse_bare_notification() {
        let msg = Message::parse("!MUTEON").unwrap();
        assert_eq!(msg.name, "MUTEON");
        assert!(msg.params.is_empty());
    }

    #[test]
    fn test_parse_echo() {
        let msg = Message::parse("#VOL?").unwrap();
        assert_eq!(msg.kind, MessageKind::Echo);
        assert_eq!(msg.name, "VOL");
        assert_eq!(msg.echoed_command(), Some("VOL?"));
        assert!(!msg.is_status());

        let msg = Message::parse("#VOL(-300)").unwrap();
        assert_eq!(msg.echoed_command(), Some("VOL(-300)"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Message::parse("hello"),
            Err(LyngdorfError::ProtocolError(_))
        ));
        assert!(Message::parse("!").is_err());
        assert!(Message::parse("").is_err());
    }

    #[test]
    fn test_status_has_no_echo() {
        let msg = Message::parse("!VOL(-405)").unwrap();
        assert_eq!(msg.echoed_command(), None);
    }

    #[test]
    fn test_format_command() {
        assert_eq!(format_command("VOL?"), "!VOL?");
        assert_eq!(format_command("SRC(2)"), "!SRC(2)");
    }

    #[test]
    fn test_codec_splits_on_cr_and_lf() {
        let chunks = decode_all(b"!VOL(-405)\r!MUTEOFF\r\n!PWR(ON)\n");
        assert_eq!(chunks, vec!["!VOL(-405)", "!MUTEOFF", "!PWR(ON)"]);
    }

    #[test]
    fn test_codec_skips_overlong_line() {
        let mut input = b"!AUDTYPE(".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_LINE_LENGTH + 1000));
        input.extend_from_slice(b")\r!MUTEON\r");

        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&input[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::new()));

        let chunks = decode_all_from(&mut codec, &mut buf);
        assert_eq!(chunks, vec!["!MUTEON"]);
    }

    fn decode_all_from(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(chunk) = codec.decode(buf).unwrap() {
            if !chunk.is_empty() {
                out.push(String::from_utf8_lossy(&chunk).to_string());
            }
        }
        out
    }

    #[test]
    fn test_codec_encodes_with_cr() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("!VOL?", &mut buf).unwrap();
        assert_eq!(&buf[..], b"!VOL?\r");
    }
}
