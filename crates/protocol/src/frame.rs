use crate::packet::RfPlayerPacket;
use log::{debug, warn};

pub const END_OF_LINE: &str = "\n\r";
pub const PACKET_HEADER_LEN: usize = 5;

pub const COMMAND_HEADER: &str = "ZIA++";
pub const SIMPLE_HEADER: &str = "ZIA--";
pub const JSON_HEADER: &str = "ZIA33";
/// Binary and XML formats the gateway can emit but that are not decoded here.
pub const UNSUPPORTED_HEADERS: [&str; 5] = ["ZIA00", "ZIA11", "ZIA22", "ZIA44", "ZIA66"];

pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const LINE_TRIM: [char; 4] = ['\0', ' ', '\t', '\r'];

/// Encode a command line for the gateway.
pub fn encode_command(command: &str) -> Vec<u8> {
    format!("{COMMAND_HEADER}{command}{END_OF_LINE}").into_bytes()
}

/// Assembles the incoming byte stream into per-line packets.
///
/// Bytes are buffered undecoded so a UTF-8 sequence split across two reads
/// survives; decoding happens once a full line is available.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    discarding: bool,
    max_line: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that discards lines longer than `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
            max_line,
        }
    }

    /// Bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn decode(&mut self, data: &[u8]) -> Vec<RfPlayerPacket> {
        debug!("received data: {:?}", String::from_utf8_lossy(data));
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line {
                warn!("dropping oversized line ({} bytes)", line.len());
                continue;
            }
            if let Some(packet) = decode_line(line) {
                packets.push(packet);
            }
        }

        if self.buffer.len() > self.max_line {
            warn!(
                "dropping oversized partial line ({} bytes)",
                self.buffer.len()
            );
            self.buffer.clear();
            self.discarding = true;
        }

        packets
    }
}

fn decode_line(line: &[u8]) -> Option<RfPlayerPacket> {
    let Ok(text) = std::str::from_utf8(line) else {
        warn!(
            "Error during decode of data, invalid data: {}",
            String::from_utf8_lossy(line)
        );
        return None;
    };

    let text = text.trim_matches(&LINE_TRIM[..]);
    if text.len() <= PACKET_HEADER_LEN {
        warn!("dropping invalid data: {text:?}");
        return None;
    }

    parse_packet(text)
}

/// Dispatch one trimmed line on its 5-char header.
pub fn parse_packet(raw_packet: &str) -> Option<RfPlayerPacket> {
    let (Some(header), Some(body)) = (
        raw_packet.get(..PACKET_HEADER_LEN),
        raw_packet.get(PACKET_HEADER_LEN..),
    ) else {
        warn!("dropping invalid packet: {raw_packet}");
        return None;
    };

    match header {
        SIMPLE_HEADER => Some(RfPlayerPacket::Simple(body.to_string())),
        JSON_HEADER => match serde_json::from_str(body) {
            Ok(value) => Some(RfPlayerPacket::Json(value)),
            Err(err) => {
                warn!("dropping malformed JSON packet: {err}");
                debug!("packet body: {body}");
                None
            }
        },
        h if UNSUPPORTED_HEADERS.contains(&h) => {
            warn!("unsupported packet format: {h}");
            debug!("packet body: {body}");
            None
        }
        _ => {
            warn!("dropping invalid packet: {raw_packet}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn encodes_commands_with_header_and_terminator() {
        assert_eq!(encode_command("FORMAT JSON"), b"ZIA++FORMAT JSON\n\r".to_vec());
    }

    #[test]
    fn decodes_single_json_packet() {
        let mut decoder = FrameDecoder::new();
        let packets = decoder.decode(b"ZIA33{\"foo\": \"bar\"}\n\r");
        assert_eq!(packets, vec![RfPlayerPacket::Json(json!({"foo": "bar"}))]);
    }

    #[test]
    fn decodes_multiple_packets_in_one_read() {
        let mut decoder = FrameDecoder::new();
        let packets = decoder.decode(b"ZIA33{\"foo1\": \"bar1\"}\n\rZIA33{\"foo2\": \"bar2\"}\n\r");
        assert_eq!(
            packets,
            vec![
                RfPlayerPacket::Json(json!({"foo1": "bar1"})),
                RfPlayerPacket::Json(json!({"foo2": "bar2"})),
            ]
        );
    }

    #[test]
    fn decodes_simple_packet() {
        let mut decoder = FrameDecoder::new();
        let packets = decoder.decode(b"ZIA--Hello world!\n\r");
        assert_eq!(packets, vec![RfPlayerPacket::Simple("Hello world!".into())]);
    }

    #[test]
    fn keeps_incomplete_line_until_next_read() {
        let mut decoder = FrameDecoder::new();
        let first = decoder.decode(b"ZIA33{\"foo1\": \"bar1\"}\n\r\n\rZIA33");
        assert_eq!(first, vec![RfPlayerPacket::Json(json!({"foo1": "bar1"}))]);
        assert!(decoder.pending() > 0);

        let second = decoder.decode(b"{\"foo2\": \"bar2\"}\n\r");
        assert_eq!(second, vec![RfPlayerPacket::Json(json!({"foo2": "bar2"}))]);
    }

    #[test]
    fn strips_padding_around_packets() {
        let mut decoder = FrameDecoder::new();
        let packets = decoder.decode(b"\r\0 ZIA33{\"foo\": \"bar\"}\t\n\r");
        assert_eq!(packets, vec![RfPlayerPacket::Json(json!({"foo": "bar"}))]);
    }

    #[test]
    fn drops_header_only_and_unknown_packets() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"ZIA33\n\r").is_empty());
        assert!(decoder.decode(b"ZIA11AABBCC\n\r").is_empty());
        assert!(decoder.decode(b"HELLO WORLD\n\r").is_empty());
        assert!(decoder.decode(b"ZIA33{not json}\n\r").is_empty());
    }

    #[test]
    fn survives_utf8_sequence_split_across_reads() {
        let mut decoder = FrameDecoder::new();
        let line = "ZIA--température\n\r".as_bytes();
        let split = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        assert!(decoder.decode(&line[..split]).is_empty());
        let packets = decoder.decode(&line[split..]);
        assert_eq!(packets, vec![RfPlayerPacket::Simple("température".into())]);
    }

    #[test]
    fn drops_invalid_utf8_line_and_continues() {
        let mut decoder = FrameDecoder::new();
        let packets = decoder.decode(b"ZIA--\xff\xfe\n\rZIA--ok line\n\r");
        assert_eq!(packets, vec![RfPlayerPacket::Simple("ok line".into())]);
    }

    #[test]
    fn discards_oversized_partial_line() {
        let mut decoder = FrameDecoder::with_max_line(64);
        let mut payload = b"ZIA--".to_vec();
        payload.extend(std::iter::repeat(b'a').take(70));
        assert!(decoder.decode(&payload).is_empty());
        assert_eq!(decoder.pending(), 0);

        let packets = decoder.decode(b"tail of long line\n\rZIA--next\n\r");
        assert_eq!(packets, vec![RfPlayerPacket::Simple("next".into())]);
    }

    #[test]
    fn default_limit_accepts_large_lines_below_one_mebibyte() {
        let mut decoder = FrameDecoder::new();
        let mut line = b"ZIA--".to_vec();
        line.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES - 64));
        line.extend_from_slice(b"\n\r");
        let packets = decoder.decode(&line);
        assert_eq!(packets.len(), 1);

        let mut oversized = b"ZIA--".to_vec();
        oversized.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES));
        oversized.extend_from_slice(b"\n\rZIA--next\n\r");
        assert_eq!(
            decoder.decode(&oversized),
            vec![RfPlayerPacket::Simple("next".into())]
        );
    }
}
