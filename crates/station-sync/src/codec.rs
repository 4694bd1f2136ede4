//! # Wire Codec
//!
//! Every command and reply exchanged with a node is one binary frame holding
//! a short list of text and binary parts.
//!
//! ## Frame Layout
//! ```text
//! ┌──────┬──────────────────────────────────────┬──────────────────────────┐
//! │ N    │ N header entries, 5 bytes each       │ payloads, in part order  │
//! │ (u8) │ ┌──────┬───────────────────────────┐ │                          │
//! │      │ │ type │ offset (u32, little end.) │ │ "media" "put" <bytes...> │
//! │      │ └──────┴───────────────────────────┘ │                          │
//! └──────┴──────────────────────────────────────┴──────────────────────────┘
//!   type: 0 = UTF-8 text, 1 = binary
//!   offset: absolute position of the payload in the frame
//!   length: next offset − this offset; the last part runs to end of frame
//! ```
//!
//! ## Bounds
//! `decode` is strict: the header must fit in the frame, offsets start at or
//! after the header end, rise strictly and stay inside the frame, and text
//! parts must be valid UTF-8. The receive path uses [`decode_lossy`], which
//! turns any failure into the single interpretation-error sentinel part.

use thiserror::Error;

/// Type tag of a text part.
pub const TYPE_TEXT: u8 = 0;

/// Type tag of a binary part.
pub const TYPE_BINARY: u8 = 1;

/// Most parts one frame can carry (the count is a single byte).
pub const MAX_PARTS: usize = 255;

/// Text of the sentinel part produced when a frame cannot be interpreted.
pub const INTERPRETATION_ERROR: &str = "interpretation_error";

const HEADER_ENTRY_LEN: usize = 5;

/// One part of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Binary(Vec<u8>),
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Part::Text(value.into())
    }

    /// The sentinel that stands in for an undecodable frame.
    pub fn interpretation_error() -> Self {
        Part::Text(INTERPRETATION_ERROR.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Binary(_) => None,
        }
    }

    pub fn is_interpretation_error(&self) -> bool {
        self.as_text() == Some(INTERPRETATION_ERROR)
    }

    fn type_tag(&self) -> u8 {
        match self {
            Part::Text(_) => TYPE_TEXT,
            Part::Binary(_) => TYPE_BINARY,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Part::Text(text) => text.as_bytes(),
            Part::Binary(data) => data,
        }
    }
}

impl From<&str> for Part {
    fn from(value: &str) -> Self {
        Part::Text(value.to_string())
    }
}

impl From<String> for Part {
    fn from(value: String) -> Self {
        Part::Text(value)
    }
}

impl From<Vec<u8>> for Part {
    fn from(value: Vec<u8>) -> Self {
        Part::Binary(value)
    }
}

/// Why a frame could not be built or read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Frame is empty")]
    Empty,

    #[error("Frame must carry between 1 and 255 parts, got {0}")]
    PartCount(usize),

    #[error("Part {index} has no payload")]
    EmptyPart { index: usize },

    #[error("Frame of {len} bytes exceeds the 32-bit offset range")]
    TooLarge { len: usize },

    #[error("Header of {parts} parts needs {needed} bytes, frame has {len}")]
    TruncatedHeader { parts: usize, needed: usize, len: usize },

    #[error("Part {index} has unknown type tag {tag}")]
    UnknownType { index: usize, tag: u8 },

    #[error("Part {index} offset {offset} is out of bounds")]
    OffsetOutOfBounds { index: usize, offset: usize },

    #[error("Part {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
}

/// Builds one frame from `parts`.
pub fn encode(parts: &[Part]) -> Result<Vec<u8>, CodecError> {
    if parts.is_empty() || parts.len() > MAX_PARTS {
        return Err(CodecError::PartCount(parts.len()));
    }
    if let Some(index) = parts.iter().position(|p| p.payload().is_empty()) {
        return Err(CodecError::EmptyPart { index });
    }

    let header_len = 1 + HEADER_ENTRY_LEN * parts.len();
    let total = header_len + parts.iter().map(|p| p.payload().len()).sum::<usize>();
    if u32::try_from(total).is_err() {
        return Err(CodecError::TooLarge { len: total });
    }

    let mut frame = Vec::with_capacity(total);
    frame.push(parts.len() as u8);

    let mut offset = header_len;
    for part in parts {
        frame.push(part.type_tag());
        frame.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += part.payload().len();
    }
    for part in parts {
        frame.extend_from_slice(part.payload());
    }

    Ok(frame)
}

/// Reads a frame back into its parts.
pub fn decode(frame: &[u8]) -> Result<Vec<Part>, CodecError> {
    let count = *frame.first().ok_or(CodecError::Empty)? as usize;
    if count == 0 {
        return Err(CodecError::PartCount(0));
    }

    let header_len = 1 + HEADER_ENTRY_LEN * count;
    if frame.len() < header_len {
        return Err(CodecError::TruncatedHeader {
            parts: count,
            needed: header_len,
            len: frame.len(),
        });
    }

    let mut headers = Vec::with_capacity(count);
    for index in 0..count {
        let at = 1 + index * HEADER_ENTRY_LEN;
        let tag = frame[at];
        if tag != TYPE_TEXT && tag != TYPE_BINARY {
            return Err(CodecError::UnknownType { index, tag });
        }
        let offset = u32::from_le_bytes([frame[at + 1], frame[at + 2], frame[at + 3], frame[at + 4]])
            as usize;

        let floor = headers.last().map(|&(_, prev)| prev + 1).unwrap_or(header_len);
        if offset < floor || offset >= frame.len() {
            return Err(CodecError::OffsetOutOfBounds { index, offset });
        }
        headers.push((tag, offset));
    }

    let mut parts = Vec::with_capacity(count);
    for (index, &(tag, start)) in headers.iter().enumerate() {
        let end = headers
            .get(index + 1)
            .map(|&(_, next)| next)
            .unwrap_or(frame.len());
        let payload = &frame[start..end];

        let part = if tag == TYPE_TEXT {
            let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8 { index })?;
            Part::Text(text.to_string())
        } else {
            Part::Binary(payload.to_vec())
        };
        parts.push(part);
    }

    Ok(parts)
}

/// Like [`decode`], but a failure yields `[interpretation_error]`.
pub fn decode_lossy(frame: &[u8]) -> Vec<Part> {
    decode(frame).unwrap_or_else(|err| {
        tracing::warn!(error = %err, len = frame.len(), "Could not decode frame");
        vec![Part::interpretation_error()]
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<Part> {
        items.iter().map(|s| Part::text(*s)).collect()
    }

    #[test]
    fn test_network_pong_roundtrip() {
        let parts = texts(&["network", "pong"]);
        let frame = encode(&parts).unwrap();

        // 1 count byte + 2 headers + "network" + "pong"
        assert_eq!(frame.len(), 1 + 10 + 7 + 4);
        assert_eq!(frame[0], 2);
        assert_eq!(frame[1], TYPE_TEXT);
        assert_eq!(&frame[2..6], &11u32.to_le_bytes());
        assert_eq!(&frame[7..11], &18u32.to_le_bytes());

        assert_eq!(decode(&frame).unwrap(), parts);
    }

    #[test]
    fn test_binary_part_is_bit_exact() {
        let blob = vec![0x00, 0xff, 0x10, 0x80, 0x7f, 0x01];
        let parts = vec![Part::text("media"), Part::text("put"), Part::Binary(blob.clone())];
        let decoded = decode(&encode(&parts).unwrap()).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[2], Part::Binary(blob));
        assert_eq!(decoded, parts);
    }

    #[test]
    fn test_mixed_parts_roundtrip() {
        let parts = vec![
            Part::text("contents"),
            Part::text("put"),
            Part::text("{\"name\":\"Ausstellung ü\"}"),
            Part::Binary(vec![1; 300]),
            Part::text("x"),
        ];
        assert_eq!(decode(&encode(&parts).unwrap()).unwrap(), parts);
    }

    /// Part `index` of a generated list; `mix` picks all text, all binary
    /// or an interleaving.
    fn generated_part(index: usize, count: usize, mix: usize) -> Part {
        let len = (index * 37 + count * 11) % 97 + 1;
        let binary = match mix {
            0 => false,
            1 => true,
            _ => (index + mix) % 3 == 0,
        };
        if binary {
            Part::Binary((0..len).map(|j| (j * 31 + index) as u8).collect())
        } else {
            let alphabet = ['a', 'Z', '7', ' ', 'ü', '€', '{', '"'];
            Part::Text((0..len).map(|j| alphabet[(j + index) % alphabet.len()]).collect())
        }
    }

    #[test]
    fn test_roundtrip_across_counts_sizes_and_mixes() {
        for count in [1, 2, 3, 5, 16, 64, 128, 200, 254, MAX_PARTS] {
            for mix in 0..4 {
                let parts: Vec<Part> = (0..count).map(|i| generated_part(i, count, mix)).collect();
                let frame = encode(&parts).unwrap();

                assert_eq!(frame[0] as usize, count);
                assert_eq!(decode(&frame).unwrap(), parts, "count {count}, mix {mix}");
            }
        }
    }

    #[test]
    fn test_large_binary_part_roundtrip() {
        let blob: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let parts = vec![Part::text("media"), Part::text("put"), Part::text("mp4"), Part::Binary(blob)];
        assert_eq!(decode(&encode(&parts).unwrap()).unwrap(), parts);
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        assert_eq!(encode(&[]), Err(CodecError::PartCount(0)));
        assert_eq!(
            encode(&[Part::text("media"), Part::text("")]),
            Err(CodecError::EmptyPart { index: 1 })
        );
        let too_many: Vec<Part> = (0..256).map(|_| Part::text("a")).collect();
        assert_eq!(encode(&too_many), Err(CodecError::PartCount(256)));
    }

    #[test]
    fn test_decode_failures_yield_sentinel() {
        // empty input
        assert_eq!(decode_lossy(&[]), vec![Part::interpretation_error()]);
        // declared count of zero
        assert_eq!(decode_lossy(&[0, 1, 2, 3]), vec![Part::interpretation_error()]);
        // header only, no payload bytes
        let mut header_only = vec![1, TYPE_TEXT];
        header_only.extend_from_slice(&6u32.to_le_bytes());
        assert_eq!(decode_lossy(&header_only), vec![Part::interpretation_error()]);
        assert!(decode_lossy(&header_only)[0].is_interpretation_error());
    }

    #[test]
    fn test_decode_strict_bounds() {
        // header claims three parts but the frame is shorter than the header
        assert!(matches!(
            decode(&[3, 0, 16, 0, 0, 0]),
            Err(CodecError::TruncatedHeader { parts: 3, .. })
        ));

        let mut frame = encode(&texts(&["network", "pong"])).unwrap();

        // second offset pointing past the end
        let mut past_end = frame.clone();
        past_end[7..11].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            decode(&past_end),
            Err(CodecError::OffsetOutOfBounds { index: 1, .. })
        ));

        // offsets not increasing would make a zero-length part
        let mut equal = frame.clone();
        equal[7..11].copy_from_slice(&11u32.to_le_bytes());
        assert!(matches!(decode(&equal), Err(CodecError::OffsetOutOfBounds { .. })));

        // first offset inside the header
        let mut inside_header = frame.clone();
        inside_header[2..6].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            decode(&inside_header),
            Err(CodecError::OffsetOutOfBounds { index: 0, .. })
        ));

        // unknown type tag
        frame[6] = 9;
        assert_eq!(decode(&frame), Err(CodecError::UnknownType { index: 1, tag: 9 }));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let mut frame = encode(&[Part::Binary(vec![0xc3, 0x28])]).unwrap();
        frame[1] = TYPE_TEXT;
        assert_eq!(decode(&frame), Err(CodecError::InvalidUtf8 { index: 0 }));
    }
}
