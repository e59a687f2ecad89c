// src/core/protocol/resp_frame.rs

//! Implements the RESP v2 frame structure and the corresponding `Encoder`
//! and `Decoder` for network communication.
//!
//! Requests arrive either as multi-bulk arrays of bulk strings or as a single
//! inline line (space-separated, CRLF-terminated). Replies are encoded from
//! [`RespFrame`] values.

use crate::core::KyaniteError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits to prevent denial-of-service from malformed frames.
const MAX_MULTIBULK_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024; // 512MB
const MAX_INLINE_SIZE: usize = 64 * 1024;

/// An enum representing a single frame in the RESP protocol.
/// This is the low-level representation of data exchanged between the client and server.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// A convenience method to encode a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(self, &mut buf);
        buf.to_vec()
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default)]
pub struct RespCodec;

impl Encoder<RespFrame> for RespCodec {
    type Error = KyaniteError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}

/// Encodes a `RespFrame` into a buffer according to the RESP v2 specification.
fn encode_frame(item: &RespFrame, dst: &mut BytesMut) {
    let mut int_buf = itoa::Buffer::new();
    match item {
        RespFrame::SimpleString(s) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Error(s) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Integer(i) => {
            dst.extend_from_slice(b":");
            dst.extend_from_slice(int_buf.format(*i).as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::BulkString(b) => {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(int_buf.format(b.len()).as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Null => {
            dst.extend_from_slice(b"$-1\r\n");
        }
        RespFrame::NullArray => {
            dst.extend_from_slice(b"*-1\r\n");
        }
        RespFrame::Array(arr) => {
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(int_buf.format(arr.len()).as_bytes());
            dst.extend_from_slice(CRLF);
            for frame in arr {
                encode_frame(frame, dst);
            }
        }
    }
}

impl Decoder for RespCodec {
    type Item = RespFrame;
    type Error = KyaniteError;

    /// Decodes a `RespFrame` from a `BytesMut` buffer.
    ///
    /// Returns `Ok(None)` if the buffer does not yet contain a full frame,
    /// allowing the `Framed` stream to wait for more data from the network.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let result = if src[0] == b'*' {
            parse_frame(src)
        } else {
            parse_inline(src)
        };
        match result {
            Ok((frame, len)) => {
                src.advance(len);
                Ok(Some(frame))
            }
            Err(KyaniteError::IncompleteFrame) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The main parsing entry point. It inspects the first byte (the type prefix)
/// and dispatches to the appropriate parsing function.
fn parse_frame(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    if src.is_empty() {
        return Err(KyaniteError::IncompleteFrame);
    }
    match src[0] {
        b'+' => parse_simple_string(src),
        b'-' => parse_error(src),
        b':' => parse_integer(src),
        b'$' => parse_bulk_string(src),
        b'*' => parse_array(src),
        _ => Err(KyaniteError::ProtocolError(format!(
            "unexpected type byte '{}'",
            src[0] as char
        ))),
    }
}

/// Helper function to find the next CRLF sequence in a buffer.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}

/// Parses a single line (up to CRLF) from a buffer.
fn parse_line(src: &[u8]) -> Result<(&[u8], usize), KyaniteError> {
    find_crlf(src)
        .map(|pos| (&src[..pos], pos + CRLF_LEN))
        .ok_or(KyaniteError::IncompleteFrame)
}

fn parse_decimal(line: &[u8]) -> Result<i64, KyaniteError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| KyaniteError::ProtocolError("invalid length".to_string()))
}

/// Parses a Simple String (e.g., `+OK\r\n`).
fn parse_simple_string(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::SimpleString(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

/// Parses an Error (e.g., `-ERR message\r\n`).
fn parse_error(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::Error(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

/// Parses an Integer (e.g., `:1000\r\n`).
fn parse_integer(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((RespFrame::Integer(parse_decimal(line)?), len + 1))
}

/// Parses a Bulk String (e.g., `$5\r\nhello\r\n`).
fn parse_bulk_string(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let str_len = parse_decimal(line)?;

    // Handle Null Bulk String ($-1\r\n).
    if str_len == -1 {
        return Ok((RespFrame::Null, len_of_line + 1));
    }
    if str_len < 0 || str_len as usize > MAX_BULK_STRING_SIZE {
        return Err(KyaniteError::ProtocolError(
            "invalid bulk length".to_string(),
        ));
    }

    let str_len = str_len as usize;
    let total_len_prefix = len_of_line + 1;
    // The entire bulk string (data plus final CRLF) must be in the buffer.
    if src.len() < total_len_prefix + str_len + CRLF_LEN {
        return Err(KyaniteError::IncompleteFrame);
    }
    if &src[total_len_prefix + str_len..total_len_prefix + str_len + CRLF_LEN] != CRLF {
        return Err(KyaniteError::ProtocolError(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&src[total_len_prefix..total_len_prefix + str_len]);
    Ok((RespFrame::BulkString(data), total_len_prefix + str_len + CRLF_LEN))
}

/// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`).
fn parse_array(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let arr_len = parse_decimal(line)?;

    // Handle Null Array (*-1\r\n).
    if arr_len == -1 {
        return Ok((RespFrame::NullArray, len_of_line + 1));
    }
    if arr_len < 0 || arr_len as usize > MAX_MULTIBULK_ELEMENTS {
        return Err(KyaniteError::ProtocolError(
            "invalid multibulk length".to_string(),
        ));
    }

    let arr_len = arr_len as usize;
    let mut frames = Vec::with_capacity(arr_len);
    let mut cursor = len_of_line + 1;

    for _ in 0..arr_len {
        let (frame, frame_len) = parse_frame(&src[cursor..])?;
        frames.push(frame);
        cursor += frame_len;
    }

    Ok((RespFrame::Array(frames), cursor))
}

/// Parses the inline command form: a single space-separated line terminated
/// by CRLF. Produces the same `Array` of bulk strings the multi-bulk form
/// does, so the command layer never sees the difference.
fn parse_inline(src: &[u8]) -> Result<(RespFrame, usize), KyaniteError> {
    let Some(pos) = find_crlf(src) else {
        if src.len() > MAX_INLINE_SIZE {
            return Err(KyaniteError::ProtocolError(
                "too big inline request".to_string(),
            ));
        }
        return Err(KyaniteError::IncompleteFrame);
    };

    let line = &src[..pos];
    let consumed = pos + CRLF_LEN;

    let args: Vec<RespFrame> = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|part| !part.is_empty())
        .map(|part| RespFrame::BulkString(Bytes::copy_from_slice(part)))
        .collect();

    if args.is_empty() {
        // An empty inline line is legal and simply skipped by the caller.
        return Ok((RespFrame::Array(Vec::new()), consumed));
    }
    Ok((RespFrame::Array(args), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::Decoder;

    fn decode_all(input: &[u8]) -> Vec<RespFrame> {
        let mut codec = RespCodec;
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn decodes_multibulk_request() {
        let frames = decode_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(
            frames,
            vec![RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"SET")),
                RespFrame::BulkString(Bytes::from_static(b"foo")),
                RespFrame::BulkString(Bytes::from_static(b"bar")),
            ])]
        );
    }

    #[test]
    fn decodes_inline_request() {
        let frames = decode_all(b"PING\r\nGET  foo\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[1],
            RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"GET")),
                RespFrame::BulkString(Bytes::from_static(b"foo")),
            ])
        );
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let mut codec = RespCodec;
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nfo"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"o\r\n");
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_multibulk() {
        let mut codec = RespCodec;
        let mut buf = BytesMut::from(&b"*99999999\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_bad_bulk_terminator() {
        let mut codec = RespCodec;
        let mut buf = BytesMut::from(&b"*1\r\n$3\r\nfooXX"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn bulk_string_roundtrip_is_binary_safe() {
        let payload = Bytes::from_static(b"\x00\x01\xff\r\n rest");
        let encoded = RespFrame::BulkString(payload.clone()).encode_to_vec();
        let (frame, len) = parse_frame(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(frame, RespFrame::BulkString(payload));
    }

    #[test]
    fn null_reply_encodings() {
        assert_eq!(RespFrame::Null.encode_to_vec(), b"$-1\r\n");
        assert_eq!(RespFrame::NullArray.encode_to_vec(), b"*-1\r\n");
    }
}
