// src/core/commands/helpers.rs

//! Helper functions for parsing command arguments from `RespFrame`s.
//! These reduce boilerplate and keep error handling consistent across commands.

use crate::core::KyaniteError;
use crate::core::protocol::RespFrame;
use bytes::Bytes;
use wildmatch::WildMatch;

/// Extracts the payload of a bulk-string argument.
pub fn extract_bytes(frame: &RespFrame) -> Result<Bytes, KyaniteError> {
    match frame {
        RespFrame::BulkString(b) => Ok(b.clone()),
        _ => Err(KyaniteError::SyntaxError),
    }
}

/// Extracts an argument as a UTF-8 string (used for option keywords).
pub fn extract_string(frame: &RespFrame) -> Result<String, KyaniteError> {
    let bytes = extract_bytes(frame)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| KyaniteError::SyntaxError)
}

/// Parses an argument as a signed 64-bit integer.
pub fn extract_i64(frame: &RespFrame) -> Result<i64, KyaniteError> {
    let bytes = extract_bytes(frame)?;
    std::str::from_utf8(&bytes)
        .map_err(|_| KyaniteError::NotAnInteger)?
        .parse()
        .map_err(|_| KyaniteError::NotAnInteger)
}

/// Parses an argument as a float (scores, increments).
pub fn extract_f64(frame: &RespFrame) -> Result<f64, KyaniteError> {
    let bytes = extract_bytes(frame)?;
    let s = std::str::from_utf8(&bytes).map_err(|_| KyaniteError::NotAFloat)?;
    match s {
        "+inf" | "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => s.parse().map_err(|_| KyaniteError::NotAFloat),
    }
}

/// Extracts every argument as raw bytes (keys or members lists).
pub fn extract_all_bytes(args: &[RespFrame]) -> Result<Vec<Bytes>, KyaniteError> {
    args.iter().map(extract_bytes).collect()
}

/// True if the argument equals the keyword, ASCII case-insensitively.
pub fn arg_eq(frame: &RespFrame, keyword: &str) -> bool {
    matches!(frame, RespFrame::BulkString(b) if b.eq_ignore_ascii_case(keyword.as_bytes()))
}

/// Parses a blocking-command timeout (seconds, 0 = wait forever).
pub fn extract_timeout_secs(frame: &RespFrame) -> Result<u64, KyaniteError> {
    let value = extract_i64(frame).map_err(|_| KyaniteError::InvalidTimeout)?;
    if value < 0 {
        return Err(KyaniteError::NegativeTimeout);
    }
    Ok(value as u64)
}

/// Glob matching for `KEYS` patterns and pub/sub pattern subscriptions.
/// `*` and `?` wildcards, matched over the lossy UTF-8 view of the bytes.
pub fn glob_match(pattern: &[u8], subject: &[u8]) -> bool {
    let pattern = String::from_utf8_lossy(pattern);
    let subject = String::from_utf8_lossy(subject);
    WildMatch::new(&pattern).matches(&subject)
}

/// Normalises a possibly negative range index against a container length,
/// clamping the way `LRANGE`/`ZRANGE` expect.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_normalisation() {
        assert_eq!(normalize_range(0, -1, 3), Some((0, 2)));
        assert_eq!(normalize_range(-2, -1, 3), Some((1, 2)));
        assert_eq!(normalize_range(1, 0, 3), None);
        assert_eq!(normalize_range(5, 10, 3), None);
        assert_eq!(normalize_range(0, 100, 3), Some((0, 2)));
        assert_eq!(normalize_range(0, 0, 0), None);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"news.*", b"news.sport"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"news.*", b"weather"));
    }

    #[test]
    fn float_extraction_accepts_infinities() {
        assert_eq!(
            extract_f64(&RespFrame::BulkString(Bytes::from_static(b"+inf"))).unwrap(),
            f64::INFINITY
        );
        assert!(extract_f64(&RespFrame::BulkString(Bytes::from_static(b"abc"))).is_err());
    }
}
