//! Property-based tests for the protocol codec and the core containers.

use bytes::{Bytes, BytesMut};
use kyanite::core::commands::helpers::normalize_range;
use kyanite::core::protocol::{RespCodec, RespFrame};
use kyanite::core::storage::SortedSet;
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn arb_frame() -> impl Strategy<Value = RespFrame> {
    let leaf = prop_oneof![
        "[a-zA-Z0-9 ]{0,32}".prop_map(RespFrame::SimpleString),
        any::<i64>().prop_map(RespFrame::Integer),
        proptest::collection::vec(any::<u8>(), 0..64)
            .prop_map(|v| RespFrame::BulkString(Bytes::from(v))),
        Just(RespFrame::Null),
        Just(RespFrame::NullArray),
    ];
    leaf.prop_recursive(3, 32, 8, |inner| {
        proptest::collection::vec(inner, 0..8).prop_map(RespFrame::Array)
    })
}

proptest! {
    /// Any encoded frame decodes back to itself (requests aside, the codec
    /// only ever sees arrays from clients; this covers the reply side too).
    #[test]
    fn frame_encoding_roundtrips(frame in arb_frame()) {
        let encoded = frame.encode_to_vec();

        // Wrap in a single-element array so the decoder (which expects the
        // request shape at the top level) exercises the same byte parser.
        let mut request = BytesMut::new();
        let wrapper = RespFrame::Array(vec![frame.clone()]);
        RespCodec.encode(wrapper.clone(), &mut request).unwrap();
        let decoded = RespCodec.decode(&mut request).unwrap();
        prop_assert_eq!(decoded, Some(wrapper));
        prop_assert!(!encoded.is_empty());
    }

    /// Multi-bulk requests of arbitrary binary arguments survive the wire.
    #[test]
    fn multibulk_requests_roundtrip(
        parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..48), 1..8)
    ) {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
        for part in &parts {
            wire.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
            wire.extend_from_slice(part);
            wire.extend_from_slice(b"\r\n");
        }

        let decoded = RespCodec.decode(&mut wire).unwrap();
        let expected = RespFrame::Array(
            parts
                .iter()
                .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p)))
                .collect(),
        );
        prop_assert_eq!(decoded, Some(expected));
        prop_assert!(wire.is_empty());
    }

    /// Truncating the wire bytes anywhere never yields a bogus frame: the
    /// decoder reports "incomplete" (None) rather than misparsing.
    #[test]
    fn truncated_requests_never_misparse(
        parts in proptest::collection::vec(proptest::collection::vec(b'a'..=b'z', 1..16), 1..4),
        cut_ratio in 0.0f64..1.0
    ) {
        let mut wire = Vec::new();
        wire.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
        for part in &parts {
            wire.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
            wire.extend_from_slice(part);
            wire.extend_from_slice(b"\r\n");
        }
        let cut = ((wire.len() as f64) * cut_ratio) as usize;
        let mut truncated = BytesMut::from(&wire[..cut]);

        if let Some(frame) = RespCodec.decode(&mut truncated).unwrap() {
            // Only a fully intact prefix may produce a frame, and then it
            // must be the whole request.
            prop_assert_eq!(cut, wire.len());
            prop_assert!(matches!(frame, RespFrame::Array(_)));
        }
    }

    /// The range normaliser agrees with a brute-force model.
    #[test]
    fn normalize_range_matches_model(start in -20i64..20, stop in -20i64..20, len in 0usize..12) {
        let model: Vec<usize> = {
            let l = len as i64;
            let s = if start < 0 { l + start } else { start }.max(0);
            let e = if stop < 0 { l + stop } else { stop }.min(l - 1);
            (0..len).filter(|&i| (i as i64) >= s && (i as i64) <= e).collect()
        };
        match normalize_range(start, stop, len) {
            Some((lo, hi)) => {
                prop_assert!(!model.is_empty());
                prop_assert_eq!(lo, model[0]);
                prop_assert_eq!(hi, *model.last().unwrap());
            }
            None => prop_assert!(model.is_empty()),
        }
    }

    /// Sorted-set rank/iteration order stays consistent with a model under
    /// arbitrary insert/update/remove interleavings.
    #[test]
    fn sorted_set_matches_model(
        ops in proptest::collection::vec(
            (0u8..3, 0u8..16, -100i32..100),
            1..64
        )
    ) {
        let mut zset = SortedSet::new();
        let mut model: std::collections::HashMap<u8, f64> = std::collections::HashMap::new();

        for (op, member, score) in ops {
            let key = Bytes::from(format!("m{member}"));
            match op {
                0 | 1 => {
                    let is_new = zset.insert(score as f64, key.clone());
                    prop_assert_eq!(is_new, !model.contains_key(&member));
                    model.insert(member, score as f64);
                }
                _ => {
                    let removed = zset.remove(&key);
                    prop_assert_eq!(removed, model.remove(&member));
                }
            }
        }

        prop_assert_eq!(zset.len(), model.len());
        // Iteration is ascending by (score, member) and covers everything.
        let entries: Vec<_> = zset.iter().collect();
        for window in entries.windows(2) {
            let a = (&window[0], &window[1]);
            prop_assert!(
                (a.0.score, &a.0.member) < (a.1.score, &a.1.member),
                "entries out of order"
            );
        }
        for entry in &entries {
            let member: u8 = std::str::from_utf8(&entry.member[1..]).unwrap().parse().unwrap();
            prop_assert_eq!(model.get(&member).copied(), Some(entry.score));
        }
        // Ranks are dense and agree with iteration order.
        for (rank, entry) in entries.iter().enumerate() {
            prop_assert_eq!(zset.rank(&entry.member), Some(rank));
        }
    }
}
