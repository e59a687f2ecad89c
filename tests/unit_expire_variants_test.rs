use bytes::Bytes;
use kyanite::core::Command;
use kyanite::core::protocol::RespFrame;

fn bulk(s: &[u8]) -> RespFrame {
    RespFrame::BulkString(Bytes::copy_from_slice(s))
}

#[tokio::test]
async fn test_expire_parses_relative_seconds() {
    let cmd = Command::parse("expire", &[bulk(b"k"), bulk(b"10")]).unwrap();
    match cmd {
        Command::Expire(e) => {
            assert_eq!(e.key, Bytes::from_static(b"k"));
            assert_eq!(e.value, 10);
            assert_eq!(e.unit_ms, 1000);
            assert!(!e.absolute);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_pexpireat_parses_absolute_milliseconds() {
    let cmd = Command::parse("pexpireat", &[bulk(b"k"), bulk(b"1700000000000")]).unwrap();
    match cmd {
        Command::Expire(e) => {
            assert_eq!(e.value, 1_700_000_000_000);
            assert_eq!(e.unit_ms, 1);
            assert!(e.absolute);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_expire_rejects_non_integer_ttl() {
    assert!(Command::parse("expire", &[bulk(b"k"), bulk(b"soon")]).is_err());
}

#[tokio::test]
async fn test_expire_rejects_wrong_arity() {
    assert!(Command::parse("expire", &[bulk(b"k")]).is_err());
    assert!(Command::parse("pttl", &[bulk(b"k"), bulk(b"extra")]).is_err());
}

#[tokio::test]
async fn test_ttl_variants_select_unit() {
    match Command::parse("ttl", &[bulk(b"k")]).unwrap() {
        Command::Ttl(t) => assert!(!t.in_ms),
        other => panic!("unexpected command: {other:?}"),
    }
    match Command::parse("pttl", &[bulk(b"k")]).unwrap() {
        Command::Ttl(t) => assert!(t.in_ms),
        other => panic!("unexpected command: {other:?}"),
    }
}
