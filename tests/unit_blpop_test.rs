use bytes::Bytes;
use kyanite::core::Command;
use kyanite::core::commands::command_trait::CommandFlags;
use kyanite::core::database::PopDirection;
use kyanite::core::protocol::RespFrame;

fn bulk(s: &[u8]) -> RespFrame {
    RespFrame::BulkString(Bytes::copy_from_slice(s))
}

#[tokio::test]
async fn test_blpop_parse_single_key() {
    match Command::parse("blpop", &[bulk(b"q"), bulk(b"5")]).unwrap() {
        Command::BlockingPop(cmd) => {
            assert_eq!(cmd.keys, vec![Bytes::from_static(b"q")]);
            assert_eq!(cmd.timeout_secs, 5);
            assert_eq!(cmd.direction, PopDirection::Left);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_brpop_parse_multiple_keys() {
    match Command::parse("brpop", &[bulk(b"a"), bulk(b"b"), bulk(b"c"), bulk(b"0")]).unwrap() {
        Command::BlockingPop(cmd) => {
            assert_eq!(cmd.keys.len(), 3);
            assert_eq!(cmd.timeout_secs, 0);
            assert_eq!(cmd.direction, PopDirection::Right);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_blpop_rejects_negative_timeout() {
    assert!(Command::parse("blpop", &[bulk(b"q"), bulk(b"-1")]).is_err());
}

#[tokio::test]
async fn test_blpop_rejects_missing_timeout() {
    assert!(Command::parse("blpop", &[bulk(b"q")]).is_err());
}

#[tokio::test]
async fn test_brpoplpush_parse() {
    match Command::parse("brpoplpush", &[bulk(b"src"), bulk(b"dst"), bulk(b"3")]).unwrap() {
        Command::BRPopLPush(cmd) => {
            assert_eq!(cmd.source, Bytes::from_static(b"src"));
            assert_eq!(cmd.destination, Bytes::from_static(b"dst"));
            assert_eq!(cmd.timeout_secs, 3);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_blocking_commands_carry_the_blocking_flag() {
    let blpop = Command::parse("blpop", &[bulk(b"q"), bulk(b"1")]).unwrap();
    assert!(blpop.flags().contains(CommandFlags::BLOCKING));
    let lpop = Command::parse("lpop", &[bulk(b"q")]).unwrap();
    assert!(!lpop.flags().contains(CommandFlags::BLOCKING));
}
