use bytes::Bytes;
use kyanite::core::commands::command_trait::ParseCommand;
use kyanite::core::commands::string::{Set, SetCondition, TtlOption};
use kyanite::core::protocol::RespFrame;

fn bulk(s: &[u8]) -> RespFrame {
    RespFrame::BulkString(Bytes::copy_from_slice(s))
}

#[tokio::test]
async fn test_set_parse_basic() {
    let args = [bulk(b"mykey"), bulk(b"myvalue")];
    let cmd = Set::parse(&args).unwrap();
    assert_eq!(cmd.key, Bytes::from_static(b"mykey"));
    assert_eq!(cmd.value, Bytes::from_static(b"myvalue"));
    assert_eq!(cmd.condition, SetCondition::None);
    assert!(matches!(cmd.ttl, TtlOption::None));
    assert!(!cmd.get);
}

#[tokio::test]
async fn test_set_parse_with_nx() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"NX")];
    let cmd = Set::parse(&args).unwrap();
    assert_eq!(cmd.condition, SetCondition::IfNotExists);
}

#[tokio::test]
async fn test_set_parse_with_xx() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"XX")];
    let cmd = Set::parse(&args).unwrap();
    assert_eq!(cmd.condition, SetCondition::IfExists);
}

#[tokio::test]
async fn test_set_parse_with_ex() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"EX"), bulk(b"3600")];
    let cmd = Set::parse(&args).unwrap();
    assert!(matches!(cmd.ttl, TtlOption::Seconds(3600)));
}

#[tokio::test]
async fn test_set_parse_with_px() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"PX"), bulk(b"90000")];
    let cmd = Set::parse(&args).unwrap();
    assert!(matches!(cmd.ttl, TtlOption::Milliseconds(90000)));
}

#[tokio::test]
async fn test_set_parse_with_keepttl() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"KEEPTTL")];
    let cmd = Set::parse(&args).unwrap();
    assert!(matches!(cmd.ttl, TtlOption::KeepExisting));
}

#[tokio::test]
async fn test_set_parse_all_options() {
    let args = [
        bulk(b"mykey"),
        bulk(b"myvalue"),
        bulk(b"NX"),
        bulk(b"PX"),
        bulk(b"12345"),
        bulk(b"GET"),
    ];
    let cmd = Set::parse(&args).unwrap();
    assert_eq!(cmd.condition, SetCondition::IfNotExists);
    assert!(matches!(cmd.ttl, TtlOption::Milliseconds(12345)));
    assert!(cmd.get);
}

#[tokio::test]
async fn test_set_parse_rejects_conflicting_conditions() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"NX"), bulk(b"XX")];
    assert!(Set::parse(&args).is_err());
}

#[tokio::test]
async fn test_set_parse_rejects_two_ttl_options() {
    let args = [
        bulk(b"mykey"),
        bulk(b"myvalue"),
        bulk(b"EX"),
        bulk(b"10"),
        bulk(b"PX"),
        bulk(b"10000"),
    ];
    assert!(Set::parse(&args).is_err());
}

#[tokio::test]
async fn test_set_parse_invalid_option() {
    let args = [bulk(b"mykey"), bulk(b"myvalue"), bulk(b"ZZ")];
    assert!(Set::parse(&args).is_err());
}

#[tokio::test]
async fn test_set_parse_missing_value() {
    let args = [bulk(b"mykey")];
    assert!(Set::parse(&args).is_err());
}
