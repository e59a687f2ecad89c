//! End-to-end tests: a full server on an ephemeral port, raw sockets, and
//! byte-exact assertions on the RESP replies.

use futures::FutureExt;
use futures::future::BoxFuture;
use kyanite::config::Config;
use kyanite::server::Server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn test_config() -> Config {
    Config {
        bind: vec!["127.0.0.1".to_string()],
        port: 0,
        ..Default::default()
    }
}

async fn start_server(config: Config) -> (Server, SocketAddr) {
    let server = Server::start(config).await.expect("server should start");
    let addr = server.local_addrs[0];
    (server, addr)
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn send(&mut self, parts: &[&[u8]]) {
        let mut buf = Vec::new();
        buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
        for part in parts {
            buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
            buf.extend_from_slice(part);
            buf.extend_from_slice(b"\r\n");
        }
        self.writer.write_all(&buf).await.expect("write");
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write raw");
    }

    /// Reads one complete reply frame, returning its raw bytes.
    async fn read_reply(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        timeout(REPLY_TIMEOUT, self.read_frame_into(&mut out))
            .await
            .expect("reply within timeout");
        out
    }

    fn read_frame_into<'a>(&'a mut self, out: &'a mut Vec<u8>) -> BoxFuture<'a, ()> {
        async move {
            let mut line = Vec::new();
            self.reader
                .read_until(b'\n', &mut line)
                .await
                .expect("read line");
            assert!(line.ends_with(b"\r\n"), "unterminated line: {line:?}");
            out.extend_from_slice(&line);

            let header = std::str::from_utf8(&line[1..line.len() - 2]).expect("ascii header");
            match line[0] {
                b'+' | b'-' | b':' => {}
                b'$' => {
                    let len: i64 = header.parse().expect("bulk length");
                    if len >= 0 {
                        let mut payload = vec![0u8; len as usize + 2];
                        self.reader.read_exact(&mut payload).await.expect("payload");
                        out.extend_from_slice(&payload);
                    }
                }
                b'*' => {
                    let len: i64 = header.parse().expect("array length");
                    for _ in 0..len.max(0) {
                        self.read_frame_into(out).await;
                    }
                }
                other => panic!("unexpected reply prefix {other:?}"),
            }
        }
        .boxed()
    }

    /// One request/reply round trip.
    async fn cmd(&mut self, parts: &[&[u8]]) -> Vec<u8> {
        self.send(parts).await;
        self.read_reply().await
    }
}

// --- Basic string scenarios ---

#[tokio::test]
async fn set_get_strlen_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"foo", b"bar"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"GET", b"foo"]).await, b"$3\r\nbar\r\n");
    assert_eq!(client.cmd(&[b"STRLEN", b"foo"]).await, b":3\r\n");
    assert_eq!(client.cmd(&[b"GET", b"missing"]).await, b"$-1\r\n");
}

#[tokio::test]
async fn inline_commands_are_accepted() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw(b"PING\r\n").await;
    assert_eq!(client.read_reply().await, b"+PONG\r\n");

    client.send_raw(b"SET inline works\r\n").await;
    assert_eq!(client.read_reply().await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"GET", b"inline"]).await, b"$5\r\nworks\r\n");
}

#[tokio::test]
async fn pipelined_replies_come_back_in_order() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    client
        .send_raw(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$4\r\nINCR\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n")
        .await;
    assert_eq!(client.read_reply().await, b"+OK\r\n");
    assert_eq!(client.read_reply().await, b":2\r\n");
    assert_eq!(client.read_reply().await, b"$1\r\n2\r\n");
}

#[tokio::test]
async fn incr_family_arithmetic() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"INCR", b"n"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"INCRBY", b"n", b"9"]).await, b":10\r\n");
    assert_eq!(client.cmd(&[b"DECR", b"n"]).await, b":9\r\n");
    assert_eq!(client.cmd(&[b"DECRBY", b"n", b"4"]).await, b":5\r\n");
    assert_eq!(client.cmd(&[b"SET", b"s", b"abc"]).await, b"+OK\r\n");
    let reply = client.cmd(&[b"INCR", b"s"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
}

// --- Lists ---

#[tokio::test]
async fn rpush_lrange_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.cmd(&[b"RPUSH", b"mylist", b"a", b"b", b"c"]).await,
        b":3\r\n"
    );
    assert_eq!(
        client.cmd(&[b"LRANGE", b"mylist", b"0", b"-1"]).await,
        b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
    );
    assert_eq!(client.cmd(&[b"LLEN", b"mylist"]).await, b":3\r\n");
    assert_eq!(client.cmd(&[b"LPOP", b"mylist"]).await, b"$1\r\na\r\n");
    assert_eq!(client.cmd(&[b"RPOP", b"mylist"]).await, b"$1\r\nc\r\n");
}

#[tokio::test]
async fn wrong_type_is_reported() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"k", b"v"]).await, b"+OK\r\n");
    let reply = client.cmd(&[b"RPUSH", b"k", b"x"]).await;
    assert!(
        reply.starts_with(b"-WRONGTYPE"),
        "unexpected reply: {reply:?}"
    );
}

// --- Keyspace / expiration ---

#[tokio::test]
async fn del_is_idempotent() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"k", b"v"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"DEL", b"k"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"DEL", b"k"]).await, b":0\r\n");
}

#[tokio::test]
async fn pexpireat_then_pttl_goes_missing() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"k", b"v"]).await, b"+OK\r\n");

    let deadline = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
        + 150;
    assert_eq!(
        client
            .cmd(&[b"PEXPIREAT", b"k", deadline.to_string().as_bytes()])
            .await,
        b":1\r\n"
    );

    let reply = client.cmd(&[b"PTTL", b"k"]).await;
    let ttl: i64 = std::str::from_utf8(&reply[1..reply.len() - 2])
        .unwrap()
        .parse()
        .unwrap();
    assert!((0..=150).contains(&ttl), "unexpected ttl {ttl}");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(client.cmd(&[b"PTTL", b"k"]).await, b":-2\r\n");
    assert_eq!(client.cmd(&[b"GET", b"k"]).await, b"$-1\r\n");
}

#[tokio::test]
async fn keys_type_and_rename() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"user:1", b"a"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"SET", b"user:2", b"b"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"SET", b"other", b"c"]).await, b"+OK\r\n");

    let reply = client.cmd(&[b"KEYS", b"user:*"]).await;
    assert!(reply.starts_with(b"*2\r\n"), "unexpected reply: {reply:?}");

    assert_eq!(client.cmd(&[b"TYPE", b"user:1"]).await, b"+string\r\n");
    assert_eq!(client.cmd(&[b"TYPE", b"nope"]).await, b"+none\r\n");

    assert_eq!(client.cmd(&[b"RENAME", b"other", b"renamed"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"EXISTS", b"other"]).await, b":0\r\n");
    assert_eq!(client.cmd(&[b"GET", b"renamed"]).await, b"$1\r\nc\r\n");
    let reply = client.cmd(&[b"RENAME", b"ghost", b"x"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
}

#[tokio::test]
async fn select_isolates_databases() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"k", b"db0"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"SELECT", b"1"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"GET", b"k"]).await, b"$-1\r\n");
    assert_eq!(client.cmd(&[b"DBSIZE"]).await, b":0\r\n");
    assert_eq!(client.cmd(&[b"SELECT", b"0"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"GET", b"k"]).await, b"$3\r\ndb0\r\n");

    let reply = client.cmd(&[b"SELECT", b"99"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
}

// --- Hashes / sets / sorted sets / HLL ---

#[tokio::test]
async fn hash_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.cmd(&[b"HSET", b"h", b"f1", b"v1", b"f2", b"v2"]).await,
        b":2\r\n"
    );
    assert_eq!(client.cmd(&[b"HGET", b"h", b"f1"]).await, b"$2\r\nv1\r\n");
    assert_eq!(client.cmd(&[b"HLEN", b"h"]).await, b":2\r\n");
    assert_eq!(
        client.cmd(&[b"HGETALL", b"h"]).await,
        b"*4\r\n$2\r\nf1\r\n$2\r\nv1\r\n$2\r\nf2\r\n$2\r\nv2\r\n"
    );
    assert_eq!(client.cmd(&[b"HDEL", b"h", b"f1"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"HEXISTS", b"h", b"f1"]).await, b":0\r\n");
    // Removing the last field removes the key.
    assert_eq!(client.cmd(&[b"HDEL", b"h", b"f2"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"EXISTS", b"h"]).await, b":0\r\n");
}

#[tokio::test]
async fn set_family_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SADD", b"s", b"a", b"b", b"a"]).await, b":2\r\n");
    assert_eq!(client.cmd(&[b"SCARD", b"s"]).await, b":2\r\n");
    assert_eq!(client.cmd(&[b"SISMEMBER", b"s", b"a"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"SREM", b"s", b"a"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"SISMEMBER", b"s", b"a"]).await, b":0\r\n");
}

#[tokio::test]
async fn zset_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client
            .cmd(&[b"ZADD", b"z", b"2", b"b", b"1", b"a", b"3", b"c"])
            .await,
        b":3\r\n"
    );
    assert_eq!(
        client.cmd(&[b"ZRANGE", b"z", b"0", b"-1"]).await,
        b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
    );
    assert_eq!(
        client.cmd(&[b"ZRANGE", b"z", b"0", b"0", b"WITHSCORES"]).await,
        b"*2\r\n$1\r\na\r\n$1\r\n1\r\n"
    );
    assert_eq!(client.cmd(&[b"ZSCORE", b"z", b"b"]).await, b"$1\r\n2\r\n");
    assert_eq!(client.cmd(&[b"ZRANK", b"z", b"c"]).await, b":2\r\n");
    assert_eq!(
        client.cmd(&[b"ZRANGEBYSCORE", b"z", b"(1", b"+inf"]).await,
        b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n"
    );
    assert_eq!(client.cmd(&[b"ZCOUNT", b"z", b"-inf", b"2"]).await, b":2\r\n");
}

#[tokio::test]
async fn hyperloglog_estimates() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    fn count(reply: &[u8]) -> i64 {
        std::str::from_utf8(&reply[1..reply.len() - 2])
            .unwrap()
            .parse()
            .unwrap()
    }

    assert_eq!(client.cmd(&[b"PFADD", b"hll", b"a", b"b", b"c"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"PFADD", b"hll", b"a"]).await, b":0\r\n");
    // Register collisions can shave an element off a tiny estimate.
    let n = count(&client.cmd(&[b"PFCOUNT", b"hll"]).await);
    assert!((2..=3).contains(&n), "estimate {n} for 3 elements");

    assert_eq!(client.cmd(&[b"PFADD", b"hll2", b"c", b"d"]).await, b":1\r\n");
    assert_eq!(client.cmd(&[b"PFMERGE", b"dest", b"hll", b"hll2"]).await, b"+OK\r\n");
    let n = count(&client.cmd(&[b"PFCOUNT", b"dest"]).await);
    assert!((3..=4).contains(&n), "estimate {n} for 4 elements");
}

// --- Transactions ---

#[tokio::test]
async fn multi_exec_commits_in_order() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"MULTI"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"SET", b"a", b"1"]).await, b"+QUEUED\r\n");
    assert_eq!(client.cmd(&[b"INCR", b"a"]).await, b"+QUEUED\r\n");
    assert_eq!(client.cmd(&[b"EXEC"]).await, b"*2\r\n+OK\r\n:2\r\n");
    assert_eq!(client.cmd(&[b"GET", b"a"]).await, b"$1\r\n2\r\n");
}

#[tokio::test]
async fn watch_aborts_exec_after_foreign_write() {
    let (_server, addr) = start_server(test_config()).await;
    let mut session_a = TestClient::connect(addr).await;
    let mut session_b = TestClient::connect(addr).await;

    assert_eq!(session_a.cmd(&[b"WATCH", b"k"]).await, b"+OK\r\n");
    assert_eq!(session_a.cmd(&[b"MULTI"]).await, b"+OK\r\n");
    assert_eq!(session_a.cmd(&[b"SET", b"k", b"1"]).await, b"+QUEUED\r\n");

    // Another session modifies the watched key before EXEC.
    assert_eq!(session_b.cmd(&[b"SET", b"k", b"2"]).await, b"+OK\r\n");

    assert_eq!(session_a.cmd(&[b"EXEC"]).await, b"*-1\r\n");
    assert_eq!(session_a.cmd(&[b"GET", b"k"]).await, b"$1\r\n2\r\n");
}

#[tokio::test]
async fn exec_without_multi_is_an_error() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"EXEC"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");

    // An unknown command inside MULTI poisons the transaction.
    assert_eq!(client.cmd(&[b"MULTI"]).await, b"+OK\r\n");
    let reply = client.cmd(&[b"NOSUCHCMD"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
    let reply = client.cmd(&[b"EXEC"]).await;
    assert!(
        reply.starts_with(b"-EXECABORT"),
        "unexpected reply: {reply:?}"
    );
}

// --- Blocking commands ---

#[tokio::test]
async fn blpop_wakes_on_push() {
    let (_server, addr) = start_server(test_config()).await;
    let mut blocked = TestClient::connect(addr).await;
    let mut pusher = TestClient::connect(addr).await;

    blocked.send(&[b"BLPOP", b"q", b"5"]).await;
    // Let the blocking session park before pushing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(pusher.cmd(&[b"LPUSH", b"q", b"hello"]).await, b":1\r\n");

    assert_eq!(
        blocked.read_reply().await,
        b"*2\r\n$1\r\nq\r\n$5\r\nhello\r\n"
    );
    // The pushed value went straight to the blocked client.
    assert_eq!(pusher.cmd(&[b"LLEN", b"q"]).await, b":0\r\n");
}

#[tokio::test]
async fn blpop_times_out_with_null_array() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    client.send(&[b"BLPOP", b"empty", b"1"]).await;
    let started = std::time::Instant::now();
    let mut out = Vec::new();
    timeout(Duration::from_secs(5), client.read_frame_into(&mut out))
        .await
        .expect("timeout reply");
    assert_eq!(out, b"*-1\r\n");
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn blpop_session_still_works_after_resuming() {
    let (_server, addr) = start_server(test_config()).await;
    let mut blocked = TestClient::connect(addr).await;
    let mut pusher = TestClient::connect(addr).await;

    blocked.send(&[b"BLPOP", b"jobs", b"5"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pusher.cmd(&[b"RPUSH", b"jobs", b"one"]).await, b":1\r\n");
    assert_eq!(
        blocked.read_reply().await,
        b"*2\r\n$4\r\njobs\r\n$3\r\none\r\n"
    );

    // The migrated session keeps serving commands on its new worker.
    assert_eq!(blocked.cmd(&[b"SET", b"after", b"block"]).await, b"+OK\r\n");
    assert_eq!(blocked.cmd(&[b"GET", b"after"]).await, b"$5\r\nblock\r\n");
}

#[tokio::test]
async fn brpoplpush_moves_value_atomically() {
    let (_server, addr) = start_server(test_config()).await;
    let mut blocked = TestClient::connect(addr).await;
    let mut pusher = TestClient::connect(addr).await;

    blocked.send(&[b"BRPOPLPUSH", b"src", b"dst", b"5"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(pusher.cmd(&[b"RPUSH", b"src", b"payload"]).await, b":1\r\n");
    assert_eq!(blocked.read_reply().await, b"$7\r\npayload\r\n");

    assert_eq!(pusher.cmd(&[b"LLEN", b"src"]).await, b":0\r\n");
    assert_eq!(
        pusher.cmd(&[b"LRANGE", b"dst", b"0", b"-1"]).await,
        b"*1\r\n$7\r\npayload\r\n"
    );
}

// --- Pub/Sub ---

#[tokio::test]
async fn publish_reaches_exactly_the_subscriber() {
    let (_server, addr) = start_server(test_config()).await;
    let mut subscriber = TestClient::connect(addr).await;
    let mut publisher = TestClient::connect(addr).await;
    let mut bystander = TestClient::connect(addr).await;

    assert_eq!(
        subscriber.cmd(&[b"SUBSCRIBE", b"ch"]).await,
        b"*3\r\n$9\r\nsubscribe\r\n$2\r\nch\r\n:1\r\n"
    );
    // Subscription is registered synchronously with the ack, so the publish
    // cannot race it.
    assert_eq!(publisher.cmd(&[b"PUBLISH", b"ch", b"msg"]).await, b":1\r\n");
    assert_eq!(
        subscriber.read_reply().await,
        b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$3\r\nmsg\r\n"
    );

    // No one else sees the message; the bystander still works normally.
    assert_eq!(bystander.cmd(&[b"PING"]).await, b"+PONG\r\n");
}

#[tokio::test]
async fn pattern_subscription_receives_pmessage() {
    let (_server, addr) = start_server(test_config()).await;
    let mut subscriber = TestClient::connect(addr).await;
    let mut publisher = TestClient::connect(addr).await;

    assert_eq!(
        subscriber.cmd(&[b"PSUBSCRIBE", b"news.*"]).await,
        b"*3\r\n$10\r\npsubscribe\r\n$6\r\nnews.*\r\n:1\r\n"
    );
    assert_eq!(
        publisher.cmd(&[b"PUBLISH", b"news.sport", b"goal"]).await,
        b":1\r\n"
    );
    assert_eq!(
        subscriber.read_reply().await,
        b"*4\r\n$8\r\npmessage\r\n$6\r\nnews.*\r\n$10\r\nnews.sport\r\n$4\r\ngoal\r\n"
    );

    // Data commands are refused while subscribed.
    let reply = subscriber.cmd(&[b"GET", b"k"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
}

// --- Eviction ---

#[tokio::test]
async fn eviction_keeps_memory_bounded() {
    // Five raw 100-byte values with 4-byte keys cost 104 bytes each; the
    // limit sits just below five of them so the sixth insert must evict.
    let config = Config {
        maxmemory: 5 * 104 - 1,
        maxmemory_policy: kyanite::config::EvictionPolicy::AllkeysLru,
        ..test_config()
    };
    let (server, addr) = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let value = vec![b'x'; 100];
    for i in 0..6 {
        let key = format!("k{i:03}");
        assert_eq!(
            client.cmd(&[b"SET", key.as_bytes(), &value]).await,
            b"+OK\r\n"
        );
    }
    assert_eq!(client.cmd(&[b"DBSIZE"]).await, b":5\r\n");
    assert!(server.state().total_used_memory() <= 5 * 104);
}

#[tokio::test]
async fn noeviction_rejects_writes_over_the_limit() {
    let config = Config {
        maxmemory: 100,
        ..test_config()
    };
    let (_server, addr) = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let value = vec![b'x'; 100];
    assert_eq!(client.cmd(&[b"SET", b"a", &value]).await, b"+OK\r\n");
    let reply = client.cmd(&[b"SET", b"b", &value]).await;
    assert!(reply.starts_with(b"-OOM"), "unexpected reply: {reply:?}");
    // Reads still work: "$100\r\n" + payload + CRLF.
    assert_eq!(client.cmd(&[b"GET", b"a"]).await.len(), 108);
}

// --- Authentication / observability ---

#[tokio::test]
async fn requirepass_gates_commands() {
    let config = Config {
        requirepass: Some("hunter2".to_string()),
        ..test_config()
    };
    let (_server, addr) = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"GET", b"k"]).await;
    assert!(reply.starts_with(b"-NOAUTH"), "unexpected reply: {reply:?}");

    let reply = client.cmd(&[b"AUTH", b"wrong"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");

    assert_eq!(client.cmd(&[b"AUTH", b"hunter2"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"GET", b"k"]).await, b"$-1\r\n");
}

#[tokio::test]
async fn adminpass_gates_configured_commands() {
    let config = Config {
        adminpass: Some("root".to_string()),
        commands_need_adminpass: ["flushall".to_string()].into_iter().collect(),
        ..test_config()
    };
    let (_server, addr) = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"FLUSHALL"]).await;
    assert!(reply.starts_with(b"-NOAUTH"), "unexpected reply: {reply:?}");

    assert_eq!(client.cmd(&[b"AUTH", b"root"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"FLUSHALL"]).await, b"+OK\r\n");
}

#[tokio::test]
async fn slowlog_records_when_threshold_is_zero() {
    let config = Config {
        slowlog_log_slower_than: 0,
        ..test_config()
    };
    let (_server, addr) = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.cmd(&[b"SET", b"k", b"v"]).await, b"+OK\r\n");
    let reply = client.cmd(&[b"SLOWLOG", b"LEN"]).await;
    let len: i64 = std::str::from_utf8(&reply[1..reply.len() - 2])
        .unwrap()
        .parse()
        .unwrap();
    assert!(len >= 1, "slowlog should have at least one entry, got {len}");

    assert_eq!(client.cmd(&[b"SLOWLOG", b"RESET"]).await, b"+OK\r\n");
    assert_eq!(client.cmd(&[b"SLOWLOG", b"LEN"]).await, b":0\r\n");
}

#[tokio::test]
async fn config_get_and_set_roundtrip() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"CONFIG", b"GET", b"maxmemory"]).await;
    assert_eq!(reply, b"*2\r\n$9\r\nmaxmemory\r\n$1\r\n0\r\n");

    assert_eq!(
        client.cmd(&[b"CONFIG", b"SET", b"maxmemory", b"1024"]).await,
        b"+OK\r\n"
    );
    let reply = client.cmd(&[b"CONFIG", b"GET", b"maxmemory"]).await;
    assert_eq!(reply, b"*2\r\n$9\r\nmaxmemory\r\n$4\r\n1024\r\n");

    let reply = client.cmd(&[b"CONFIG", b"SET", b"nonsense", b"1"]).await;
    assert!(reply.starts_with(b"-ERR"), "unexpected reply: {reply:?}");
}

#[tokio::test]
async fn info_reports_sections() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"INFO"]).await;
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("# Server"));
    assert!(text.contains("# Stats"));
    assert!(text.contains("connected_clients:"));

    let reply = client.cmd(&[b"INFO", b"memory"]).await;
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("used_memory:"));
    assert!(!text.contains("# Server"));
}

#[tokio::test]
async fn unknown_command_is_an_error() {
    let (_server, addr) = start_server(test_config()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client.cmd(&[b"FROBNICATE", b"x"]).await;
    assert!(
        reply.starts_with(b"-ERR unknown command"),
        "unexpected reply: {reply:?}"
    );
}
