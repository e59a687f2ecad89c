// src/core/commands/mod.rs

//! Defines all supported commands and the central `Command` enum that
//! carries their parsed state through the router.

use crate::core::database::{ExecutionContext, PopDirection, PushDirection};
use crate::core::protocol::RespFrame;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

pub mod command_trait;
pub mod connection;
pub mod hash;
pub mod helpers;
pub mod hyperloglog;
pub mod keyspace;
pub mod list;
pub mod pubsub;
pub mod server;
pub mod set;
pub mod string;
pub mod transaction;
pub mod zset;

pub use command_trait::{CommandFlags, ExecutableCommand, ParseCommand};

use hash::HashReadKind;
use set::{SetAlgebraKind, SetReadKind};
use zset::ZSetReadKind;

/// A fully parsed request. Data commands implement [`ExecutableCommand`];
/// session-level commands (flagged `SESSION`) are interpreted by the router
/// and the session driver instead.
#[derive(Debug, Clone)]
pub enum Command {
    // --- Connection ---
    Ping(connection::Ping),
    Echo(connection::Echo),
    Auth(connection::Auth),
    Select(connection::Select),
    Quit(connection::Quit),
    Shutdown(connection::Shutdown),

    // --- Keyspace ---
    Del(keyspace::Del),
    Exists(keyspace::Exists),
    Expire(keyspace::Expire),
    Ttl(keyspace::Ttl),
    Persist(keyspace::Persist),
    Type(keyspace::TypeCmd),
    Keys(keyspace::Keys),
    RandomKey(keyspace::RandomKey),
    Rename(keyspace::Rename),
    FlushDb(keyspace::FlushDb),
    Object(keyspace::ObjectCmd),

    // --- Server ---
    Info(server::Info),
    Config(server::ConfigCmd),
    Slowlog(server::SlowlogCmd),
    Time(server::Time),
    DbSize(server::DbSize),
    FlushAll(server::FlushAll),

    // --- Strings ---
    Get(string::Get),
    Set(string::Set),
    SetNx(string::SetNx),
    SetWithTtl(string::SetWithTtl),
    MGet(string::MGet),
    MSet(string::MSet),
    Append(string::Append),
    Strlen(string::Strlen),
    IncrBy(string::IncrBy),
    GetRange(string::GetRange),

    // --- Lists ---
    Push(list::Push),
    Pop(list::Pop),
    LLen(list::LLen),
    LRange(list::LRange),
    LIndex(list::LIndex),
    LSet(list::LSet),
    LRem(list::LRem),
    LTrim(list::LTrim),
    RPopLPush(list::RPopLPush),
    BlockingPop(list::BlockingPop),
    BRPopLPush(list::BRPopLPush),

    // --- Hashes ---
    HSet(hash::HSet),
    HSetNx(hash::HSetNx),
    HGet(hash::HGet),
    HMGet(hash::HMGet),
    HDel(hash::HDel),
    HashRead(hash::HashRead),
    HIncrBy(hash::HIncrBy),

    // --- Sets ---
    SAdd(set::SAdd),
    SRem(set::SRem),
    SetRead(set::SetRead),
    SPop(set::SPop),
    SetAlgebra(set::SetAlgebra),

    // --- Sorted sets ---
    ZAdd(zset::ZAdd),
    ZRem(zset::ZRem),
    ZIncrBy(zset::ZIncrBy),
    ZSetRead(zset::ZSetRead),
    ZRange(zset::ZRange),
    ZRangeByScore(zset::ZRangeByScore),
    ZCount(zset::ZCount),

    // --- HyperLogLog ---
    PfAdd(hyperloglog::PfAdd),
    PfCount(hyperloglog::PfCount),
    PfMerge(hyperloglog::PfMerge),

    // --- Pub/Sub ---
    Publish(pubsub::Publish),
    Subscribe(pubsub::Subscribe),
    Unsubscribe(pubsub::Unsubscribe),

    // --- Transactions ---
    Multi(transaction::Multi),
    Exec(transaction::Exec),
    Discard(transaction::Discard),
    Watch(transaction::Watch),
    Unwatch(transaction::Unwatch),
}

/// Splits a request frame into the lowercase command name and its argument
/// frames. Requests are arrays of bulk strings (the inline form is already
/// normalised to that shape by the codec).
pub fn split_request(frame: RespFrame) -> Result<(String, Vec<RespFrame>), KyaniteError> {
    let RespFrame::Array(mut parts) = frame else {
        return Err(KyaniteError::ProtocolError(
            "expected a multi-bulk request".to_string(),
        ));
    };
    if parts.is_empty() {
        return Err(KyaniteError::ProtocolError("empty request".to_string()));
    }
    let name_frame = parts.remove(0);
    let RespFrame::BulkString(raw_name) = name_frame else {
        return Err(KyaniteError::ProtocolError(
            "command name must be a bulk string".to_string(),
        ));
    };
    let name = String::from_utf8_lossy(&raw_name).to_ascii_lowercase();
    Ok((name, parts))
}

/// The bulk-string arguments of a request, for slow-log capture.
pub fn request_arg_bytes(args: &[RespFrame]) -> Vec<Bytes> {
    args.iter()
        .filter_map(|frame| match frame {
            RespFrame::BulkString(b) => Some(b.clone()),
            _ => None,
        })
        .collect()
}

impl Command {
    /// Parses a named command. The name must already be lowercase.
    pub fn parse(name: &str, args: &[RespFrame]) -> Result<Self, KyaniteError> {
        use Command as C;
        Ok(match name {
            // Connection
            "ping" => C::Ping(connection::Ping::parse(args)?),
            "echo" => C::Echo(connection::Echo::parse(args)?),
            "auth" => C::Auth(connection::Auth::parse(args)?),
            "select" => C::Select(connection::Select::parse(args)?),
            "quit" => C::Quit(connection::Quit::parse(args)?),
            "shutdown" => C::Shutdown(connection::Shutdown::parse(args)?),

            // Keyspace
            "del" => C::Del(keyspace::Del::parse(args)?),
            "exists" => C::Exists(keyspace::Exists::parse(args)?),
            "expire" => C::Expire(keyspace::Expire::parse(args, "expire", 1000, false)?),
            "pexpire" => C::Expire(keyspace::Expire::parse(args, "pexpire", 1, false)?),
            "expireat" => C::Expire(keyspace::Expire::parse(args, "expireat", 1000, true)?),
            "pexpireat" => C::Expire(keyspace::Expire::parse(args, "pexpireat", 1, true)?),
            "ttl" => C::Ttl(keyspace::Ttl::parse(args, "ttl", false)?),
            "pttl" => C::Ttl(keyspace::Ttl::parse(args, "pttl", true)?),
            "persist" => C::Persist(keyspace::Persist::parse(args)?),
            "type" => C::Type(keyspace::TypeCmd::parse(args)?),
            "keys" => C::Keys(keyspace::Keys::parse(args)?),
            "randomkey" => C::RandomKey(keyspace::RandomKey::parse(args)?),
            "rename" => C::Rename(keyspace::Rename::parse(args)?),
            "flushdb" => C::FlushDb(keyspace::FlushDb::parse(args)?),
            "object" => C::Object(keyspace::ObjectCmd::parse(args)?),

            // Server
            "info" => C::Info(server::Info::parse(args)?),
            "config" => C::Config(server::ConfigCmd::parse(args)?),
            "slowlog" => C::Slowlog(server::SlowlogCmd::parse(args)?),
            "time" => C::Time(server::Time::parse(args)?),
            "dbsize" => C::DbSize(server::DbSize::parse(args)?),
            "flushall" => C::FlushAll(server::FlushAll::parse(args)?),

            // Strings
            "get" => C::Get(string::Get::parse(args)?),
            "set" => C::Set(string::Set::parse(args)?),
            "setnx" => C::SetNx(string::SetNx::parse(args)?),
            "setex" => C::SetWithTtl(string::SetWithTtl::parse(args, "setex", 1000)?),
            "psetex" => C::SetWithTtl(string::SetWithTtl::parse(args, "psetex", 1)?),
            "mget" => C::MGet(string::MGet::parse(args)?),
            "mset" => C::MSet(string::MSet::parse(args)?),
            "append" => C::Append(string::Append::parse(args)?),
            "strlen" => C::Strlen(string::Strlen::parse(args)?),
            "incr" => C::IncrBy(string::IncrBy::parse(args, "incr", 1, false)?),
            "decr" => C::IncrBy(string::IncrBy::parse(args, "decr", -1, false)?),
            "incrby" => C::IncrBy(string::IncrBy::parse(args, "incrby", 1, true)?),
            "decrby" => C::IncrBy(string::IncrBy::parse(args, "decrby", -1, true)?),
            "getrange" => C::GetRange(string::GetRange::parse(args)?),

            // Lists
            "lpush" => C::Push(list::Push::parse(args, "lpush", PushDirection::Left, false)?),
            "rpush" => C::Push(list::Push::parse(args, "rpush", PushDirection::Right, false)?),
            "lpushx" => C::Push(list::Push::parse(args, "lpushx", PushDirection::Left, true)?),
            "rpushx" => C::Push(list::Push::parse(args, "rpushx", PushDirection::Right, true)?),
            "lpop" => C::Pop(list::Pop::parse(args, "lpop", PopDirection::Left)?),
            "rpop" => C::Pop(list::Pop::parse(args, "rpop", PopDirection::Right)?),
            "llen" => C::LLen(list::LLen::parse(args)?),
            "lrange" => C::LRange(list::LRange::parse(args)?),
            "lindex" => C::LIndex(list::LIndex::parse(args)?),
            "lset" => C::LSet(list::LSet::parse(args)?),
            "lrem" => C::LRem(list::LRem::parse(args)?),
            "ltrim" => C::LTrim(list::LTrim::parse(args)?),
            "rpoplpush" => C::RPopLPush(list::RPopLPush::parse(args)?),
            "blpop" => {
                C::BlockingPop(list::BlockingPop::parse(args, "blpop", PopDirection::Left)?)
            }
            "brpop" => {
                C::BlockingPop(list::BlockingPop::parse(args, "brpop", PopDirection::Right)?)
            }
            "brpoplpush" => C::BRPopLPush(list::BRPopLPush::parse(args)?),

            // Hashes
            "hset" => C::HSet(hash::HSet::parse(args, "hset", false)?),
            "hmset" => C::HSet(hash::HSet::parse(args, "hmset", true)?),
            "hsetnx" => C::HSetNx(hash::HSetNx::parse(args)?),
            "hget" => C::HGet(hash::HGet::parse(args)?),
            "hmget" => C::HMGet(hash::HMGet::parse(args)?),
            "hdel" => C::HDel(hash::HDel::parse(args)?),
            "hlen" => C::HashRead(hash::HashRead::parse(args, "hlen", HashReadKind::Len)?),
            "hexists" => {
                C::HashRead(hash::HashRead::parse(args, "hexists", HashReadKind::Exists)?)
            }
            "hkeys" => C::HashRead(hash::HashRead::parse(args, "hkeys", HashReadKind::Keys)?),
            "hvals" => C::HashRead(hash::HashRead::parse(args, "hvals", HashReadKind::Vals)?),
            "hgetall" => {
                C::HashRead(hash::HashRead::parse(args, "hgetall", HashReadKind::GetAll)?)
            }
            "hincrby" => C::HIncrBy(hash::HIncrBy::parse(args)?),

            // Sets
            "sadd" => C::SAdd(set::SAdd::parse(args)?),
            "srem" => C::SRem(set::SRem::parse(args)?),
            "scard" => C::SetRead(set::SetRead::parse(args, "scard", SetReadKind::Card)?),
            "sismember" => {
                C::SetRead(set::SetRead::parse(args, "sismember", SetReadKind::IsMember)?)
            }
            "smembers" => {
                C::SetRead(set::SetRead::parse(args, "smembers", SetReadKind::Members)?)
            }
            "spop" => C::SPop(set::SPop::parse(args, "spop", true)?),
            "srandmember" => C::SPop(set::SPop::parse(args, "srandmember", false)?),
            "sinter" => {
                C::SetAlgebra(set::SetAlgebra::parse(args, "sinter", SetAlgebraKind::Inter)?)
            }
            "sunion" => {
                C::SetAlgebra(set::SetAlgebra::parse(args, "sunion", SetAlgebraKind::Union)?)
            }
            "sdiff" => {
                C::SetAlgebra(set::SetAlgebra::parse(args, "sdiff", SetAlgebraKind::Diff)?)
            }

            // Sorted sets
            "zadd" => C::ZAdd(zset::ZAdd::parse(args)?),
            "zrem" => C::ZRem(zset::ZRem::parse(args)?),
            "zincrby" => C::ZIncrBy(zset::ZIncrBy::parse(args)?),
            "zscore" => C::ZSetRead(zset::ZSetRead::parse(args, "zscore", ZSetReadKind::Score)?),
            "zcard" => C::ZSetRead(zset::ZSetRead::parse(args, "zcard", ZSetReadKind::Card)?),
            "zrank" => C::ZSetRead(zset::ZSetRead::parse(args, "zrank", ZSetReadKind::Rank)?),
            "zrevrank" => {
                C::ZSetRead(zset::ZSetRead::parse(args, "zrevrank", ZSetReadKind::RevRank)?)
            }
            "zrange" => C::ZRange(zset::ZRange::parse(args, "zrange", false)?),
            "zrevrange" => C::ZRange(zset::ZRange::parse(args, "zrevrange", true)?),
            "zrangebyscore" => C::ZRangeByScore(zset::ZRangeByScore::parse(args)?),
            "zcount" => C::ZCount(zset::ZCount::parse(args)?),

            // HyperLogLog
            "pfadd" => C::PfAdd(hyperloglog::PfAdd::parse(args)?),
            "pfcount" => C::PfCount(hyperloglog::PfCount::parse(args)?),
            "pfmerge" => C::PfMerge(hyperloglog::PfMerge::parse(args)?),

            // Pub/Sub
            "publish" => C::Publish(pubsub::Publish::parse(args)?),
            "subscribe" => C::Subscribe(pubsub::Subscribe::parse(args, "subscribe", false)?),
            "psubscribe" => C::Subscribe(pubsub::Subscribe::parse(args, "psubscribe", true)?),
            "unsubscribe" => C::Unsubscribe(pubsub::Unsubscribe::parse(args, false)?),
            "punsubscribe" => C::Unsubscribe(pubsub::Unsubscribe::parse(args, true)?),

            // Transactions
            "multi" => C::Multi(transaction::Multi::parse(args)?),
            "exec" => C::Exec(transaction::Exec::parse(args)?),
            "discard" => C::Discard(transaction::Discard::parse(args)?),
            "watch" => C::Watch(transaction::Watch::parse(args)?),
            "unwatch" => C::Unwatch(transaction::Unwatch::parse(args)?),

            _ => return Err(KyaniteError::UnknownCommand(name.to_string())),
        })
    }

    /// The flags driving lock mode, auth gating and routing.
    pub fn flags(&self) -> CommandFlags {
        use Command as C;
        use CommandFlags as F;
        match self {
            C::Ping(_) | C::Echo(_) | C::Select(_) => F::SESSION,
            C::Auth(_) | C::Quit(_) => F::SESSION | F::NO_AUTH,
            C::Shutdown(_) => F::SESSION,

            C::Del(_) | C::Persist(_) | C::Rename(_) | C::FlushDb(_) | C::Expire(_) => F::WRITE,
            C::Exists(_)
            | C::Ttl(_)
            | C::Type(_)
            | C::Keys(_)
            | C::RandomKey(_)
            | C::Object(_) => F::READONLY,

            C::Info(_) | C::Config(_) | C::Slowlog(_) | C::Time(_) | C::DbSize(_)
            | C::FlushAll(_) => F::SESSION,

            C::Get(_) | C::MGet(_) | C::Strlen(_) | C::GetRange(_) => F::READONLY,
            C::Set(_) | C::SetNx(_) | C::SetWithTtl(_) | C::MSet(_) | C::Append(_)
            | C::IncrBy(_) => F::WRITE | F::DENY_OOM,

            C::Push(_) | C::LSet(_) | C::RPopLPush(_) => F::WRITE | F::DENY_OOM,
            C::Pop(_) | C::LRem(_) | C::LTrim(_) => F::WRITE,
            C::LLen(_) | C::LRange(_) | C::LIndex(_) => F::READONLY,
            C::BlockingPop(_) => F::WRITE | F::BLOCKING,
            C::BRPopLPush(_) => F::WRITE | F::DENY_OOM | F::BLOCKING,

            C::HSet(_) | C::HSetNx(_) | C::HIncrBy(_) => F::WRITE | F::DENY_OOM,
            C::HDel(_) => F::WRITE,
            C::HGet(_) | C::HMGet(_) | C::HashRead(_) => F::READONLY,

            C::SAdd(_) => F::WRITE | F::DENY_OOM,
            C::SRem(_) => F::WRITE,
            C::SPop(cmd) => {
                if cmd.remove {
                    F::WRITE
                } else {
                    F::READONLY
                }
            }
            C::SetRead(_) | C::SetAlgebra(_) => F::READONLY,

            C::ZAdd(_) | C::ZIncrBy(_) => F::WRITE | F::DENY_OOM,
            C::ZRem(_) => F::WRITE,
            C::ZSetRead(_) | C::ZRange(_) | C::ZRangeByScore(_) | C::ZCount(_) => F::READONLY,

            C::PfAdd(_) | C::PfMerge(_) => F::WRITE | F::DENY_OOM,
            C::PfCount(_) => F::READONLY,

            C::Publish(_) => F::WRITE,
            C::Subscribe(_) | C::Unsubscribe(_) => F::SESSION,

            C::Multi(_) | C::Exec(_) | C::Discard(_) | C::Watch(_) | C::Unwatch(_) => {
                F::SESSION | F::TRANSACTION
            }
        }
    }

    /// Runs a data command against the held database lock. Session commands
    /// never reach this point.
    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        use Command as C;
        match self {
            C::Del(c) => c.execute(ctx),
            C::Exists(c) => c.execute(ctx),
            C::Expire(c) => c.execute(ctx),
            C::Ttl(c) => c.execute(ctx),
            C::Persist(c) => c.execute(ctx),
            C::Type(c) => c.execute(ctx),
            C::Keys(c) => c.execute(ctx),
            C::RandomKey(c) => c.execute(ctx),
            C::Rename(c) => c.execute(ctx),
            C::FlushDb(c) => c.execute(ctx),
            C::Object(c) => c.execute(ctx),

            C::Get(c) => c.execute(ctx),
            C::Set(c) => c.execute(ctx),
            C::SetNx(c) => c.execute(ctx),
            C::SetWithTtl(c) => c.execute(ctx),
            C::MGet(c) => c.execute(ctx),
            C::MSet(c) => c.execute(ctx),
            C::Append(c) => c.execute(ctx),
            C::Strlen(c) => c.execute(ctx),
            C::IncrBy(c) => c.execute(ctx),
            C::GetRange(c) => c.execute(ctx),

            C::Push(c) => c.execute(ctx),
            C::Pop(c) => c.execute(ctx),
            C::LLen(c) => c.execute(ctx),
            C::LRange(c) => c.execute(ctx),
            C::LIndex(c) => c.execute(ctx),
            C::LSet(c) => c.execute(ctx),
            C::LRem(c) => c.execute(ctx),
            C::LTrim(c) => c.execute(ctx),
            C::RPopLPush(c) => c.execute(ctx),

            C::HSet(c) => c.execute(ctx),
            C::HSetNx(c) => c.execute(ctx),
            C::HGet(c) => c.execute(ctx),
            C::HMGet(c) => c.execute(ctx),
            C::HDel(c) => c.execute(ctx),
            C::HashRead(c) => c.execute(ctx),
            C::HIncrBy(c) => c.execute(ctx),

            C::SAdd(c) => c.execute(ctx),
            C::SRem(c) => c.execute(ctx),
            C::SetRead(c) => c.execute(ctx),
            C::SPop(c) => c.execute(ctx),
            C::SetAlgebra(c) => c.execute(ctx),

            C::ZAdd(c) => c.execute(ctx),
            C::ZRem(c) => c.execute(ctx),
            C::ZIncrBy(c) => c.execute(ctx),
            C::ZSetRead(c) => c.execute(ctx),
            C::ZRange(c) => c.execute(ctx),
            C::ZRangeByScore(c) => c.execute(ctx),
            C::ZCount(c) => c.execute(ctx),

            C::PfAdd(c) => c.execute(ctx),
            C::PfCount(c) => c.execute(ctx),
            C::PfMerge(c) => c.execute(ctx),

            C::Publish(c) => c.execute(ctx),

            C::Ping(_)
            | C::Echo(_)
            | C::Auth(_)
            | C::Select(_)
            | C::Quit(_)
            | C::Shutdown(_)
            | C::Info(_)
            | C::Config(_)
            | C::Slowlog(_)
            | C::Time(_)
            | C::DbSize(_)
            | C::FlushAll(_)
            | C::Subscribe(_)
            | C::Unsubscribe(_)
            | C::BlockingPop(_)
            | C::BRPopLPush(_)
            | C::Multi(_)
            | C::Exec(_)
            | C::Discard(_)
            | C::Watch(_)
            | C::Unwatch(_) => Err(KyaniteError::Internal(
                "session-level command reached the data execution path".to_string(),
            )),
        }
    }
}
