// src/core/handler/mod.rs

//! The command router: takes a decoded request frame, enforces
//! authentication and mode restrictions, stages transactions, picks the
//! database lock mode, executes, and produces the session's next step.

use crate::config::HotConfig;
use crate::core::commands::command_trait::CommandFlags;
use crate::core::commands::{self, Command};
use crate::core::database::eviction::free_memory_if_needed;
use crate::core::database::{DbGuard, ExecutionContext, SessionWake, Waiter, now_unix_ms};
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::{KyaniteError, RespValue};
use crate::connection::session::{Session, SessionMode};
use crate::server::handoff::{BlockedOn, ToDispatcher};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// What the session driver should do after a request was handled.
#[derive(Debug)]
pub enum Flow {
    Reply(RespValue),
    /// Several frames in sequence (subscription acknowledgements, EXEC).
    Replies(Vec<RespValue>),
    /// Park the session at the dispatcher until woken or timed out.
    Block(BlockedOn),
    /// Write the optional reply, then close the connection.
    Close(Option<RespValue>),
}

impl Flow {
    fn error(e: KyaniteError) -> Flow {
        Flow::Reply(RespValue::Error(e.to_string()))
    }
}

/// Routes one decoded request for `session`. Wake-ups produced while serving
/// ready keys are forwarded to the dispatcher before this returns.
pub async fn dispatch(
    state: &Arc<ServerState>,
    session: &mut Session,
    hot: &Arc<HotConfig>,
    frame: RespFrame,
) -> Flow {
    // A blank inline line parses to an empty array and is silently skipped.
    if matches!(&frame, RespFrame::Array(parts) if parts.is_empty()) {
        return Flow::Replies(Vec::new());
    }

    let (name, args) = match commands::split_request(frame) {
        Ok(split) => split,
        Err(e) => {
            // Protocol-level garbage poisons an open transaction.
            if let SessionMode::InMulti { aborted, .. } = &mut session.mode {
                *aborted = true;
            }
            return Flow::error(e);
        }
    };
    let raw_args = commands::request_arg_bytes(&args);

    let command = match Command::parse(&name, &args) {
        Ok(command) => command,
        Err(e) => {
            if let SessionMode::InMulti { aborted, .. } = &mut session.mode {
                *aborted = true;
            }
            return Flow::error(e);
        }
    };
    let flags = command.flags();

    // Authentication gates.
    if hot.requirepass.is_some() && !session.authenticated && !flags.contains(CommandFlags::NO_AUTH)
    {
        return Flow::error(KyaniteError::AuthRequired);
    }
    if hot.commands_need_adminpass.contains(&name) && !session.admin {
        return Flow::error(KyaniteError::AdminRequired);
    }

    // In subscriber mode only the subscription surface and PING/QUIT work.
    if session.is_subscribed()
        && !matches!(
            command,
            Command::Subscribe(_) | Command::Unsubscribe(_) | Command::Ping(_) | Command::Quit(_)
        )
    {
        return Flow::error(KyaniteError::Generic(format!(
            "only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context, got '{name}'"
        )));
    }

    // Transaction staging: anything but the control commands is queued.
    if session.in_multi() && !flags.contains(CommandFlags::TRANSACTION) {
        if flags.contains(CommandFlags::SESSION) {
            if let SessionMode::InMulti { aborted, .. } = &mut session.mode {
                *aborted = true;
            }
            return Flow::error(KyaniteError::Generic(format!(
                "{} is not allowed in transactions",
                name.to_ascii_uppercase()
            )));
        }
        if let SessionMode::InMulti { queued, .. } = &mut session.mode {
            queued.push(command);
        }
        return Flow::Reply(RespValue::SimpleString("QUEUED".to_string()));
    }

    match command {
        // --- Session-level commands ---
        Command::Ping(cmd) => Flow::Reply(match cmd.message {
            Some(message) => RespValue::BulkString(message),
            None => RespValue::SimpleString("PONG".to_string()),
        }),
        Command::Echo(cmd) => Flow::Reply(RespValue::BulkString(cmd.message)),
        Command::Auth(cmd) => handle_auth(session, hot, &cmd.password),
        Command::Select(cmd) => {
            if cmd.index < 0 || cmd.index as usize >= state.dbs.len() {
                Flow::error(KyaniteError::InvalidDbIndex)
            } else {
                session.select_db(cmd.index as usize);
                Flow::Reply(RespValue::ok())
            }
        }
        Command::Quit(_) => Flow::Close(Some(RespValue::ok())),
        Command::Shutdown(cmd) => {
            warn!(
                nosave = cmd.nosave,
                "SHUTDOWN requested by client {}", session.addr
            );
            state.begin_shutdown();
            Flow::Close(None)
        }

        Command::Info(cmd) => Flow::Reply(commands::server::info_reply(
            state,
            cmd.section.as_deref(),
        )),
        Command::Config(cmd) => handle_config(state, cmd),
        Command::Slowlog(cmd) => Flow::Reply(match cmd {
            commands::server::SlowlogCmd::Get(count) => state.slowlog.get(count),
            commands::server::SlowlogCmd::Len => RespValue::Integer(state.slowlog.len() as i64),
            commands::server::SlowlogCmd::Reset => {
                state.slowlog.reset();
                RespValue::ok()
            }
        }),
        Command::Time(_) => Flow::Reply(commands::server::time_reply()),
        Command::DbSize(_) => {
            let count = state
                .get_db(session.db_index)
                .map_or(0, |db| db.key_count());
            Flow::Reply(RespValue::Integer(count as i64))
        }
        Command::FlushAll(_) => {
            for db in &state.dbs {
                let dirty = {
                    let mut inner = db.write();
                    inner.empty(|_| {});
                    inner.take_dirty_watchers()
                };
                for id in dirty {
                    state.clients.mark_dirty_cas(id);
                }
            }
            Flow::Reply(RespValue::ok())
        }

        Command::Subscribe(cmd) => handle_subscribe(state, session, cmd),
        Command::Unsubscribe(cmd) => handle_unsubscribe(session, cmd),

        Command::Multi(_) => {
            if session.in_multi() {
                Flow::error(KyaniteError::NestedMulti)
            } else {
                session.mode = SessionMode::InMulti {
                    queued: Vec::new(),
                    aborted: false,
                };
                Flow::Reply(RespValue::ok())
            }
        }
        Command::Exec(_) => handle_exec(state, session, hot).await,
        Command::Discard(_) => {
            if !session.in_multi() {
                return Flow::error(KyaniteError::NotInMulti("DISCARD"));
            }
            session.mode = SessionMode::Normal;
            unwatch_all(state, session);
            Flow::Reply(RespValue::ok())
        }
        Command::Watch(cmd) => {
            if session.in_multi() {
                return Flow::error(KyaniteError::WatchInMulti);
            }
            let Some(db) = state.get_db(session.db_index) else {
                return Flow::error(KyaniteError::InvalidDbIndex);
            };
            {
                let mut inner = db.write();
                for key in &cmd.keys {
                    inner.watch_key(key.clone(), session.id);
                }
            }
            for key in cmd.keys {
                session.watched.push((session.db_index, key));
            }
            Flow::Reply(RespValue::ok())
        }
        Command::Unwatch(_) => {
            unwatch_all(state, session);
            Flow::Reply(RespValue::ok())
        }

        // --- Blocking commands ---
        command if flags.contains(CommandFlags::BLOCKING) => {
            handle_blocking(state, session, hot, command).await
        }

        // --- Data commands ---
        command => {
            let (result, wakes) = execute_data(
                state,
                hot,
                session.db_index,
                session.id,
                &command,
                &name,
                &raw_args,
            );
            forward_wakes(state, wakes).await;
            match result {
                Ok(reply) => Flow::Reply(reply),
                Err(e) => Flow::error(e),
            }
        }
    }
}

/// Executes one data command under the appropriate database lock, serving
/// any ready keys and draining dirty watchers before the lock is released.
/// Returns the reply plus the wake-ups to forward to the dispatcher.
pub fn execute_data(
    state: &Arc<ServerState>,
    hot: &Arc<HotConfig>,
    db_index: usize,
    session_id: u64,
    command: &Command,
    name: &str,
    raw_args: &[Bytes],
) -> (Result<RespValue, KyaniteError>, Vec<SessionWake>) {
    let flags = command.flags();

    if flags.contains(CommandFlags::DENY_OOM)
        && let Err(e) = free_memory_if_needed(state, hot)
    {
        return (Err(e), Vec::new());
    }

    let Some(db) = state.get_db(db_index) else {
        return (Err(KyaniteError::InvalidDbIndex), Vec::new());
    };

    let started = Instant::now();
    let now_ms = now_unix_ms();
    let lru_clock = state.lru_clock();

    let (result, wakes) = {
        let guard = if flags.contains(CommandFlags::READONLY) {
            DbGuard::Shared(db.read())
        } else {
            DbGuard::Exclusive(db.write())
        };
        let mut ctx = ExecutionContext {
            state,
            db: &db,
            guard,
            session_id,
            now_ms,
            lru_clock,
        };
        let result = command.execute(&mut ctx);

        // Post-command housekeeping, still under the lock: hand ready data
        // to blocked sessions and flag dirtied WATCHers in commit order.
        let wakes = match &mut ctx.guard {
            DbGuard::Exclusive(inner) => {
                let wakes = if inner.has_ready_keys() {
                    inner.serve_ready_keys(now_ms, lru_clock)
                } else {
                    Vec::new()
                };
                for id in inner.take_dirty_watchers() {
                    state.clients.mark_dirty_cas(id);
                }
                wakes
            }
            DbGuard::Shared(_) => Vec::new(),
        };
        (result, wakes)
    };

    state.stats.command_processed();
    record_slowlog(state, hot, name, raw_args, started.elapsed());
    (result, wakes)
}

fn record_slowlog(
    state: &ServerState,
    hot: &HotConfig,
    name: &str,
    raw_args: &[Bytes],
    elapsed: Duration,
) {
    if hot.slowlog_log_slower_than < 0 {
        return;
    }
    if elapsed.as_micros() as i64 >= hot.slowlog_log_slower_than {
        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        state.slowlog.record(name, raw_args, elapsed, unix_time);
    }
}

/// Sends the produced wake-ups to the dispatcher. Called after every lock is
/// released; the send may suspend.
pub async fn forward_wakes(state: &Arc<ServerState>, wakes: Vec<SessionWake>) {
    for wake in wakes {
        if state
            .dispatcher_tx
            .send(ToDispatcher::Wake {
                session_id: wake.session_id,
                reply: wake.reply,
            })
            .await
            .is_err()
        {
            debug!("dispatcher gone while forwarding wake-ups");
            return;
        }
    }
}

fn handle_auth(session: &mut Session, hot: &HotConfig, password: &str) -> Flow {
    if hot.requirepass.is_none() && hot.adminpass.is_none() {
        return Flow::error(KyaniteError::NoPasswordConfigured);
    }
    if hot.adminpass.as_deref() == Some(password) {
        session.authenticated = true;
        session.admin = true;
        return Flow::Reply(RespValue::ok());
    }
    if hot.requirepass.as_deref() == Some(password) {
        session.authenticated = true;
        return Flow::Reply(RespValue::ok());
    }
    Flow::error(KyaniteError::InvalidPassword)
}

fn handle_config(state: &Arc<ServerState>, cmd: commands::server::ConfigCmd) -> Flow {
    use commands::server::ConfigCmd;
    match cmd {
        ConfigCmd::Get(pattern) => Flow::Reply(commands::server::config_get_reply(state, &pattern)),
        ConfigCmd::Set(name, value) => match commands::server::config_set(state, &name, &value) {
            Ok(()) => Flow::Reply(RespValue::ok()),
            Err(e) => Flow::error(e),
        },
        ConfigCmd::ResetStat => {
            state.stats.reset();
            Flow::Reply(RespValue::ok())
        }
    }
}

fn handle_subscribe(
    state: &Arc<ServerState>,
    session: &mut Session,
    cmd: commands::pubsub::Subscribe,
) -> Flow {
    let Some(db) = state.get_db(session.db_index) else {
        return Flow::error(KyaniteError::InvalidDbIndex);
    };
    let kind = if cmd.patterns { "psubscribe" } else { "subscribe" };
    let mut acks = Vec::with_capacity(cmd.targets.len());
    for target in cmd.targets {
        {
            let mut inner = db.write();
            if cmd.patterns {
                let rx = inner.pubsub.subscribe_pattern(&target);
                session
                    .pattern_subs
                    .insert(target.clone(), BroadcastStream::new(rx));
            } else {
                let rx = inner.pubsub.subscribe(&target);
                session
                    .channel_subs
                    .insert(target.clone(), BroadcastStream::new(rx));
            }
        }
        acks.push(RespValue::Array(vec![
            RespValue::BulkString(kind.into()),
            RespValue::BulkString(target),
            RespValue::Integer(session.subscription_count() as i64),
        ]));
    }
    Flow::Replies(acks)
}

fn handle_unsubscribe(session: &mut Session, cmd: commands::pubsub::Unsubscribe) -> Flow {
    let kind = if cmd.patterns {
        "punsubscribe"
    } else {
        "unsubscribe"
    };
    let targets: Vec<Bytes> = if cmd.targets.is_empty() {
        if cmd.patterns {
            session.pattern_subs.keys().cloned().collect()
        } else {
            session.channel_subs.keys().cloned().collect()
        }
    } else {
        cmd.targets
    };

    if targets.is_empty() {
        return Flow::Reply(RespValue::Array(vec![
            RespValue::BulkString(kind.into()),
            RespValue::Null,
            RespValue::Integer(session.subscription_count() as i64),
        ]));
    }

    let mut acks = Vec::with_capacity(targets.len());
    for target in targets {
        if cmd.patterns {
            session.pattern_subs.remove(&target);
        } else {
            session.channel_subs.remove(&target);
        }
        acks.push(RespValue::Array(vec![
            RespValue::BulkString(kind.into()),
            RespValue::BulkString(target),
            RespValue::Integer(session.subscription_count() as i64),
        ]));
    }
    Flow::Replies(acks)
}

/// Commits or aborts an open transaction.
async fn handle_exec(
    state: &Arc<ServerState>,
    session: &mut Session,
    hot: &Arc<HotConfig>,
) -> Flow {
    let SessionMode::InMulti { queued, aborted } =
        std::mem::replace(&mut session.mode, SessionMode::Normal)
    else {
        return Flow::error(KyaniteError::NotInMulti("EXEC"));
    };

    if aborted {
        unwatch_all(state, session);
        return Flow::error(KyaniteError::ExecAborted);
    }

    // Optimistic check: any watched key modified since WATCH aborts.
    let dirty = session.handle.take_dirty_cas();
    unwatch_all(state, session);
    if dirty {
        debug!("session {}: EXEC aborted by dirty WATCH", session.id);
        return Flow::Reply(RespValue::NullArray);
    }

    // Each staged command runs in its own lock scope so a long transaction
    // does not monopolise the database.
    let mut replies = Vec::with_capacity(queued.len());
    let mut all_wakes = Vec::new();
    for command in &queued {
        let (result, wakes) = match command {
            // Blocking commands act non-blocking inside a transaction.
            Command::BlockingPop(cmd) => exec_nonblocking_pop(state, session, cmd),
            Command::BRPopLPush(cmd) => exec_nonblocking_move(state, session, cmd),
            command => execute_data(
                state,
                hot,
                session.db_index,
                session.id,
                command,
                "exec",
                &[],
            ),
        };
        all_wakes.extend(wakes);
        replies.push(match result {
            Ok(reply) => reply,
            Err(e) => RespValue::Error(e.to_string()),
        });
    }
    forward_wakes(state, all_wakes).await;
    Flow::Reply(RespValue::Array(replies))
}

fn exec_nonblocking_pop(
    state: &Arc<ServerState>,
    session: &Session,
    cmd: &commands::list::BlockingPop,
) -> (Result<RespValue, KyaniteError>, Vec<SessionWake>) {
    with_exclusive_ctx(
        state,
        session.db_index,
        session.id,
        Err(KyaniteError::InvalidDbIndex),
        |ctx| {
            Ok(
                match commands::list::try_pop_first(ctx, &cmd.keys, cmd.direction)? {
                    Some(reply) => reply,
                    None => RespValue::NullArray,
                },
            )
        },
    )
}

fn exec_nonblocking_move(
    state: &Arc<ServerState>,
    session: &Session,
    cmd: &commands::list::BRPopLPush,
) -> (Result<RespValue, KyaniteError>, Vec<SessionWake>) {
    with_exclusive_ctx(
        state,
        session.db_index,
        session.id,
        Err(KyaniteError::InvalidDbIndex),
        |ctx| {
            Ok(
                match commands::list::rpoplpush_logic(ctx, &cmd.source, &cmd.destination)? {
                    Some(value) => RespValue::BulkString(value),
                    None => RespValue::Null,
                },
            )
        },
    )
}

/// Runs `f` with an exclusive execution context, then performs the standard
/// under-lock housekeeping (ready keys, dirty watchers).
fn with_exclusive_ctx<R>(
    state: &Arc<ServerState>,
    db_index: usize,
    session_id: u64,
    on_missing_db: R,
    f: impl FnOnce(&mut ExecutionContext<'_>) -> R,
) -> (R, Vec<SessionWake>) {
    let Some(db) = state.get_db(db_index) else {
        return (on_missing_db, Vec::new());
    };
    let now_ms = now_unix_ms();
    let lru_clock = state.lru_clock();
    let mut ctx = ExecutionContext {
        state,
        db: &db,
        guard: DbGuard::Exclusive(db.write()),
        session_id,
        now_ms,
        lru_clock,
    };
    let result = f(&mut ctx);
    let wakes = match &mut ctx.guard {
        DbGuard::Exclusive(inner) => {
            let wakes = if inner.has_ready_keys() {
                inner.serve_ready_keys(now_ms, lru_clock)
            } else {
                Vec::new()
            };
            for id in inner.take_dirty_watchers() {
                state.clients.mark_dirty_cas(id);
            }
            wakes
        }
        DbGuard::Shared(_) => Vec::new(),
    };
    (result, wakes)
}

/// The immediate half of a blocking command: serve now if data is present,
/// otherwise register the waiter (under the same lock that proved the keys
/// empty) and hand the session over for parking.
async fn handle_blocking(
    state: &Arc<ServerState>,
    session: &mut Session,
    hot: &Arc<HotConfig>,
    command: Command,
) -> Flow {
    if command.flags().contains(CommandFlags::DENY_OOM)
        && let Err(e) = free_memory_if_needed(state, hot)
    {
        return Flow::error(e);
    }

    let (keys, direction, target, timeout_secs) = match &command {
        Command::BlockingPop(cmd) => (cmd.keys.clone(), cmd.direction, None, cmd.timeout_secs),
        Command::BRPopLPush(cmd) => (
            vec![cmd.source.clone()],
            crate::core::database::PopDirection::Right,
            Some(cmd.destination.clone()),
            cmd.timeout_secs,
        ),
        _ => {
            return Flow::error(KyaniteError::Internal(
                "non-blocking command in blocking path".to_string(),
            ));
        }
    };

    let session_id = session.id;
    let (result, wakes) = with_exclusive_ctx(
        state,
        session.db_index,
        session_id,
        Err(KyaniteError::InvalidDbIndex),
        |ctx| {
            let served = match &command {
                Command::BlockingPop(cmd) => {
                    commands::list::try_pop_first(ctx, &cmd.keys, cmd.direction)?
                }
                Command::BRPopLPush(cmd) => {
                    commands::list::rpoplpush_logic(ctx, &cmd.source, &cmd.destination)?
                        .map(RespValue::BulkString)
                }
                _ => None,
            };
            if served.is_none() {
                // Nothing to serve: register before the lock drops so a
                // concurrent push cannot slip between check and wait.
                ctx.inner_mut()?.register_waiter(
                    &keys,
                    Waiter {
                        session_id,
                        direction,
                        target: target.clone(),
                    },
                );
            }
            Ok(served)
        },
    );
    state.stats.command_processed();
    forward_wakes(state, wakes).await;

    match result {
        Ok(Some(reply)) => Flow::Reply(reply),
        Ok(None) => {
            let deadline = if timeout_secs == 0 {
                None
            } else {
                Some(Instant::now() + Duration::from_secs(timeout_secs))
            };
            Flow::Block(BlockedOn {
                db_index: session.db_index,
                keys,
                deadline,
            })
        }
        Err(e) => Flow::error(e),
    }
}

/// Drops every WATCH this session holds, across all databases, and clears
/// the dirty flag so a stale signal cannot leak into the next transaction.
pub fn unwatch_all(state: &Arc<ServerState>, session: &mut Session) {
    if session.watched.is_empty() {
        session.handle.take_dirty_cas();
        return;
    }
    let mut by_db: HashMap<usize, Vec<Bytes>> = HashMap::new();
    for (db_index, key) in session.watched.drain(..) {
        by_db.entry(db_index).or_default().push(key);
    }
    for (db_index, keys) in by_db {
        if let Some(db) = state.get_db(db_index) {
            db.write().unwatch_keys(&keys, session.id);
        }
    }
    session.handle.take_dirty_cas();
}

/// Final teardown for a session leaving its worker for good: WATCHes and the
/// registry entry are released. Subscription receivers drop with the session.
pub fn cleanup_session(state: &Arc<ServerState>, session: &mut Session) {
    unwatch_all(state, session);
    state.clients.unregister(session.id);
}
