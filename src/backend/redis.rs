// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend.
//!
//! One [`ConnectionManager`] is shared by every clone of the backend; it
//! multiplexes commands over a single connection and reconnects on its own.
//! Transactions are sent as an atomic pipeline (`MULTI ... EXEC`), and the
//! three compound operations run as Lua scripts via `EVAL` so they can be
//! queued inside a transaction like any other command.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, from_redis_value, Client, Cmd, Value};
use tracing::{debug, info, instrument};

use super::command::{Command, Reply};
use super::traits::{Backend, CacheError};
use crate::config::CacheConfig;
use crate::resilience::retry::{retry, RetryConfig};

/// ZINCRBY every `member, delta` pair in ARGV; drop members at or below zero.
const APPLY_DELTAS_SCRIPT: &str = r#"
local res = {}
for i = 1, #ARGV, 2 do
    local member = ARGV[i]
    local score = redis.call('ZINCRBY', KEYS[1], ARGV[i + 1], member)
    res[#res + 1] = score
    if tonumber(score) <= 0 then
        redis.call('ZREM', KEYS[1], member)
    end
end
return res
"#;

/// Walk a sorted set ten entries at a time, narrowing the score window past
/// the last score seen, until the leading numbers of the visited members add
/// up to ARGV[1]. ARGV[2] is '1' for highest-first.
const WALK_UNTIL_SUM_SCRIPT: &str = r#"
local amount = tonumber(ARGV[1])
local result = {}
if amount == nil or amount <= 0 then
    return result
end

local func = 'ZRANGEBYSCORE'
local s_start = '-inf'
local s_end = '+inf'
if ARGV[2] == '1' then
    func = 'ZREVRANGEBYSCORE'
    s_start = '+inf'
    s_end = '-inf'
end

local sum = 0
repeat
    local page = redis.call(func, KEYS[1], s_start, s_end, 'WITHSCORES', 'LIMIT', 0, 10)
    for i = 1, #page, 2 do
        local member = page[i]
        local field = string.match(member, '^([^,]*)')
        local qty = tonumber(string.match(field, '(%-?[%d%.]*%d)[^%d]*$')) or 0
        sum = sum + qty
        result[#result + 1] = member
        result[#result + 1] = page[i + 1]
        s_start = '(' .. page[i + 1]
        if sum >= amount then
            return result
        end
    end
until #page == 0
return result
"#;

/// Compare-and-delete used for lock release.
const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
}

impl RedisBackend {
    /// Connect using the configured host, port, password and database.
    ///
    /// The initial connection is retried with [`RetryConfig::startup`] so a
    /// misconfigured address fails within seconds instead of hanging.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        info!(host = %config.host, port = config.port, db = config.db, "Connecting to cache");
        let client = Client::open(config.connection_info())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| CacheError::Unavailable(e.to_string()))?;

        info!("Connected to cache");
        Ok(Self { connection })
    }
}

fn eval(script: &str, key: &str) -> Cmd {
    let mut c = cmd("EVAL");
    c.arg(script).arg(1).arg(key);
    c
}

/// Render a command in the store's wire vocabulary.
pub(crate) fn to_cmd(command: &Command) -> Cmd {
    match command {
        Command::Get { key } => cmd("GET").arg(key).clone(),
        Command::Set { key, value } => cmd("SET").arg(key).arg(value).clone(),
        Command::SetEx { key, value, seconds } => cmd("SETEX").arg(key).arg(*seconds).arg(value).clone(),
        Command::SetNxPx { key, value, millis } => cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(*millis)
            .arg("NX")
            .clone(),
        Command::Del { key } => cmd("DEL").arg(key).clone(),
        Command::Exists { key } => cmd("EXISTS").arg(key).clone(),
        Command::IncrByFloat { key, delta } => cmd("INCRBYFLOAT").arg(key).arg(*delta).clone(),

        Command::RPush { key, value } => cmd("RPUSH").arg(key).arg(value).clone(),
        Command::LRange { key, start, stop } => cmd("LRANGE").arg(key).arg(*start).arg(*stop).clone(),
        Command::LLen { key } => cmd("LLEN").arg(key).clone(),
        Command::LTrim { key, start, stop } => cmd("LTRIM").arg(key).arg(*start).arg(*stop).clone(),

        Command::HSet { key, entries } => {
            let mut c = cmd("HSET");
            c.arg(key);
            for (field, value) in entries {
                c.arg(field).arg(value);
            }
            c
        }
        Command::HGet { key, field } => cmd("HGET").arg(key).arg(field).clone(),
        Command::HGetAll { key } => cmd("HGETALL").arg(key).clone(),
        Command::HDel { key, fields } => cmd("HDEL").arg(key).arg(fields).clone(),
        Command::HExists { key, field } => cmd("HEXISTS").arg(key).arg(field).clone(),
        Command::HIncrByFloat { key, field, delta } => {
            cmd("HINCRBYFLOAT").arg(key).arg(field).arg(*delta).clone()
        }

        Command::ZAddNx { key, entries } => {
            let mut c = cmd("ZADD");
            c.arg(key).arg("NX");
            for (score, member) in entries {
                c.arg(*score).arg(member);
            }
            c
        }
        Command::ZRangeByScore { key, min, max, rev, with_scores, limit } => {
            let mut c = if *rev {
                let mut c = cmd("ZREVRANGEBYSCORE");
                c.arg(key).arg(max.to_string()).arg(min.to_string());
                c
            } else {
                let mut c = cmd("ZRANGEBYSCORE");
                c.arg(key).arg(min.to_string()).arg(max.to_string());
                c
            };
            if *with_scores {
                c.arg("WITHSCORES");
            }
            if let Some((offset, count)) = limit {
                c.arg("LIMIT").arg(*offset).arg(*count);
            }
            c
        }
        Command::ZRem { key, members } => cmd("ZREM").arg(key).arg(members).clone(),
        Command::ZRemRangeByScore { key, min, max } => cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min.to_string())
            .arg(max.to_string())
            .clone(),
        Command::ZScan { key, cursor, pattern, count } => {
            let mut c = cmd("ZSCAN");
            c.arg(key).arg(cursor);
            if let Some(pattern) = pattern {
                c.arg("MATCH").arg(pattern);
            }
            if let Some(count) = count {
                c.arg("COUNT").arg(*count);
            }
            c
        }

        Command::ApplyDeltas { key, deltas } => {
            let mut c = eval(APPLY_DELTAS_SCRIPT, key);
            for (member, delta) in deltas {
                c.arg(member).arg(*delta);
            }
            c
        }
        Command::WalkUntilSum { key, amount, desc } => {
            let mut c = eval(WALK_UNTIL_SUM_SCRIPT, key);
            c.arg(*amount).arg(if *desc { "1" } else { "0" });
            c
        }
        Command::DeleteIfEquals { key, value } => {
            let mut c = eval(DELETE_IF_EQUALS_SCRIPT, key);
            c.arg(value);
            c
        }
    }
}

/// Interpret a raw reply according to the command that produced it.
pub(crate) fn to_reply(command: &Command, value: &Value) -> Result<Reply, CacheError> {
    let reply = match command {
        Command::Get { .. } | Command::HGet { .. } => {
            from_redis_value::<Option<String>>(value)?.map_or(Reply::Nil, Reply::Text)
        }
        Command::SetNxPx { .. } => {
            from_redis_value::<Option<String>>(value)?.map_or(Reply::Nil, |_| Reply::Okay)
        }
        Command::Set { .. } | Command::SetEx { .. } | Command::LTrim { .. } => Reply::Okay,
        Command::Del { .. }
        | Command::Exists { .. }
        | Command::RPush { .. }
        | Command::LLen { .. }
        | Command::HSet { .. }
        | Command::HDel { .. }
        | Command::HExists { .. }
        | Command::ZAddNx { .. }
        | Command::ZRem { .. }
        | Command::ZRemRangeByScore { .. }
        | Command::DeleteIfEquals { .. } => Reply::Int(from_redis_value(value)?),
        Command::IncrByFloat { .. } | Command::HIncrByFloat { .. } => {
            Reply::Float(from_redis_value(value)?)
        }
        Command::LRange { .. }
        | Command::HGetAll { .. }
        | Command::ZRangeByScore { .. }
        | Command::WalkUntilSum { .. } => Reply::Items(from_redis_value(value)?),
        Command::ZScan { .. } => {
            let (cursor, items): (String, Vec<String>) = from_redis_value(value)?;
            Reply::Scan { cursor, items }
        }
        Command::ApplyDeltas { .. } => Reply::Floats(from_redis_value(value)?),
    };
    Ok(reply)
}

#[async_trait]
impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self, command), fields(op = command.name(), key = command.key()))]
    async fn run(&self, command: Command) -> Result<Reply, CacheError> {
        let mut conn = self.connection.clone();
        let value: Value = to_cmd(&command).query_async(&mut conn).await?;
        to_reply(&command, &value)
    }

    #[instrument(skip(self, commands), fields(batch_size = commands.len()))]
    async fn run_atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>, CacheError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            pipe.add_command(to_cmd(command));
        }

        let mut conn = self.connection.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        debug!(replies = values.len(), "Transaction executed");

        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| to_reply(command, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::command::RangeBound;

    fn args(c: &Cmd) -> Vec<String> {
        c.args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                redis::Arg::Cursor => "<cursor>".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_lock_set_renders_px_nx() {
        let c = to_cmd(&Command::SetNxPx {
            key: "lock.orders".into(),
            value: "worker-1".into(),
            millis: 30000,
        });
        assert_eq!(args(&c), vec!["SET", "lock.orders", "worker-1", "PX", "30000", "NX"]);
    }

    #[test]
    fn test_reverse_range_swaps_bounds() {
        let c = to_cmd(&Command::ZRangeByScore {
            key: "z".into(),
            min: RangeBound::NegInf,
            max: RangeBound::PosInf,
            rev: true,
            with_scores: true,
            limit: Some((5, 10)),
        });
        assert_eq!(
            args(&c),
            vec!["ZREVRANGEBYSCORE", "z", "+inf", "-inf", "WITHSCORES", "LIMIT", "5", "10"]
        );
    }

    #[test]
    fn test_exclusive_range_removal() {
        let c = to_cmd(&Command::ZRemRangeByScore {
            key: "z".into(),
            min: RangeBound::Exclusive(1.0),
            max: RangeBound::PosInf,
        });
        assert_eq!(args(&c), vec!["ZREMRANGEBYSCORE", "z", "(1", "+inf"]);
    }

    #[test]
    fn test_zadd_uses_nx() {
        let c = to_cmd(&Command::ZAddNx {
            key: "z".into(),
            entries: vec![(10.0, "a".into())],
        });
        assert_eq!(args(&c), vec!["ZADD", "z", "NX", "10.0", "a"]);
    }

    #[test]
    fn test_scripts_are_single_key_evals() {
        let c = to_cmd(&Command::ApplyDeltas {
            key: "depth".into(),
            deltas: vec![("100.5".into(), -2.0)],
        });
        let rendered = args(&c);
        assert_eq!(rendered[0], "EVAL");
        assert_eq!(rendered[2], "1");
        assert_eq!(rendered[3], "depth");
        assert_eq!(&rendered[4..], &["100.5", "-2.0"]);
    }

    #[test]
    fn test_reply_conversion() {
        let value = Value::BulkString(b"2.5".to_vec());
        let reply = to_reply(&Command::IncrByFloat { key: "k".into(), delta: 1.0 }, &value).unwrap();
        assert_eq!(reply, Reply::Float(2.5));

        let reply = to_reply(&Command::Get { key: "k".into() }, &Value::Nil).unwrap();
        assert_eq!(reply, Reply::Nil);

        let value = Value::Array(vec![
            Value::BulkString(b"0".to_vec()),
            Value::Array(vec![Value::BulkString(b"m".to_vec()), Value::BulkString(b"1".to_vec())]),
        ]);
        let reply = to_reply(
            &Command::ZScan { key: "z".into(), cursor: "0".into(), pattern: None, count: None },
            &value,
        )
        .unwrap();
        assert_eq!(reply, Reply::Scan { cursor: "0".into(), items: vec!["m".into(), "1".into()] });
    }
}
