// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backend.
//!
//! Implements the same command set as the Redis backend against a keyspace
//! guarded by one mutex, so every command (and every batch passed to
//! `run_atomic`) is atomic with respect to other callers. Used by the unit
//! tests and by embedders that want the cache semantics without a server.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::command::{Command, Reply};
use super::traits::{Backend, CacheError};

/// Default number of members returned per ZSCAN page.
const SCAN_PAGE: usize = 10;
/// Entries fetched per step of a sum walk.
const WALK_PAGE: usize = 10;

#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    List(VecDeque<String>),
    Hash(BTreeMap<String, String>),
    Sorted(HashMap<String, f64>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
            Self::Sorted(_) => "zset",
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
}

pub struct MemoryBackend {
    keyspace: Mutex<Keyspace>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
        }
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut keyspace = self.keyspace.lock();
        keyspace.purge_all(Instant::now());
        keyspace.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.keyspace.lock().slots.clear();
    }

    /// Remaining time to live of `key`, if it has an expiry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        keyspace.purge(key, now);
        keyspace
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn run(&self, command: Command) -> Result<Reply, CacheError> {
        self.keyspace.lock().apply(command, Instant::now())
    }

    async fn run_atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>, CacheError> {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        let mut replies = Vec::with_capacity(commands.len());
        let mut first_error = None;

        // EXEC semantics: a failing command does not stop the others
        for command in commands {
            match keyspace.apply(command, now) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(replies),
        }
    }
}

fn wrong_type(key: &str, found: &Entry) -> CacheError {
    CacheError::WrongType(format!("key '{}' holds a {}", key, found.kind()))
}

fn format_score(score: f64) -> String {
    format!("{}", score)
}

/// Resolve list indices (negative counts from the tail) to a `start..end` range.
fn list_window(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

/// Members ordered by score, then member text.
fn ordered(set: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = set.iter().map(|(m, s)| (m.clone(), *s)).collect();
    entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// The number a walk accumulates for one member: the last number inside the
/// member's first comma-separated field, or zero when there is none.
pub(crate) fn leading_quantity(member: &str) -> f64 {
    let field = member.split(',').next().unwrap_or("");
    let bytes = field.as_bytes();
    let mut end = bytes.len();
    while end > 0 && !bytes[end - 1].is_ascii_digit() {
        end -= 1;
    }
    if end == 0 {
        return 0.0;
    }
    let mut start = end;
    while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
        start -= 1;
    }
    if start > 0 && bytes[start - 1] == b'-' {
        start -= 1;
    }
    field[start..end].parse().unwrap_or(0.0)
}

/// Glob matching with the store's MATCH rules: `*`, `?`, `[...]` (with `^`
/// negation and `a-z` ranges) and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_from(&pattern, &text)
}

fn glob_match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                while p + 1 < pattern.len() && pattern[p + 1] == '*' {
                    p += 1;
                }
                if p + 1 == pattern.len() {
                    return true;
                }
                return (t..=text.len()).any(|skip| glob_match_from(&pattern[p + 1..], &text[skip..]));
            }
            '?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            '[' => {
                if t >= text.len() {
                    return false;
                }
                let (matched, next) = match_class(pattern, p + 1, text[t]);
                if !matched {
                    return false;
                }
                t += 1;
                p = next;
            }
            '\\' if p + 1 < pattern.len() => {
                if t >= text.len() || text[t] != pattern[p + 1] {
                    return false;
                }
                t += 1;
                p += 2;
            }
            literal => {
                if t >= text.len() || text[t] != literal {
                    return false;
                }
                t += 1;
                p += 1;
            }
        }
    }
    t == text.len()
}

/// Match `c` against the class starting at `pattern[start]` (just past `[`).
/// Returns whether it matched and the index just past the closing `]`.
fn match_class(pattern: &[char], start: usize, c: char) -> (bool, usize) {
    let mut i = start;
    let negate = i < pattern.len() && pattern[i] == '^';
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < pattern.len() && pattern[i] != ']' {
        if pattern[i] == '\\' && i + 1 < pattern.len() {
            if pattern[i + 1] == c {
                matched = true;
            }
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if pattern[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    (matched != negate, (i + 1).min(pattern.len()))
}

impl Keyspace {
    fn purge(&mut self, key: &str, now: Instant) {
        let expired = self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.slots.remove(key);
        }
    }

    fn purge_all(&mut self, now: Instant) {
        self.slots
            .retain(|_, slot| slot.expires_at.map_or(true, |at| at > now));
    }

    fn text(&self, key: &str) -> Result<Option<&String>, CacheError> {
        match self.slots.get(key).map(|slot| &slot.entry) {
            None => Ok(None),
            Some(Entry::Text(text)) => Ok(Some(text)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>, CacheError> {
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::List(list) => Ok(list),
            other => Err(wrong_type(key, other)),
        }
    }

    fn list(&self, key: &str) -> Result<Option<&VecDeque<String>>, CacheError> {
        match self.slots.get(key).map(|slot| &slot.entry) {
            None => Ok(None),
            Some(Entry::List(list)) => Ok(Some(list)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>, CacheError> {
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Hash(BTreeMap::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::Hash(hash) => Ok(hash),
            other => Err(wrong_type(key, other)),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>, CacheError> {
        match self.slots.get(key).map(|slot| &slot.entry) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(Some(hash)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<&mut HashMap<String, f64>, CacheError> {
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Sorted(HashMap::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::Sorted(set) => Ok(set),
            other => Err(wrong_type(key, other)),
        }
    }

    fn sorted(&self, key: &str) -> Result<Option<&HashMap<String, f64>>, CacheError> {
        match self.slots.get(key).map(|slot| &slot.entry) {
            None => Ok(None),
            Some(Entry::Sorted(set)) => Ok(Some(set)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    /// Containers that became empty disappear, as in the store.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.slots.get(key).map(|slot| &slot.entry) {
            Some(Entry::List(list)) => list.is_empty(),
            Some(Entry::Hash(hash)) => hash.is_empty(),
            Some(Entry::Sorted(set)) => set.is_empty(),
            _ => false,
        };
        if empty {
            self.slots.remove(key);
        }
    }

    fn put_text(&mut self, key: &str, value: String, expires_at: Option<Instant>) {
        self.slots.insert(
            key.to_string(),
            Slot {
                entry: Entry::Text(value),
                expires_at,
            },
        );
    }

    fn apply(&mut self, command: Command, now: Instant) -> Result<Reply, CacheError> {
        self.purge(command.key(), now);

        match command {
            Command::Get { key } => Ok(self
                .text(&key)?
                .map_or(Reply::Nil, |text| Reply::Text(text.clone()))),
            Command::Set { key, value } => {
                self.put_text(&key, value, None);
                Ok(Reply::Okay)
            }
            Command::SetEx { key, value, seconds } => {
                if seconds == 0 {
                    return Err(CacheError::Command("invalid expire time in 'setex' command".into()));
                }
                self.put_text(&key, value, Some(now + Duration::from_secs(seconds)));
                Ok(Reply::Okay)
            }
            Command::SetNxPx { key, value, millis } => {
                if millis == 0 {
                    return Err(CacheError::Command("invalid expire time in 'set' command".into()));
                }
                if self.slots.contains_key(&key) {
                    return Ok(Reply::Nil);
                }
                self.put_text(&key, value, Some(now + Duration::from_millis(millis)));
                Ok(Reply::Okay)
            }
            Command::Del { key } => Ok(Reply::Int(i64::from(self.slots.remove(&key).is_some()))),
            Command::Exists { key } => Ok(Reply::Int(i64::from(self.slots.contains_key(&key)))),
            Command::IncrByFloat { key, delta } => {
                let current = match self.text(&key)? {
                    Some(text) => text
                        .parse::<f64>()
                        .map_err(|_| CacheError::Command("value is not a valid float".into()))?,
                    None => 0.0,
                };
                let next = current + delta;
                let expires_at = self.slots.get(&key).and_then(|slot| slot.expires_at);
                self.put_text(&key, format_score(next), expires_at);
                Ok(Reply::Float(next))
            }

            Command::RPush { key, value } => {
                let list = self.list_mut(&key)?;
                list.push_back(value);
                Ok(Reply::Int(list.len() as i64))
            }
            Command::LRange { key, start, stop } => {
                let items = match self.list(&key)? {
                    Some(list) => match list_window(list.len(), start, stop) {
                        Some((from, to)) => list.range(from..to).cloned().collect(),
                        None => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Reply::Items(items))
            }
            Command::LLen { key } => Ok(Reply::Int(
                self.list(&key)?.map_or(0, |list| list.len() as i64),
            )),
            Command::LTrim { key, start, stop } => {
                if self.list(&key)?.is_none() {
                    return Ok(Reply::Okay);
                }
                let list = self.list_mut(&key)?;
                match list_window(list.len(), start, stop) {
                    Some((from, to)) => {
                        list.truncate(to);
                        list.drain(..from);
                    }
                    None => list.clear(),
                }
                self.drop_if_empty(&key);
                Ok(Reply::Okay)
            }

            Command::HSet { key, entries } => {
                let hash = self.hash_mut(&key)?;
                let mut added = 0;
                for (field, value) in entries {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Ok(Reply::Int(added))
            }
            Command::HGet { key, field } => Ok(self
                .hash(&key)?
                .and_then(|hash| hash.get(&field))
                .map_or(Reply::Nil, |value| Reply::Text(value.clone()))),
            Command::HGetAll { key } => {
                let items = self
                    .hash(&key)?
                    .map(|hash| {
                        hash.iter()
                            .flat_map(|(f, v)| [f.clone(), v.clone()])
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Reply::Items(items))
            }
            Command::HDel { key, fields } => {
                if self.hash(&key)?.is_none() {
                    return Ok(Reply::Int(0));
                }
                let hash = self.hash_mut(&key)?;
                let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
                self.drop_if_empty(&key);
                Ok(Reply::Int(removed as i64))
            }
            Command::HExists { key, field } => Ok(Reply::Int(i64::from(
                self.hash(&key)?.is_some_and(|hash| hash.contains_key(&field)),
            ))),
            Command::HIncrByFloat { key, field, delta } => {
                let hash = self.hash_mut(&key)?;
                let current = match hash.get(&field) {
                    Some(text) => text
                        .parse::<f64>()
                        .map_err(|_| CacheError::Command("hash value is not a float".into()))?,
                    None => 0.0,
                };
                let next = current + delta;
                hash.insert(field, format_score(next));
                Ok(Reply::Float(next))
            }

            Command::ZAddNx { key, entries } => {
                let set = self.sorted_mut(&key)?;
                let mut added = 0;
                for (score, member) in entries {
                    if !set.contains_key(&member) {
                        set.insert(member, score);
                        added += 1;
                    }
                }
                Ok(Reply::Int(added))
            }
            Command::ZRangeByScore { key, min, max, rev, with_scores, limit } => {
                let (min, max) = (min.score_limit()?, max.score_limit()?);
                let Some(set) = self.sorted(&key)? else {
                    return Ok(Reply::Items(Vec::new()));
                };
                let mut hits: Vec<(String, f64)> = ordered(set)
                    .into_iter()
                    .filter(|(_, s)| min.admits_from_below(*s) && max.admits_from_above(*s))
                    .collect();
                if rev {
                    hits.reverse();
                }
                let (offset, count) = limit.unwrap_or((0, usize::MAX));
                let items = hits
                    .into_iter()
                    .skip(offset)
                    .take(count)
                    .flat_map(|(member, score)| {
                        if with_scores {
                            vec![member, format_score(score)]
                        } else {
                            vec![member]
                        }
                    })
                    .collect();
                Ok(Reply::Items(items))
            }
            Command::ZRem { key, members } => {
                if self.sorted(&key)?.is_none() {
                    return Ok(Reply::Int(0));
                }
                let set = self.sorted_mut(&key)?;
                let removed = members.iter().filter(|m| set.remove(*m).is_some()).count();
                self.drop_if_empty(&key);
                Ok(Reply::Int(removed as i64))
            }
            Command::ZRemRangeByScore { key, min, max } => {
                let (min, max) = (min.score_limit()?, max.score_limit()?);
                if self.sorted(&key)?.is_none() {
                    return Ok(Reply::Int(0));
                }
                let set = self.sorted_mut(&key)?;
                let before = set.len();
                set.retain(|_, s| !(min.admits_from_below(*s) && max.admits_from_above(*s)));
                let removed = before - set.len();
                self.drop_if_empty(&key);
                Ok(Reply::Int(removed as i64))
            }
            Command::ZScan { key, cursor, pattern, count } => {
                let offset: usize = cursor
                    .parse()
                    .map_err(|_| CacheError::Command("invalid cursor".into()))?;
                let Some(set) = self.sorted(&key)? else {
                    return Ok(Reply::Scan { cursor: "0".into(), items: Vec::new() });
                };
                let mut members: Vec<(&String, &f64)> = set.iter().collect();
                members.sort_by(|a, b| a.0.cmp(b.0));

                let page = count.unwrap_or(SCAN_PAGE).max(1);
                let end = (offset + page).min(members.len());
                let items = members
                    .get(offset..end)
                    .unwrap_or_default()
                    .iter()
                    .filter(|(m, _)| pattern.as_deref().map_or(true, |p| glob_match(p, m)))
                    .flat_map(|(m, s)| [(*m).clone(), format_score(**s)])
                    .collect();
                let next = if end >= members.len() { "0".to_string() } else { end.to_string() };
                Ok(Reply::Scan { cursor: next, items })
            }

            Command::ApplyDeltas { key, deltas } => {
                let set = self.sorted_mut(&key)?;
                let mut scores = Vec::with_capacity(deltas.len());
                for (member, delta) in deltas {
                    let next = set.get(&member).copied().unwrap_or(0.0) + delta;
                    if next <= 0.0 {
                        set.remove(&member);
                    } else {
                        set.insert(member, next);
                    }
                    scores.push(next);
                }
                self.drop_if_empty(&key);
                Ok(Reply::Floats(scores))
            }
            Command::WalkUntilSum { key, amount, desc } => {
                let mut visited = Vec::new();
                if amount <= 0.0 {
                    return Ok(Reply::Items(visited));
                }
                let Some(set) = self.sorted(&key)? else {
                    return Ok(Reply::Items(visited));
                };
                let mut entries = ordered(set);
                if desc {
                    entries.reverse();
                }
                // Same paging as the script: WALK_PAGE entries at a time, each
                // page starting strictly past the last score seen.
                let mut sum = 0.0;
                let mut last_score: Option<f64> = None;
                loop {
                    let page: Vec<(String, f64)> = entries
                        .iter()
                        .filter(|(_, s)| match last_score {
                            Some(last) if desc => *s < last,
                            Some(last) => *s > last,
                            None => true,
                        })
                        .take(WALK_PAGE)
                        .cloned()
                        .collect();
                    if page.is_empty() {
                        break;
                    }
                    for (member, score) in page {
                        sum += leading_quantity(&member);
                        visited.push(member);
                        visited.push(format_score(score));
                        last_score = Some(score);
                        if sum >= amount {
                            return Ok(Reply::Items(visited));
                        }
                    }
                }
                Ok(Reply::Items(visited))
            }
            Command::DeleteIfEquals { key, value } => {
                if self.text(&key)?.is_some_and(|current| *current == value) {
                    self.slots.remove(&key);
                    Ok(Reply::Int(1))
                } else {
                    Ok(Reply::Int(0))
                }
            }
        }
    }
}
