//! In-process cache store

use super::{CacheError, CacheOp, CacheStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Writes between opportunistic sweeps of expired keys
const PURGE_EVERY: u64 = 256;

/// Total-ordered score for sorted-set membership
#[derive(Debug, Clone, Copy)]
struct ScoreKey(f64);

impl PartialEq for ScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted set with O(log n) updates
#[derive(Debug, Clone, Default)]
struct SortedSet {
    ordered: BTreeSet<(ScoreKey, String)>,
    scores: HashMap<String, f64>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: f64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(ScoreKey(old), member.to_string()));
        }
        self.ordered.insert((ScoreKey(score), member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.ordered.remove(&(ScoreKey(old), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn rev_range(&self, start: usize, stop: usize) -> Vec<(String, f64)> {
        if stop < start {
            return Vec::new();
        }
        self.ordered
            .iter()
            .rev()
            .skip(start)
            .take((stop - start).saturating_add(1))
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(SortedSet),
    Counter(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Hash,
    ZSet,
    Counter,
}

impl Value {
    fn kind(&self) -> Kind {
        match self {
            Value::Str(_) => Kind::Str,
            Value::Hash(_) => Kind::Hash,
            Value::ZSet(_) => Kind::ZSet,
            Value::Counter(_) => Kind::Counter,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    writes: u64,
}

impl State {
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    /// Live entry for writing; expired entries are dropped first
    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Kind each key would hold after `ops`, failing on the first conflict
    fn check(&self, ops: &[CacheOp], now: Instant) -> Result<(), CacheError> {
        let mut pending: HashMap<&str, Option<Kind>> = HashMap::new();

        for op in ops {
            let key = op.key();
            let current = pending
                .get(key)
                .copied()
                .unwrap_or_else(|| self.live(key, now).map(|e| e.value.kind()));
            let (required, result) = match op {
                CacheOp::Set { .. } => (None, Some(Kind::Str)),
                CacheOp::Del { .. } => (None, None),
                CacheOp::HSet { .. } => (Some(Kind::Hash), Some(Kind::Hash)),
                CacheOp::ZAdd { .. } => (Some(Kind::ZSet), Some(Kind::ZSet)),
                CacheOp::ZRem { .. } => (Some(Kind::ZSet), current),
                CacheOp::Incr { .. } => (Some(Kind::Counter), Some(Kind::Counter)),
            };

            if let (Some(required), Some(current)) = (required, current) {
                if required != current {
                    return Err(CacheError::WrongType(key.to_string()));
                }
            }
            pending.insert(key, result);
        }
        Ok(())
    }

    /// Apply a checked op; type conflicts were ruled out by `check`
    fn apply(&mut self, op: CacheOp, now: Instant) {
        match op {
            CacheOp::Set { key, value, ttl } => {
                self.entries.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at: ttl.map(|t| now + t),
                    },
                );
            }
            CacheOp::HSet { key, fields, ttl } => {
                let expires_at = ttl.map(|t| now + t);
                match self.live_mut(&key, now) {
                    Some(Entry {
                        value: Value::Hash(hash),
                        expires_at: at,
                    }) => {
                        hash.extend(fields);
                        *at = expires_at;
                    }
                    _ => {
                        self.entries.insert(
                            key,
                            Entry {
                                value: Value::Hash(fields),
                                expires_at,
                            },
                        );
                    }
                }
            }
            CacheOp::ZAdd { key, member, score } => match self.live_mut(&key, now) {
                Some(Entry {
                    value: Value::ZSet(set),
                    ..
                }) => set.insert(&member, score),
                _ => {
                    let mut set = SortedSet::default();
                    set.insert(&member, score);
                    self.entries.insert(
                        key,
                        Entry {
                            value: Value::ZSet(set),
                            expires_at: None,
                        },
                    );
                }
            },
            CacheOp::ZRem { key, member } => {
                if let Some(Entry {
                    value: Value::ZSet(set),
                    ..
                }) = self.live_mut(&key, now)
                {
                    set.remove(&member);
                }
            }
            CacheOp::Incr { key, by } => match self.live_mut(&key, now) {
                Some(Entry {
                    value: Value::Counter(n),
                    ..
                }) => *n += by,
                _ => {
                    self.entries.insert(
                        key,
                        Entry {
                            value: Value::Counter(by),
                            expires_at: None,
                        },
                    );
                }
            },
            CacheOp::Del { key } => {
                self.entries.remove(&key);
            }
        }
    }

    fn after_write(&mut self, now: Instant) {
        self.writes += 1;
        if self.writes % PURGE_EVERY == 0 {
            self.entries.retain(|_, e| !e.is_expired(now));
        }
    }
}

/// Cache store backed by process memory
///
/// One lock guards every key, so a batch passed to `exec` is observed
/// entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired(now));
        before - state.entries.len()
    }

    /// Number of stored keys, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut state = self.state.write();
        state.check(&ops, now)?;
        for op in ops {
            state.apply(op, now);
        }
        state.after_write(now);
        Ok(())
    }

    fn wrong_type(key: &str) -> CacheError {
        CacheError::WrongType(key.to_string())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let state = self.state.read();
        match state.live(key, Instant::now()).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Counter(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.write(vec![CacheOp::Set {
            key: key.to_string(),
            value,
            ttl,
        }])
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let state = self.state.read();
        match state.live(key, Instant::now()).map(|e| &e.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hset(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.write(vec![CacheOp::HSet {
            key: key.to_string(),
            fields,
            ttl,
        }])
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        self.write(vec![CacheOp::ZAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }])
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.state.write();
        let removed = match state.live_mut(key, now) {
            None => false,
            Some(Entry {
                value: Value::ZSet(set),
                ..
            }) => set.remove(member),
            Some(_) => return Err(Self::wrong_type(key)),
        };
        state.after_write(now);
        Ok(removed)
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        let state = self.state.read();
        match state.live(key, Instant::now()).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::ZSet(set)) => Ok(set.rev_range(start, stop)),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        let state = self.state.read();
        match state.live(key, Instant::now()).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::ZSet(set)) => Ok(set.len()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let now = Instant::now();
        let op = CacheOp::Incr {
            key: key.to_string(),
            by,
        };
        let mut state = self.state.write();
        state.check(std::slice::from_ref(&op), now)?;
        state.apply(op, now);
        state.after_write(now);

        match state.live(key, now).map(|e| &e.value) {
            Some(Value::Counter(n)) => Ok(*n),
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.state.write();
        let existed = state.live(key, now).is_some();
        state.entries.remove(key);
        state.after_write(now);
        Ok(existed)
    }

    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        self.write(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_set_get_with_ttl() {
        let store = MemoryStore::new();
        store
            .set("a", "1".to_string(), Some(Duration::from_millis(30)))
            .await
            .unwrap();
        store.set("b", "2".to_string(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_hash_merge_and_expiry() {
        let store = MemoryStore::new();
        store
            .hset("h", fields(&[("x", "1")]), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store
            .hset("h", fields(&[("y", "2")]), Some(Duration::from_millis(20)))
            .await
            .unwrap();

        let all = store.hget_all("h").await.unwrap();
        assert_eq!(all.len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.hget_all("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_set_ordering_and_update() {
        let store = MemoryStore::new();
        store.zadd("z", "a", 10.0).await.unwrap();
        store.zadd("z", "b", 30.0).await.unwrap();
        store.zadd("z", "c", 20.0).await.unwrap();
        store.zadd("z", "a", 40.0).await.unwrap();

        let top = store.zrevrange("z", 0, 1).await.unwrap();
        assert_eq!(top, vec![("a".to_string(), 40.0), ("b".to_string(), 30.0)]);
        assert_eq!(store.zcard("z").await.unwrap(), 3);

        assert!(store.zrem("z", "b").await.unwrap());
        assert!(!store.zrem("z", "b").await.unwrap());
        let all = store.zrevrange("z", 0, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.zrevrange("z", 5, 10).await.unwrap().is_empty());
        assert!(store.zrevrange("missing", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incr() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("n", 1).await.unwrap(), 1);
        assert_eq!(store.incr("n", 4).await.unwrap(), 5);
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("s", "v".to_string(), None).await.unwrap();
        assert!(matches!(
            store.zadd("s", "m", 1.0).await,
            Err(CacheError::WrongType(_))
        ));
        assert!(store.incr("s", 1).await.is_err());
        assert!(store.hget_all("s").await.is_err());
    }

    #[tokio::test]
    async fn test_exec_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.set("s", "v".to_string(), None).await.unwrap();

        let result = store
            .exec(vec![
                CacheOp::ZAdd {
                    key: "rank".to_string(),
                    member: "a".to_string(),
                    score: 1.0,
                },
                CacheOp::HSet {
                    key: "s".to_string(),
                    fields: fields(&[("x", "1")]),
                    ttl: None,
                },
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.zcard("rank").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exec_delete_then_repopulate() {
        let store = MemoryStore::new();
        store.zadd("rank", "old", 99.0).await.unwrap();

        store
            .exec(vec![
                CacheOp::Del {
                    key: "rank".to_string(),
                },
                CacheOp::ZAdd {
                    key: "rank".to_string(),
                    member: "new".to_string(),
                    score: 1.0,
                },
            ])
            .await
            .unwrap();

        let members = store.zrevrange("rank", 0, 10).await.unwrap();
        assert_eq!(members, vec![("new".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn test_del_reports_existence() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), None).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(store.is_empty());
    }
}
