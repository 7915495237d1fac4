//! Popular-services ranking
//!
//! A sorted member→score collection. Scores only grow, through an increment
//! the store applies atomically, so callers never read-modify-write.

use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use parking_lot::RwLock;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_RANKING_KEY: &str = "popular_services";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ranking store pool error: {0}")]
    Pool(String),
    #[error("ranking store command failed: {0}")]
    Command(#[from] redis::RedisError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub member: String,
    pub score: u64,
}

impl RankingEntry {
    pub fn new(member: impl Into<String>, score: u64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Add 1 to `member`, creating it at 1 when absent.
    async fn increment(&self, member: &str) -> Result<(), StoreError>;

    /// Up to `n` entries, highest score first. Read-only.
    async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, StoreError>;
}

/// Redis sorted set. Equal scores come back in reverse lexicographic member
/// order, which is what `ZREVRANGE` does.
pub struct RedisRankingStore {
    pool: Pool,
    key: String,
}

impl RedisRankingStore {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let pool = RedisConfig::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            key: key.into(),
        })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl RankingStore for RedisRankingStore {
    async fn increment(&self, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: f64 = conn.zincr(&self.key, member, 1).await?;
        Ok(())
    }

    async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, StoreError> {
        // ZREVRANGE 0 -1 would mean "everything".
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let stop = isize::try_from(n - 1).unwrap_or(isize::MAX);
        let rows: Vec<(String, f64)> = conn.zrevrange_withscores(&self.key, 0, stop).await?;

        Ok(entries_from_rows(rows))
    }
}

/// Sorted-set rows to entries in `ZREVRANGE` order: score descending, then
/// member descending. Scores are whole increments stored as floats.
fn entries_from_rows(mut rows: Vec<(String, f64)>) -> Vec<RankingEntry> {
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    rows.into_iter()
        .map(|(member, score)| RankingEntry::new(member, score.max(0.0).round() as u64))
        .collect()
}

struct Ranked {
    score: u64,
    first_seen: u64,
}

#[derive(Default)]
struct Scores {
    members: HashMap<String, Ranked>,
    next_seq: u64,
}

/// Process-local store. Equal scores rank by first insertion: the member
/// that was incremented first comes first.
#[derive(Default)]
pub struct InMemoryRankingStore {
    scores: RwLock<Scores>,
}

impl InMemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, member: &str) -> Option<u64> {
        self.scores.read().members.get(member).map(|r| r.score)
    }
}

#[async_trait]
impl RankingStore for InMemoryRankingStore {
    async fn increment(&self, member: &str) -> Result<(), StoreError> {
        let mut scores = self.scores.write();
        let seq = scores.next_seq;
        let entry = scores.members.entry(member.to_string()).or_insert(Ranked {
            score: 0,
            first_seen: seq,
        });
        entry.score += 1;
        if entry.first_seen == seq {
            scores.next_seq += 1;
        }
        Ok(())
    }

    async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, StoreError> {
        let scores = self.scores.read();
        let mut ranked: Vec<_> = scores
            .members
            .iter()
            .map(|(member, r)| (member, r.score, r.first_seen))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        Ok(ranked
            .into_iter()
            .take(n)
            .map(|(member, score, _)| RankingEntry::new(member.clone(), score))
            .collect())
    }
}
