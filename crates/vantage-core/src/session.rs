//! Cache-backed session bookkeeping: salted session hashes, first-sight
//! uniqueness, session durations and live-visitor heartbeats.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::cache::KeyValueCache;

const SALT_KEY: &str = "salt";

fn rand_hex(n: usize) -> String {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Session id for a visitor: sha256(salt + pid + ip + user agent), first 16
/// bytes as hex. Stable for as long as the salt lives.
pub fn session_hash(pid: &str, ip: &str, user_agent: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pid.as_bytes());
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Current hashing salt, generated and cached for `ttl` when absent.
pub async fn session_salt(cache: &dyn KeyValueCache, ttl: Duration) -> anyhow::Result<String> {
    if let Some(salt) = cache.get(SALT_KEY).await? {
        return Ok(salt);
    }
    let salt = rand_hex(32);
    cache.set(SALT_KEY, &salt, ttl).await?;
    tracing::info!("Session salt regenerated");
    Ok(salt)
}

/// `true` the first time `hash` is seen within `ttl`.
pub async fn is_unique_session(
    cache: &dyn KeyValueCache,
    hash: &str,
    ttl: Duration,
) -> anyhow::Result<bool> {
    let key = format!("ses:{hash}");
    if cache.get(&key).await?.is_some() {
        return Ok(false);
    }
    cache.set(&key, "1", ttl).await?;
    Ok(true)
}

pub async fn record_heartbeat(
    cache: &dyn KeyValueCache,
    pid: &str,
    psid: &str,
    ttl: Duration,
) -> anyhow::Result<()> {
    cache.set(&format!("hb:{pid}:{psid}"), "1", ttl).await
}

/// Seconds since the session's first recorded activity.
///
/// The first call stores `now` as the start under `sd:<pid>:<psid>` and
/// reports zero. Every call refreshes the key for another `ttl`, so a
/// session stays open for as long as activity keeps arriving.
pub async fn session_duration(
    cache: &dyn KeyValueCache,
    pid: &str,
    psid: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> anyhow::Result<u64> {
    let key = format!("sd:{pid}:{psid}");
    let now = now.timestamp();
    let start = cache
        .get(&key)
        .await?
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|start| *start <= now)
        .unwrap_or(now);
    cache.set(&key, &start.to_string(), ttl).await?;
    Ok(u64::try_from(now - start).unwrap_or(0))
}

pub async fn live_visitors(cache: &dyn KeyValueCache, pid: &str) -> anyhow::Result<u64> {
    cache.count_matching(&format!("hb:{pid}:*")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn session_hash_is_deterministic_hex() {
        let a = session_hash("pid1", "1.2.3.4", "Mozilla/5.0", "salt");
        let b = session_hash("pid1", "1.2.3.4", "Mozilla/5.0", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, session_hash("pid2", "1.2.3.4", "Mozilla/5.0", "salt"));
    }

    #[tokio::test]
    async fn salt_is_reused_while_cached() {
        let cache = MemoryCache::new();
        let first = session_salt(&cache, Duration::from_secs(60)).await.expect("salt");
        let second = session_salt(&cache, Duration::from_secs(60)).await.expect("salt");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn uniqueness_is_first_sight_only() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert!(is_unique_session(&cache, "abc", ttl).await.expect("first"));
        assert!(!is_unique_session(&cache, "abc", ttl).await.expect("second"));
    }

    #[tokio::test]
    async fn live_visitors_counts_heartbeats_per_project() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        record_heartbeat(&cache, "p1", "s1", ttl).await.expect("hb");
        record_heartbeat(&cache, "p1", "s2", ttl).await.expect("hb");
        record_heartbeat(&cache, "p1", "s2", ttl).await.expect("hb");
        record_heartbeat(&cache, "p2", "s3", ttl).await.expect("hb");
        assert_eq!(live_visitors(&cache, "p1").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn duration_counts_from_the_first_sighting() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp");
        let later = start + chrono::TimeDelta::seconds(95);

        let first = session_duration(&cache, "p1", "s1", start, ttl).await;
        assert_eq!(first.expect("start"), 0);
        let second = session_duration(&cache, "p1", "s1", later, ttl).await;
        assert_eq!(second.expect("duration"), 95);
        let other = session_duration(&cache, "p2", "s1", later, ttl).await;
        assert_eq!(other.expect("other project"), 0);
        assert_eq!(
            cache.get("sd:p1:s1").await.expect("get").as_deref(),
            Some("1700000000")
        );
    }

    #[tokio::test]
    async fn garbled_start_restarts_the_session() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("sd:p1:s1", "yesterday", ttl).await.expect("set");
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp");
        let duration = session_duration(&cache, "p1", "s1", now, ttl).await;
        assert_eq!(duration.expect("duration"), 0);
    }
}
