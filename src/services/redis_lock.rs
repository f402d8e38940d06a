// Redis lease for scheduled jobs
// Keeps two instances from running the same sweep tick at once

use redis::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// A held lease on one job
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub resource: String,
    pub lock_key: String,
    pub lock_value: String,
    pub acquired_at: Instant,
    pub expires_at: Instant,
}

impl LockInfo {
    pub fn new(resource: &str, ttl: Duration) -> Self {
        let now = Instant::now();

        Self {
            resource: resource.to_string(),
            lock_key: format!("p2p:lock:{}", resource),
            lock_value: Uuid::new_v4().to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }
}

#[derive(Clone)]
pub struct RedisLock {
    client: Client,
    ttl: Duration,
}

impl RedisLock {
    pub fn new(redis_url: &str, ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client, ttl })
    }

    /// Single SET NX EX attempt. `None` means another instance holds the job.
    pub async fn try_acquire(&self, resource: &str) -> Result<Option<LockInfo>> {
        let lock_info = LockInfo::new(resource, self.ttl);
        let ttl_seconds = self.ttl.as_secs().max(1);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(&lock_info.lock_key)
            .arg(&lock_info.lock_value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        if reply.is_some() {
            debug!("Lock acquired for job: {}", resource);
            Ok(Some(lock_info))
        } else {
            debug!("Job {} is held by another instance", resource);
            Ok(None)
        }
    }

    /// Deletes the key only if this lease still owns it
    pub async fn release(&self, lock_info: &LockInfo) -> Result<bool> {
        let script = r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: i32 = redis::Script::new(script)
            .key(&lock_info.lock_key)
            .arg(&lock_info.lock_value)
            .invoke_async(&mut conn)
            .await?;

        let released = result == 1;
        if !released {
            warn!(
                "Lock for job {} expired before release (held {:?})",
                lock_info.resource,
                lock_info.acquired_at.elapsed()
            );
        }
        Ok(released)
    }
}
