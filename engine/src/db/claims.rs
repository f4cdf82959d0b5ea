/// Idempotency claims
///
/// Before a unit is queued, the dispatcher claims the key
/// `item id + sha256(state, title, labels)`. A re-delivery of the same
/// observed item while the claim is live finds it taken and is skipped. Once
/// the TTL passes the key can be claimed again, so a failed run can be retried
/// by re-delivering the event.
use super::now_secs;
use anyhow::{Context, Result};
use sdk::TrackedItem;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Idempotency key for the observed snapshot of an item
///
/// Labels are already a sorted set, so equal snapshots hash equally
/// regardless of delivery order.
pub fn claim_key(item: &TrackedItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.state.trim().to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(item.title.as_bytes());
    hasher.update([0u8]);
    for label in &item.labels {
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
    }
    format!("{}:{}", item.id, hex::encode(hasher.finalize()))
}

/// Conditional-write claim store
#[derive(Clone)]
pub struct ClaimStore {
    pool: SqlitePool,
    ttl_secs: i64,
}

impl ClaimStore {
    pub fn new(pool: SqlitePool, ttl_secs: u64) -> Self {
        Self {
            pool,
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Try to claim `key` for `run_id`
    ///
    /// Returns `true` if this call now holds the claim, `false` if a live
    /// claim already exists. A single upsert makes check-and-set atomic.
    pub async fn try_claim(&self, key: &str, item_id: &str, run_id: &str) -> Result<bool> {
        let now = now_secs()?;
        let expires_at = now.saturating_add(self.ttl_secs);

        let result = sqlx::query(
            "INSERT INTO claims (claim_key, item_id, run_id, claimed_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(claim_key) DO UPDATE SET
                 item_id = excluded.item_id,
                 run_id = excluded.run_id,
                 claimed_at = excluded.claimed_at,
                 expires_at = excluded.expires_at
             WHERE claims.expires_at <= excluded.claimed_at",
        )
        .bind(key)
        .bind(item_id)
        .bind(run_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to write claim")?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop a claim held by `run_id`
    ///
    /// Used when a claimed unit could not be queued.
    pub async fn release(&self, key: &str, run_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM claims WHERE claim_key = ? AND run_id = ?")
            .bind(key)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .context("Failed to release claim")?;
        Ok(())
    }

    /// Delete expired claims, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = now_secs()?;
        let result = sqlx::query("DELETE FROM claims WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired claims")?;
        Ok(result.rows_affected())
    }
}
