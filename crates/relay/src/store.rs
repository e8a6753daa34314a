//! Persistence gateway: monitored groups and the pending-comment queue.
//!
//! Thin wrappers over sqlx against the shared SQLite pool. Cursor updates are
//! clamped to be monotonically non-decreasing at the SQL level.

use sqlx::SqlitePool;

use groupwatch_common::error::AppError;
use groupwatch_common::types::{Comment, MonitoredGroup, Network};

/// Registration payload for a new monitored group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub network: Network,
    pub group_id: String,
    pub group_name: String,
    /// Initial cursor; registration starts monitoring from "now".
    pub last_check: i64,
    pub extra_data: String,
}

#[derive(Clone)]
pub struct GroupStore {
    pool: SqlitePool,
}

impl GroupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a group. Re-registering an existing `(network, group_id)`
    /// pair refreshes its name and extra data without resetting the cursor.
    pub async fn add(&self, group: NewGroup) -> Result<MonitoredGroup, AppError> {
        let row = sqlx::query_as::<_, MonitoredGroup>(
            r#"
            INSERT INTO monitored_groups (network, group_id, group_name, last_check, extra_data)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (network, group_id) DO UPDATE SET
                group_name = excluded.group_name,
                extra_data = excluded.extra_data
            RETURNING *
            "#,
        )
        .bind(group.network)
        .bind(&group.group_id)
        .bind(&group.group_name)
        .bind(group.last_check)
        .bind(&group.extra_data)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            id = row.id,
            network = %row.network,
            group_id = %row.group_id,
            "Registered monitored group"
        );
        Ok(row)
    }

    /// Remove a group and every comment cached for it. Returns whether a
    /// group was actually deleted.
    pub async fn remove(&self, network: Network, group_id: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM comments WHERE group_id IN
                (SELECT id FROM monitored_groups WHERE network = ? AND group_id = ?)
            "#,
        )
        .bind(network)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM monitored_groups WHERE network = ? AND group_id = ?")
            .bind(network)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_all(&self) -> Result<Vec<MonitoredGroup>, AppError> {
        Ok(
            sqlx::query_as::<_, MonitoredGroup>("SELECT * FROM monitored_groups ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_by_network(&self, network: Network) -> Result<Vec<MonitoredGroup>, AppError> {
        Ok(sqlx::query_as::<_, MonitoredGroup>(
            "SELECT * FROM monitored_groups WHERE network = ? ORDER BY id",
        )
        .bind(network)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_by_network_and_id(
        &self,
        network: Network,
        group_id: &str,
    ) -> Result<Option<MonitoredGroup>, AppError> {
        Ok(sqlx::query_as::<_, MonitoredGroup>(
            "SELECT * FROM monitored_groups WHERE network = ? AND group_id = ?",
        )
        .bind(network)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_by_internal_id(&self, id: i64) -> Result<Option<MonitoredGroup>, AppError> {
        Ok(
            sqlx::query_as::<_, MonitoredGroup>("SELECT * FROM monitored_groups WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Advance a group's cursor. The cursor never moves backwards.
    pub async fn update_cursor(&self, id: i64, timestamp: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE monitored_groups SET last_check = MAX(last_check, ?) WHERE id = ?")
            .bind(timestamp)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PendingStore {
    pool: SqlitePool,
}

impl PendingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite a comment by its composite identity. Re-observing
    /// the same comment is an idempotent overwrite, never a duplicate row.
    pub async fn upsert(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO comments
                (network, group_id, comment_id, author, body, timestamp,
                 post_url, is_pending, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (network, group_id, comment_id) DO UPDATE SET
                author = excluded.author,
                body = excluded.body,
                timestamp = excluded.timestamp,
                post_url = excluded.post_url,
                is_pending = excluded.is_pending,
                received_at = excluded.received_at
            "#,
        )
        .bind(comment.network)
        .bind(comment.group_id)
        .bind(&comment.comment_id)
        .bind(&comment.author)
        .bind(&comment.body)
        .bind(comment.timestamp)
        .bind(&comment.post_url)
        .bind(comment.is_pending)
        .bind(comment.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pending comments observed after `cutoff`, oldest first.
    pub async fn select_pending_received_after(
        &self,
        cutoff: i64,
    ) -> Result<Vec<Comment>, AppError> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE is_pending = TRUE AND received_at > ?
            ORDER BY received_at, comment_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Mark a comment delivered. The row is kept, so a crash between send
    /// and clear re-delivers rather than loses.
    pub async fn clear_pending(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE comments SET is_pending = FALSE
            WHERE network = ? AND group_id = ? AND comment_id = ?
            "#,
        )
        .bind(comment.network)
        .bind(comment.group_id)
        .bind(&comment.comment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop every cached comment of a group (orphan cleanup).
    pub async fn delete_all_for_group(&self, group_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM comments WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
