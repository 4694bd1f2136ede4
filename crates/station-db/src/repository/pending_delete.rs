//! # Pending Delete Repository
//!
//! Device-side media ids that a node still has to be told to delete.
//!
//! ## Send-Then-Clear
//! ```text
//! add(entry)           ← authoring replaced or removed uploaded media
//!      │
//!      ▼
//! sync: send "media delete <id>" to the node
//!      │  ok
//!      ▼
//! remove(entry)        ← only after the command went out
//! ```
//!
//! A crash between send and remove leaves the row in place, so the delete is
//! sent again on the next sync.

use sqlx::{FromRow, SqlitePool};
use station_core::{NodeId, PendingDeleteEntry, StationId};
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct PendingDeleteRow {
    station_id: i64,
    node_id: i64,
    media_id: i64,
}

impl TryFrom<PendingDeleteRow> for PendingDeleteEntry {
    type Error = DbError;

    fn try_from(row: PendingDeleteRow) -> DbResult<Self> {
        let out_of_range = |what: &str, v: i64| DbError::Internal(format!("{what} {v} out of range"));
        Ok(PendingDeleteEntry {
            station_id: StationId::try_from(row.station_id)
                .map_err(|_| out_of_range("station id", row.station_id))?,
            node_id: NodeId::try_from(row.node_id)
                .map_err(|_| out_of_range("node id", row.node_id))?,
            media_id: row.media_id,
        })
    }
}

/// Repository for queued device-side deletes.
#[derive(Debug, Clone)]
pub struct PendingDeleteRepository {
    pool: SqlitePool,
}

impl PendingDeleteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PendingDeleteRepository { pool }
    }

    /// Queues a delete. Queuing the same entry twice is a no-op.
    pub async fn add(&self, entry: &PendingDeleteEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO pending_deletes (station_id, node_id, media_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entry.station_id as i64)
        .bind(entry.node_id as i64)
        .bind(entry.media_id)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(
            station_id = entry.station_id,
            node_id = entry.node_id,
            media_id = entry.media_id,
            "Queued device delete"
        );
        Ok(())
    }

    /// Entries of a station, oldest first.
    pub async fn list_for_station(&self, station_id: StationId) -> DbResult<Vec<PendingDeleteEntry>> {
        let rows = sqlx::query_as::<_, PendingDeleteRow>(
            r#"
            SELECT station_id, node_id, media_id
            FROM pending_deletes
            WHERE station_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(station_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingDeleteEntry::try_from).collect()
    }

    /// Removes one entry; returns whether it existed.
    pub async fn remove(&self, entry: &PendingDeleteEntry) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_deletes
            WHERE station_id = ?1 AND node_id = ?2 AND media_id = ?3
            "#,
        )
        .bind(entry.station_id as i64)
        .bind(entry.node_id as i64)
        .bind(entry.media_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drops every entry targeting a node (the node left the station).
    pub async fn remove_all_for_node(&self, station_id: StationId, node_id: NodeId) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_deletes WHERE station_id = ?1 AND node_id = ?2")
            .bind(station_id as i64)
            .bind(node_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn remove_all_for_station(&self, station_id: StationId) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_deletes WHERE station_id = ?1")
            .bind(station_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_station(&self, station_id: StationId) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_deletes WHERE station_id = ?1")
                .bind(station_id as i64)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
