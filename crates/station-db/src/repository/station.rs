//! # Station Repository
//!
//! Stores each station as its manifest JSON plus a few indexed columns.
//!
//! ## Row Layout
//! ```text
//! stations
//! ┌────┬──────────┬──────────────────┬─────────────────────┬────────────┐
//! │ id │ name     │ manifest (JSON)  │ has_pending_changes │ updated_at │
//! ├────┼──────────┼──────────────────┼─────────────────────┼────────────┤
//! │ 1  │ Museum   │ {"name":...}     │ 1                   │ ...        │
//! │ 2  │ Foyer    │ {"name":...}     │ 0                   │ ...        │
//! └────┴──────────┴──────────────────┴─────────────────────┴────────────┘
//! ```
//!
//! `has_pending_changes` is raised by every authoring edit and cleared by a
//! sync that committed the manifest to the controller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use station_core::{CoreError, Station, StationId};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Listing row for a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSummary {
    pub id: StationId,
    pub name: String,
    pub has_pending_changes: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StationRow {
    id: i64,
    name: String,
    manifest: String,
    has_pending_changes: bool,
    updated_at: DateTime<Utc>,
}

impl StationRow {
    fn station_id(&self) -> DbResult<StationId> {
        StationId::try_from(self.id)
            .map_err(|_| DbError::Internal(format!("station id {} out of range", self.id)))
    }
}

/// Repository for station rows.
#[derive(Debug, Clone)]
pub struct StationRepository {
    pool: SqlitePool,
}

impl StationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StationRepository { pool }
    }

    /// Creates an empty station; the id is assigned by SQLite.
    pub async fn create(&self, name: &str) -> DbResult<Station> {
        station_core::validation::validate_name("station name", name).map_err(CoreError::from)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO stations (name, manifest, has_pending_changes, created_at, updated_at)
            VALUES (?1, '{}', 0, ?2, ?2)
            "#,
        )
        .bind(name.trim())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = StationId::try_from(result.last_insert_rowid())
            .map_err(|_| DbError::Internal("station id out of range".to_string()))?;
        let station = Station::new(id, name.trim());

        sqlx::query("UPDATE stations SET manifest = ?2 WHERE id = ?1")
            .bind(id as i64)
            .bind(station.to_manifest_json()?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(station_id = id, name = %station.name, "Created station");
        Ok(station)
    }

    /// Loads and rebuilds a station.
    pub async fn get(&self, id: StationId) -> DbResult<Station> {
        let row = sqlx::query_as::<_, StationRow>(
            r#"
            SELECT id, name, manifest, has_pending_changes, updated_at
            FROM stations
            WHERE id = ?1
            "#,
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CoreError::StationNotFound(id))?;

        Ok(Station::from_manifest_json(row.station_id()?, &row.manifest)?)
    }

    /// All stations ordered by id.
    pub async fn list(&self) -> DbResult<Vec<StationSummary>> {
        let rows = sqlx::query_as::<_, StationRow>(
            r#"
            SELECT id, name, manifest, has_pending_changes, updated_at
            FROM stations
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StationSummary {
                    id: row.station_id()?,
                    name: row.name,
                    has_pending_changes: row.has_pending_changes,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    /// Writes the whole station back.
    pub async fn save(&self, station: &Station) -> DbResult<()> {
        let manifest = station.to_manifest_json()?;
        let result = sqlx::query(
            r#"
            UPDATE stations SET
                name = ?2,
                manifest = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(station.id as i64)
        .bind(&station.name)
        .bind(manifest)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StationNotFound(station.id).into());
        }
        debug!(station_id = station.id, "Saved station");
        Ok(())
    }

    /// Deletes a station; its pending deletes go with it.
    pub async fn delete(&self, id: StationId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM stations WHERE id = ?1")
            .bind(id as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StationNotFound(id).into());
        }
        info!(station_id = id, "Deleted station");
        Ok(())
    }

    pub async fn has_pending_changes(&self, id: StationId) -> DbResult<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT has_pending_changes FROM stations WHERE id = ?1")
                .bind(id as i64)
                .fetch_optional(&self.pool)
                .await?;
        flag.ok_or_else(|| CoreError::StationNotFound(id).into())
    }

    pub async fn set_pending_changes(&self, id: StationId, pending: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE stations SET has_pending_changes = ?2 WHERE id = ?1")
            .bind(id as i64)
            .bind(pending)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StationNotFound(id).into());
        }
        Ok(())
    }
}
