//! Postgres-backed `Tracker`.
//!
//! `imports` is an append-only event log (one row per transition, never
//! updated or deleted); the "current" row for a `uuid` is always the one
//! with the largest `id`. Grounded on the teacher's
//! `chem-persistence::pg::PgEventStore`, which keeps the same
//! append-and-read-latest shape for Diesel; rewritten against `sqlx` so it
//! composes with the root binary's existing async pool and `FOR UPDATE
//! SKIP LOCKED` claim query (spec.md §4.1, §4.2).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use adi_core::{PreprocessingRepository, Tracker, TrackerError};
use adi_domain::{DestinationType, Order, Preprocessing, Stage};

use crate::error::PersistenceError;
use crate::retry::with_retry;

pub struct PgTracker {
    pool: PgPool,
}

impl PgTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a producer-written `IMPORT_PENDING` row directly. `Tracker`
    /// itself has no insert primitive — producers are out of core (spec.md
    /// §1) — so integration tests that need a seeded row go through this
    /// instead of reaching for raw SQL.
    pub async fn seed_pending_for_tests(&self, order: &Order) -> Result<(), PersistenceError> {
        let files = serde_json::to_value(&order.files)
            .map_err(|e| PersistenceError::Unknown(format!("failed to encode files: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO imports
                (uuid, stage, group_name, user_name, destination_id,
                 destination_type, files, "timestamp", preprocessing_id, message)
            VALUES ($1, 'IMPORT_PENDING', $2, $3, $4, $5, $6, $7, $8, NULL)
            "#,
        )
        .bind(order.uuid)
        .bind(&order.group_name)
        .bind(&order.user_name)
        .bind(order.destination_id)
        .bind(order.destination_type.to_string())
        .bind(&files)
        .bind(order.timestamp)
        .bind(order.preprocessing_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_order(
    uuid: Uuid,
    group_name: String,
    user_name: String,
    destination_id: i64,
    destination_type: String,
    files: JsonValue,
    stage: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    preprocessing_id: Option<i64>,
) -> Result<Order, PersistenceError> {
    let destination_type = DestinationType::from_str(&destination_type)
        .map_err(|e| PersistenceError::Unknown(e.to_string()))?;
    let stage =
        Stage::from_str(&stage).map_err(|e| PersistenceError::Unknown(e.to_string()))?;
    let files: Vec<PathBuf> = serde_json::from_value(files)
        .map_err(|e| PersistenceError::Unknown(format!("malformed files column: {e}")))?;
    Ok(Order {
        uuid,
        group_name,
        user_name,
        destination_id,
        destination_type,
        files,
        stage,
        timestamp,
        preprocessing_id,
    })
}

#[async_trait]
impl Tracker for PgTracker {
    async fn claim_next(&self) -> Result<Option<Order>, TrackerError> {
        with_retry(|| async {
            let mut tx = self.pool.begin().await?;

            // `FOR UPDATE` can't be applied directly over a `DISTINCT ON`
            // projection (Postgres can't tie the locked row back to a single
            // base-table row once duplicates are collapsed), so the
            // latest-per-uuid computation happens in a CTE and the lock is
            // taken by joining back onto the real `imports` row it names.
            let row = sqlx::query(
                r#"
                WITH latest AS (
                    SELECT DISTINCT ON (uuid) id, uuid, stage, "timestamp"
                    FROM imports
                    ORDER BY uuid, id DESC
                )
                SELECT i.uuid, i.group_name, i.user_name, i.destination_id, i.destination_type,
                       i.files, i."timestamp", i.preprocessing_id
                FROM imports i
                JOIN latest l ON l.id = i.id
                WHERE l.stage = 'IMPORT_PENDING'
                ORDER BY l."timestamp" ASC, l.uuid ASC
                LIMIT 1
                FOR UPDATE OF i SKIP LOCKED
                "#,
            )
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                tx.commit().await?;
                return Ok(None);
            };

            let uuid: Uuid = row.try_get("uuid")?;
            let group_name: String = row.try_get("group_name")?;
            let user_name: String = row.try_get("user_name")?;
            let destination_id: i64 = row.try_get("destination_id")?;
            let destination_type: String = row.try_get("destination_type")?;
            let files: JsonValue = row.try_get("files")?;
            let timestamp: chrono::DateTime<chrono::Utc> = row.try_get("timestamp")?;
            let preprocessing_id: Option<i64> = row.try_get("preprocessing_id")?;

            sqlx::query(
                r#"
                INSERT INTO imports
                    (uuid, stage, group_name, user_name, destination_id,
                     destination_type, files, preprocessing_id, message)
                VALUES ($1, 'IMPORT_STARTED', $2, $3, $4, $5, $6, $7, NULL)
                "#,
            )
            .bind(uuid)
            .bind(&group_name)
            .bind(&user_name)
            .bind(destination_id)
            .bind(&destination_type)
            .bind(&files)
            .bind(preprocessing_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            let order = row_to_order(
                uuid,
                group_name,
                user_name,
                destination_id,
                destination_type,
                files,
                "IMPORT_STARTED".to_string(),
                timestamp,
                preprocessing_id,
            )?;
            Ok(Some(order))
        })
        .await
        .map_err(Into::into)
    }

    async fn record(
        &self,
        uuid: Uuid,
        stage: Stage,
        message: Option<String>,
    ) -> Result<(), TrackerError> {
        with_retry(|| {
            let message = message.clone();
            async move {
                let mut tx = self.pool.begin().await?;

                let row = sqlx::query(
                    r#"
                    SELECT stage, group_name, user_name, destination_id, destination_type,
                           files, preprocessing_id
                    FROM imports
                    WHERE uuid = $1
                    ORDER BY id DESC
                    LIMIT 1
                    FOR UPDATE
                    "#,
                )
                .bind(uuid)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    return Err(PersistenceError::NotFound);
                };

                let current_stage: String = row.try_get("stage")?;
                let current_stage = Stage::from_str(&current_stage)
                    .map_err(|e| PersistenceError::Unknown(e.to_string()))?;

                if !current_stage.can_transition_to(stage) {
                    tx.rollback().await?;
                    return Err(PersistenceError::IllegalTransition { from: current_stage, to: stage });
                }

                let group_name: String = row.try_get("group_name")?;
                let user_name: String = row.try_get("user_name")?;
                let destination_id: i64 = row.try_get("destination_id")?;
                let destination_type: String = row.try_get("destination_type")?;
                let files: JsonValue = row.try_get("files")?;
                let preprocessing_id: Option<i64> = row.try_get("preprocessing_id")?;

                sqlx::query(
                    r#"
                    INSERT INTO imports
                        (uuid, stage, group_name, user_name, destination_id,
                         destination_type, files, preprocessing_id, message)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(uuid)
                .bind(stage.as_str())
                .bind(group_name)
                .bind(user_name)
                .bind(destination_id)
                .bind(destination_type)
                .bind(files)
                .bind(preprocessing_id)
                .bind(message)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(())
            }
        })
        .await
        .map_err(|e| match e {
            PersistenceError::NotFound => TrackerError::NotFound(uuid),
            PersistenceError::IllegalTransition { from, to } => {
                TrackerError::InvalidTransition { uuid, from, to }
            }
            other => other.into(),
        })
    }

    async fn current_stage(&self, uuid: Uuid) -> Result<Stage, TrackerError> {
        with_retry(|| async {
            let row = sqlx::query(r#"SELECT stage FROM imports WHERE uuid = $1 ORDER BY id DESC LIMIT 1"#)
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
            let Some(row) = row else {
                return Err(PersistenceError::NotFound);
            };
            let stage: String = row.try_get("stage")?;
            Stage::from_str(&stage).map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
        .map_err(|e| match e {
            PersistenceError::NotFound => TrackerError::NotFound(uuid),
            other => other.into(),
        })
    }

    async fn list_dangling(&self) -> Result<Vec<Uuid>, TrackerError> {
        with_retry(|| async {
            let rows = sqlx::query(
                r#"
                SELECT uuid
                FROM (
                    SELECT DISTINCT ON (uuid) uuid, stage
                    FROM imports
                    ORDER BY uuid, id DESC
                ) latest
                WHERE stage = 'IMPORT_STARTED'
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|row| row.try_get::<Uuid, _>("uuid").map_err(PersistenceError::from))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(Into::into)
    }
}

pub struct PgPreprocessingRepository {
    pool: PgPool,
}

impl PgPreprocessingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreprocessingRepository for PgPreprocessingRepository {
    async fn find(&self, id: i64) -> Result<Preprocessing, TrackerError> {
        with_retry(|| async {
            let row = sqlx::query(
                r#"
                SELECT id, container, input_file, output_folder, alt_output_folder, extra_params
                FROM imports_preprocessing
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Err(PersistenceError::NotFound);
            };

            let extra_params: JsonValue = row.try_get("extra_params")?;
            let extra_params: BTreeMap<String, String> = serde_json::from_value(extra_params)
                .map_err(|e| PersistenceError::Unknown(format!("malformed extra_params: {e}")))?;

            Ok(Preprocessing {
                id: row.try_get("id")?,
                container: row.try_get("container")?,
                input_file: row.try_get("input_file")?,
                output_folder: row.try_get::<String, _>("output_folder")?.into(),
                alt_output_folder: row.try_get::<String, _>("alt_output_folder")?.into(),
                extra_params,
            })
        })
        .await
        .map_err(|e| match e {
            PersistenceError::NotFound => TrackerError::PreprocessingNotFound(id),
            other => other.into(),
        })
    }
}
