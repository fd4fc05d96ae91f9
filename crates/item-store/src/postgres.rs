use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventId, ItemRecord, PageRequest, Result, StoreError, Version, store::ItemStore,
};

const SELECT_COLUMNS: &str = "SELECT id, sku, name, description, quantity, reserved, version, \
     created_at, updated_at, deleted_at FROM inventory_items";

/// PostgreSQL-backed item store implementation.
#[derive(Clone)]
pub struct PostgresItemStore {
    pool: PgPool,
}

impl PostgresItemStore {
    /// Creates a new PostgreSQL item store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<ItemRecord> {
        Ok(ItemRecord {
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            quantity: row.try_get("quantity")?,
            reserved: row.try_get("reserved")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    /// Maps constraint violations onto store errors.
    fn map_write_error(record: &ItemRecord, event_id: EventId, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.constraint() {
                Some("inventory_items_pkey") => return StoreError::AlreadyExists(record.id),
                Some("inventory_items_sku_key") => {
                    return StoreError::DuplicateSku(record.sku.clone());
                }
                Some("processed_events_pkey") => return StoreError::DuplicateEvent(event_id),
                Some(
                    constraint @ ("inventory_items_quantity_check"
                    | "inventory_items_reserved_check"
                    | "inventory_items_reserved_le_quantity"),
                ) => {
                    return StoreError::ConstraintViolation {
                        aggregate_id: record.id,
                        constraint: constraint.to_string(),
                    };
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }

    fn record_write<T>(op: &'static str, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!("item_store_writes_total", "op" => op, "outcome" => outcome).increment(1);

        match result {
            Err(StoreError::Database(e)) => {
                tracing::error!(op, error = %e, "item store write failed");
            }
            Err(e) => tracing::debug!(op, error = %e, "item store write rejected"),
            Ok(_) => {}
        }
    }

    async fn insert_row(&self, record: &ItemRecord, event_id: EventId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Claim the event id first so a redelivery fails as a duplicate
        // rather than as an id or SKU clash
        Self::mark_processed(&mut tx, record, event_id).await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_items
                (id, sku, name, description, quantity, reserved, version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.sku)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.quantity)
        .bind(record.reserved)
        .bind(record.version.as_i64())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_write_error(record, event_id, e))?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_row(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        Self::mark_processed(&mut tx, record, event_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET sku = $3, name = $4, description = $5, quantity = $6, reserved = $7,
                version = $8, updated_at = $9, deleted_at = $10
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(expected.as_i64())
        .bind(&record.sku)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.quantity)
        .bind(record.reserved)
        .bind(record.version.as_i64())
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_write_error(record, event_id, e))?;

        if result.rows_affected() == 0 {
            // Either the row is gone or another writer got there first
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM inventory_items WHERE id = $1")
                    .bind(record.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    aggregate_id: record.id,
                    expected,
                    actual: Version::new(actual),
                },
                None => StoreError::NotFound(record.id),
            });
        }

        tx.commit().await?;
        Ok(record.version)
    }

    async fn mark_processed(
        tx: &mut Transaction<'_, Postgres>,
        record: &ItemRecord,
        event_id: EventId,
    ) -> Result<()> {
        sqlx::query("INSERT INTO processed_events (event_id, aggregate_id) VALUES ($1, $2)")
            .bind(event_id.as_uuid())
            .bind(record.id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| Self::map_write_error(record, event_id, e))?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PostgresItemStore {
    async fn get(&self, id: AggregateId) -> Result<Option<ItemRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn get_by_sku(&self, sku: &str) -> Result<Option<ItemRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE sku = $1"))
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list(&self, page: PageRequest) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE deleted_at IS NULL ORDER BY created_at ASC, id ASC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    #[tracing::instrument(
        skip_all,
        fields(aggregate_id = %record.id, event_id = %event_id)
    )]
    async fn insert(&self, record: &ItemRecord, event_id: EventId) -> Result<()> {
        let result = self.insert_row(record, event_id).await;
        Self::record_write("insert", &result);
        result
    }

    #[tracing::instrument(
        skip_all,
        fields(aggregate_id = %record.id, expected = %expected, event_id = %event_id)
    )]
    async fn update_if_version(
        &self,
        record: &ItemRecord,
        expected: Version,
        event_id: EventId,
    ) -> Result<Version> {
        let result = self.update_row(record, expected, event_id).await;
        Self::record_write("update", &result);
        result
    }

    async fn has_processed(&self, event_id: EventId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1)",
        )
        .bind(event_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
