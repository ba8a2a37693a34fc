use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use stockinfo_core::domain::price_update::{
    PriceUpdateEvent, PriceUpdateEventId, PriceUpdateJobId, PriceUpdateOutcome,
};
use stockinfo_core::domain::product::ProductId;

use super::{PriceUpdateEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPriceUpdateEventRepository {
    pool: DbPool,
}

impl SqlPriceUpdateEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PriceUpdateEventRepository for SqlPriceUpdateEventRepository {
    async fn append(&self, event: PriceUpdateEvent) -> Result<(), RepositoryError> {
        let sequence = i64::try_from(event.sequence).map_err(|_| {
            RepositoryError::Decode(format!("sequence {} does not fit in i64", event.sequence))
        })?;

        sqlx::query(
            "INSERT INTO price_update_event (
                id,
                job_id,
                product_id,
                new_price,
                sequence,
                outcome,
                detail,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.job_id.0)
        .bind(event.product_id.0)
        .bind(event.new_price.to_string())
        .bind(sequence)
        .bind(event.outcome.as_str())
        .bind(event.detail.as_deref())
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<PriceUpdateEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, job_id, product_id, new_price, sequence, outcome, detail, occurred_at
             FROM price_update_event
             WHERE product_id = ?
             ORDER BY occurred_at ASC, sequence ASC, rowid ASC",
        )
        .bind(product_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<PriceUpdateEvent, RepositoryError> {
    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = PriceUpdateOutcome::parse(&outcome_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown price update outcome `{outcome_raw}`"))
    })?;

    let price_raw = row.try_get::<String, _>("new_price")?;
    let new_price = Decimal::from_str(&price_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid price in `new_price`: `{price_raw}` ({error})"))
    })?;

    let sequence_raw = row.try_get::<i64, _>("sequence")?;
    let sequence = u64::try_from(sequence_raw).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `sequence`: {sequence_raw}"))
    })?;

    Ok(PriceUpdateEvent {
        id: PriceUpdateEventId(row.try_get("id")?),
        job_id: PriceUpdateJobId(row.try_get("job_id")?),
        product_id: ProductId(row.try_get("product_id")?),
        new_price,
        sequence,
        outcome,
        detail: row.try_get("detail")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
