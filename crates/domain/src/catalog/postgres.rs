use async_trait::async_trait;
use common::{Money, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{CatalogAdmin, CatalogEntry, CatalogError, CatalogResult, CatalogSnapshot, validate_price};

/// PostgreSQL-backed catalog.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Creates a new PostgreSQL catalog.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: PgRow) -> CatalogResult<CatalogEntry> {
        let snapshot_version: i64 = row.try_get("snapshot_version")?;
        Ok(CatalogEntry {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            price: Money::from_cents(row.try_get("price_cents")?),
            is_active: row.try_get("is_active")?,
            snapshot_version: u64::try_from(snapshot_version).map_err(|_| {
                CatalogError::Corrupted(format!("negative snapshot_version: {snapshot_version}"))
            })?,
        })
    }
}

#[async_trait]
impl CatalogSnapshot for PostgresCatalog {
    async fn lookup(&self, product_id: &ProductId) -> CatalogResult<CatalogEntry> {
        let row = sqlx::query(
            r#"
            SELECT product_id, price_cents, is_active, snapshot_version
            FROM catalog_products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_entry(row),
            None => Err(CatalogError::NotFound(product_id.clone())),
        }
    }
}

#[async_trait]
impl CatalogAdmin for PostgresCatalog {
    async fn upsert(
        &self,
        product_id: &ProductId,
        price: Money,
        is_active: bool,
    ) -> CatalogResult<CatalogEntry> {
        validate_price(product_id, price)?;

        let row = sqlx::query(
            r#"
            INSERT INTO catalog_products (product_id, price_cents, is_active, snapshot_version)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (product_id) DO UPDATE
            SET price_cents = EXCLUDED.price_cents,
                is_active = EXCLUDED.is_active,
                snapshot_version = catalog_products.snapshot_version + 1
            RETURNING product_id, price_cents, is_active, snapshot_version
            "#,
        )
        .bind(product_id.as_str())
        .bind(price.cents())
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_entry(row)
    }

    async fn update(
        &self,
        product_id: &ProductId,
        price: Option<Money>,
        is_active: Option<bool>,
    ) -> CatalogResult<CatalogEntry> {
        if let Some(price) = price {
            validate_price(product_id, price)?;
        }

        let row = sqlx::query(
            r#"
            UPDATE catalog_products
            SET price_cents = COALESCE($2, price_cents),
                is_active = COALESCE($3, is_active),
                snapshot_version = snapshot_version + 1
            WHERE product_id = $1
            RETURNING product_id, price_cents, is_active, snapshot_version
            "#,
        )
        .bind(product_id.as_str())
        .bind(price.map(|price| price.cents()))
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_entry(row),
            None => Err(CatalogError::NotFound(product_id.clone())),
        }
    }
}
