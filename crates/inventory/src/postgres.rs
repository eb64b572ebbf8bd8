use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, ProductId, ReservationId, deadline};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    InventoryError, InventoryLedger, Reservation, ReservationState, ReservationStore, Result,
    StockRecord,
};

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| InventoryError::Corrupted(format!("negative {column}: {value}")))
}

/// PostgreSQL-backed inventory ledger.
///
/// Every mutation is a single conditional `UPDATE`, so the row lock taken by
/// PostgreSQL serializes concurrent writers per product.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_stock(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            available_quantity: to_u64(row.try_get("available_quantity")?, "available_quantity")?,
            version: to_u64(row.try_get("version")?, "version")?,
        })
    }

    /// Conditional decrement on an existing connection or transaction.
    pub(crate) async fn try_decrement_in(
        conn: &mut PgConnection,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        let row = sqlx::query(
            r#"
            UPDATE product_stock
            SET available_quantity = available_quantity - $2,
                version = version + 1,
                updated_at = now()
            WHERE product_id = $1 AND available_quantity >= $2
            RETURNING product_id, available_quantity, version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            return Self::row_to_stock(row);
        }

        // Nothing matched: either the product is unknown or stock is short.
        let available: Option<i64> =
            sqlx::query_scalar("SELECT available_quantity FROM product_stock WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        match available {
            None => Err(InventoryError::ProductNotFound(product_id.clone())),
            Some(available) => Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                requested: u64::from(quantity),
                available: to_u64(available, "available_quantity")?,
            }),
        }
    }

    /// Restoring increment on an existing connection or transaction.
    pub(crate) async fn increment_in(
        conn: &mut PgConnection,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        let row = sqlx::query(
            r#"
            UPDATE product_stock
            SET available_quantity = available_quantity + $2,
                version = version + 1,
                updated_at = now()
            WHERE product_id = $1
            RETURNING product_id, available_quantity, version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Self::row_to_stock(row),
            None => Err(InventoryError::ProductNotFound(product_id.clone())),
        }
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    async fn try_decrement(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        let mut conn = self.pool.acquire().await?;
        Self::try_decrement_in(&mut conn, product_id, quantity).await
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        let mut conn = self.pool.acquire().await?;
        Self::increment_in(&mut conn, product_id, quantity).await
    }

    async fn current_quantity(&self, product_id: &ProductId) -> Result<u64> {
        self.stock_record(product_id)
            .await?
            .map(|record| record.available_quantity)
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    async fn stock_record(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(
            "SELECT product_id, available_quantity, version FROM product_stock WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_stock).transpose()
    }

    async fn restock(&self, product_id: &ProductId, quantity: u64) -> Result<StockRecord> {
        let quantity = i64::try_from(quantity)
            .map_err(|_| InventoryError::InvalidQuantity(quantity))?;

        let row = sqlx::query(
            r#"
            INSERT INTO product_stock (product_id, available_quantity, version)
            VALUES ($1, $2, 1)
            ON CONFLICT (product_id) DO UPDATE
            SET available_quantity = product_stock.available_quantity + EXCLUDED.available_quantity,
                version = product_stock.version + 1,
                updated_at = now()
            RETURNING product_id, available_quantity, version
            "#,
        )
        .bind(product_id.as_str())
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_stock(row)
    }
}

const RESERVATION_COLUMNS: &str =
    "reservation_id, product_id, quantity, state, created_at, expires_at";

/// PostgreSQL-backed reservation store.
///
/// A reservation and its ledger adjustment always share one transaction.
/// State transitions are guarded by `WHERE state = 'Held'`; a concurrent
/// writer blocks on the row lock and then re-checks the guard, so exactly
/// one of commit, release and expiry matches.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresReservationStore {
    /// Creates a new PostgreSQL reservation store.
    pub fn new(pool: PgPool, clock: impl Clock + 'static) -> Self {
        Self {
            pool,
            clock: Arc::new(clock),
        }
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let quantity: i64 = row.try_get("quantity")?;
        let state: String = row.try_get("state")?;

        Ok(Reservation {
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("reservation_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| InventoryError::Corrupted(format!("quantity out of range: {quantity}")))?,
            state: state.parse().map_err(InventoryError::Corrupted)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    async fn fetch(
        conn: &mut PgConnection,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    /// Moves a Held reservation to `target`, returning it if the guard matched.
    async fn leave_held(
        conn: &mut PgConnection,
        reservation_id: ReservationId,
        target: ReservationState,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "UPDATE reservations SET state = $2 \
             WHERE reservation_id = $1 AND state = 'Held' \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation_id.as_uuid())
        .bind(target.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<Reservation> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(0));
        }

        let mut tx = self.pool.begin().await?;
        PostgresInventoryLedger::try_decrement_in(&mut tx, product_id, quantity).await?;

        let now = self.clock.now();
        let row = sqlx::query(&format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) \
             VALUES ($1, $2, $3, 'Held', $4, $5) \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(ReservationId::new().as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .bind(now)
        .bind(deadline(now, ttl))
        .fetch_one(&mut *tx)
        .await?;
        let reservation = Self::row_to_reservation(row)?;

        tx.commit().await?;
        Ok(reservation)
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let mut conn = self.pool.acquire().await?;
        let now = self.clock.now();

        let row = sqlx::query(&format!(
            "UPDATE reservations SET state = 'Committed' \
             WHERE reservation_id = $1 AND state = 'Held' AND expires_at > $2 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation_id.as_uuid())
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            return Self::row_to_reservation(row);
        }

        let current = Self::fetch(&mut conn, reservation_id)
            .await?
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;

        match current.state {
            ReservationState::Held | ReservationState::Expired => {
                Err(InventoryError::ReservationExpired(reservation_id))
            }
            actual => Err(InventoryError::InvalidState {
                reservation_id,
                actual,
            }),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        let Some(released) =
            Self::leave_held(&mut tx, reservation_id, ReservationState::Released).await?
        else {
            let current = Self::fetch(&mut tx, reservation_id)
                .await?
                .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
            return Err(InventoryError::InvalidState {
                reservation_id,
                actual: current.state,
            });
        };

        PostgresInventoryLedger::increment_in(&mut tx, &released.product_id, released.quantity)
            .await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "UPDATE reservations SET state = 'Expired' \
             WHERE state = 'Held' AND expires_at <= $1 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let expired = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;

        for reservation in &expired {
            PostgresInventoryLedger::increment_in(
                &mut tx,
                &reservation.product_id,
                reservation.quantity,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(expired)
    }

    async fn get(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, reservation_id).await
    }
}
