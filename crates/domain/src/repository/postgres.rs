use async_trait::async_trait;
use common::{Money, OrderId, ReservationId};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::order::{FailureReason, Order, OrderLine};

const ORDER_COLUMNS: &str = "order_id, state, lines, total_cents, reservation_ids, failure, \
                             created_at, updated_at, version";

fn to_i64(value: u64, column: &str) -> RepositoryResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Corrupted(format!("{column} out of range: {value}")))
}

/// PostgreSQL-backed order repository.
///
/// Lines and the failure reason are stored as JSONB; reservation ids as a
/// `UUID[]`.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> RepositoryResult<Order> {
        let state: String = row.try_get("state")?;
        let version: i64 = row.try_get("version")?;
        let Json(lines): Json<Vec<OrderLine>> = row.try_get("lines")?;
        let failure: Option<Json<FailureReason>> = row.try_get("failure")?;
        let reservation_ids: Vec<Uuid> = row.try_get("reservation_ids")?;

        Ok(Order {
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            lines,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            state: state.parse().map_err(RepositoryError::Corrupted)?,
            reservation_ids: reservation_ids
                .into_iter()
                .map(ReservationId::from_uuid)
                .collect(),
            failure: failure.map(|Json(reason)| reason),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: u64::try_from(version)
                .map_err(|_| RepositoryError::Corrupted(format!("negative version: {version}")))?,
        })
    }

    fn reservation_uuids(order: &Order) -> Vec<Uuid> {
        order
            .reservation_ids
            .iter()
            .map(ReservationId::as_uuid)
            .collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(order.order_id.as_uuid())
        .bind(order.state.as_str())
        .bind(Json(&order.lines))
        .bind(order.total_amount.cents())
        .bind(Self::reservation_uuids(order))
        .bind(order.failure.as_ref().map(Json))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(to_i64(order.version, "version")?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RepositoryError::AlreadyExists(order.order_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, order: &Order, expected_version: u64) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET state = $2,
                reservation_ids = $3,
                failure = $4,
                updated_at = $5,
                version = $6
            WHERE order_id = $1 AND version = $7
            "#,
        )
        .bind(order.order_id.as_uuid())
        .bind(order.state.as_str())
        .bind(Self::reservation_uuids(order))
        .bind(order.failure.as_ref().map(Json))
        .bind(order.updated_at)
        .bind(to_i64(order.version, "version")?)
        .bind(to_i64(expected_version, "expected_version")?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
            .bind(order.order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            None => Err(RepositoryError::NotFound(order.order_id)),
            Some(actual) => {
                tracing::warn!(
                    order_id = %order.order_id,
                    expected = expected_version,
                    actual,
                    "order version conflict"
                );
                Err(RepositoryError::ConcurrencyConflict {
                    order_id: order.order_id,
                    expected: expected_version,
                    actual: u64::try_from(actual).unwrap_or_default(),
                })
            }
        }
    }

    async fn get(&self, order_id: OrderId) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_pending(&self) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE state = 'Pending' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
