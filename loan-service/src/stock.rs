use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::ItemKind;

/// The only two code paths allowed to write `inventory_items.stock`.
/// Both take the row lock before reading, so two concurrent reservations
/// can never both see the same stale stock value.

#[derive(Debug, Error)]
pub enum StockError {
    #[error("item {0} not found")]
    NotFound(Uuid),
    #[error("item {id} is a {actual}, request says {expected}")]
    KindMismatch { id: Uuid, expected: ItemKind, actual: ItemKind },
    #[error("item {id} carries an unknown kind tag")]
    UnknownKind { id: Uuid },
    #[error("insufficient stock for {name}: available {available}, requested {requested}")]
    Insufficient { id: Uuid, name: String, available: i32, requested: i32 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct ReservedItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub name: String,
    pub stock_after: i32,
}

/// Open a transaction at the isolation level every stock/status mutation
/// runs under. REPEATABLE READ plus the explicit row locks below is what
/// makes reserve/release safe against lost updates.
pub async fn begin_repeatable_read(pool: &PgPool) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

pub(crate) const LOCK_ITEM_SQL: &str =
    "SELECT id, kind, name, stock FROM inventory_items WHERE id = $1 FOR UPDATE";

/// Lock the item row, verify the declared kind and the available stock,
/// then decrement. The decrement persists when the caller's transaction
/// commits; any error leaves the row untouched after rollback.
pub async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    expected_kind: ItemKind,
    quantity: i32,
) -> Result<ReservedItem, StockError> {
    let row = sqlx::query(LOCK_ITEM_SQL)
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StockError::NotFound(item_id))?;

    let kind_tag: String = row.get("kind");
    let kind = ItemKind::parse(&kind_tag).ok_or(StockError::UnknownKind { id: item_id })?;
    if kind != expected_kind {
        return Err(StockError::KindMismatch { id: item_id, expected: expected_kind, actual: kind });
    }

    let name: String = row.get("name");
    let available: i32 = row.get("stock");
    if quantity > available {
        return Err(StockError::Insufficient { id: item_id, name, available, requested: quantity });
    }

    let stock_after: i32 = sqlx::query(
        "UPDATE inventory_items SET stock = stock - $2, updated_at = now() WHERE id = $1 RETURNING stock",
    )
    .bind(item_id)
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await?
    .get("stock");

    Ok(ReservedItem { id: item_id, kind, name, stock_after })
}

/// Lock the item row and add the quantity back. Used on rejection and on
/// asset return; release never fails for "too much stock".
pub async fn release(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    quantity: i32,
) -> Result<i32, StockError> {
    // Lock first so release serializes with concurrent reservations too.
    sqlx::query(LOCK_ITEM_SQL)
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StockError::NotFound(item_id))?;

    let stock_after: i32 = sqlx::query(
        "UPDATE inventory_items SET stock = stock + $2, updated_at = now() WHERE id = $1 RETURNING stock",
    )
    .bind(item_id)
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await?
    .get("stock");

    Ok(stock_after)
}

/// Postgres signals lock-wait timeouts and repeatable-read conflicts with
/// dedicated SQLSTATEs; both are transient and worth a retry from the
/// caller's side.
pub fn is_transient_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "40001" || code == "40P01" || code == "55P03")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_query_takes_row_lock_before_read() {
        assert!(LOCK_ITEM_SQL.ends_with("FOR UPDATE"));
        assert!(LOCK_ITEM_SQL.contains("WHERE id = $1"));
    }

    #[test]
    fn serialization_failures_count_as_transient() {
        // sqlx::Error without a database error payload is not transient.
        let err = sqlx::Error::RowNotFound;
        assert!(!is_transient_conflict(&err));
    }

    #[test]
    fn insufficient_stock_message_names_item_and_amounts() {
        let err = StockError::Insufficient {
            id: Uuid::nil(),
            name: "Multimeter".into(),
            available: 2,
            requested: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Multimeter"));
        assert!(msg.contains("available 2"));
        assert!(msg.contains("requested 3"));
    }
}
