//! Per-item savepoints for batch ingestion
//!
//! Every item of a batch runs inside its own savepoint nested in the request
//! transaction. A failing item rolls back only its savepoint; the items
//! before it stay in the request transaction.

use sqlx::{Connection, PgConnection, Postgres, Transaction};

use shared::{BatchOutcome, ItemResult};

use crate::error::AppResult;

/// What an item handler decided
pub enum ItemOutcome {
    /// Keep the item's writes
    Done(ItemResult),
    /// Reported as failed without an error, e.g. a duplicate name
    Rejected(ItemResult),
}

/// Open a savepoint for one item
pub async fn begin_item(conn: &mut PgConnection) -> AppResult<Transaction<'_, Postgres>> {
    Ok(Connection::begin(conn).await?)
}

/// Commit or roll back an item's savepoint and record its result.
///
/// `failed` builds the failed entry from the error message when the item
/// raised.
pub async fn settle_item<F>(
    item_tx: Transaction<'_, Postgres>,
    outcome: AppResult<ItemOutcome>,
    batch: &mut BatchOutcome,
    failed: F,
) -> AppResult<()>
where
    F: FnOnce(String) -> ItemResult,
{
    match outcome {
        Ok(ItemOutcome::Done(result)) => {
            item_tx.commit().await?;
            batch.push_success(result);
        }
        Ok(ItemOutcome::Rejected(result)) => {
            item_tx.rollback().await?;
            batch.push_rejected(result);
        }
        Err(e) => {
            item_tx.rollback().await?;
            tracing::warn!(error = %e, "batch item rolled back");
            batch.push_error(failed(e.item_message()));
        }
    }
    Ok(())
}
