//! Quality-control ingestion
//!
//! A quality control names its ticket through `scale_no`. Mobile clients may
//! send it before the ticket itself; such payloads are kept in
//! `pending_quality_controls` and attached once the ticket exists.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    duplicate_kept_message, BatchOutcome, ItemResult, QcState, RefId, ScaleBook, StagedAudit,
    StagedStock, DATA_KEPT, KEPT_DATA_UPDATED, RECORD_CREATED, RECORD_EXISTS, RECORD_NOT_FOUND,
    RECORD_POSTED, RECORD_UPDATED,
};

use crate::config::OperationSettings;
use crate::error::{AppError, AppResult};
use crate::services::master_data::text;
use crate::services::scale_store::{
    find_ticket_by_name, flush, load_book, load_calculation_types, penalty_type_ids,
    quality_control_from_payload,
};
use crate::services::unit_of_work::{begin_item, settle_item, ItemOutcome};

/// Quality control service
#[derive(Clone)]
pub struct QualityControlService {
    db: PgPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcAction {
    Post,
    Cancel,
}

impl QcAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(QcAction::Post),
            "cancel" => Some(QcAction::Cancel),
            _ => None,
        }
    }
}

/// Quality control figures returned by lifecycle actions
#[derive(Debug, Serialize)]
pub struct QualityControlSummary {
    pub id: Uuid,
    pub name: String,
    pub state: QcState,
    pub penalty_qty_total: Decimal,
    pub return_qty_total: Decimal,
    pub ticket_id: Uuid,
    pub ticket_net_after_quality_control: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRow {
    id: i64,
    name: String,
    scale_no: String,
    payload: Json<Value>,
    ticket_id: Uuid,
    ticket_name: String,
}

impl QualityControlService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_quality_controls(
        &self,
        items: Vec<Value>,
        company_id: Option<i64>,
        settings: &OperationSettings,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let label = kept_label(item);
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = create_quality_control(&mut item_tx, item, company_id, settings).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, Some(label), ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "quality control batch processed");
        Ok(())
    }

    pub async fn update_quality_controls(
        &self,
        items: Vec<Value>,
        settings: &OperationSettings,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let label = kept_label(item);
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = update_quality_control(&mut item_tx, item, settings).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, Some(label), ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "quality control update processed");
        Ok(())
    }

    /// Attach every kept payload whose ticket now exists
    pub async fn upload_pending(
        &self,
        company_id: Option<i64>,
        settings: &OperationSettings,
    ) -> AppResult<Vec<ItemResult>> {
        let mut tx = self.db.begin().await?;
        let results = attach_pending(&mut tx, company_id, settings).await?;
        tx.commit().await?;
        Ok(results)
    }

    pub async fn apply_action(
        &self,
        id: Uuid,
        action: QcAction,
        settings: &OperationSettings,
    ) -> AppResult<QualityControlSummary> {
        let mut tx = self.db.begin().await?;

        let ticket_id = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT ticket_id FROM quality_controls WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten()
        .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        let mut book = load_book(&mut tx, &[ticket_id]).await?;
        match action {
            QcAction::Post => book.post_quality_control(id)?,
            QcAction::Cancel => book.cancel_quality_control(id)?,
        }

        flush(
            &mut tx,
            &book,
            &StagedStock::default(),
            &StagedAudit::default(),
            &settings.scale_sequence_prefix,
        )
        .await?;
        tx.commit().await?;

        let qc = book.quality_control(id)?;
        let ticket = book.ticket(ticket_id)?;
        tracing::info!(quality_control_id = %id, action = ?action, "quality control action applied");

        Ok(QualityControlSummary {
            id,
            name: qc.name.clone(),
            state: qc.state,
            penalty_qty_total: qc.penalty_qty_total,
            return_qty_total: qc.return_qty_total,
            ticket_id,
            ticket_net_after_quality_control: ticket.net_after_quality_control,
        })
    }
}

/// Attach kept payloads whose ticket now exists, each in its own savepoint.
///
/// A payload that fails stays kept.
pub async fn attach_pending(
    conn: &mut PgConnection,
    company_id: Option<i64>,
    settings: &OperationSettings,
) -> AppResult<Vec<ItemResult>> {
    let rows = sqlx::query_as::<_, PendingRow>(
        r#"
        SELECT DISTINCT ON (p.id)
               p.id, p.name, p.scale_no, p.payload, t.id AS ticket_id, t.name AS ticket_name
        FROM pending_quality_controls p
        JOIN scale_tickets t ON t.name = p.scale_no
        WHERE ($1::BIGINT IS NULL OR p.company_id IS NULL OR p.company_id = $1)
          AND NOT EXISTS (SELECT 1 FROM quality_controls q WHERE q.name = p.name)
        ORDER BY p.id, t.created_at
        "#,
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut batch = BatchOutcome::new();
    for row in rows {
        let item = row.payload.0;
        let ref_id = RefId::from_json(&item);
        let label = format!("{} - {}", row.name, row.scale_no);
        let ticket_label = format!("{} - {}", row.name, row.ticket_name);

        let mut item_tx = begin_item(conn).await?;
        let outcome = attach_kept(&mut item_tx, row.id, &item, row.ticket_id, settings)
            .await
            .map(|qc_id| {
                ItemOutcome::Done(ItemResult::success(
                    qc_id,
                    ticket_label,
                    ref_id.clone(),
                    RECORD_CREATED,
                ))
            });
        settle_item(item_tx, outcome, &mut batch, |message| {
            ItemResult::failed(Some(row.id.into()), Some(label), ref_id, message)
        })
        .await?;
    }

    Ok(batch.into_items())
}

async fn attach_kept(
    conn: &mut PgConnection,
    pending_id: i64,
    item: &Value,
    ticket_id: Uuid,
    settings: &OperationSettings,
) -> AppResult<Uuid> {
    let qc_id = attach_to_ticket(conn, item, ticket_id, settings).await?;
    sqlx::query("DELETE FROM pending_quality_controls WHERE id = $1")
        .bind(pending_id)
        .execute(&mut *conn)
        .await?;
    tracing::debug!(pending_id, quality_control_id = %qc_id, "kept quality control attached");
    Ok(qc_id)
}

async fn create_quality_control(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
    settings: &OperationSettings,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();
    let scale_no = text(item, "scale_no").unwrap_or_default();

    let existing = sqlx::query_as::<_, (Uuid, Option<String>)>(
        r#"
        SELECT q.id, t.name
        FROM quality_controls q
        LEFT JOIN scale_tickets t ON t.id = q.ticket_id
        WHERE q.name = $1
        LIMIT 1
        "#,
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some((id, ticket_name)) = existing {
        return Ok(ItemOutcome::Rejected(ItemResult::failed(
            Some(id.into()),
            Some(format!("{} - {}", name, ticket_name.unwrap_or_default())),
            ref_id,
            RECORD_EXISTS,
        )));
    }

    if let Some((ticket_id, ticket_name, _)) = find_ticket_by_name(conn, &scale_no).await? {
        let qc_id = attach_to_ticket(conn, item, ticket_id, settings).await?;
        return Ok(ItemOutcome::Done(ItemResult::success(
            qc_id,
            format!("{} - {}", name, ticket_name),
            ref_id,
            RECORD_CREATED,
        )));
    }

    let kept = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM pending_quality_controls WHERE name = $1",
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = kept {
        return Ok(ItemOutcome::Rejected(ItemResult::failed(
            Some(id.into()),
            Some(format!("{} - {}", name, scale_no)),
            ref_id,
            duplicate_kept_message(&name, id),
        )));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pending_quality_controls (name, scale_no, payload, company_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(&scale_no)
    .bind(Json(item))
    .bind(company_id)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(pending_id = id, scale_no = %scale_no, "quality control kept until its ticket arrives");
    Ok(ItemOutcome::Done(ItemResult::success(
        id,
        format!("{} - {}", name, scale_no),
        ref_id,
        DATA_KEPT,
    )))
}

async fn update_quality_control(
    conn: &mut PgConnection,
    item: &Value,
    settings: &OperationSettings,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    let stored = sqlx::query_as::<_, (Uuid, Option<Uuid>, String)>(
        "SELECT id, ticket_id, state FROM quality_controls WHERE name = $1 LIMIT 1",
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((id, ticket_id, state)) = stored {
        if state != QcState::Draft.as_str() {
            return Err(AppError::InvalidStateTransition(RECORD_POSTED.to_string()));
        }
        let ticket_id = ticket_id.ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        let mut book = load_book(conn, &[ticket_id]).await?;
        let types = load_calculation_types(conn, &penalty_type_ids(item)).await?;
        let ticket_date = book.ticket(ticket_id)?.date;
        let replacement = quality_control_from_payload(item, ticket_id, ticket_date, &types)?;

        let mut qc = book.quality_control(id)?.clone();
        qc.penalties = replacement.penalties;
        qc.returns = replacement.returns;
        if replacement.delivery_number.is_some() {
            qc.delivery_number = replacement.delivery_number;
        }
        book.insert_quality_control(qc);
        book.recompute(ticket_id)?;
        let ticket_name = book.ticket(ticket_id)?.name.clone();

        flush(
            conn,
            &book,
            &StagedStock::default(),
            &StagedAudit::default(),
            &settings.scale_sequence_prefix,
        )
        .await?;

        return Ok(ItemOutcome::Done(ItemResult::success(
            id,
            format!("{} - {}", name, ticket_name),
            ref_id,
            RECORD_UPDATED,
        )));
    }

    let kept = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, scale_no FROM pending_quality_controls WHERE name = $1",
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((id, _)) = kept else {
        return Err(AppError::NotFound(RECORD_NOT_FOUND.to_string()));
    };

    let scale_no = text(item, "scale_no").unwrap_or_default();
    sqlx::query("UPDATE pending_quality_controls SET scale_no = $2, payload = $3 WHERE id = $1")
        .bind(id)
        .bind(&scale_no)
        .bind(Json(item))
        .execute(&mut *conn)
        .await?;

    Ok(ItemOutcome::Done(ItemResult::success(
        id,
        format!("{} - {}", name, scale_no),
        ref_id,
        KEPT_DATA_UPDATED,
    )))
}

/// Create the quality control on its ticket and store the recomputed ticket
async fn attach_to_ticket(
    conn: &mut PgConnection,
    item: &Value,
    ticket_id: Uuid,
    settings: &OperationSettings,
) -> AppResult<Uuid> {
    let mut book: ScaleBook = load_book(conn, &[ticket_id]).await?;
    let types = load_calculation_types(conn, &penalty_type_ids(item)).await?;
    let ticket_date = book.ticket(ticket_id)?.date;
    let qc = quality_control_from_payload(item, ticket_id, ticket_date, &types)?;
    let qc_id = book.insert_quality_control(qc);
    book.recompute(ticket_id)?;

    if settings.auto_post_scale_ticket {
        book.post_quality_control(qc_id)?;
    }

    flush(
        conn,
        &book,
        &StagedStock::default(),
        &StagedAudit::default(),
        &settings.scale_sequence_prefix,
    )
    .await?;
    Ok(qc_id)
}

/// `{name} - {scale_no}` as reported for items that never reached a ticket
fn kept_label(item: &Value) -> String {
    format!(
        "{} - {}",
        text(item, "name").unwrap_or_default(),
        text(item, "scale_no").unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_items_are_labelled_with_the_scale_number() {
        let item = json!({"name": "QC-1", "scale_no": "WB/2024/00007"});
        assert_eq!(kept_label(&item), "QC-1 - WB/2024/00007");
        assert_eq!(kept_label(&json!({"name": "QC-2"})), "QC-2 - ");
    }

    #[test]
    fn only_post_and_cancel_are_actions() {
        assert_eq!(QcAction::parse("post"), Some(QcAction::Post));
        assert_eq!(QcAction::parse("cancel"), Some(QcAction::Cancel));
        assert_eq!(QcAction::parse("lock"), None);
    }
}
