//! Scale ticket service: batch ingestion, lifecycle actions and wizards

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    duplicate_scale_message, ensure_distinct_tickets, json_decimal, parse_date, parse_datetime,
    validate_licence_plate, validate_weight, BatchOutcome, ItemResult, MergeRequest, Pagination,
    RefId, ReturnRequest, ScaleBook, ScaleState, ScaleTicket, SourceKind, SplitOutcome,
    SplitRequest, StagedAudit, StagedStock, RECORD_CREATED, RECORD_NOT_FOUND, RECORD_POSTED, RECORD_UPDATED,
};

use crate::config::OperationSettings;
use crate::error::{AppError, AppResult};
use crate::services::master_data::text;
use crate::services::quality_control::attach_pending;
use crate::services::scale_store::{
    add_parties, find_ticket_by_name, flush, load_book, load_calculation_types, load_tickets,
    optional_payload_date, penalty_type_ids, quality_control_from_payload, reserve_ticket_names,
};
use crate::services::unit_of_work::{begin_item, settle_item, ItemOutcome};

/// Scale ticket service
#[derive(Clone)]
pub struct ScaleTicketService {
    db: PgPool,
}

/// Ticket as listed to mobile clients
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScaleTicketItem {
    pub id: Uuid,
    pub name: String,
    pub ref_id: Option<String>,
    pub date: NaiveDate,
    pub weighbridge_id: i64,
    pub partner_id: i64,
    pub product_id: i64,
    pub delivery_number: Option<String>,
    pub driver_name: Option<String>,
    pub licence_plate: Option<String>,
    pub state: String,
    pub delivery_type: Option<String>,
    pub weight_in: Decimal,
    pub weight_out: Decimal,
    pub net_weight: Decimal,
    pub net_after_quality_control: Decimal,
    pub total_weight: Decimal,
}

/// Ticket figures returned by lifecycle actions
#[derive(Debug, Serialize)]
pub struct TicketSummary {
    pub id: Uuid,
    pub name: String,
    pub state: ScaleState,
    pub net_weight: Decimal,
    pub net_after_quality_control: Decimal,
    pub total_weight: Decimal,
}

impl TicketSummary {
    fn of(ticket: &ScaleTicket, name: String) -> Self {
        Self {
            id: ticket.id,
            name,
            state: ticket.state,
            net_weight: ticket.net_weight,
            net_after_quality_control: ticket.net_after_quality_control,
            total_weight: ticket.total_weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    Post,
    Lock,
    Unlock,
    Cancel,
    Draft,
}

impl ScaleAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(ScaleAction::Post),
            "lock" => Some(ScaleAction::Lock),
            "unlock" => Some(ScaleAction::Unlock),
            "cancel" => Some(ScaleAction::Cancel),
            "draft" => Some(ScaleAction::Draft),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SplitInput {
    #[validate(length(min = 1))]
    pub ticket_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub request: SplitRequest,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MergeInput {
    #[validate(length(min = 2))]
    pub ticket_ids: Vec<Uuid>,
    pub merge_to: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UnloadInput {
    pub unload_in: Decimal,
    pub unload_out: Decimal,
    #[serde(default)]
    pub additional_unload: Decimal,
}

impl ScaleTicketService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
        state: Option<ScaleState>,
    ) -> AppResult<Vec<ScaleTicketItem>> {
        let items = sqlx::query_as::<_, ScaleTicketItem>(
            r#"
            SELECT id, name, ref_id, date, weighbridge_id, partner_id, product_id,
                   delivery_number, driver_name, licence_plate, state, delivery_type,
                   weight_in, weight_out, net_weight, net_after_quality_control, total_weight
            FROM scale_tickets
            WHERE ($1::BIGINT IS NULL OR company_id = $1)
              AND ($2::TEXT IS NULL OR state = $2)
            ORDER BY date DESC, name DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(company_id)
        .bind(state.map(|s| s.as_str()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Create tickets, then attach kept quality controls whose ticket arrived
    pub async fn create_tickets(
        &self,
        items: Vec<Value>,
        company_id: Option<i64>,
        settings: &OperationSettings,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = create_ticket(&mut item_tx, item, company_id, settings).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        if batch.succeeded() > 0 {
            let attached = attach_pending(&mut tx, company_id, settings).await?;
            if !attached.is_empty() {
                tracing::info!(attached = attached.len(), "kept quality controls attached");
            }
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "scale ticket batch processed");
        Ok(())
    }

    /// Rewrite draft tickets found by name
    pub async fn update_tickets(
        &self,
        items: Vec<Value>,
        settings: &OperationSettings,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = update_ticket(&mut item_tx, item, settings).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "scale ticket update processed");
        Ok(())
    }

    pub async fn apply_action(
        &self,
        id: Uuid,
        action: ScaleAction,
        settings: &OperationSettings,
    ) -> AppResult<TicketSummary> {
        let mut tx = self.db.begin().await?;
        let mut book = load_book(&mut tx, &[id]).await?;
        let mut stock = StagedStock::default();
        let audit = StagedAudit::default();

        match action {
            ScaleAction::Post => book.post(id, &mut stock)?,
            ScaleAction::Lock => book.lock(id)?,
            ScaleAction::Unlock => book.unlock(id)?,
            ScaleAction::Cancel => book.cancel(id, &mut stock)?,
            ScaleAction::Draft => book.reset_to_draft(id)?,
        }

        let names = flush(&mut tx, &book, &stock, &audit, &settings.scale_sequence_prefix).await?;
        tx.commit().await?;

        let ticket = book.ticket(id)?;
        tracing::info!(ticket_id = %id, action = ?action, state = %ticket.state, "scale ticket action applied");
        Ok(TicketSummary::of(ticket, stored_name(&names, ticket)))
    }

    pub async fn update_unload(
        &self,
        id: Uuid,
        input: &UnloadInput,
        settings: &OperationSettings,
    ) -> AppResult<TicketSummary> {
        for value in [input.unload_in, input.unload_out, input.additional_unload] {
            validate_weight(value).map_err(|m| AppError::ValidationError(m.to_string()))?;
        }

        let mut tx = self.db.begin().await?;
        let mut book = load_book(&mut tx, &[id]).await?;
        book.update_unload(id, input.unload_in, input.unload_out, input.additional_unload)?;

        let names = flush(
            &mut tx,
            &book,
            &StagedStock::default(),
            &StagedAudit::default(),
            &settings.scale_sequence_prefix,
        )
        .await?;
        tx.commit().await?;

        let ticket = book.ticket(id)?;
        Ok(TicketSummary::of(ticket, stored_name(&names, ticket)))
    }

    pub async fn split(
        &self,
        input: &SplitInput,
        settings: &OperationSettings,
    ) -> AppResult<SplitOutcome> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let mut book = load_book(&mut tx, &input.ticket_ids).await?;
        let outcome = book.split(&input.ticket_ids, &input.request)?;

        flush(
            &mut tx,
            &book,
            &StagedStock::default(),
            &StagedAudit::default(),
            &settings.scale_sequence_prefix,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(first = %outcome.first, second = %outcome.second, "scale ticket split");
        Ok(outcome)
    }

    pub async fn merge(
        &self,
        input: &MergeInput,
        settings: &OperationSettings,
    ) -> AppResult<TicketSummary> {
        input.validate()?;
        let request = MergeRequest {
            ticket_ids: input.ticket_ids.clone(),
            merge_to: input.merge_to,
            date: input.date.unwrap_or_else(|| Utc::now().date_naive()),
        };
        ensure_distinct_tickets(&request.ticket_ids)?;

        let mut tx = self.db.begin().await?;
        let mut book = load_book(&mut tx, &request.ticket_ids).await?;
        let names =
            reserve_ticket_names(&mut tx, &settings.scale_sequence_prefix, request.date, 1).await?;
        book.reserve_names(names);
        let merged_id = book.merge(&request)?;

        let names = flush(
            &mut tx,
            &book,
            &StagedStock::default(),
            &StagedAudit::default(),
            &settings.scale_sequence_prefix,
        )
        .await?;
        tx.commit().await?;

        let merged = book.ticket(merged_id)?;
        tracing::info!(ticket_id = %merged_id, sources = request.ticket_ids.len(), "scale tickets merged");
        Ok(TicketSummary::of(merged, stored_name(&names, merged)))
    }

    pub async fn return_tickets(
        &self,
        request: &ReturnRequest,
        settings: &OperationSettings,
    ) -> AppResult<Vec<TicketSummary>> {
        if request.reason.trim().is_empty() {
            return Err(AppError::ValidationError("Return reason is required".to_string()));
        }
        if request.lines.is_empty() {
            return Err(AppError::ValidationError(
                "Select at least one ticket to return".to_string(),
            ));
        }

        let ticket_ids: Vec<Uuid> = request.lines.iter().map(|l| l.ticket_id).collect();
        let mut tx = self.db.begin().await?;
        let mut book = load_book(&mut tx, &ticket_ids).await?;
        let names = reserve_ticket_names(
            &mut tx,
            &settings.scale_sequence_prefix,
            request.date,
            request.lines.len(),
        )
        .await?;
        book.reserve_names(names);

        let mut stock = StagedStock::default();
        let mut audit = StagedAudit::default();
        let returned = book.return_tickets(request, &mut stock, &mut audit)?;

        let names = flush(&mut tx, &book, &stock, &audit, &settings.scale_sequence_prefix).await?;
        tx.commit().await?;

        tracing::info!(returned = returned.len(), "scale tickets returned");
        returned
            .iter()
            .map(|id| {
                let ticket = book.ticket(*id)?;
                Ok(TicketSummary::of(ticket, stored_name(&names, ticket)))
            })
            .collect()
    }
}

fn stored_name(names: &HashMap<Uuid, String>, ticket: &ScaleTicket) -> String {
    names.get(&ticket.id).cloned().unwrap_or_else(|| ticket.name.clone())
}

async fn create_ticket(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
    settings: &OperationSettings,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    if let Some((id, existing, _)) = find_ticket_by_name(conn, &name).await? {
        return Ok(ItemOutcome::Rejected(ItemResult::failed(
            Some(id.into()),
            Some(existing),
            ref_id,
            duplicate_scale_message(&name, id),
        )));
    }

    let source = return_source(conn, item).await?;
    let mut ticket = ticket_from_payload(item, source.as_ref())?;
    ticket.company_id = company_id;

    let mut book = ScaleBook::new();
    add_parties(conn, &mut book, &[ticket.partner_id], &[ticket.weighbridge_id]).await?;
    let id = book.insert_ticket(ticket);
    attach_inline_quality_control(conn, &mut book, item, id).await?;
    book.recompute(id)?;

    let mut stock = StagedStock::default();
    if settings.auto_post_scale_ticket {
        book.post(id, &mut stock)?;
    }

    let names = flush(conn, &book, &stock, &StagedAudit::default(), &settings.scale_sequence_prefix)
        .await?;
    let stored = names.get(&id).cloned().unwrap_or(name);
    tracing::debug!(ticket_id = %id, name = %stored, "scale ticket created");

    Ok(ItemOutcome::Done(ItemResult::success(id, stored, ref_id, RECORD_CREATED)))
}

async fn update_ticket(
    conn: &mut PgConnection,
    item: &Value,
    settings: &OperationSettings,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    let Some((id, stored, state)) = find_ticket_by_name(conn, &name).await? else {
        return Err(AppError::NotFound(RECORD_NOT_FOUND.to_string()));
    };
    if state != ScaleState::Draft {
        return Err(AppError::InvalidStateTransition(RECORD_POSTED.to_string()));
    }

    let mut book = load_book(conn, &[id]).await?;
    let current = book.ticket(id)?.clone();
    let source = return_source(conn, item).await?;

    let mut ticket = ticket_from_payload(item, source.as_ref())?;
    ticket.id = id;
    ticket.name = stored.clone();
    ticket.company_id = current.company_id;
    add_parties(conn, &mut book, &[ticket.partner_id], &[ticket.weighbridge_id]).await?;
    book.insert_ticket(ticket);

    book.remove_quality_controls_of(id);
    attach_inline_quality_control(conn, &mut book, item, id).await?;
    book.recompute(id)?;

    flush(
        conn,
        &book,
        &StagedStock::default(),
        &StagedAudit::default(),
        &settings.scale_sequence_prefix,
    )
    .await?;

    Ok(ItemOutcome::Done(ItemResult::success(id, stored, ref_id, RECORD_UPDATED)))
}

/// The ticket a return payload refers to through `source_id`
async fn return_source(conn: &mut PgConnection, item: &Value) -> AppResult<Option<ScaleTicket>> {
    let is_return = item.get("is_return").and_then(Value::as_bool).unwrap_or(false);
    let source_id = item.get("source_id").and_then(Value::as_str);
    let (true, Some(raw)) = (is_return, source_id) else {
        return Ok(None);
    };

    let source_id = Uuid::parse_str(raw)
        .map_err(|_| AppError::ValidationError(format!("Invalid source_id: '{}'", raw)))?;
    let mut found = load_tickets(conn, &[source_id]).await?;
    match found.pop() {
        Some(source) => Ok(Some(source)),
        None => Err(AppError::NotFound(format!("Source ticket {} not found", source_id))),
    }
}

/// Penalty lines sent with a ticket become a quality control named after it
async fn attach_inline_quality_control(
    conn: &mut PgConnection,
    book: &mut ScaleBook,
    item: &Value,
    ticket_id: Uuid,
) -> AppResult<()> {
    let type_ids = penalty_type_ids(item);
    if type_ids.is_empty() {
        return Ok(());
    }
    let types = load_calculation_types(conn, &type_ids).await?;
    let ticket_date = book.ticket(ticket_id)?.date;
    let qc = quality_control_from_payload(item, ticket_id, ticket_date, &types)?;
    book.insert_quality_control(qc);
    Ok(())
}

/// Build a draft ticket from a payload item.
///
/// A return inherits partner and quantity from its source ticket.
pub fn ticket_from_payload(item: &Value, source: Option<&ScaleTicket>) -> AppResult<ScaleTicket> {
    let weight_in = decimal(item, "weight_in");
    let weight_out = decimal(item, "weight_out");
    for weight in [weight_in, weight_out] {
        validate_weight(weight).map_err(|m| AppError::ValidationError(m.to_string()))?;
    }

    let partner_id = match source {
        Some(source) => source.partner_id,
        None => required_id(item, "partner_id")?,
    };
    let date = optional_payload_date(item)?.unwrap_or_else(|| Utc::now().date_naive());

    let mut ticket = ScaleTicket::draft(
        required_id(item, "weighbridge_id")?,
        partner_id,
        required_id(item, "product_id")?,
        date,
        weight_in,
        weight_out,
    );

    if let Some(name) = text(item, "name") {
        ticket.name = name;
    }
    ticket.ref_id = RefId::from_json(item).map(|r| r.to_string());
    ticket.delivery_number = text(item, "delivery_no");
    ticket.driver_name = text(item, "driver_name");
    ticket.remark = text(item, "remark");
    ticket.quantity = match source {
        Some(source) => source.quantity,
        None => decimal(item, "quantity"),
    };
    ticket.unload_in = decimal(item, "unload_in");
    ticket.unload_out = decimal(item, "unload_out");
    ticket.vehicle_in = datetime(item, "vehicle_in")?;
    ticket.vehicle_out = datetime(item, "vehicle_out")?;

    if let Some(plate) = text(item, "licence_plate") {
        validate_licence_plate(&plate).map_err(|m| AppError::ValidationError(m.to_string()))?;
        ticket.licence_plate = Some(plate);
    }

    if let Some(source) = source {
        ticket.is_return = true;
        ticket.source_id = Some(source.id);
        ticket.source_kind = Some(SourceKind::Return);
    }

    Ok(ticket)
}

fn decimal(item: &Value, key: &str) -> Decimal {
    item.get(key).and_then(json_decimal).unwrap_or(Decimal::ZERO)
}

fn required_id(item: &Value, key: &str) -> AppResult<i64> {
    item.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::ValidationError(format!("Field {} must be int", key)))
}

fn datetime(item: &Value, key: &str) -> AppResult<Option<NaiveDateTime>> {
    match item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(raw) => parse_datetime(raw)
            .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
            .map(Some)
            .ok_or_else(|| AppError::ValidationError(format!("Invalid {}: '{}'", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "ref_id": 11,
            "name": "TBS-0001",
            "date": "15/07/2024",
            "weighbridge_id": 1,
            "product_id": 4,
            "partner_id": 7,
            "weight_in": 5000,
            "weight_out": "4000.5",
            "delivery_no": "DO-88",
            "licence_plate": "BK 1234 AB",
            "vehicle_in": "15/07/2024 08:00:00",
            "vehicle_out": "15/07/2024 09:30:00"
        })
    }

    #[test]
    fn payload_fields_land_on_the_ticket() {
        let ticket = ticket_from_payload(&payload(), None).unwrap();
        assert_eq!(ticket.name, "TBS-0001");
        assert_eq!(ticket.ref_id.as_deref(), Some("11"));
        assert_eq!(ticket.date, NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
        assert_eq!(ticket.partner_id, 7);
        assert_eq!(ticket.weight_out, Decimal::new(40005, 1));
        assert_eq!(ticket.delivery_number.as_deref(), Some("DO-88"));
        assert!(ticket.vehicle_in.is_some() && ticket.vehicle_out.is_some());
        assert_eq!(ticket.state, ScaleState::Draft);
        assert!(!ticket.is_return);
    }

    #[test]
    fn return_inherits_partner_and_quantity() {
        let mut source = ticket_from_payload(&payload(), None).unwrap();
        source.partner_id = 99;
        source.quantity = Decimal::from(120);

        let mut item = payload();
        item["partner_id"] = json!(1);
        item["quantity"] = json!(5);
        let ticket = ticket_from_payload(&item, Some(&source)).unwrap();

        assert_eq!(ticket.partner_id, 99);
        assert_eq!(ticket.quantity, Decimal::from(120));
        assert!(ticket.is_return);
        assert_eq!(ticket.source_id, Some(source.id));
        assert_eq!(ticket.source_kind, Some(SourceKind::Return));
    }

    #[test]
    fn negative_weight_fails_the_item() {
        let mut item = payload();
        item["weight_in"] = json!(-1);
        assert!(ticket_from_payload(&item, None).is_err());
    }

    #[test]
    fn unreadable_vehicle_time_is_reported() {
        let mut item = payload();
        item["vehicle_in"] = json!("noon");
        let err = ticket_from_payload(&item, None).unwrap_err();
        assert_eq!(err.item_message(), "Invalid vehicle_in: 'noon'");
    }

    #[test]
    fn actions_parse_from_path_segments() {
        assert_eq!(ScaleAction::parse("unlock"), Some(ScaleAction::Unlock));
        assert_eq!(ScaleAction::parse("draft"), Some(ScaleAction::Draft));
        assert_eq!(ScaleAction::parse("approve"), None);
    }

    #[test]
    fn split_input_requires_a_ticket() {
        let input: SplitInput = serde_json::from_value(json!({
            "ticket_ids": [],
            "netto": 400
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }
}
