//! Loading and persisting the ticket book
//!
//! Ticket operations run on an in-memory [`ScaleBook`]. This module fills a
//! book with the rows an operation touches and writes the book back, along
//! with the staged stock moves and audit messages, once the operation
//! succeeded.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use shared::{
    json_decimal, parse_date, validate_percentage, CalculationType, DeliveryType, Partner,
    QcPenaltyLine, QcReturnLine, QcState, QualityControl, ScaleBook, ScaleState, ScaleTicket,
    SourceKind, StagedAudit, StagedStock, Weighbridge, NEW_TICKET_NAME,
};

use crate::error::{AppError, AppResult};

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    name: String,
    ref_id: Option<String>,
    company_id: Option<i64>,
    weighbridge_id: i64,
    partner_id: i64,
    product_id: i64,
    date: NaiveDate,
    delivery_number: Option<String>,
    driver_name: Option<String>,
    licence_plate: Option<String>,
    remark: Option<String>,
    state: String,
    is_return: bool,
    source_id: Option<Uuid>,
    source_kind: Option<String>,
    merged_to: Option<Uuid>,
    quantity: Decimal,
    weight_in: Decimal,
    weight_out: Decimal,
    net_weight: Decimal,
    delivery_type: Option<String>,
    vehicle_in: Option<NaiveDateTime>,
    vehicle_out: Option<NaiveDateTime>,
    vehicle_duration: Decimal,
    unload_in: Decimal,
    unload_out: Decimal,
    additional_unload: Decimal,
    net_unload: Decimal,
    net_unload_after: Decimal,
    shrinkage: Decimal,
    shrinkage_percentage: Decimal,
    gross_quality_control: Decimal,
    total_quality_control_qty: Decimal,
    net_after_quality_control: Decimal,
    total_weight: Decimal,
}

impl TryFrom<TicketRow> for ScaleTicket {
    type Error = AppError;

    fn try_from(row: TicketRow) -> AppResult<Self> {
        let state = ScaleState::parse(&row.state).ok_or_else(|| {
            AppError::CorruptRecord(format!("ticket {} has state '{}'", row.id, row.state))
        })?;
        let source_kind = match row.source_kind.as_deref() {
            Some(kind) => Some(SourceKind::parse(kind).ok_or_else(|| {
                AppError::CorruptRecord(format!("ticket {} has source kind '{}'", row.id, kind))
            })?),
            None => None,
        };
        let delivery_type = row.delivery_type.as_deref().and_then(DeliveryType::parse);

        Ok(ScaleTicket {
            id: row.id,
            name: row.name,
            ref_id: row.ref_id,
            company_id: row.company_id,
            weighbridge_id: row.weighbridge_id,
            partner_id: row.partner_id,
            product_id: row.product_id,
            date: row.date,
            delivery_number: row.delivery_number,
            driver_name: row.driver_name,
            licence_plate: row.licence_plate,
            remark: row.remark,
            state,
            is_return: row.is_return,
            source_id: row.source_id,
            source_kind,
            merged_to: row.merged_to,
            quantity: row.quantity,
            weight_in: row.weight_in,
            weight_out: row.weight_out,
            net_weight: row.net_weight,
            delivery_type,
            vehicle_in: row.vehicle_in,
            vehicle_out: row.vehicle_out,
            vehicle_duration: row.vehicle_duration,
            unload_in: row.unload_in,
            unload_out: row.unload_out,
            additional_unload: row.additional_unload,
            net_unload: row.net_unload,
            net_unload_after: row.net_unload_after,
            shrinkage: row.shrinkage,
            shrinkage_percentage: row.shrinkage_percentage,
            gross_quality_control: row.gross_quality_control,
            total_quality_control_qty: row.total_quality_control_qty,
            net_after_quality_control: row.net_after_quality_control,
            total_weight: row.total_weight,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QualityControlRow {
    id: Uuid,
    name: String,
    ref_id: Option<String>,
    ticket_id: Option<Uuid>,
    date: NaiveDate,
    delivery_number: Option<String>,
    state: String,
    source_id: Option<Uuid>,
    merged_to: Option<Uuid>,
    scale_qty: Decimal,
    penalties: Json<Vec<QcPenaltyLine>>,
    returns: Json<Vec<QcReturnLine>>,
    penalty_qty_total: Decimal,
    return_qty_total: Decimal,
}

impl TryFrom<QualityControlRow> for QualityControl {
    type Error = AppError;

    fn try_from(row: QualityControlRow) -> AppResult<Self> {
        let state = QcState::parse(&row.state).ok_or_else(|| {
            AppError::CorruptRecord(format!("quality control {} has state '{}'", row.id, row.state))
        })?;
        Ok(QualityControl {
            id: row.id,
            name: row.name,
            ref_id: row.ref_id,
            ticket_id: row.ticket_id,
            date: row.date,
            delivery_number: row.delivery_number,
            state,
            source_id: row.source_id,
            merged_to: row.merged_to,
            scale_qty: row.scale_qty,
            penalties: row.penalties.0,
            returns: row.returns.0,
            penalty_qty_total: row.penalty_qty_total,
            return_qty_total: row.return_qty_total,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PartnerRow {
    id: i64,
    name: String,
    company_id: Option<i64>,
    supplier_location_id: i64,
    customer_location_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct WeighbridgeRow {
    id: i64,
    name: String,
    code: String,
    company_id: Option<i64>,
    partner_id: Option<i64>,
    stock_location_id: i64,
}

const TICKET_COLUMNS: &str = r#"
    id, name, ref_id, company_id, weighbridge_id, partner_id, product_id, date,
    delivery_number, driver_name, licence_plate, remark, state, is_return, source_id,
    source_kind, merged_to, quantity, weight_in, weight_out, net_weight, delivery_type,
    vehicle_in, vehicle_out, vehicle_duration, unload_in, unload_out, additional_unload,
    net_unload, net_unload_after, shrinkage, shrinkage_percentage, gross_quality_control,
    total_quality_control_qty, net_after_quality_control, total_weight
"#;

const QUALITY_CONTROL_COLUMNS: &str = r#"
    id, name, ref_id, ticket_id, date, delivery_number, state, source_id, merged_to,
    scale_qty, penalties, returns, penalty_qty_total, return_qty_total
"#;

/// Tickets by id, in the order of `ids`
pub async fn load_tickets(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<Vec<ScaleTicket>> {
    let rows = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {} FROM scale_tickets WHERE id = ANY($1)",
        TICKET_COLUMNS
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut tickets: Vec<ScaleTicket> = rows
        .into_iter()
        .map(ScaleTicket::try_from)
        .collect::<AppResult<_>>()?;
    tickets.sort_by_key(|t| ids.iter().position(|id| *id == t.id));
    Ok(tickets)
}

/// Id and state of the ticket carrying `name`
pub async fn find_ticket_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> AppResult<Option<(Uuid, String, ScaleState)>> {
    let row = sqlx::query_as::<_, (Uuid, String, String)>(
        "SELECT id, name, state FROM scale_tickets WHERE name = $1 ORDER BY created_at LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(id, name, state)| {
        let state = ScaleState::parse(&state).ok_or_else(|| {
            AppError::CorruptRecord(format!("ticket {} has state '{}'", id, state))
        })?;
        Ok((id, name, state))
    })
    .transpose()
}

/// A book holding the tickets, their quality controls, partners and
/// weighbridges.
///
/// Every requested id must exist.
pub async fn load_book(conn: &mut PgConnection, ticket_ids: &[Uuid]) -> AppResult<ScaleBook> {
    let tickets = load_tickets(conn, ticket_ids).await?;
    if tickets.len() != distinct_count(ticket_ids) {
        return Err(AppError::NotFound(shared::RECORD_NOT_FOUND.to_string()));
    }

    let quality_controls = sqlx::query_as::<_, QualityControlRow>(&format!(
        "SELECT {} FROM quality_controls WHERE ticket_id = ANY($1) ORDER BY name",
        QUALITY_CONTROL_COLUMNS
    ))
    .bind(ticket_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut book = ScaleBook::new();
    let partner_ids: Vec<i64> = tickets.iter().map(|t| t.partner_id).collect();
    let weighbridge_ids: Vec<i64> = tickets.iter().map(|t| t.weighbridge_id).collect();
    add_parties(conn, &mut book, &partner_ids, &weighbridge_ids).await?;

    for ticket in tickets {
        book.insert_ticket(ticket);
    }
    for row in quality_controls {
        book.insert_quality_control(QualityControl::try_from(row)?);
    }
    Ok(book)
}

/// Number of different ids in a selection; repeats are judged by the engine
fn distinct_count(ids: &[Uuid]) -> usize {
    let mut distinct = ids.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.len()
}

/// Load partners and weighbridges into the book
pub async fn add_parties(
    conn: &mut PgConnection,
    book: &mut ScaleBook,
    partner_ids: &[i64],
    weighbridge_ids: &[i64],
) -> AppResult<()> {
    let partners = sqlx::query_as::<_, PartnerRow>(
        r#"
        SELECT id, name, company_id, supplier_location_id, customer_location_id
        FROM partners
        WHERE id = ANY($1)
        "#,
    )
    .bind(partner_ids)
    .fetch_all(&mut *conn)
    .await?;

    let weighbridges = sqlx::query_as::<_, WeighbridgeRow>(
        r#"
        SELECT id, name, code, company_id, partner_id, stock_location_id
        FROM weighbridges
        WHERE id = ANY($1)
        "#,
    )
    .bind(weighbridge_ids)
    .fetch_all(&mut *conn)
    .await?;

    for p in partners {
        book.add_partner(Partner {
            id: p.id,
            name: p.name,
            company_id: p.company_id,
            supplier_location_id: p.supplier_location_id,
            customer_location_id: p.customer_location_id,
        });
    }
    for w in weighbridges {
        book.add_weighbridge(Weighbridge {
            id: w.id,
            name: w.name,
            code: w.code,
            company_id: w.company_id,
            partner_id: w.partner_id,
            stock_location_id: w.stock_location_id,
        });
    }
    Ok(())
}

/// Ticket names drawn from the ticket sequence
pub async fn reserve_ticket_names(
    conn: &mut PgConnection,
    prefix: &str,
    date: NaiveDate,
    count: usize,
) -> AppResult<Vec<String>> {
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(next_name(conn, "scale_ticket_seq", prefix, date).await?);
    }
    Ok(names)
}

async fn next_name(
    conn: &mut PgConnection,
    sequence: &str,
    prefix: &str,
    date: NaiveDate,
) -> AppResult<String> {
    let value = sqlx::query_scalar::<_, i64>("SELECT nextval($1::regclass)")
        .bind(sequence)
        .fetch_one(&mut *conn)
        .await?;
    Ok(sequence_name(prefix, date, value))
}

/// `{prefix}/{YYYY}/{00000}`
pub fn sequence_name(prefix: &str, date: NaiveDate, value: i64) -> String {
    format!("{}/{}/{:05}", prefix, date.year(), value)
}

/// Calculation types of the given quality types
pub async fn load_calculation_types(
    conn: &mut PgConnection,
    ids: &[i64],
) -> AppResult<HashMap<i64, CalculationType>> {
    let rows = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, calculation_type FROM quality_types WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(id, raw)| {
            CalculationType::parse(&raw)
                .map(|c| (id, c))
                .ok_or_else(|| {
                    AppError::CorruptRecord(format!("quality type {} has calculation type '{}'", id, raw))
                })
        })
        .collect()
}

/// Quality-type ids referenced by `penalty_info`
pub fn penalty_type_ids(item: &Value) -> Vec<i64> {
    item.get("penalty_info")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.get("penalty_id").and_then(Value::as_i64))
                .collect()
        })
        .unwrap_or_default()
}

/// Build a quality-control record from a payload's `penalty_info` and
/// `return_info` lines
pub fn quality_control_from_payload(
    item: &Value,
    ticket_id: Uuid,
    ticket_date: NaiveDate,
    types: &HashMap<i64, CalculationType>,
) -> AppResult<QualityControl> {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(NEW_TICKET_NAME);
    let date = optional_payload_date(item)?.unwrap_or(ticket_date);

    let mut qc = QualityControl::draft(name, Some(ticket_id), date);
    qc.delivery_number = item
        .get("delivery_no")
        .and_then(Value::as_str)
        .map(str::to_string);
    qc.ref_id = shared::RefId::from_json(item).map(|r| r.to_string());

    for line in array(item, "penalty_info") {
        let type_id = line.get("penalty_id").and_then(Value::as_i64).ok_or_else(|| {
            AppError::ValidationError("Penalty line is missing penalty_id".to_string())
        })?;
        let calculation = *types.get(&type_id).ok_or_else(|| {
            AppError::ValidationError(format!("Quality type {} does not exist", type_id))
        })?;
        let qty = line
            .get("penalty_qty")
            .and_then(json_decimal)
            .unwrap_or(Decimal::ZERO);
        if calculation == CalculationType::Percentage {
            validate_percentage(qty).map_err(|m| AppError::ValidationError(m.to_string()))?;
        }
        qc.penalties.push(QcPenaltyLine::new(type_id, calculation, qty));
    }

    for line in array(item, "return_info") {
        let type_id = line.get("return_id").and_then(Value::as_i64).ok_or_else(|| {
            AppError::ValidationError("Return line is missing return_id".to_string())
        })?;
        qc.returns.push(QcReturnLine {
            quality_type_id: type_id,
            return_qty: line
                .get("return_qty")
                .and_then(json_decimal)
                .unwrap_or(Decimal::ZERO),
        });
    }

    Ok(qc)
}

/// The item's `date`, day first
pub fn payload_date(item: &Value) -> AppResult<NaiveDate> {
    let raw = item.get("date").and_then(Value::as_str).unwrap_or_default();
    parse_date(raw).ok_or_else(|| AppError::ValidationError(format!("Invalid date: '{}'", raw)))
}

/// `date` of a payload item when the client sent one
pub fn optional_payload_date(item: &Value) -> AppResult<Option<NaiveDate>> {
    match item.get("date") {
        None | Some(Value::Null) => Ok(None),
        Some(_) => payload_date(item).map(Some),
    }
}

fn array<'a>(item: &'a Value, key: &str) -> &'a [Value] {
    item.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Write the book, staged moves and audit messages.
///
/// Tickets and quality controls still named `New` get a sequence name.
/// Returns the stored name of every ticket in the book.
pub async fn flush(
    conn: &mut PgConnection,
    book: &ScaleBook,
    stock: &StagedStock,
    audit: &StagedAudit,
    prefix: &str,
) -> AppResult<HashMap<Uuid, String>> {
    let mut names = HashMap::with_capacity(book.tickets().len());
    for ticket in book.tickets() {
        let name = if ticket.name == NEW_TICKET_NAME {
            next_name(conn, "scale_ticket_seq", prefix, ticket.date).await?
        } else {
            ticket.name.clone()
        };
        upsert_ticket(conn, ticket, &name).await?;
        names.insert(ticket.id, name);
    }

    if !book.removed_quality_controls().is_empty() {
        sqlx::query("DELETE FROM quality_controls WHERE id = ANY($1)")
            .bind(book.removed_quality_controls())
            .execute(&mut *conn)
            .await?;
    }
    for qc in book.quality_controls() {
        let name = if qc.name == NEW_TICKET_NAME {
            next_name(conn, "quality_control_seq", "QC", qc.date).await?
        } else {
            qc.name.clone()
        };
        upsert_quality_control(conn, qc, &name).await?;
    }

    if !stock.unlinked.is_empty() {
        sqlx::query("UPDATE stock_moves SET ticket_id = NULL WHERE ticket_id = ANY($1)")
            .bind(&stock.unlinked)
            .execute(&mut *conn)
            .await?;
    }
    for m in &stock.moves {
        sqlx::query(
            r#"
            INSERT INTO stock_moves
                (id, name, reference, ticket_id, product_id, quantity, source_location_id, dest_location_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(m.id)
        .bind(&m.name)
        .bind(&m.reference)
        .bind(m.ticket_id)
        .bind(m.product_id)
        .bind(m.quantity)
        .bind(m.source_location_id)
        .bind(m.dest_location_id)
        .execute(&mut *conn)
        .await?;
    }

    for (ticket_id, body) in &audit.messages {
        sqlx::query("INSERT INTO audit_messages (ticket_id, body) VALUES ($1, $2)")
            .bind(ticket_id)
            .bind(body)
            .execute(&mut *conn)
            .await?;
    }

    Ok(names)
}

async fn upsert_ticket(conn: &mut PgConnection, t: &ScaleTicket, name: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO scale_tickets (
            id, name, ref_id, company_id, weighbridge_id, partner_id, product_id, date,
            delivery_number, driver_name, licence_plate, remark, state, is_return, source_id,
            source_kind, merged_to, quantity, weight_in, weight_out, net_weight, delivery_type,
            vehicle_in, vehicle_out, vehicle_duration, unload_in, unload_out, additional_unload,
            net_unload, net_unload_after, shrinkage, shrinkage_percentage, gross_quality_control,
            total_quality_control_qty, net_after_quality_control, total_weight
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34,
            $35, $36
        )
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            ref_id = EXCLUDED.ref_id,
            weighbridge_id = EXCLUDED.weighbridge_id,
            partner_id = EXCLUDED.partner_id,
            product_id = EXCLUDED.product_id,
            date = EXCLUDED.date,
            delivery_number = EXCLUDED.delivery_number,
            driver_name = EXCLUDED.driver_name,
            licence_plate = EXCLUDED.licence_plate,
            remark = EXCLUDED.remark,
            state = EXCLUDED.state,
            is_return = EXCLUDED.is_return,
            source_id = EXCLUDED.source_id,
            source_kind = EXCLUDED.source_kind,
            merged_to = EXCLUDED.merged_to,
            quantity = EXCLUDED.quantity,
            weight_in = EXCLUDED.weight_in,
            weight_out = EXCLUDED.weight_out,
            net_weight = EXCLUDED.net_weight,
            delivery_type = EXCLUDED.delivery_type,
            vehicle_in = EXCLUDED.vehicle_in,
            vehicle_out = EXCLUDED.vehicle_out,
            vehicle_duration = EXCLUDED.vehicle_duration,
            unload_in = EXCLUDED.unload_in,
            unload_out = EXCLUDED.unload_out,
            additional_unload = EXCLUDED.additional_unload,
            net_unload = EXCLUDED.net_unload,
            net_unload_after = EXCLUDED.net_unload_after,
            shrinkage = EXCLUDED.shrinkage,
            shrinkage_percentage = EXCLUDED.shrinkage_percentage,
            gross_quality_control = EXCLUDED.gross_quality_control,
            total_quality_control_qty = EXCLUDED.total_quality_control_qty,
            net_after_quality_control = EXCLUDED.net_after_quality_control,
            total_weight = EXCLUDED.total_weight,
            updated_at = NOW()
        "#,
    )
    .bind(t.id)
    .bind(name)
    .bind(&t.ref_id)
    .bind(t.company_id)
    .bind(t.weighbridge_id)
    .bind(t.partner_id)
    .bind(t.product_id)
    .bind(t.date)
    .bind(&t.delivery_number)
    .bind(&t.driver_name)
    .bind(&t.licence_plate)
    .bind(&t.remark)
    .bind(t.state.as_str())
    .bind(t.is_return)
    .bind(t.source_id)
    .bind(t.source_kind.map(|k| k.as_str()))
    .bind(t.merged_to)
    .bind(t.quantity)
    .bind(t.weight_in)
    .bind(t.weight_out)
    .bind(t.net_weight)
    .bind(t.delivery_type.map(|d| d.as_str()))
    .bind(t.vehicle_in)
    .bind(t.vehicle_out)
    .bind(t.vehicle_duration)
    .bind(t.unload_in)
    .bind(t.unload_out)
    .bind(t.additional_unload)
    .bind(t.net_unload)
    .bind(t.net_unload_after)
    .bind(t.shrinkage)
    .bind(t.shrinkage_percentage)
    .bind(t.gross_quality_control)
    .bind(t.total_quality_control_qty)
    .bind(t.net_after_quality_control)
    .bind(t.total_weight)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_quality_control(
    conn: &mut PgConnection,
    qc: &QualityControl,
    name: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO quality_controls (
            id, name, ref_id, ticket_id, date, delivery_number, state, source_id, merged_to,
            scale_qty, penalties, returns, penalty_qty_total, return_qty_total
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            ref_id = EXCLUDED.ref_id,
            ticket_id = EXCLUDED.ticket_id,
            date = EXCLUDED.date,
            delivery_number = EXCLUDED.delivery_number,
            state = EXCLUDED.state,
            source_id = EXCLUDED.source_id,
            merged_to = EXCLUDED.merged_to,
            scale_qty = EXCLUDED.scale_qty,
            penalties = EXCLUDED.penalties,
            returns = EXCLUDED.returns,
            penalty_qty_total = EXCLUDED.penalty_qty_total,
            return_qty_total = EXCLUDED.return_qty_total
        "#,
    )
    .bind(qc.id)
    .bind(name)
    .bind(&qc.ref_id)
    .bind(qc.ticket_id)
    .bind(qc.date)
    .bind(&qc.delivery_number)
    .bind(qc.state.as_str())
    .bind(qc.source_id)
    .bind(qc.merged_to)
    .bind(qc.scale_qty)
    .bind(Json(&qc.penalties))
    .bind(Json(&qc.returns))
    .bind(qc.penalty_qty_total)
    .bind(qc.return_qty_total)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    fn types() -> HashMap<i64, CalculationType> {
        HashMap::from([(1, CalculationType::PerQty), (2, CalculationType::Percentage)])
    }

    #[test]
    fn sequence_names_are_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(sequence_name("WB", date, 42), "WB/2024/00042");
        assert_eq!(sequence_name("QC", date, 123456), "QC/2024/123456");
    }

    #[test]
    fn payload_lines_become_quality_control() {
        let item = json!({
            "ref_id": "m-1",
            "name": "QC-7",
            "date": "01/07/2024",
            "delivery_no": "DO-1",
            "penalty_info": [
                {"penalty_id": 1, "penalty_qty": 50},
                {"penalty_id": 2, "penalty_qty": 2.5}
            ],
            "return_info": [{"return_id": 9, "return_qty": 4}]
        });
        let ticket_id = Uuid::new_v4();
        let mut qc = quality_control_from_payload(&item, ticket_id, ticket_day(), &types()).unwrap();
        qc.recompute(Decimal::from(1000));

        assert_eq!(qc.name, "QC-7");
        assert_eq!(qc.ticket_id, Some(ticket_id));
        assert_eq!(qc.ref_id.as_deref(), Some("m-1"));
        assert_eq!(qc.penalty_qty_total, Decimal::from(75));
        assert_eq!(qc.return_qty_total, Decimal::from(4));
    }

    #[test]
    fn unknown_quality_type_fails_the_item() {
        let item = json!({
            "name": "QC-8",
            "date": "2024-07-01",
            "penalty_info": [{"penalty_id": 99, "penalty_qty": 1}]
        });
        let err = quality_control_from_payload(&item, Uuid::new_v4(), ticket_day(), &types()).unwrap_err();
        assert_eq!(err.item_message(), "Quality type 99 does not exist");
    }

    #[test]
    fn percentage_above_hundred_is_rejected() {
        let item = json!({
            "name": "QC-9",
            "date": "2024-07-01",
            "penalty_info": [{"penalty_id": 2, "penalty_qty": 120}]
        });
        assert!(quality_control_from_payload(&item, Uuid::new_v4(), ticket_day(), &types()).is_err());
    }

    #[test]
    fn missing_date_is_reported() {
        let err = payload_date(&json!({"date": "someday"})).unwrap_err();
        assert_eq!(err.item_message(), "Invalid date: 'someday'");
    }

    #[test]
    fn inline_quality_control_without_date_takes_the_ticket_date() {
        let item = json!({
            "ref_id": 5,
            "name": "WB/2024/00005",
            "penalty_info": [{"penalty_id": 1, "penalty_qty": 50}]
        });
        let qc = quality_control_from_payload(&item, Uuid::new_v4(), ticket_day(), &types()).unwrap();
        assert_eq!(qc.date, ticket_day());

        let dated = json!({"date": "2024-07-01", "penalty_info": []});
        let qc = quality_control_from_payload(&dated, Uuid::new_v4(), ticket_day(), &types()).unwrap();
        assert_eq!(qc.date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    }

    #[test]
    fn repeated_ids_count_once() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(distinct_count(&[a, b, a]), 2);
        assert_eq!(distinct_count(&[]), 0);
    }
}
