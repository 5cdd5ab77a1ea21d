//! Harvest operation service: batch ingestion, lifecycle and premi recomputation
//!
//! Every write that changes a worker's labour records for a day recomputes
//! all of that worker's records for the day, because the base weight and the
//! attendance bonus depend on the other records of the same day.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use shared::{
    json_decimal, parse_date, recompute_worker_day, AverageWeight, BatchOutcome, ContractState,
    EmploymentContract, HarvestLabourRecord, HarvestOperation, HarvestPenalty, Holiday,
    EmployeeType, ItemResult, OperationState, PenaltyPosition, PenaltyType, PremiCondition,
    PremiConfiguration,
    PremiInputs, PremiQuantifier, PremiType, RefId, Worker, RECORD_CREATED, RECORD_EXISTS,
    RECORD_NOT_FOUND, RECORD_UPDATED,
};

use crate::error::{AppError, AppResult};
use crate::services::master_data::text;
use crate::services::unit_of_work::{begin_item, settle_item, ItemOutcome};

/// Harvest service for palm harvest operations
#[derive(Clone)]
pub struct HarvestService {
    db: PgPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationAction {
    Validate,
    Post,
    Lock,
    Cancel,
    Draft,
}

impl OperationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validate" => Some(OperationAction::Validate),
            "post" => Some(OperationAction::Post),
            "lock" => Some(OperationAction::Lock),
            "cancel" => Some(OperationAction::Cancel),
            "draft" => Some(OperationAction::Draft),
            _ => None,
        }
    }
}

/// Labour record as shown after an operation changed state
#[derive(Debug, Serialize)]
pub struct LabourRecordItem {
    pub id: i64,
    pub name: String,
    pub worker_id: i64,
    pub block_id: i64,
    pub harvest_qty_unit: i32,
    pub harvest_qty_weight: Decimal,
    pub total_premi: Decimal,
    pub daily_wages: Decimal,
    pub penalty_total: Decimal,
    pub total_include_penalty: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OperationSummary {
    pub id: i64,
    pub name: String,
    pub state: OperationState,
    pub records: Vec<LabourRecordItem>,
}

#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: i64,
    name: String,
    company_id: Option<i64>,
    operation_date: NaiveDate,
    operation_type_id: i64,
    afdeling_id: i64,
    foreman_id: Option<i64>,
    foreman_extra_id: Option<i64>,
    assistant_id: Option<i64>,
    clerk_id: Option<i64>,
    recorder_id: Option<i64>,
    state: String,
}

impl TryFrom<OperationRow> for HarvestOperation {
    type Error = AppError;

    fn try_from(row: OperationRow) -> AppResult<Self> {
        let state = OperationState::parse(&row.state).ok_or_else(|| {
            AppError::CorruptRecord(format!("operation {} has state '{}'", row.id, row.state))
        })?;
        Ok(HarvestOperation {
            id: row.id,
            name: row.name,
            company_id: row.company_id,
            operation_date: row.operation_date,
            operation_type_id: row.operation_type_id,
            afdeling_id: row.afdeling_id,
            foreman_id: row.foreman_id,
            foreman_extra_id: row.foreman_extra_id,
            assistant_id: row.assistant_id,
            clerk_id: row.clerk_id,
            recorder_id: row.recorder_id,
            state,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    operation_id: i64,
    worker_id: i64,
    block_id: i64,
    operation_date: NaiveDate,
    is_cancelled: bool,
    harvest_qty_unit: i32,
    other_harvest_qty: Decimal,
    other_uom_factor: Decimal,
    avg_weight: Decimal,
    harvest_qty_weight: Decimal,
    premi_id: Option<i64>,
    base_weight: Decimal,
    base_extra_weight: Decimal,
    premi_base_extra: Decimal,
    attendance_premi: Decimal,
    other_harvest_premi: Decimal,
    total_premi: Decimal,
    daily_wages: Decimal,
    total_exclude_penalty: Decimal,
    penalties: Json<Vec<HarvestPenalty>>,
    penalty_total: Decimal,
    abnormal_unit: Decimal,
    total_include_penalty: Decimal,
}

impl From<RecordRow> for HarvestLabourRecord {
    fn from(row: RecordRow) -> Self {
        HarvestLabourRecord {
            id: row.id,
            operation_id: row.operation_id,
            worker_id: row.worker_id,
            block_id: row.block_id,
            operation_date: row.operation_date,
            is_cancelled: row.is_cancelled,
            harvest_qty_unit: row.harvest_qty_unit,
            other_harvest_qty: row.other_harvest_qty,
            other_uom_factor: row.other_uom_factor,
            avg_weight: row.avg_weight,
            harvest_qty_weight: row.harvest_qty_weight,
            premi_id: row.premi_id,
            base_weight: row.base_weight,
            base_extra_weight: row.base_extra_weight,
            premi_base_extra: row.premi_base_extra,
            attendance_premi: row.attendance_premi,
            other_harvest_premi: row.other_harvest_premi,
            total_premi: row.total_premi,
            daily_wages: row.daily_wages,
            total_exclude_penalty: row.total_exclude_penalty,
            penalties: row.penalties.0,
            penalty_total: row.penalty_total,
            abnormal_unit: row.abnormal_unit,
            total_include_penalty: row.total_include_penalty,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    id: i64,
    name: String,
    job_id: Option<i64>,
    calendar_id: Option<i64>,
    employee_type: String,
    contract_wage: Option<Decimal>,
    contract_state: Option<String>,
    contract_date_start: Option<NaiveDate>,
}

impl From<WorkerRow> for Worker {
    fn from(row: WorkerRow) -> Self {
        let state = match row.contract_state.as_deref() {
            Some("open") => Some(ContractState::Open),
            Some("draft") => Some(ContractState::Draft),
            Some("close") => Some(ContractState::Close),
            Some("cancel") => Some(ContractState::Cancel),
            _ => None,
        };
        let contract = match (row.contract_wage, state) {
            (Some(wage), Some(state)) => Some(EmploymentContract {
                wage,
                state,
                date_start: row.contract_date_start,
            }),
            _ => None,
        };
        Worker {
            id: row.id,
            name: row.name,
            job_id: row.job_id,
            calendar_id: row.calendar_id,
            employee_type: EmployeeType::parse(&row.employee_type),
            contract,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConfigurationRow {
    id: i64,
    name: String,
    company_id: Option<i64>,
    active: bool,
    premi_type: String,
    block_id: Option<i64>,
    activity_id: Option<i64>,
    start_month: Option<i32>,
    end_month: Option<i32>,
    harvest_base_qty: Decimal,
    other_harvest_premi: Decimal,
    use_condition: bool,
    quantifiers: Json<Vec<PremiQuantifier>>,
    conditions: Json<Vec<PremiCondition>>,
    premi_amount: Decimal,
    force_premi_amount: bool,
    minimal_unit: Decimal,
}

impl TryFrom<ConfigurationRow> for PremiConfiguration {
    type Error = AppError;

    fn try_from(row: ConfigurationRow) -> AppResult<Self> {
        let premi_type = PremiType::parse(&row.premi_type).ok_or_else(|| {
            AppError::CorruptRecord(format!(
                "premi configuration {} has type '{}'",
                row.id, row.premi_type
            ))
        })?;
        Ok(PremiConfiguration {
            id: row.id,
            name: row.name,
            company_id: row.company_id,
            active: row.active,
            premi_type,
            block_id: row.block_id,
            activity_id: row.activity_id,
            start_month: row.start_month.and_then(|m| u32::try_from(m).ok()),
            end_month: row.end_month.and_then(|m| u32::try_from(m).ok()),
            harvest_base_qty: row.harvest_base_qty,
            other_harvest_premi: row.other_harvest_premi,
            use_condition: row.use_condition,
            quantifiers: row.quantifiers.0,
            conditions: row.conditions.0,
            premi_amount: row.premi_amount,
            force_premi_amount: row.force_premi_amount,
            minimal_unit: row.minimal_unit,
        })
    }
}

const OPERATION_COLUMNS: &str = r#"
    id, name, company_id, operation_date, operation_type_id, afdeling_id, foreman_id,
    foreman_extra_id, assistant_id, clerk_id, recorder_id, state
"#;

const CONFIGURATION_COLUMNS: &str = r#"
    id, name, company_id, active, premi_type, block_id, activity_id, start_month, end_month,
    harvest_base_qty, other_harvest_premi, use_condition, quantifiers, conditions, premi_amount,
    force_premi_amount, minimal_unit
"#;

const RECORD_COLUMNS: &str = r#"
    id, operation_id, worker_id, block_id, operation_date, is_cancelled, harvest_qty_unit,
    other_harvest_qty, other_uom_factor, avg_weight, harvest_qty_weight, premi_id, base_weight,
    base_extra_weight, premi_base_extra, attendance_premi, other_harvest_premi, total_premi,
    daily_wages, total_exclude_penalty, penalties, penalty_total, abnormal_unit,
    total_include_penalty
"#;

impl HarvestService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_operations(
        &self,
        items: Vec<Value>,
        company_id: Option<i64>,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = create_operation(&mut item_tx, item, company_id).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "harvest batch processed");
        Ok(())
    }

    /// Replace header and labour records of draft operations found by name
    pub async fn update_operations(&self, items: Vec<Value>, batch: &mut BatchOutcome) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = update_operation(&mut item_tx, item).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "harvest update processed");
        Ok(())
    }

    pub async fn apply_action(&self, id: i64, action: OperationAction) -> AppResult<OperationSummary> {
        let mut tx = self.db.begin().await?;
        let mut operation = load_operation(&mut tx, id).await?;

        match action {
            OperationAction::Validate => operation.validate()?,
            OperationAction::Post => {
                operation.post()?;
                recompute_operation(&mut tx, id).await?;
            }
            OperationAction::Lock => operation.lock()?,
            OperationAction::Cancel => {
                operation.cancel();
                set_records_cancelled(&mut tx, id, true).await?;
                recompute_operation(&mut tx, id).await?;
            }
            OperationAction::Draft => {
                let was_cancelled = operation.state == OperationState::Cancelled;
                operation.reset_to_draft()?;
                if was_cancelled {
                    set_records_cancelled(&mut tx, id, false).await?;
                    recompute_operation(&mut tx, id).await?;
                }
            }
        }

        sqlx::query("UPDATE harvest_operations SET state = $2 WHERE id = $1")
            .bind(id)
            .bind(operation.state.as_str())
            .execute(&mut *tx)
            .await?;

        let records = labour_records(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(operation_id = id, action = ?action, state = operation.state.as_str(), "harvest operation action applied");
        Ok(OperationSummary {
            id,
            name: operation.name,
            state: operation.state,
            records,
        })
    }

    /// Remove one labour record of a draft operation
    pub async fn remove_record(&self, record_id: i64) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let (operation_id, worker_id, date) = sqlx::query_as::<_, (i64, i64, NaiveDate)>(
            r#"
            SELECT operation_id, worker_id, operation_date
            FROM harvest_records
            WHERE id = $1 AND active
            "#,
        )
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        load_operation(&mut tx, operation_id).await?.ensure_editable()?;

        // the row stays for history; the rest of the worker's day takes over its share
        sqlx::query("UPDATE harvest_records SET active = FALSE, is_cancelled = TRUE WHERE id = $1")
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        recompute_day(&mut tx, worker_id, date).await?;

        tx.commit().await?;
        tracing::info!(record_id, operation_id, "labour record cancelled");
        Ok(())
    }
}

async fn create_operation(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM harvest_operations WHERE name = $1")
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(ItemOutcome::Rejected(ItemResult::failed(
            Some(id.into()),
            Some(name),
            ref_id,
            RECORD_EXISTS,
        )));
    }

    let date = operation_date(item)?;
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO harvest_operations (
            ref_id, name, company_id, operation_date, operation_type_id, afdeling_id, product_id,
            foreman_id, foreman_extra_id, assistant_id, clerk_id, recorder_id, team_id,
            assigned_to
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(ref_id.as_ref().map(RefId::to_string))
    .bind(&name)
    .bind(company_id)
    .bind(date)
    .bind(int(item, "type_id"))
    .bind(int(item, "afdeling_id"))
    .bind(int(item, "product_id"))
    .bind(int(item, "foreman_id"))
    .bind(int(item, "foreman_extra_id"))
    .bind(int(item, "assistant_id"))
    .bind(int(item, "clerk_id"))
    .bind(int(item, "recorder_id"))
    .bind(int(item, "team_id"))
    .bind(int_list(item, "assigned_to"))
    .fetch_one(&mut *conn)
    .await?;

    let workers = insert_labour(conn, id, date, item).await?;
    for worker_id in workers {
        recompute_day(conn, worker_id, date).await?;
    }

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_CREATED)))
}

async fn update_operation(conn: &mut PgConnection, item: &Value) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM harvest_operations WHERE name = $1")
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;
    let operation = load_operation(conn, id).await?;
    operation.ensure_editable()?;

    let previous = sqlx::query_as::<_, (i64, NaiveDate)>(
        "SELECT DISTINCT worker_id, operation_date FROM harvest_records WHERE operation_id = $1",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let date = operation_date(item)?;
    sqlx::query(
        r#"
        UPDATE harvest_operations SET
            operation_date = $2, operation_type_id = $3, afdeling_id = $4, product_id = $5,
            foreman_id = $6, foreman_extra_id = $7, assistant_id = $8, clerk_id = $9,
            recorder_id = $10, team_id = $11, assigned_to = $12
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(date)
    .bind(int(item, "type_id"))
    .bind(int(item, "afdeling_id"))
    .bind(int(item, "product_id"))
    .bind(int(item, "foreman_id"))
    .bind(int(item, "foreman_extra_id"))
    .bind(int(item, "assistant_id"))
    .bind(int(item, "clerk_id"))
    .bind(int(item, "recorder_id"))
    .bind(int(item, "team_id"))
    .bind(int_list(item, "assigned_to"))
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM harvest_records WHERE operation_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let workers = insert_labour(conn, id, date, item).await?;

    let touched: BTreeSet<(i64, NaiveDate)> = previous
        .into_iter()
        .chain(workers.into_iter().map(|w| (w, date)))
        .collect();
    for (worker_id, day) in touched {
        recompute_day(conn, worker_id, day).await?;
    }

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_UPDATED)))
}

/// Harvested bunches on a labour line; absent means none
fn labour_qty(line: &Value) -> AppResult<i32> {
    let Some(raw) = line.get("qty").filter(|v| !v.is_null()) else {
        return Ok(0);
    };
    let qty = raw
        .as_i64()
        .and_then(|q| i32::try_from(q).ok())
        .ok_or_else(|| {
            AppError::ValidationError(format!("Field qty must be a whole number, got {}", raw))
        })?;
    if qty < 0 {
        return Err(AppError::ValidationError(
            "Harvest quantity cannot be negative".to_string(),
        ));
    }
    Ok(qty)
}

/// Insert the item's `labour_ids`; returns the workers involved
async fn insert_labour(
    conn: &mut PgConnection,
    operation_id: i64,
    date: NaiveDate,
    item: &Value,
) -> AppResult<BTreeSet<i64>> {
    let mut workers = BTreeSet::new();
    let lines = item
        .get("labour_ids")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for line in lines {
        let worker_id = int(line, "member_id")
            .ok_or_else(|| AppError::ValidationError("Field member_id must be int".to_string()))?;
        let block_id = int(line, "block_id")
            .ok_or_else(|| AppError::ValidationError("Field block_id must be int".to_string()))?;
        let qty = labour_qty(line)?;

        sqlx::query(
            r#"
            INSERT INTO harvest_records (
                operation_id, worker_id, block_id, operation_date, tph_code, work_note,
                harvest_qty_unit, other_harvest_qty, other_uom_factor, penalties, planning_qty
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(operation_id)
        .bind(worker_id)
        .bind(block_id)
        .bind(date)
        .bind(text(line, "tph_code"))
        .bind(text(line, "work_note"))
        .bind(qty)
        .bind(line.get("other_qty").and_then(json_decimal).unwrap_or(Decimal::ZERO))
        .bind(line.get("other_uom_factor").and_then(json_decimal).unwrap_or(Decimal::ONE))
        .bind(Json(penalty_lines(line)))
        .bind(line.get("planning_qty").and_then(json_decimal).unwrap_or(Decimal::ZERO))
        .execute(&mut *conn)
        .await?;

        workers.insert(worker_id);
    }

    Ok(workers)
}

/// `penalty_ids` of a labour line; prices are filled in on recomputation
pub fn penalty_lines(line: &Value) -> Vec<HarvestPenalty> {
    line.get("penalty_ids")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|p| {
                    Some(HarvestPenalty {
                        penalty_type_id: p.get("penalty_id")?.as_i64()?,
                        qty: p.get("penalty_qty").and_then(json_decimal).unwrap_or(Decimal::ZERO),
                        price: Decimal::ZERO,
                        subtotal: Decimal::ZERO,
                        foreman_total: Decimal::ZERO,
                        extra_foreman_total: Decimal::ZERO,
                        recorder_total: Decimal::ZERO,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn load_operation(conn: &mut PgConnection, id: i64) -> AppResult<HarvestOperation> {
    let row = sqlx::query_as::<_, OperationRow>(&format!(
        "SELECT {} FROM harvest_operations WHERE id = $1",
        OPERATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;

    HarvestOperation::try_from(row)
}

/// Operations of a date with their labour records, cancelled ones excluded
pub(crate) async fn operations_of_day(
    conn: &mut PgConnection,
    company_id: Option<i64>,
    date: NaiveDate,
) -> AppResult<(Vec<HarvestOperation>, Vec<HarvestLabourRecord>)> {
    let operations = sqlx::query_as::<_, OperationRow>(&format!(
        r#"
        SELECT {} FROM harvest_operations
        WHERE operation_date = $1
          AND state <> 'cancelled'
          AND ($2::BIGINT IS NULL OR company_id = $2)
        ORDER BY id
        "#,
        OPERATION_COLUMNS
    ))
    .bind(date)
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(HarvestOperation::try_from)
    .collect::<AppResult<Vec<_>>>()?;

    let ids: Vec<i64> = operations.iter().map(|o| o.id).collect();
    let records = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {} FROM harvest_records WHERE operation_id = ANY($1) AND NOT is_cancelled ORDER BY id",
        RECORD_COLUMNS
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(HarvestLabourRecord::from)
    .collect();

    Ok((operations, records))
}

async fn set_records_cancelled(
    conn: &mut PgConnection,
    operation_id: i64,
    cancelled: bool,
) -> AppResult<()> {
    // removed records stay cancelled when the operation comes back to draft
    sqlx::query("UPDATE harvest_records SET is_cancelled = $2 WHERE operation_id = $1 AND active")
        .bind(operation_id)
        .bind(cancelled)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Recompute every worker-day the operation touches
async fn recompute_operation(conn: &mut PgConnection, operation_id: i64) -> AppResult<()> {
    let days = sqlx::query_as::<_, (i64, NaiveDate)>(
        "SELECT DISTINCT worker_id, operation_date FROM harvest_records WHERE operation_id = $1",
    )
    .bind(operation_id)
    .fetch_all(&mut *conn)
    .await?;

    for (worker_id, date) in days {
        recompute_day(conn, worker_id, date).await?;
    }
    Ok(())
}

/// Load one worker's records of a day, run the premi engine and store the results
async fn recompute_day(conn: &mut PgConnection, worker_id: i64, date: NaiveDate) -> AppResult<()> {
    let mut records: Vec<HarvestLabourRecord> = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {} FROM harvest_records WHERE worker_id = $1 AND operation_date = $2 ORDER BY id",
        RECORD_COLUMNS
    ))
    .bind(worker_id)
    .bind(date)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(HarvestLabourRecord::from)
    .collect();

    if records.iter().all(|r| r.is_cancelled) {
        return Ok(());
    }

    let worker = load_worker(conn, worker_id).await?;

    let block_ids: Vec<i64> = records.iter().map(|r| r.block_id).collect();
    let configurations = sqlx::query_as::<_, ConfigurationRow>(&format!(
        "SELECT {} FROM premi_configurations WHERE active AND block_id = ANY($1) ORDER BY id",
        CONFIGURATION_COLUMNS
    ))
    .bind(&block_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(PremiConfiguration::try_from)
    .collect::<AppResult<Vec<_>>>()?;

    let average_weights: Vec<AverageWeight> = sqlx::query_as::<_, (i64, i64, NaiveDate, Decimal, Decimal)>(
        r#"
        SELECT id, block_id, harvesting_date, harvest_qty, harvest_uom_qty
        FROM block_average_weights
        WHERE block_id = ANY($1) AND EXTRACT(YEAR FROM harvesting_date)::INT = $2
        "#,
    )
    .bind(&block_ids)
    .bind(date.year())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(id, block_id, harvesting_date, harvest_qty, harvest_uom_qty)| AverageWeight {
        id,
        block_id,
        harvesting_date,
        harvest_qty,
        harvest_uom_qty,
    })
    .collect();

    let holidays = load_holidays(conn, date).await?;

    let penalty_ids: Vec<i64> = records
        .iter()
        .flat_map(|r| r.penalties.iter().map(|p| p.penalty_type_id))
        .collect();
    let penalty_types = load_penalty_types(conn, &penalty_ids).await?;

    let inputs = PremiInputs {
        configurations: &configurations,
        average_weights: &average_weights,
        holidays: &holidays,
        penalty_types: &penalty_types,
    };
    recompute_worker_day(&mut records, &worker, &inputs)?;

    for record in records.iter().filter(|r| !r.is_cancelled) {
        store_record(conn, record).await?;
    }
    tracing::debug!(worker_id, %date, records = records.len(), "worker day recomputed");
    Ok(())
}

pub(crate) async fn load_worker(conn: &mut PgConnection, worker_id: i64) -> AppResult<Worker> {
    let row = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT id, name, job_id, calendar_id, employee_type, contract_wage, contract_state,
               contract_date_start
        FROM workers
        WHERE id = $1
        "#,
    )
    .bind(worker_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Worker {} not found", worker_id)))?;
    Ok(row.into())
}

/// Active non-harvest premi configurations of an activity
pub(crate) async fn activity_configurations(
    conn: &mut PgConnection,
    activity_id: i64,
) -> AppResult<Vec<PremiConfiguration>> {
    sqlx::query_as::<_, ConfigurationRow>(&format!(
        "SELECT {} FROM premi_configurations WHERE active AND activity_id = $1 ORDER BY id",
        CONFIGURATION_COLUMNS
    ))
    .bind(activity_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(PremiConfiguration::try_from)
    .collect()
}

/// Holidays covering a date, for every calendar
pub(crate) async fn load_holidays(conn: &mut PgConnection, date: NaiveDate) -> AppResult<Vec<Holiday>> {
    let rows = sqlx::query_as::<_, (i64, String, NaiveDate, NaiveDate, Option<i64>)>(
        "SELECT id, name, date_from, date_to, calendar_id FROM holidays WHERE date_from <= $1 AND date_to >= $1",
    )
    .bind(date)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, date_from, date_to, calendar_id)| Holiday {
            id,
            name,
            date_from,
            date_to,
            calendar_id,
        })
        .collect())
}

async fn load_penalty_types(conn: &mut PgConnection, ids: &[i64]) -> AppResult<Vec<PenaltyType>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, (i64, String, Json<Vec<PenaltyPosition>>, Decimal, Decimal, Decimal)>(
        r#"
        SELECT id, name, positions, foreman_amount, extra_foreman_amount, recorder_amount
        FROM penalty_types
        WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, name, positions, foreman_amount, extra_foreman_amount, recorder_amount)| PenaltyType {
                id,
                name,
                positions: positions.0,
                foreman_amount,
                extra_foreman_amount,
                recorder_amount,
            },
        )
        .collect())
}

async fn store_record(conn: &mut PgConnection, r: &HarvestLabourRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE harvest_records SET
            avg_weight = $2, harvest_qty_weight = $3, premi_id = $4, base_weight = $5,
            base_extra_weight = $6, premi_base_extra = $7, attendance_premi = $8,
            other_harvest_premi = $9, total_premi = $10, daily_wages = $11,
            total_exclude_penalty = $12, penalties = $13, penalty_total = $14,
            abnormal_unit = $15, total_include_penalty = $16
        WHERE id = $1
        "#,
    )
    .bind(r.id)
    .bind(r.avg_weight)
    .bind(r.harvest_qty_weight)
    .bind(r.premi_id)
    .bind(r.base_weight)
    .bind(r.base_extra_weight)
    .bind(r.premi_base_extra)
    .bind(r.attendance_premi)
    .bind(r.other_harvest_premi)
    .bind(r.total_premi)
    .bind(r.daily_wages)
    .bind(r.total_exclude_penalty)
    .bind(Json(&r.penalties))
    .bind(r.penalty_total)
    .bind(r.abnormal_unit)
    .bind(r.total_include_penalty)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn labour_records(conn: &mut PgConnection, operation_id: i64) -> AppResult<Vec<LabourRecordItem>> {
    let rows = sqlx::query_as::<_, (i64, i64, i64, NaiveDate, i32, Decimal, Decimal, Decimal, Decimal, Decimal, String, Option<String>)>(
        r#"
        SELECT r.id, r.worker_id, r.block_id, r.operation_date, r.harvest_qty_unit,
               r.harvest_qty_weight, r.total_premi, r.daily_wages, r.penalty_total,
               r.total_include_penalty, b.code, p.code
        FROM harvest_records r
        JOIN blocks b ON b.id = r.block_id
        JOIN harvest_operations o ON o.id = r.operation_id
        LEFT JOIN products p ON p.id = o.product_id
        WHERE r.operation_id = $1 AND r.active
        ORDER BY r.id
        "#,
    )
    .bind(operation_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, worker_id, block_id, date, qty, weight, premi, wages, penalty, total, block_code, product_code)| {
                let record = HarvestLabourRecord::new(id, operation_id, worker_id, block_id, date, qty);
                LabourRecordItem {
                    id,
                    name: record.display_name(product_code.as_deref(), &block_code),
                    worker_id,
                    block_id,
                    harvest_qty_unit: qty,
                    harvest_qty_weight: weight,
                    total_premi: premi,
                    daily_wages: wages,
                    penalty_total: penalty,
                    total_include_penalty: total,
                }
            },
        )
        .collect())
}

pub(crate) fn operation_date(item: &Value) -> AppResult<NaiveDate> {
    match item.get("date").and_then(Value::as_str) {
        Some(raw) => parse_date(raw)
            .ok_or_else(|| AppError::ValidationError(format!("Invalid date: '{}'", raw))),
        None => Ok(Utc::now().date_naive()),
    }
}

pub(crate) fn int(item: &Value, key: &str) -> Option<i64> {
    item.get(key).and_then(Value::as_i64)
}

/// Whole numbers of a list field; anything else in the list is skipped
pub(crate) fn int_list(item: &Value, key: &str) -> Vec<i64> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn penalty_lines_skip_entries_without_type() {
        let line = json!({
            "member_id": 4,
            "block_id": 2,
            "penalty_ids": [
                {"penalty_id": 1, "penalty_qty": 3},
                {"penalty_qty": 9},
                {"penalty_id": 2, "penalty_qty": "1.5"}
            ]
        });
        let lines = penalty_lines(&line);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].qty, Decimal::from(3));
        assert_eq!(lines[1].qty, Decimal::new(15, 1));
        assert!(lines.iter().all(|l| l.subtotal.is_zero()));
    }

    #[test]
    fn worker_without_open_contract_has_no_wage() {
        let worker: Worker = WorkerRow {
            id: 1,
            name: "Sutrisno".into(),
            job_id: Some(3),
            calendar_id: None,
            employee_type: "employee".into(),
            contract_wage: Some(Decimal::from(3_000_000)),
            contract_state: Some("close".into()),
            contract_date_start: None,
        }
        .into();
        assert!(worker.daily_wage().is_err());

        let worker: Worker = WorkerRow {
            id: 2,
            name: "Paijo".into(),
            job_id: Some(3),
            calendar_id: None,
            employee_type: "freelance".into(),
            contract_wage: Some(Decimal::from(3_000_000)),
            contract_state: Some("open".into()),
            contract_date_start: None,
        }
        .into();
        assert_eq!(worker.daily_wage().unwrap(), Decimal::from(100_000));
        assert_eq!(worker.employee_type, EmployeeType::Freelance);
    }

    #[test]
    fn assigned_users_keep_only_ids() {
        let item = json!({"assigned_to": [3, "x", 7], "team_id": 2});
        assert_eq!(int_list(&item, "assigned_to"), vec![3, 7]);
        assert!(int_list(&json!({}), "assigned_to").is_empty());
    }

    #[test]
    fn operation_date_reads_day_first() {
        let date = operation_date(&json!({"date": "02/03/2024"})).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(operation_date(&json!({"date": "32/13/2024"})).is_err());
    }

    #[test]
    fn actions_parse_from_path_segments() {
        assert_eq!(OperationAction::parse("validate"), Some(OperationAction::Validate));
        assert_eq!(OperationAction::parse("remove"), None);
    }

    #[test]
    fn labour_qty_must_be_a_whole_number() {
        assert_eq!(labour_qty(&json!({"member_id": 4})).unwrap(), 0);
        assert_eq!(labour_qty(&json!({"qty": 12})).unwrap(), 12);

        let err = labour_qty(&json!({"qty": 2.5})).unwrap_err();
        assert_eq!(err.item_message(), "Field qty must be a whole number, got 2.5");

        let err = labour_qty(&json!({"qty": "12"})).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = labour_qty(&json!({"qty": 3_000_000_000i64})).unwrap_err();
        assert!(err.item_message().starts_with("Field qty must be a whole number"));

        let err = labour_qty(&json!({"qty": -1})).unwrap_err();
        assert_eq!(err.item_message(), "Harvest quantity cannot be negative");
    }
}
