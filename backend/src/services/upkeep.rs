//! Upkeep operation service: batch ingestion and labour pricing
//!
//! Upkeep labour is priced once per line when it is stored. A worker who
//! also has a harvest record that day is paid the activity premi instead of
//! a second daily wage.

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use shared::{
    group_materials, price_upkeep_record, BatchOutcome, ItemResult, OperationState, RefId,
    UpkeepInputs, UpkeepLabourLine, UpkeepLabourRecord, RECORD_CREATED, RECORD_EXISTS,
    RECORD_NOT_FOUND, RECORD_UPDATED,
};

use crate::error::{AppError, AppResult};
use crate::services::harvest::{
    activity_configurations, int, int_list, load_holidays, load_worker, operation_date,
};
use crate::services::master_data::text;
use crate::services::unit_of_work::{begin_item, settle_item, ItemOutcome};

#[derive(Clone)]
pub struct UpkeepService {
    db: PgPool,
}

impl UpkeepService {
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
        tracing::info!(items = items.len(), status = batch.status(), "upkeep batch processed");
        Ok(())
    }

    /// Replace header, labour and materials of draft operations found by name
    pub async fn update_operations(
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
            let outcome = update_operation(&mut item_tx, item, company_id).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "upkeep update processed");
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

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM upkeep_operations WHERE name = $1")
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

    let lines = labour_lines(item)?;
    let date = operation_date(item)?;
    let activity_id = activity_of(item)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO upkeep_operations (
            ref_id, name, company_id, operation_date, operation_type_id, afdeling_id,
            activity_id, team_id, foreman_id, foreman_extra_id, assistant_id, recorder_id,
            assigned_to
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(ref_id.as_ref().map(RefId::to_string))
    .bind(&name)
    .bind(company_id)
    .bind(date)
    .bind(int(item, "type_id"))
    .bind(int(item, "afdeling_id"))
    .bind(activity_id)
    .bind(int(item, "team_id"))
    .bind(int(item, "foreman_id"))
    .bind(int(item, "foreman_extra_id"))
    .bind(int(item, "assistant_id"))
    .bind(int(item, "recorder_id"))
    .bind(int_list(item, "assigned_to"))
    .fetch_one(&mut *conn)
    .await?;

    store_lines(conn, id, activity_id, date, company_id, &lines).await?;

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_CREATED)))
}

async fn update_operation(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let name = text(item, "name").unwrap_or_default();

    let (id, state) = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, state FROM upkeep_operations WHERE name = $1",
    )
    .bind(&name)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;
    OperationState::parse(&state)
        .ok_or_else(|| AppError::CorruptRecord(format!("upkeep {} has state '{}'", id, state)))?
        .ensure_editable()?;

    let lines = labour_lines(item)?;
    let date = operation_date(item)?;
    let activity_id = activity_of(item)?;

    sqlx::query(
        r#"
        UPDATE upkeep_operations SET
            operation_date = $2, operation_type_id = $3, afdeling_id = $4, activity_id = $5,
            team_id = $6, foreman_id = $7, foreman_extra_id = $8, assistant_id = $9,
            recorder_id = $10, assigned_to = $11
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(date)
    .bind(int(item, "type_id"))
    .bind(int(item, "afdeling_id"))
    .bind(activity_id)
    .bind(int(item, "team_id"))
    .bind(int(item, "foreman_id"))
    .bind(int(item, "foreman_extra_id"))
    .bind(int(item, "assistant_id"))
    .bind(int(item, "recorder_id"))
    .bind(int_list(item, "assigned_to"))
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM upkeep_records WHERE operation_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM upkeep_materials WHERE operation_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    store_lines(conn, id, activity_id, date, company_id, &lines).await?;

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_UPDATED)))
}

fn activity_of(item: &Value) -> AppResult<i64> {
    int(item, "activity_id")
        .ok_or_else(|| AppError::ValidationError("Field activity_id must be int".to_string()))
}

/// Typed `labour_ids` of an upkeep item, each line validated
pub fn labour_lines(item: &Value) -> AppResult<Vec<UpkeepLabourLine>> {
    let raw = item.get("labour_ids").cloned().unwrap_or(Value::Array(Vec::new()));
    let lines: Vec<UpkeepLabourLine> = serde_json::from_value(raw)
        .map_err(|e| AppError::ValidationError(format!("Invalid labour line: {}", e)))?;
    for line in &lines {
        line.validate()?;
    }
    Ok(lines)
}

/// Insert priced labour records and the materials they used, grouped
async fn store_lines(
    conn: &mut PgConnection,
    operation_id: i64,
    activity_id: i64,
    date: NaiveDate,
    company_id: Option<i64>,
    lines: &[UpkeepLabourLine],
) -> AppResult<()> {
    let configurations = activity_configurations(conn, activity_id).await?;
    let holidays = load_holidays(conn, date).await?;

    for line in lines {
        let worker = load_worker(conn, line.member_id).await?;
        let harvested_same_day = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM harvest_records
                WHERE worker_id = $1 AND operation_date = $2 AND NOT is_cancelled
            )
            "#,
        )
        .bind(line.member_id)
        .bind(date)
        .fetch_one(&mut *conn)
        .await?;

        let mut record = UpkeepLabourRecord::new(
            0,
            operation_id,
            line.member_id,
            line.block_id,
            activity_id,
            date,
        );
        record.quantity = line.quantity;
        record.num_of_days = line.num_of_days;
        record.planning_qty = line.planning_qty;
        record.is_outside_work_hour = line.is_outside_work_hour;

        let inputs = UpkeepInputs {
            configurations: &configurations,
            holidays: &holidays,
            company_id,
            harvested_same_day,
        };
        price_upkeep_record(&mut record, &worker, &inputs);

        sqlx::query(
            r#"
            INSERT INTO upkeep_records (
                operation_id, worker_id, block_id, activity_id, operation_date, quantity,
                num_of_days, planning_qty, is_outside_work_hour, work_note, premi_id,
                calculation, price_amount, total_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(operation_id)
        .bind(record.worker_id)
        .bind(record.block_id)
        .bind(activity_id)
        .bind(date)
        .bind(record.quantity)
        .bind(record.num_of_days)
        .bind(record.planning_qty)
        .bind(record.is_outside_work_hour)
        .bind(line.work_note.as_deref())
        .bind(record.premi_id)
        .bind(record.calculation.as_str())
        .bind(record.price_amount)
        .bind(record.total_amount)
        .execute(&mut *conn)
        .await?;
    }

    let materials = group_materials(lines.iter().flat_map(|l| l.materials.iter()));
    for material in &materials {
        sqlx::query(
            r#"
            INSERT INTO upkeep_materials (operation_id, product_id, block_id, qty)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(operation_id)
        .bind(material.product_id)
        .bind(material.block_id)
        .bind(material.qty)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(
        operation_id,
        lines = lines.len(),
        materials = materials.len(),
        "upkeep lines stored"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn labour_lines_are_typed_and_checked() {
        let item = json!({
            "labour_ids": [
                {"member_id": 4, "block_id": 2, "qty": 12, "workday": 0.5},
                {"member_id": 5, "block_id": 2}
            ]
        });
        let lines = labour_lines(&item).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].num_of_days, Decimal::new(5, 1));
        assert_eq!(lines[1].num_of_days, Decimal::ONE);
    }

    #[test]
    fn malformed_labour_line_fails_the_item() {
        let item = json!({"labour_ids": [{"member_id": "x", "block_id": 2}]});
        let err = labour_lines(&item).unwrap_err();
        assert!(err.item_message().starts_with("Invalid labour line"));

        let item = json!({"labour_ids": [{"member_id": 4, "block_id": 2, "qty": -2}]});
        let err = labour_lines(&item).unwrap_err();
        assert!(err.item_message().starts_with("Invalid value for"));
    }

    #[test]
    fn missing_activity_is_reported() {
        let err = activity_of(&json!({"activity_id": "30"})).unwrap_err();
        assert_eq!(err.item_message(), "Field activity_id must be int");
        assert_eq!(activity_of(&json!({"activity_id": 30})).unwrap(), 30);
    }
}
