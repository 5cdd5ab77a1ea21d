//! Upkeep (non-harvest estate work) operation, labour and material models

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::OperationState;
use crate::error::DomainResult;

/// How an upkeep labour line is paid
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WageCalculation {
    /// Daily wage times worked days
    #[default]
    DailySalary,
    /// Premi amount times quantity of work
    Premi,
}

impl WageCalculation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WageCalculation::DailySalary => "daily_salary",
            WageCalculation::Premi => "premi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily_salary" => Some(WageCalculation::DailySalary),
            "premi" => Some(WageCalculation::Premi),
            _ => None,
        }
    }
}

/// An upkeep activity for one afdeling, owning labour and material lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpkeepOperation {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub operation_date: NaiveDate,
    pub operation_type_id: i64,
    pub afdeling_id: i64,
    pub activity_id: i64,
    pub foreman_id: Option<i64>,
    pub foreman_extra_id: Option<i64>,
    pub assistant_id: Option<i64>,
    pub recorder_id: Option<i64>,
    pub state: OperationState,
}

impl UpkeepOperation {
    pub fn ensure_editable(&self) -> DomainResult<()> {
        self.state.ensure_editable()
    }
}

/// One worker's upkeep result on one block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpkeepLabourRecord {
    pub id: i64,
    pub operation_id: i64,
    pub worker_id: i64,
    pub block_id: i64,
    pub activity_id: i64,
    pub operation_date: NaiveDate,
    pub quantity: Decimal,
    pub num_of_days: Decimal,
    pub planning_qty: Decimal,
    pub is_outside_work_hour: bool,

    pub premi_id: Option<i64>,
    pub calculation: WageCalculation,
    pub price_amount: Decimal,
    pub total_amount: Decimal,
}

impl UpkeepLabourRecord {
    /// A fresh one-day record with nothing priced yet
    pub fn new(
        id: i64,
        operation_id: i64,
        worker_id: i64,
        block_id: i64,
        activity_id: i64,
        operation_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            operation_id,
            worker_id,
            block_id,
            activity_id,
            operation_date,
            quantity: Decimal::ZERO,
            num_of_days: Decimal::ONE,
            planning_qty: Decimal::ZERO,
            is_outside_work_hour: false,
            premi_id: None,
            calculation: WageCalculation::DailySalary,
            price_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        }
    }

    /// The worker checked out when any workday was booked
    pub fn checkout(&self) -> bool {
        self.num_of_days > Decimal::ZERO
    }

    /// `{activity}/{block}/{YYYY/MM/DD}/{id}`
    pub fn display_name(&self, activity_code: Option<&str>, block_code: Option<&str>) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{:02}/{}",
            activity_code.unwrap_or("N/A"),
            block_code.unwrap_or("N/A"),
            self.operation_date.year(),
            self.operation_date.month(),
            self.operation_date.day(),
            self.id
        )
    }
}

fn not_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must not be negative"));
    }
    Ok(())
}

fn one_day() -> Decimal {
    Decimal::ONE
}

/// Material issued on a labour line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MaterialUsage {
    pub product_id: i64,
    pub block_id: i64,
    #[serde(default)]
    #[validate(custom = "not_negative")]
    pub qty: Decimal,
}

/// A `labour_ids` entry of an upkeep payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpkeepLabourLine {
    pub member_id: i64,
    pub block_id: i64,
    #[serde(default, rename = "qty")]
    #[validate(custom = "not_negative")]
    pub quantity: Decimal,
    #[serde(default = "one_day", rename = "workday")]
    #[validate(custom = "not_negative")]
    pub num_of_days: Decimal,
    #[serde(default)]
    pub planning_qty: Decimal,
    #[serde(default)]
    pub is_outside_work_hour: bool,
    #[serde(default)]
    pub work_note: Option<String>,
    #[serde(default, rename = "material_ids")]
    #[validate]
    pub materials: Vec<MaterialUsage>,
}

/// Material lines summed per product and block, in first-seen order
pub fn group_materials<'a>(
    lines: impl IntoIterator<Item = &'a MaterialUsage>,
) -> Vec<MaterialUsage> {
    let mut grouped: Vec<MaterialUsage> = Vec::new();
    for line in lines {
        match grouped
            .iter_mut()
            .find(|g| g.product_id == line.product_id && g.block_id == line.block_id)
        {
            Some(existing) => existing.qty += line.qty,
            None => grouped.push(line.clone()),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usage(product_id: i64, block_id: i64, qty: i64) -> MaterialUsage {
        MaterialUsage { product_id, block_id, qty: Decimal::from(qty) }
    }

    #[test]
    fn labour_line_defaults_to_one_workday() {
        let line: UpkeepLabourLine =
            serde_json::from_value(json!({"member_id": 4, "block_id": 2, "qty": 12.5})).unwrap();
        assert_eq!(line.quantity, Decimal::new(125, 1));
        assert_eq!(line.num_of_days, Decimal::ONE);
        assert!(line.materials.is_empty());
        assert!(line.validate().is_ok());
    }

    #[test]
    fn negative_quantities_fail_validation() {
        let line: UpkeepLabourLine =
            serde_json::from_value(json!({"member_id": 4, "block_id": 2, "qty": -1})).unwrap();
        assert!(line.validate().is_err());

        let line: UpkeepLabourLine = serde_json::from_value(json!({
            "member_id": 4,
            "block_id": 2,
            "material_ids": [{"product_id": 7, "block_id": 2, "qty": -3}]
        }))
        .unwrap();
        assert!(line.validate().is_err());
    }

    #[test]
    fn materials_are_grouped_by_product_and_block() {
        let lines = vec![usage(1, 10, 2), usage(2, 10, 1), usage(1, 10, 3), usage(1, 11, 4)];
        let grouped = group_materials(&lines);
        assert_eq!(grouped, vec![usage(1, 10, 5), usage(2, 10, 1), usage(1, 11, 4)]);
    }

    #[test]
    fn record_name_falls_back_for_missing_codes() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 9).unwrap();
        let record = UpkeepLabourRecord::new(12, 1, 4, 2, 3, date);
        assert_eq!(record.display_name(Some("PRN"), None), "PRN/N/A/2024/08/09/12");
        assert!(record.checkout());
    }
}
