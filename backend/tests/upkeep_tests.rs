//! Upkeep labour pricing scenario and property-based tests
//!
//! Covers:
//! - Payload lines deserialised, validated and priced end to end
//! - Premi versus daily salary selection per worker and day
//! - Minimal unit gate on salaried work
//! - Material lines grouped across labour lines

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use validator::Validate;

use shared::{
    check_missing_or_incorrect_fields, group_materials, price_upkeep_record,
    upkeep_operation_schema, ContractState, EmployeeType, EmploymentContract, MaterialUsage,
    PremiConfiguration, PremiType, UpkeepInputs, UpkeepLabourLine, UpkeepLabourRecord,
    WageCalculation, Worker,
};

// ============================================================================
// Fixtures
// ============================================================================

const ACTIVITY: i64 = 41;

fn work_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 4).unwrap()
}

fn worker(employee_type: EmployeeType, monthly_wage: i64) -> Worker {
    Worker {
        id: 12,
        name: "Made".into(),
        job_id: None,
        calendar_id: None,
        employee_type,
        contract: Some(EmploymentContract {
            wage: Decimal::from(monthly_wage),
            state: ContractState::Open,
            date_start: None,
        }),
    }
}

fn spraying_premi(amount: i64, minimal_unit: i64) -> PremiConfiguration {
    PremiConfiguration {
        id: 8,
        name: "Premi Semprot Gulma".into(),
        company_id: Some(1),
        active: true,
        premi_type: PremiType::NonHarvest,
        block_id: None,
        activity_id: Some(ACTIVITY),
        start_month: None,
        end_month: None,
        harvest_base_qty: Decimal::ZERO,
        other_harvest_premi: Decimal::ZERO,
        use_condition: false,
        quantifiers: vec![],
        conditions: vec![],
        premi_amount: Decimal::from(amount),
        force_premi_amount: false,
        minimal_unit: Decimal::from(minimal_unit),
    }
}

fn record_from(line: &UpkeepLabourLine) -> UpkeepLabourRecord {
    let mut record =
        UpkeepLabourRecord::new(1, 1, line.member_id, line.block_id, ACTIVITY, work_day());
    record.quantity = line.quantity;
    record.num_of_days = line.num_of_days;
    record.is_outside_work_hour = line.is_outside_work_hour;
    record
}

fn salaried() -> Worker {
    worker(EmployeeType::Employee, 3_000_000)
}

fn freelancer() -> Worker {
    worker(EmployeeType::Freelance, 0)
}

fn inputs(configurations: &[PremiConfiguration], harvested_same_day: bool) -> UpkeepInputs<'_> {
    UpkeepInputs {
        configurations,
        holidays: &[],
        company_id: Some(1),
        harvested_same_day,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn payload_line_is_priced_as_half_a_workday() {
    let item = json!({
        "ref_id": "UP-1",
        "type_id": 2,
        "name": "RWT/2024/0001",
        "afdeling_id": 3,
        "foreman_id": 4,
        "foreman_extra_id": 5,
        "assistant_id": 6,
        "activity_id": ACTIVITY,
        "labour_ids": [{"member_id": 12, "block_id": 7, "qty": 25, "workday": 0.5}]
    });
    assert_eq!(check_missing_or_incorrect_fields(&item, &upkeep_operation_schema()), None);

    let lines: Vec<UpkeepLabourLine> = serde_json::from_value(item["labour_ids"].clone()).unwrap();
    assert!(lines[0].validate().is_ok());

    let configs = vec![spraying_premi(1200, 0)];
    let mut record = record_from(&lines[0]);
    price_upkeep_record(&mut record, &salaried(), &inputs(&configs, false));

    assert_eq!(record.calculation, WageCalculation::DailySalary);
    assert_eq!(record.price_amount, Decimal::from(100_000));
    assert_eq!(record.total_amount, Decimal::from(50_000));
}

#[test]
fn harvest_on_the_same_day_switches_to_premi() {
    let configs = vec![spraying_premi(1200, 0)];
    let line: UpkeepLabourLine =
        serde_json::from_value(json!({"member_id": 12, "block_id": 7, "qty": 25})).unwrap();

    let mut record = record_from(&line);
    price_upkeep_record(&mut record, &salaried(), &inputs(&configs, true));

    assert_eq!(record.calculation, WageCalculation::Premi);
    assert_eq!(record.premi_id, Some(8));
    assert_eq!(record.total_amount, Decimal::from(30_000));
}

#[test]
fn other_company_premi_does_not_apply() {
    let mut config = spraying_premi(1200, 0);
    config.company_id = Some(2);
    let configs = vec![config];
    let line: UpkeepLabourLine =
        serde_json::from_value(json!({"member_id": 12, "block_id": 7, "qty": 25})).unwrap();

    let mut record = record_from(&line);
    price_upkeep_record(&mut record, &freelancer(), &inputs(&configs, false));

    assert_eq!(record.premi_id, None);
    assert_eq!(record.total_amount, Decimal::ZERO);
}

#[test]
fn short_salaried_work_is_unpaid_but_premi_work_is_not() {
    let configs = vec![spraying_premi(1200, 20)];
    let line: UpkeepLabourLine =
        serde_json::from_value(json!({"member_id": 12, "block_id": 7, "qty": 15})).unwrap();

    let mut salary_record = record_from(&line);
    price_upkeep_record(&mut salary_record, &salaried(), &inputs(&configs, false));
    assert_eq!(salary_record.total_amount, Decimal::ZERO);

    let mut premi_record = record_from(&line);
    price_upkeep_record(&mut premi_record, &freelancer(), &inputs(&configs, false));
    assert_eq!(premi_record.total_amount, Decimal::from(18_000));
}

#[test]
fn materials_of_all_lines_are_grouped() {
    let lines: Vec<UpkeepLabourLine> = serde_json::from_value(json!([
        {"member_id": 1, "block_id": 7, "material_ids": [
            {"product_id": 30, "block_id": 7, "qty": 1.5}
        ]},
        {"member_id": 2, "block_id": 7, "material_ids": [
            {"product_id": 30, "block_id": 7, "qty": 2},
            {"product_id": 31, "block_id": 7, "qty": 1}
        ]}
    ]))
    .unwrap();

    let grouped = group_materials(lines.iter().flat_map(|l| l.materials.iter()));
    assert_eq!(
        grouped,
        vec![
            MaterialUsage { product_id: 30, block_id: 7, qty: Decimal::new(35, 1) },
            MaterialUsage { product_id: 31, block_id: 7, qty: Decimal::ONE },
        ]
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Salaried workers are never paid per unit; premi workers never per day
    #[test]
    fn units_follow_the_calculation(
        quantity in 0..=300i64,
        workdays in 1..=3i64,
        freelance in any::<bool>(),
        overtime in any::<bool>(),
    ) {
        let configs = vec![spraying_premi(900, 0)];
        let paid = if freelance { freelancer() } else { salaried() };
        let mut record = UpkeepLabourRecord::new(1, 1, 12, 7, ACTIVITY, work_day());
        record.quantity = Decimal::from(quantity);
        record.num_of_days = Decimal::from(workdays);
        record.is_outside_work_hour = overtime;

        price_upkeep_record(&mut record, &paid, &inputs(&configs, false));

        if freelance || overtime {
            prop_assert_eq!(record.calculation, WageCalculation::Premi);
            prop_assert_eq!(record.total_amount, Decimal::from(900 * quantity));
        } else {
            prop_assert_eq!(record.calculation, WageCalculation::DailySalary);
            prop_assert_eq!(record.total_amount, Decimal::from(100_000 * workdays));
        }
    }
}
