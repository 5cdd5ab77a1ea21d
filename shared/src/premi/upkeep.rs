//! Upkeep labour pricing
//!
//! A labour line is paid the activity's premi amount per unit of work when
//! the worker also harvested that day, is a freelancer, worked outside hours
//! or the premi forces it. Everyone else earns the daily wage per workday.

use rust_decimal::Decimal;

use crate::models::{
    EmployeeType, Holiday, PremiConfiguration, PremiType, UpkeepLabourRecord, WageCalculation,
    Worker,
};

/// Everything pricing needs besides the record and its worker
#[derive(Debug, Clone, Copy)]
pub struct UpkeepInputs<'a> {
    pub configurations: &'a [PremiConfiguration],
    pub holidays: &'a [Holiday],
    pub company_id: Option<i64>,
    /// The worker has a harvest record on the same date
    pub harvested_same_day: bool,
}

/// Active premi of an activity; the most recent configuration wins
pub fn resolve_activity_premi(
    configurations: &[PremiConfiguration],
    activity_id: i64,
    company_id: Option<i64>,
) -> Option<&PremiConfiguration> {
    configurations
        .iter()
        .filter(|c| {
            c.active
                && c.premi_type == PremiType::NonHarvest
                && c.activity_id == Some(activity_id)
                && (company_id.is_none() || c.company_id.is_none() || c.company_id == company_id)
        })
        .max_by_key(|c| c.id)
}

/// Premi amount for the record's date; a matching condition supplies its own
pub fn premi_amount_for(
    premi: &PremiConfiguration,
    record: &UpkeepLabourRecord,
    worker: &Worker,
    holidays: &[Holiday],
) -> Decimal {
    match premi.condition_for(record.operation_date, worker.calendar_id, holidays) {
        Some(condition) => condition.premi_amount,
        None => premi.premi_amount,
    }
}

fn salary_wage(
    premi: Option<&PremiConfiguration>,
    record: &UpkeepLabourRecord,
    worker: &Worker,
) -> Decimal {
    let below_minimum = premi
        .map(|p| p.minimal_unit > Decimal::ZERO && record.quantity < p.minimal_unit)
        .unwrap_or(false);
    if below_minimum {
        Decimal::ZERO
    } else {
        worker.daily_wage_or_zero()
    }
}

/// Set calculation, price and total of one upkeep labour record
pub fn price_upkeep_record(
    record: &mut UpkeepLabourRecord,
    worker: &Worker,
    inputs: &UpkeepInputs<'_>,
) {
    let premi =
        resolve_activity_premi(inputs.configurations, record.activity_id, inputs.company_id);
    record.premi_id = premi.map(|p| p.id);

    let paid_by_premi = inputs.harvested_same_day
        || worker.employee_type == EmployeeType::Freelance
        || premi.map(|p| p.force_premi_amount).unwrap_or(false)
        || record.is_outside_work_hour;

    if paid_by_premi {
        record.calculation = WageCalculation::Premi;
        record.price_amount = premi
            .map(|p| premi_amount_for(p, record, worker, inputs.holidays))
            .unwrap_or(Decimal::ZERO);
    } else {
        record.calculation = WageCalculation::DailySalary;
        record.price_amount = salary_wage(premi, record, worker);
    }

    record.total_amount = record.price_amount * upkeep_units(record);
}

/// Quantity for premi lines, workdays for salaried lines
pub fn upkeep_units(record: &UpkeepLabourRecord) -> Decimal {
    match record.calculation {
        WageCalculation::Premi => record.quantity,
        WageCalculation::DailySalary => record.num_of_days,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;
    use crate::models::{ConditionKind, ContractState, EmploymentContract, PremiCondition};

    const ACTIVITY: i64 = 30;

    fn day() -> NaiveDate {
        // a Tuesday
        NaiveDate::from_ymd_opt(2024, 8, 13).unwrap()
    }

    fn worker(employee_type: EmployeeType) -> Worker {
        Worker {
            id: 4,
            name: "Ketut".into(),
            job_id: Some(2),
            calendar_id: None,
            employee_type,
            contract: Some(EmploymentContract {
                wage: Decimal::from(2_400_000),
                state: ContractState::Open,
                date_start: None,
            }),
        }
    }

    fn premi(id: i64, amount: i64) -> PremiConfiguration {
        PremiConfiguration {
            id,
            name: "Premi Semprot".into(),
            company_id: None,
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
            minimal_unit: Decimal::ZERO,
        }
    }

    fn record(quantity: i64, days: i64) -> UpkeepLabourRecord {
        let mut r = UpkeepLabourRecord::new(1, 1, 4, 10, ACTIVITY, day());
        r.quantity = Decimal::from(quantity);
        r.num_of_days = Decimal::from(days);
        r
    }

    fn price(r: &mut UpkeepLabourRecord, employee_type: EmployeeType, inputs: &UpkeepInputs<'_>) {
        price_upkeep_record(r, &worker(employee_type), inputs);
    }

    fn inputs(configurations: &[PremiConfiguration], harvested_same_day: bool) -> UpkeepInputs<'_> {
        UpkeepInputs {
            configurations,
            holidays: &[],
            company_id: None,
            harvested_same_day,
        }
    }

    #[test]
    fn salaried_worker_earns_daily_wage_per_workday() {
        let configs = vec![premi(1, 1500)];
        let mut r = record(40, 2);
        price(&mut r, EmployeeType::Employee, &inputs(&configs, false));

        assert_eq!(r.calculation, WageCalculation::DailySalary);
        assert_eq!(r.premi_id, Some(1));
        assert_eq!(r.price_amount, Decimal::from(80_000));
        assert_eq!(r.total_amount, Decimal::from(160_000));
    }

    #[test]
    fn worker_who_also_harvested_is_paid_premi_per_unit() {
        let configs = vec![premi(1, 1500)];
        let mut r = record(40, 1);
        price(&mut r, EmployeeType::Employee, &inputs(&configs, true));

        assert_eq!(r.calculation, WageCalculation::Premi);
        assert_eq!(r.price_amount, Decimal::from(1500));
        assert_eq!(r.total_amount, Decimal::from(60_000));
    }

    #[test]
    fn freelancer_forced_premi_and_overtime_all_use_premi() {
        let configs = vec![premi(1, 1000)];
        let mut freelance = record(5, 1);
        price(&mut freelance, EmployeeType::Freelance, &inputs(&configs, false));
        assert_eq!(freelance.calculation, WageCalculation::Premi);

        let mut forced_config = premi(2, 1000);
        forced_config.force_premi_amount = true;
        let forced_configs = vec![forced_config];
        let mut forced = record(5, 1);
        price(&mut forced, EmployeeType::Employee, &inputs(&forced_configs, false));
        assert_eq!(forced.calculation, WageCalculation::Premi);

        let mut overtime = record(5, 1);
        overtime.is_outside_work_hour = true;
        price(&mut overtime, EmployeeType::Employee, &inputs(&configs, false));
        assert_eq!(overtime.total_amount, Decimal::from(5000));
    }

    #[test]
    fn work_below_minimal_unit_earns_no_wage() {
        let mut config = premi(1, 1500);
        config.minimal_unit = Decimal::from(10);
        let configs = vec![config];

        let mut short = record(9, 1);
        price(&mut short, EmployeeType::Employee, &inputs(&configs, false));
        assert_eq!(short.price_amount, Decimal::ZERO);
        assert_eq!(short.total_amount, Decimal::ZERO);

        let mut enough = record(10, 1);
        price(&mut enough, EmployeeType::Employee, &inputs(&configs, false));
        assert_eq!(enough.price_amount, Decimal::from(80_000));
    }

    #[test]
    fn latest_active_premi_of_the_activity_applies() {
        let mut inactive = premi(5, 9000);
        inactive.active = false;
        let mut other_activity = premi(6, 7000);
        other_activity.activity_id = Some(99);
        let mut harvest_premi = premi(7, 8000);
        harvest_premi.premi_type = PremiType::MonthlyHarvest;
        let configs =
            vec![premi(1, 1000), premi(3, 2000), inactive, other_activity, harvest_premi];

        let resolved = resolve_activity_premi(&configs, ACTIVITY, None).unwrap();
        assert_eq!(resolved.id, 3);
        assert!(resolve_activity_premi(&configs, 42, None).is_none());
    }

    #[test]
    fn matching_condition_supplies_the_premi_amount() {
        let mut config = premi(1, 1000);
        config.use_condition = true;
        config.conditions = vec![PremiCondition {
            kind: ConditionKind::ByDay { day: 2 },
            harvest_base_qty: Decimal::ZERO,
            quantifiers: vec![],
            premi_amount: Decimal::from(2500),
        }];
        let configs = vec![config];

        let mut r = record(4, 1);
        price(&mut r, EmployeeType::Freelance, &inputs(&configs, false));
        assert_eq!(r.price_amount, Decimal::from(2500));
        assert_eq!(r.total_amount, Decimal::from(10_000));
    }

    #[test]
    fn activity_without_premi_pays_salary_or_nothing() {
        let mut salaried = record(4, 1);
        price(&mut salaried, EmployeeType::Employee, &inputs(&[], false));
        assert_eq!(salaried.premi_id, None);
        assert_eq!(salaried.total_amount, Decimal::from(80_000));

        let mut freelance = record(4, 1);
        price(&mut freelance, EmployeeType::Freelance, &inputs(&[], false));
        assert_eq!(freelance.total_amount, Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn total_is_price_times_units(
            quantity in 0..=500i64,
            days in 0..=5i64,
            amount in 0..=10_000i64,
            harvested in any::<bool>(),
        ) {
            let configs = vec![premi(1, amount)];
            let mut r = record(quantity, days);
            price(&mut r, EmployeeType::Employee, &inputs(&configs, harvested));

            let units = if harvested { Decimal::from(quantity) } else { Decimal::from(days) };
            prop_assert_eq!(r.total_amount, r.price_amount * units);
            prop_assert!(r.total_amount >= Decimal::ZERO);
        }
    }
}
