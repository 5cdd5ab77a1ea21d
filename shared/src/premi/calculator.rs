//! Harvest premi calculator
//!
//! Computes the bonus, wage and penalty breakdown of every labour record a
//! worker has on one day. Records are processed in insertion order (`id`
//! ascending): the daily base quantity is consumed by earlier records first,
//! and the attendance bonus and daily wage are credited to the first record
//! only.

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::{
    block_average_weight, AverageWeight, HarvestLabourRecord, Holiday, PenaltyType,
    PremiConfiguration, PremiQuantifier, PremiType, Worker,
};

/// A tier with its absolute threshold resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierRule {
    pub threshold: Decimal,
    pub rate: Decimal,
    pub attendance: Decimal,
}

impl TierRule {
    pub fn from_quantifier(base_qty: Decimal, q: &PremiQuantifier) -> Self {
        Self {
            threshold: q.base_quantifier(base_qty),
            rate: q.premi_extra,
            attendance: q.attendance_premi,
        }
    }
}

/// Aggregate bonus for a day before it is shared between records
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutcome {
    pub bonus: Decimal,
    /// Flat amount of the highest tier reached
    pub attendance: Decimal,
}

/// Reference data the calculator reads
#[derive(Debug, Clone, Copy)]
pub struct PremiInputs<'a> {
    pub configurations: &'a [PremiConfiguration],
    pub average_weights: &'a [AverageWeight],
    pub holidays: &'a [Holiday],
    pub penalty_types: &'a [PenaltyType],
}

/// Active monthly-harvest configuration for a block and month.
///
/// When several match, the one created first wins.
pub fn resolve_premi(
    configurations: &[PremiConfiguration],
    block_id: i64,
    month: u32,
) -> Option<&PremiConfiguration> {
    configurations
        .iter()
        .filter(|c| {
            c.active
                && c.premi_type == PremiType::MonthlyHarvest
                && c.block_id == Some(block_id)
                && c.covers_month(month)
        })
        .min_by_key(|c| c.id)
}

pub fn tier_rules(base_qty: Decimal, quantifiers: &[PremiQuantifier]) -> Vec<TierRule> {
    quantifiers
        .iter()
        .map(|q| TierRule::from_quantifier(base_qty, q))
        .collect()
}

/// Marginal bonus for `harvested` weight.
///
/// Tiers at or below the harvested weight are walked from the highest
/// threshold down; each one pays its rate only on the weight between its
/// threshold and what the higher tiers already paid for.
pub fn marginal_bonus(rules: &[TierRule], harvested: Decimal) -> StepOutcome {
    let mut applicable: Vec<&TierRule> = rules.iter().filter(|r| r.threshold <= harvested).collect();
    applicable.sort_by(|a, b| b.threshold.cmp(&a.threshold));

    let mut remaining = harvested;
    let mut bonus = Decimal::ZERO;
    for rule in &applicable {
        let net = (remaining - rule.threshold).max(Decimal::ZERO);
        bonus += rule.rate * net;
        remaining -= net;
    }

    StepOutcome {
        bonus,
        attendance: applicable.first().map(|r| r.attendance).unwrap_or(Decimal::ZERO),
    }
}

/// Share of the day's bonus earned by one record
pub fn distribute(bonus: Decimal, day_total: Decimal, record_weight: Decimal) -> Decimal {
    if day_total.is_zero() {
        Decimal::ZERO
    } else {
        bonus / day_total * record_weight
    }
}

/// Base quantity left after earlier records of the day, never negative
pub fn effective_base(base_qty: Decimal, prior_weight: Decimal) -> Decimal {
    (base_qty - prior_weight).max(Decimal::ZERO)
}

/// Recompute every record of one worker on one day.
///
/// `records` may arrive in any order and may include cancelled records,
/// which are left untouched and ignored for the daily totals.
pub fn recompute_worker_day(
    records: &mut [HarvestLabourRecord],
    worker: &Worker,
    inputs: &PremiInputs<'_>,
) -> DomainResult<()> {
    records.sort_by_key(|r| r.id);

    for record in records.iter_mut().filter(|r| !r.is_cancelled) {
        record.avg_weight = block_average_weight(
            inputs.average_weights,
            record.block_id,
            record.operation_date.year(),
        );
        record.harvest_qty_weight = record.avg_weight * Decimal::from(record.harvest_qty_unit);
    }

    let day_total: Decimal = records
        .iter()
        .filter(|r| !r.is_cancelled)
        .map(|r| r.harvest_qty_weight)
        .sum();

    let wage = worker.daily_wage()?;
    let mut prior_weight = Decimal::ZERO;

    for (position, record) in records.iter_mut().filter(|r| !r.is_cancelled).enumerate() {
        let first_of_day = position == 0;
        let premi = resolve_premi(
            inputs.configurations,
            record.block_id,
            record.operation_date.month(),
        );
        apply_premi(record, premi, worker, inputs, day_total, prior_weight, first_of_day);
        record.daily_wages = if first_of_day { wage } else { Decimal::ZERO };
        apply_penalties(record, worker, inputs.penalty_types)?;

        record.total_exclude_penalty = record.total_premi + record.daily_wages;
        record.total_include_penalty = record.total_exclude_penalty - record.penalty_total;

        prior_weight += record.harvest_qty_weight;
    }

    Ok(())
}

fn apply_premi(
    record: &mut HarvestLabourRecord,
    premi: Option<&PremiConfiguration>,
    worker: &Worker,
    inputs: &PremiInputs<'_>,
    day_total: Decimal,
    prior_weight: Decimal,
    first_of_day: bool,
) {
    record.premi_id = premi.map(|p| p.id);
    record.base_extra_weight = Decimal::ZERO;
    record.premi_base_extra = Decimal::ZERO;
    record.attendance_premi = Decimal::ZERO;
    record.other_harvest_premi = Decimal::ZERO;

    let Some(premi) = premi else {
        record.base_weight = Decimal::ZERO;
        record.total_premi = Decimal::ZERO;
        return;
    };

    record.base_weight = effective_base(premi.harvest_base_qty, prior_weight);
    record.other_harvest_premi = premi.other_harvest_premi * record.other_harvest_stock_qty();

    let extra = record.harvest_qty_weight - record.base_weight;
    if extra > Decimal::ZERO {
        record.base_extra_weight = extra;

        let condition = premi.condition_for(
            record.operation_date,
            worker.calendar_id,
            inputs.holidays,
        );
        let rules = match condition {
            Some(c) => tier_rules(c.harvest_base_qty, &c.quantifiers),
            None => tier_rules(premi.harvest_base_qty, &premi.quantifiers),
        };
        let outcome = marginal_bonus(&rules, day_total);

        record.premi_base_extra = distribute(outcome.bonus, day_total, record.harvest_qty_weight);
        if first_of_day && condition.is_none() {
            record.attendance_premi = outcome.attendance;
        }
    }

    record.total_premi =
        record.premi_base_extra + record.attendance_premi + record.other_harvest_premi;
}

fn apply_penalties(
    record: &mut HarvestLabourRecord,
    worker: &Worker,
    penalty_types: &[PenaltyType],
) -> DomainResult<()> {
    for line in &mut record.penalties {
        let penalty = penalty_types
            .iter()
            .find(|p| p.id == line.penalty_type_id)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "Penalty type {} does not exist",
                    line.penalty_type_id
                ))
            })?;
        line.price = penalty.price_for_job(worker.job_id)?;
        line.subtotal = line.qty * line.price;
        line.foreman_total = line.qty * penalty.foreman_amount;
        line.extra_foreman_total = line.qty * penalty.extra_foreman_amount;
        line.recorder_total = line.qty * penalty.recorder_amount;
    }
    record.penalty_total = record.penalties.iter().map(|p| p.subtotal).sum();
    record.abnormal_unit = record.penalties.iter().map(|p| p.qty).sum();
    Ok(())
}
