//! Supervisor premi: daily premi for field supervisors and the monthly
//! afdeling/estate premi lines.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::{HarvestLabourRecord, HarvestOperation};
use crate::types::DateRange;

/// Supervisory role a daily premi is paid for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorRole {
    Foreman,
    ExtraForeman,
    Clerk,
    Recorder,
}

impl SupervisorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorRole::Foreman => "foreman",
            SupervisorRole::ExtraForeman => "extra_foreman",
            SupervisorRole::Clerk => "clerk",
            SupervisorRole::Recorder => "recorder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "foreman" => Some(SupervisorRole::Foreman),
            "extra_foreman" => Some(SupervisorRole::ExtraForeman),
            "clerk" => Some(SupervisorRole::Clerk),
            "recorder" => Some(SupervisorRole::Recorder),
            _ => None,
        }
    }

    /// Whether `employee_id` holds this role on the operation
    pub fn supervises(&self, operation: &HarvestOperation, employee_id: i64) -> bool {
        let assigned = match self {
            SupervisorRole::Foreman => operation.foreman_id,
            SupervisorRole::ExtraForeman => operation.foreman_extra_id,
            SupervisorRole::Clerk => operation.clerk_id,
            SupervisorRole::Recorder => operation.recorder_id,
        };
        assigned == Some(employee_id)
    }

    /// The part of a record's penalties charged to this role
    pub fn penalty_share(&self, record: &HarvestLabourRecord) -> Decimal {
        record
            .penalties
            .iter()
            .map(|p| match self {
                SupervisorRole::Foreman => p.foreman_total,
                SupervisorRole::ExtraForeman => p.extra_foreman_total,
                SupervisorRole::Recorder => p.recorder_total,
                SupervisorRole::Clerk => Decimal::ZERO,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PremiDocumentState {
    Draft,
    Posted,
    Done,
    Cancelled,
}

impl PremiDocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiDocumentState::Draft => "draft",
            PremiDocumentState::Posted => "posted",
            PremiDocumentState::Done => "done",
            PremiDocumentState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PremiDocumentState::Draft),
            "posted" => Some(PremiDocumentState::Posted),
            "done" => Some(PremiDocumentState::Done),
            "cancelled" => Some(PremiDocumentState::Cancelled),
            _ => None,
        }
    }
}

/// A supervised worker's premi for the day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiSource {
    pub worker_id: i64,
    pub total_premi: Decimal,
}

/// Daily premi of one supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySupervisorPremi {
    pub employee_id: i64,
    pub date: NaiveDate,
    pub role: SupervisorRole,
    /// Percentage applied to the average worker premi
    pub multiplier: Decimal,
    pub additional_premi: Decimal,
    pub penalty_deduction: Decimal,
    pub sources: Vec<PremiSource>,
    pub premi_total: Decimal,
    pub state: PremiDocumentState,
}

impl DailySupervisorPremi {
    /// Gather sources and penalties from the day's operations
    pub fn collect(
        employee_id: i64,
        date: NaiveDate,
        role: SupervisorRole,
        multiplier: Decimal,
        operations: &[HarvestOperation],
        records: &[HarvestLabourRecord],
    ) -> Self {
        let supervised: Vec<i64> = operations
            .iter()
            .filter(|op| op.operation_date == date && role.supervises(op, employee_id))
            .map(|op| op.id)
            .collect();

        let mut per_worker: BTreeMap<i64, Decimal> = BTreeMap::new();
        let mut penalty_deduction = Decimal::ZERO;
        for record in records
            .iter()
            .filter(|r| !r.is_cancelled && supervised.contains(&r.operation_id))
        {
            *per_worker.entry(record.worker_id).or_default() += record.total_premi;
            penalty_deduction += role.penalty_share(record);
        }

        let mut premi = Self {
            employee_id,
            date,
            role,
            multiplier,
            additional_premi: Decimal::ZERO,
            penalty_deduction,
            sources: per_worker
                .into_iter()
                .map(|(worker_id, total_premi)| PremiSource { worker_id, total_premi })
                .collect(),
            premi_total: Decimal::ZERO,
            state: PremiDocumentState::Draft,
        };
        premi.recompute();
        premi
    }

    pub fn recompute(&mut self) {
        let count = Decimal::from(self.sources.len());
        let sum: Decimal = self.sources.iter().map(|s| s.total_premi).sum();
        self.premi_total = if count.is_zero() || sum.is_zero() || self.multiplier.is_zero() {
            self.additional_premi
        } else {
            (sum / count) * (self.multiplier / Decimal::from(100)) + self.additional_premi
                - self.penalty_deduction
        };
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.state == PremiDocumentState::Draft {
            Ok(())
        } else {
            Err(DomainError::invalid_state("Only draft premi can be deleted"))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityOperator {
    Equals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// Reward paid when the harvested quality compares to `percentage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRule {
    pub operator: QualityOperator,
    pub percentage: Decimal,
    pub amount: Decimal,
}

/// Reward for a harvested quality percentage.
///
/// An `Equals` rule that matches is returned at once; otherwise the last
/// matching comparison rule wins.
pub fn quality_reward(rules: &[QualityRule], quality: Decimal) -> (Decimal, bool) {
    let mut reward = Decimal::ZERO;
    for rule in rules {
        let matched = match rule.operator {
            QualityOperator::Equals => {
                if rule.percentage == quality {
                    return (rule.amount, true);
                }
                false
            }
            QualityOperator::GreaterThan => quality > rule.percentage,
            QualityOperator::GreaterThanOrEqual => quality >= rule.percentage,
            QualityOperator::LessThan => quality < rule.percentage,
            QualityOperator::LessThanOrEqual => quality <= rule.percentage,
        };
        if matched {
            reward = rule.amount;
        }
    }
    (reward, false)
}

/// Inputs of a monthly afdeling premi line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfdelingPremiInput {
    pub employee_id: i64,
    pub employee_start: Option<NaiveDate>,
    pub actual_harvest: Decimal,
    pub planned_optimal: Decimal,
    pub planned_maximum: Decimal,
    pub premi_optimal: Decimal,
    pub premi_maximum: Decimal,
    pub harvest_quality: Decimal,
    pub multiplier: Decimal,
    #[serde(default)]
    pub deduction: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AfdelingPremiLine {
    pub employee_id: i64,
    pub quantity_premi: Decimal,
    pub quality_premi: Decimal,
    pub employee_premi: Decimal,
}

pub fn afdeling_premi(
    input: &AfdelingPremiInput,
    rules: &[QualityRule],
    period: &DateRange,
) -> AfdelingPremiLine {
    let mut line = AfdelingPremiLine {
        employee_id: input.employee_id,
        quantity_premi: Decimal::ZERO,
        quality_premi: Decimal::ZERO,
        employee_premi: Decimal::ZERO,
    };
    if input.planned_optimal.is_zero()
        || input.planned_maximum.is_zero()
        || input.actual_harvest.is_zero()
    {
        return line;
    }

    line.quantity_premi = if input.actual_harvest >= input.planned_maximum {
        (input.actual_harvest - input.planned_maximum) * Decimal::from(2) + input.premi_maximum
    } else {
        input.actual_harvest / input.planned_optimal * input.premi_optimal
    };

    let (reward, exact) = quality_reward(rules, input.harvest_quality);
    line.quality_premi = if exact {
        reward
    } else {
        prorate_quality(reward, input.employee_start, period)
    };

    line.employee_premi = (line.quantity_premi + line.quality_premi)
        * (input.multiplier / Decimal::from(100))
        - input.deduction;
    line
}

fn prorate_quality(reward: Decimal, start: Option<NaiveDate>, period: &DateRange) -> Decimal {
    match start {
        Some(start) if start >= period.end => Decimal::ZERO,
        Some(start) if start >= period.start => {
            let days = (period.end - start).num_days() + 2;
            reward / Decimal::from(30) * Decimal::from(days)
        }
        _ => reward,
    }
}

/// Estate manager premi: average afdeling premi scaled by the multiplier
pub fn estate_premi(afdeling_premis: &[Decimal], multiplier: Decimal) -> Decimal {
    if afdeling_premis.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = afdeling_premis.iter().sum();
    sum / Decimal::from(afdeling_premis.len()) * (multiplier / Decimal::from(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HarvestPenalty, OperationState};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn operation(id: i64, foreman: i64) -> HarvestOperation {
        HarvestOperation {
            id,
            name: format!("OP/{id}"),
            company_id: None,
            operation_date: date(10),
            operation_type_id: 1,
            afdeling_id: 1,
            foreman_id: Some(foreman),
            foreman_extra_id: None,
            assistant_id: None,
            clerk_id: None,
            recorder_id: None,
            state: OperationState::Posted,
        }
    }

    fn record(id: i64, op: i64, worker: i64, premi: i64) -> HarvestLabourRecord {
        let mut r = HarvestLabourRecord::new(id, op, worker, 1, date(10), 10);
        r.total_premi = Decimal::from(premi);
        r
    }

    #[test]
    fn foreman_premi_averages_supervised_workers() {
        let ops = vec![operation(1, 77), operation(2, 88)];
        let mut penalised = record(3, 1, 11, 4000);
        penalised.penalties.push(HarvestPenalty {
            penalty_type_id: 1,
            qty: Decimal::ONE,
            price: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            foreman_total: Decimal::from(500),
            extra_foreman_total: Decimal::ZERO,
            recorder_total: Decimal::ZERO,
        });
        let records = vec![record(1, 1, 10, 10_000), record(2, 1, 11, 6000), penalised, record(4, 2, 12, 99_999)];

        let premi = DailySupervisorPremi::collect(
            77,
            date(10),
            SupervisorRole::Foreman,
            Decimal::from(150),
            &ops,
            &records,
        );
        assert_eq!(premi.sources.len(), 2);
        assert_eq!(premi.penalty_deduction, Decimal::from(500));
        // (20000 / 2) * 1.5 - 500
        assert_eq!(premi.premi_total, Decimal::from(14_500));
        assert!(premi.ensure_deletable().is_ok());
    }

    #[test]
    fn no_sources_pays_only_additional() {
        let mut premi = DailySupervisorPremi::collect(
            1,
            date(10),
            SupervisorRole::Clerk,
            Decimal::from(100),
            &[],
            &[],
        );
        premi.additional_premi = Decimal::from(2500);
        premi.recompute();
        assert_eq!(premi.premi_total, Decimal::from(2500));
    }

    #[test]
    fn equals_rule_has_priority() {
        let rules = vec![
            QualityRule {
                operator: QualityOperator::GreaterThanOrEqual,
                percentage: Decimal::from(90),
                amount: Decimal::from(100),
            },
            QualityRule {
                operator: QualityOperator::Equals,
                percentage: Decimal::from(95),
                amount: Decimal::from(300),
            },
            QualityRule {
                operator: QualityOperator::GreaterThan,
                percentage: Decimal::from(92),
                amount: Decimal::from(200),
            },
        ];
        assert_eq!(quality_reward(&rules, Decimal::from(95)), (Decimal::from(300), true));
        assert_eq!(quality_reward(&rules, Decimal::from(96)), (Decimal::from(200), false));
        assert_eq!(quality_reward(&rules, Decimal::from(91)), (Decimal::from(100), false));
        assert_eq!(quality_reward(&rules, Decimal::from(50)), (Decimal::ZERO, false));
    }

    fn afdeling_input(actual: i64, start: Option<NaiveDate>) -> AfdelingPremiInput {
        AfdelingPremiInput {
            employee_id: 1,
            employee_start: start,
            actual_harvest: Decimal::from(actual),
            planned_optimal: Decimal::from(100),
            planned_maximum: Decimal::from(120),
            premi_optimal: Decimal::from(1000),
            premi_maximum: Decimal::from(1500),
            harvest_quality: Decimal::from(95),
            multiplier: Decimal::from(100),
            deduction: Decimal::ZERO,
        }
    }

    fn rules() -> Vec<QualityRule> {
        vec![QualityRule {
            operator: QualityOperator::GreaterThan,
            percentage: Decimal::from(90),
            amount: Decimal::from(300),
        }]
    }

    #[test]
    fn afdeling_premi_above_maximum() {
        let period = DateRange { start: date(1), end: date(30) };
        let line = afdeling_premi(&afdeling_input(130, None), &rules(), &period);
        assert_eq!(line.quantity_premi, Decimal::from(1520));
        assert_eq!(line.quality_premi, Decimal::from(300));
        assert_eq!(line.employee_premi, Decimal::from(1820));
    }

    #[test]
    fn afdeling_premi_below_maximum_and_prorated() {
        let period = DateRange { start: date(1), end: date(30) };
        let line = afdeling_premi(&afdeling_input(50, Some(date(20))), &rules(), &period);
        assert_eq!(line.quantity_premi, Decimal::from(500));
        // 300 / 30 * (10 + 2)
        assert_eq!(line.quality_premi, Decimal::from(120));

        let late = afdeling_premi(&afdeling_input(50, Some(date(30))), &rules(), &period);
        assert_eq!(late.quality_premi, Decimal::ZERO);
    }

    #[test]
    fn estate_premi_averages_afdelings() {
        let premis = vec![Decimal::from(1000), Decimal::from(2000)];
        assert_eq!(estate_premi(&premis, Decimal::from(120)), Decimal::from(1800));
        assert_eq!(estate_premi(&[], Decimal::from(120)), Decimal::ZERO);
    }
}
