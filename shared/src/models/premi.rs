//! Premi (bonus) configuration models

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of bonus rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PremiType {
    NonHarvest,
    LoadedPremi,
    MonthlyHarvest,
}

impl PremiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiType::NonHarvest => "non_harvest",
            PremiType::LoadedPremi => "loaded_premi",
            PremiType::MonthlyHarvest => "monthly_harvest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "non_harvest" => Some(PremiType::NonHarvest),
            "loaded_premi" => Some(PremiType::LoadedPremi),
            "monthly_harvest" => Some(PremiType::MonthlyHarvest),
            _ => None,
        }
    }
}

/// One tier of a premi configuration.
///
/// The tier threshold is `base_qty × quantifier`; harvested weight above
/// the threshold earns `premi_extra` per unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiQuantifier {
    pub quantifier: Decimal,
    pub premi_extra: Decimal,
    #[serde(default)]
    pub attendance_premi: Decimal,
}

impl PremiQuantifier {
    pub fn base_quantifier(&self, base_qty: Decimal) -> Decimal {
        base_qty * self.quantifier
    }
}

/// What makes a condition override apply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionKind {
    /// ISO weekday, Monday = 1 .. Sunday = 7
    ByDay { day: u32 },
    ByHolidays,
}

/// Day-of-week or holiday override with its own base quantity and tiers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiCondition {
    #[serde(flatten)]
    pub kind: ConditionKind,
    pub harvest_base_qty: Decimal,
    #[serde(default)]
    pub quantifiers: Vec<PremiQuantifier>,
    /// Flat premi paid for non-harvest work on a matching day
    #[serde(default)]
    pub premi_amount: Decimal,
}

/// A named bonus rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiConfiguration {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub active: bool,
    pub premi_type: PremiType,
    pub block_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub start_month: Option<u32>,
    pub end_month: Option<u32>,
    pub harvest_base_qty: Decimal,
    pub other_harvest_premi: Decimal,
    pub use_condition: bool,
    pub quantifiers: Vec<PremiQuantifier>,
    pub conditions: Vec<PremiCondition>,
    /// Flat premi per unit of non-harvest work
    #[serde(default)]
    pub premi_amount: Decimal,
    /// Pay the premi amount even to salaried workers
    #[serde(default)]
    pub force_premi_amount: bool,
    /// Salaried work below this quantity earns no wage; 0 disables the check
    #[serde(default)]
    pub minimal_unit: Decimal,
}

impl PremiConfiguration {
    /// Whether the inclusive month window contains `month`
    pub fn covers_month(&self, month: u32) -> bool {
        match (self.start_month, self.end_month) {
            (Some(start), Some(end)) => start <= month && month <= end,
            _ => false,
        }
    }

    /// First condition matching the worker's date, when conditions are enabled
    pub fn condition_for(
        &self,
        date: NaiveDate,
        calendar_id: Option<i64>,
        holidays: &[Holiday],
    ) -> Option<&PremiCondition> {
        if !self.use_condition {
            return None;
        }
        self.conditions.iter().find(|c| match c.kind {
            ConditionKind::ByDay { day } => date.weekday().number_from_monday() == day,
            ConditionKind::ByHolidays => holidays.iter().any(|h| h.applies_to(date, calendar_id)),
        })
    }
}

/// A public or calendar-specific leave period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: i64,
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// `None` means the holiday applies to every working calendar
    pub calendar_id: Option<i64>,
}

impl Holiday {
    pub fn applies_to(&self, date: NaiveDate, calendar_id: Option<i64>) -> bool {
        let in_range = self.date_from <= date && date <= self.date_to;
        let calendar_match = match self.calendar_id {
            None => true,
            Some(own) => calendar_id == Some(own),
        };
        in_range && calendar_match
    }
}
