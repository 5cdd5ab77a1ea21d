//! Quality-control models for scale tickets

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a penalty line turns its quantity into a weight deduction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    #[default]
    PerQty,
    PerUnit,
    Percentage,
}

impl CalculationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationType::PerQty => "per_qty",
            CalculationType::PerUnit => "per_unit",
            CalculationType::Percentage => "percentage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "per_qty" => Some(CalculationType::PerQty),
            "per_unit" => Some(CalculationType::PerUnit),
            "percentage" => Some(CalculationType::Percentage),
            _ => None,
        }
    }

    /// Unit label shown to mobile clients
    pub fn unit_label(&self) -> &'static str {
        match self {
            CalculationType::PerQty => "kg",
            CalculationType::PerUnit => "unit",
            CalculationType::Percentage => "%",
        }
    }

    /// Deduction for `qty` against the ticket's scale quantity.
    ///
    /// `PerUnit` contributes nothing.
    pub fn subtotal(&self, qty: Decimal, scale_qty: Decimal) -> Decimal {
        match self {
            CalculationType::PerQty => qty,
            CalculationType::PerUnit => Decimal::ZERO,
            CalculationType::Percentage => scale_qty * qty / Decimal::from(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    Quality,
    Return,
    Deduction,
    Fraction,
}

impl QualityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCategory::Quality => "quality",
            QualityCategory::Return => "return",
            QualityCategory::Deduction => "deduction",
            QualityCategory::Fraction => "fraction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quality" => Some(QualityCategory::Quality),
            "return" => Some(QualityCategory::Return),
            "deduction" => Some(QualityCategory::Deduction),
            "fraction" => Some(QualityCategory::Fraction),
            _ => None,
        }
    }
}

/// Catalogue entry for penalty, return and fraction lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityType {
    pub id: i64,
    pub name: String,
    pub category: QualityCategory,
    pub calculation_type: CalculationType,
    pub remark: Option<String>,
}

/// Quality-control record status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QcState {
    Draft,
    Posted,
    Locked,
    Split,
    Merged,
    Cancelled,
}

impl QcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcState::Draft => "draft",
            QcState::Posted => "posted",
            QcState::Locked => "locked",
            QcState::Split => "split",
            QcState::Merged => "merged",
            QcState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QcState::Draft),
            "posted" => Some(QcState::Posted),
            "locked" => Some(QcState::Locked),
            "split" => Some(QcState::Split),
            "merged" => Some(QcState::Merged),
            "cancelled" => Some(QcState::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QcPenaltyLine {
    pub quality_type_id: i64,
    pub calculation_type: CalculationType,
    pub penalty_qty: Decimal,
    #[serde(default)]
    pub penalty_subtotal: Decimal,
}

impl QcPenaltyLine {
    pub fn new(quality_type_id: i64, calculation_type: CalculationType, penalty_qty: Decimal) -> Self {
        Self {
            quality_type_id,
            calculation_type,
            penalty_qty,
            penalty_subtotal: Decimal::ZERO,
        }
    }

    pub fn recompute(&mut self, scale_qty: Decimal) {
        self.penalty_subtotal = if self.penalty_qty.is_zero() {
            Decimal::ZERO
        } else {
            self.calculation_type.subtotal(self.penalty_qty, scale_qty)
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QcReturnLine {
    pub quality_type_id: i64,
    pub return_qty: Decimal,
}

/// Penalty and return lines attached to one scale ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityControl {
    pub id: Uuid,
    pub name: String,
    pub ref_id: Option<String>,
    pub ticket_id: Option<Uuid>,
    pub date: NaiveDate,
    pub delivery_number: Option<String>,
    pub state: QcState,
    pub source_id: Option<Uuid>,
    pub merged_to: Option<Uuid>,
    pub scale_qty: Decimal,
    pub penalties: Vec<QcPenaltyLine>,
    pub returns: Vec<QcReturnLine>,
    pub penalty_qty_total: Decimal,
    pub return_qty_total: Decimal,
}

impl QualityControl {
    pub fn draft(name: impl Into<String>, ticket_id: Option<Uuid>, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ref_id: None,
            ticket_id,
            date,
            delivery_number: None,
            state: QcState::Draft,
            source_id: None,
            merged_to: None,
            scale_qty: Decimal::ZERO,
            penalties: Vec::new(),
            returns: Vec::new(),
            penalty_qty_total: Decimal::ZERO,
            return_qty_total: Decimal::ZERO,
        }
    }

    /// Re-derive line subtotals and totals for the ticket's net weight
    pub fn recompute(&mut self, scale_qty: Decimal) {
        self.scale_qty = scale_qty;
        for line in &mut self.penalties {
            line.recompute(scale_qty);
        }
        self.penalty_qty_total = self.penalties.iter().map(|l| l.penalty_subtotal).sum();
        self.return_qty_total = self.returns.iter().map(|l| l.return_qty).sum();
    }

    /// Counted in the ticket deduction
    pub fn is_live(&self) -> bool {
        self.state != QcState::Cancelled
    }
}
