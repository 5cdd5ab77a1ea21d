//! Harvest operation and labour record models

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Harvest operation status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Draft,
    Validated,
    Posted,
    Locked,
    Cancelled,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Draft => "draft",
            OperationState::Validated => "validated",
            OperationState::Posted => "posted",
            OperationState::Locked => "locked",
            OperationState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(OperationState::Draft),
            "validated" => Some(OperationState::Validated),
            "posted" => Some(OperationState::Posted),
            "locked" => Some(OperationState::Locked),
            "cancelled" => Some(OperationState::Cancelled),
            _ => None,
        }
    }

    /// Labour records may only be added or removed while in draft
    pub fn ensure_editable(&self) -> DomainResult<()> {
        if *self == OperationState::Draft {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!("Record Already {}", self.label())))
        }
    }

    /// Label used in "Record Already {state}" messages
    pub fn label(&self) -> &'static str {
        match self {
            OperationState::Draft => "Draft",
            OperationState::Validated => "Validated",
            OperationState::Posted => "Posted",
            OperationState::Locked => "Locked",
            OperationState::Cancelled => "Cancelled",
        }
    }
}

/// A daily harvest activity for one afdeling, owning the labour records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOperation {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub operation_date: NaiveDate,
    pub operation_type_id: i64,
    pub afdeling_id: i64,
    pub foreman_id: Option<i64>,
    pub foreman_extra_id: Option<i64>,
    pub assistant_id: Option<i64>,
    pub clerk_id: Option<i64>,
    pub recorder_id: Option<i64>,
    pub state: OperationState,
}

impl HarvestOperation {
    pub fn validate(&mut self) -> DomainResult<()> {
        if self.state != OperationState::Draft {
            return Err(DomainError::invalid_state("Only draft operations can be validated"));
        }
        self.state = OperationState::Validated;
        Ok(())
    }

    pub fn post(&mut self) -> DomainResult<()> {
        match self.state {
            OperationState::Draft | OperationState::Validated => {
                self.state = OperationState::Posted;
                Ok(())
            }
            OperationState::Posted => Ok(()),
            _ => Err(DomainError::invalid_state(format!(
                "Cannot post an operation in {} state",
                self.state.as_str()
            ))),
        }
    }

    pub fn lock(&mut self) -> DomainResult<()> {
        if self.state != OperationState::Posted {
            return Err(DomainError::invalid_state("Only posted operations can be locked"));
        }
        self.state = OperationState::Locked;
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.state = OperationState::Cancelled;
    }

    pub fn reset_to_draft(&mut self) -> DomainResult<()> {
        match self.state {
            OperationState::Cancelled | OperationState::Validated | OperationState::Draft => {
                self.state = OperationState::Draft;
                Ok(())
            }
            _ => Err(DomainError::invalid_state(
                "Cannot reset a posted or locked operation to draft",
            )),
        }
    }

    pub fn ensure_editable(&self) -> DomainResult<()> {
        self.state.ensure_editable()
    }
}

/// Job-position price for one penalty type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PenaltyPosition {
    pub job_id: i64,
    pub amount: Decimal,
}

/// Harvest penalty catalogue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyType {
    pub id: i64,
    pub name: String,
    pub positions: Vec<PenaltyPosition>,
    #[serde(default)]
    pub foreman_amount: Decimal,
    #[serde(default)]
    pub extra_foreman_amount: Decimal,
    #[serde(default)]
    pub recorder_amount: Decimal,
}

impl PenaltyType {
    /// Unit price for the given job; the last matching position wins
    pub fn price_for_job(&self, job_id: Option<i64>) -> DomainResult<Decimal> {
        let job_id = job_id.ok_or_else(|| {
            DomainError::validation("Please set the job position for the worker first")
        })?;
        Ok(self
            .positions
            .iter()
            .rev()
            .find(|p| p.job_id == job_id)
            .map(|p| p.amount)
            .unwrap_or(Decimal::ZERO))
    }
}

/// One penalty booked on a labour record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarvestPenalty {
    pub penalty_type_id: i64,
    pub qty: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub foreman_total: Decimal,
    #[serde(default)]
    pub extra_foreman_total: Decimal,
    #[serde(default)]
    pub recorder_total: Decimal,
}

/// Employment contract status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    Draft,
    Open,
    Close,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmploymentContract {
    pub wage: Decimal,
    pub state: ContractState,
    pub date_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeType {
    #[default]
    Employee,
    Freelance,
}

impl EmployeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeType::Employee => "employee",
            EmployeeType::Freelance => "freelance",
        }
    }

    /// Unknown types are treated as regular employees
    pub fn parse(s: &str) -> Self {
        match s {
            "freelance" => EmployeeType::Freelance,
            _ => EmployeeType::Employee,
        }
    }
}

/// Estate worker with the data the premi engines need
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub job_id: Option<i64>,
    pub calendar_id: Option<i64>,
    #[serde(default)]
    pub employee_type: EmployeeType,
    pub contract: Option<EmploymentContract>,
}

impl Worker {
    /// Monthly wage spread over 30 days
    pub fn daily_wage(&self) -> DomainResult<Decimal> {
        match &self.contract {
            Some(c) if c.state == ContractState::Open => Ok(c.wage / Decimal::from(30)),
            _ => Err(DomainError::validation("Employee contract is not active")),
        }
    }

    /// Daily wage, or zero for a worker without an open contract
    pub fn daily_wage_or_zero(&self) -> Decimal {
        self.daily_wage().unwrap_or(Decimal::ZERO)
    }
}

/// One worker's harvest result for one block on one date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestLabourRecord {
    pub id: i64,
    pub operation_id: i64,
    pub worker_id: i64,
    pub block_id: i64,
    pub operation_date: NaiveDate,
    pub is_cancelled: bool,
    pub harvest_qty_unit: i32,
    pub other_harvest_qty: Decimal,
    /// Conversion from the other product's unit into its stock unit
    pub other_uom_factor: Decimal,

    pub avg_weight: Decimal,
    pub harvest_qty_weight: Decimal,
    pub premi_id: Option<i64>,
    pub base_weight: Decimal,
    pub base_extra_weight: Decimal,
    pub premi_base_extra: Decimal,
    pub attendance_premi: Decimal,
    pub other_harvest_premi: Decimal,
    pub total_premi: Decimal,
    pub daily_wages: Decimal,
    pub total_exclude_penalty: Decimal,
    pub penalties: Vec<HarvestPenalty>,
    pub penalty_total: Decimal,
    pub abnormal_unit: Decimal,
    pub total_include_penalty: Decimal,
}

impl HarvestLabourRecord {
    /// A fresh record with every computed figure zeroed
    pub fn new(
        id: i64,
        operation_id: i64,
        worker_id: i64,
        block_id: i64,
        operation_date: NaiveDate,
        harvest_qty_unit: i32,
    ) -> Self {
        Self {
            id,
            operation_id,
            worker_id,
            block_id,
            operation_date,
            is_cancelled: false,
            harvest_qty_unit,
            other_harvest_qty: Decimal::ZERO,
            other_uom_factor: Decimal::ONE,
            avg_weight: Decimal::ZERO,
            harvest_qty_weight: Decimal::ZERO,
            premi_id: None,
            base_weight: Decimal::ZERO,
            base_extra_weight: Decimal::ZERO,
            premi_base_extra: Decimal::ZERO,
            attendance_premi: Decimal::ZERO,
            other_harvest_premi: Decimal::ZERO,
            total_premi: Decimal::ZERO,
            daily_wages: Decimal::ZERO,
            total_exclude_penalty: Decimal::ZERO,
            penalties: Vec::new(),
            penalty_total: Decimal::ZERO,
            abnormal_unit: Decimal::ZERO,
            total_include_penalty: Decimal::ZERO,
        }
    }

    pub fn other_harvest_stock_qty(&self) -> Decimal {
        self.other_harvest_qty * self.other_uom_factor
    }

    /// `{product}/{block}/{YYYY/MM/DD}/{id}`
    pub fn display_name(&self, product_code: Option<&str>, block_code: &str) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{:02}/{}",
            product_code.unwrap_or("N/A"),
            block_code,
            self.operation_date.year(),
            self.operation_date.month(),
            self.operation_date.day(),
            self.id
        )
    }
}
