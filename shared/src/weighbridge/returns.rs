//! Returning posted tickets

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditLog, ScaleBook, StockLayer};
use crate::error::{DomainError, DomainResult};
use crate::models::{ScaleState, SourceKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    /// Unload readings mirror the original ticket; the return is posted at once
    Full,
    /// Unload readings follow the return's own weights; stays draft
    Partial,
}

/// One ticket to return, with optional corrected weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLine {
    pub ticket_id: Uuid,
    #[serde(default)]
    pub weight_in: Option<Decimal>,
    #[serde(default)]
    pub weight_out: Option<Decimal>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub licence_plate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub method: ReturnMethod,
    pub reason: String,
    pub date: NaiveDate,
    pub lines: Vec<ReturnLine>,
}

impl ScaleBook {
    /// Create one return ticket per line with swapped weights.
    ///
    /// The originals keep their state and receive an audit message.
    pub fn return_tickets(
        &mut self,
        request: &ReturnRequest,
        stock: &mut dyn StockLayer,
        audit: &mut dyn AuditLog,
    ) -> DomainResult<Vec<Uuid>> {
        for line in &request.lines {
            let source = self.ticket(line.ticket_id)?;
            if !matches!(source.state, ScaleState::Posted | ScaleState::Locked) {
                return Err(DomainError::validation(
                    "You can only return posted or locked ticket.",
                ));
            }
        }

        let mut created = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let source = self.ticket(line.ticket_id)?.clone();

            let mut returned = source.clone();
            returned.id = Uuid::new_v4();
            returned.name = self.allocate_name();
            returned.ref_id = None;
            returned.state = ScaleState::Draft;
            returned.is_return = true;
            returned.source_id = Some(source.id);
            returned.source_kind = Some(SourceKind::Return);
            returned.merged_to = None;
            returned.date = request.date;
            returned.remark = Some(request.reason.clone());
            returned.weight_in = line.weight_in.unwrap_or(source.weight_out);
            returned.weight_out = line.weight_out.unwrap_or(source.weight_in);
            if line.driver_name.is_some() {
                returned.driver_name = line.driver_name.clone();
            }
            if line.licence_plate.is_some() {
                returned.licence_plate = line.licence_plate.clone();
            }
            let (unload_in, unload_out) = match request.method {
                ReturnMethod::Full => (source.weight_in, source.weight_out),
                ReturnMethod::Partial => (returned.weight_out, returned.weight_in),
            };
            returned.unload_in = unload_in;
            returned.unload_out = unload_out;
            returned.additional_unload = Decimal::ZERO;
            returned.gross_quality_control = Decimal::ZERO;

            let returned_id = self.insert_ticket(returned);
            self.recompute(returned_id)?;

            audit.post(returned_id, format!("Return Scale Ticket from {}", source.name));
            audit.post(source.id, "Scale has been returned.".to_string());
            if request.method == ReturnMethod::Full {
                self.post(returned_id, stock)?;
            }
            created.push(returned_id);
        }
        Ok(created)
    }
}
