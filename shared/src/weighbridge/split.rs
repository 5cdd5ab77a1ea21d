//! Splitting one draft ticket into two children

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScaleBook;
use crate::error::{DomainError, DomainResult};
use crate::models::{
    CalculationType, DeliveryType, QcState, QualityControl, ScaleState, ScaleTicket, SourceKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRequest {
    /// Net-after-QC weight of the first child
    pub netto: Decimal,
    /// Quantity of the first child; zero leaves all quantity on the second
    #[serde(default)]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitOutcome {
    pub first: Uuid,
    pub second: Uuid,
}

/// Which part of the original a child receives
#[derive(Clone, Copy)]
enum Share {
    Ratio(Decimal),
    Remainder(Decimal),
}

impl Share {
    fn of(self, total: Decimal) -> Decimal {
        match self {
            Share::Ratio(r) => total * r,
            Share::Remainder(r) => total - total * r,
        }
    }
}

impl ScaleBook {
    /// Split a draft ticket by the requested first-child net weight.
    ///
    /// Weights, deductions and quality-control lines are apportioned by the
    /// ratio `netto / net_after_quality_control` so the children's
    /// net-after-QC weights add up to the original's.
    pub fn split(&mut self, ids: &[Uuid], request: &SplitRequest) -> DomainResult<SplitOutcome> {
        let id = match ids {
            [id] => *id,
            _ => return Err(DomainError::validation("You can only split one scale at a time")),
        };
        if self.ticket(id)?.state != ScaleState::Draft {
            return Err(DomainError::validation("You can only split scale in draft state"));
        }

        self.recompute(id)?;
        let original = self.ticket(id)?.clone();
        let original_netto = original.net_after_quality_control;
        if request.netto <= Decimal::ZERO
            || request.netto >= original_netto
            || (request.quantity >= original.quantity && request.quantity > Decimal::ZERO)
        {
            return Err(DomainError::validation(
                "The split weight and quantity must be less than the original ticket",
            ));
        }

        let ratio = request.netto / original_netto;
        let first = self.spawn_child(&original, 1, Share::Ratio(ratio), request.quantity)?;
        let second = self.spawn_child(
            &original,
            2,
            Share::Remainder(ratio),
            original.quantity - request.quantity,
        )?;

        self.ticket_mut(id)?.state = ScaleState::Split;
        for qc in self.quality_controls_of_mut(id) {
            if qc.is_live() {
                qc.state = QcState::Split;
            }
        }

        Ok(SplitOutcome { first, second })
    }

    fn spawn_child(
        &mut self,
        original: &ScaleTicket,
        index: u8,
        share: Share,
        quantity: Decimal,
    ) -> DomainResult<Uuid> {
        let child_net = share.of(original.net_weight);

        let mut child = original.clone();
        child.id = Uuid::new_v4();
        child.name = format!("{}-{}", original.name, index);
        child.state = ScaleState::Draft;
        child.source_id = Some(original.id);
        child.source_kind = Some(SourceKind::Split);
        child.merged_to = None;
        child.quantity = quantity;
        match original.delivery_type {
            Some(DeliveryType::Shipment) => child.weight_out = original.weight_in + child_net,
            _ => child.weight_in = original.weight_out + child_net,
        }
        child.gross_quality_control = share.of(original.gross_quality_control);
        child.additional_unload = share.of(original.additional_unload);
        child.unload_in = Decimal::ZERO;
        child.unload_out = Decimal::ZERO;
        let child_id = self.insert_ticket(child);

        let clones: Vec<QualityControl> = self
            .quality_controls_of(original.id)
            .filter(|qc| qc.is_live())
            .map(|qc| {
                let mut copy = qc.clone();
                copy.id = Uuid::new_v4();
                copy.name = format!("{}-{}", qc.name, index);
                copy.ticket_id = Some(child_id);
                copy.source_id = Some(qc.id);
                copy.merged_to = None;
                copy.state = QcState::Draft;
                for line in &mut copy.penalties {
                    if line.calculation_type != CalculationType::Percentage {
                        line.penalty_qty = share.of(line.penalty_qty);
                    }
                }
                for line in &mut copy.returns {
                    line.return_qty = share.of(line.return_qty);
                }
                copy
            })
            .collect();
        for qc in clones {
            self.insert_quality_control(qc);
        }

        self.recompute(child_id)?;
        Ok(child_id)
    }
}
