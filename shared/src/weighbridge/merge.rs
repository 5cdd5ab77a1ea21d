//! Merging several draft tickets into one

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScaleBook;
use crate::error::{DomainError, DomainResult};
use crate::models::{
    QcPenaltyLine, QcReturnLine, QcState, QualityControl, ScaleState, ScaleTicket, SourceKind,
    NEW_TICKET_NAME,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub ticket_ids: Vec<Uuid>,
    /// Ticket whose header is copied; defaults to the first selected
    #[serde(default)]
    pub merge_to: Option<Uuid>,
    pub date: NaiveDate,
}

pub const DUPLICATE_MERGE_SOURCE: &str = "You cannot merge the same scale more than once";

/// Reject a selection that names the same ticket twice
pub fn ensure_distinct_tickets(ticket_ids: &[Uuid]) -> DomainResult<()> {
    for (i, id) in ticket_ids.iter().enumerate() {
        if ticket_ids[..i].contains(id) {
            return Err(DomainError::validation(DUPLICATE_MERGE_SOURCE));
        }
    }
    Ok(())
}

impl ScaleBook {
    /// Merge draft tickets of one partner, product and weighbridge
    pub fn merge(&mut self, request: &MergeRequest) -> DomainResult<Uuid> {
        if request.ticket_ids.len() < 2 {
            return Err(DomainError::validation(
                "You need to choose more than one scale at a time to do merge",
            ));
        }
        ensure_distinct_tickets(&request.ticket_ids)?;
        for id in &request.ticket_ids {
            self.recompute(*id)?;
        }
        let sources: Vec<ScaleTicket> = request
            .ticket_ids
            .iter()
            .map(|id| self.ticket(*id).cloned())
            .collect::<DomainResult<_>>()?;
        validate_merge(&sources)?;

        let base_id = request.merge_to.unwrap_or(request.ticket_ids[0]);
        let base = sources
            .iter()
            .find(|t| t.id == base_id)
            .ok_or_else(|| DomainError::validation("The merge target must be one of the selected scales"))?;

        let mut merged = base.clone();
        merged.id = Uuid::new_v4();
        merged.name = self.allocate_name();
        merged.date = request.date;
        merged.state = ScaleState::Draft;
        merged.source_id = None;
        merged.source_kind = Some(SourceKind::Merge);
        merged.merged_to = None;
        merged.delivery_number = join_delivery_numbers(&sources);
        merged.quantity = sources.iter().map(|t| t.quantity).sum();
        merged.weight_in = sources.iter().map(|t| t.weight_in).sum();
        merged.weight_out = sources.iter().map(|t| t.weight_out).sum();
        merged.gross_quality_control = sources.iter().map(|t| t.gross_quality_control).sum();
        merged.unload_in = sources.iter().map(|t| t.unload_in).sum();
        merged.unload_out = sources.iter().map(|t| t.unload_out).sum();
        merged.additional_unload = sources.iter().map(|t| t.additional_unload).sum();
        let merged_id = self.insert_ticket(merged);

        let source_qcs: Vec<QualityControl> = request
            .ticket_ids
            .iter()
            .flat_map(|id| self.quality_controls_of(*id))
            .filter(|qc| qc.is_live())
            .cloned()
            .collect();
        let merged_qc_id = match source_qcs.first() {
            Some(first) => {
                let mut qc = first.clone();
                qc.id = Uuid::new_v4();
                qc.name = NEW_TICKET_NAME.to_string();
                qc.ticket_id = Some(merged_id);
                qc.date = request.date;
                qc.state = QcState::Draft;
                qc.source_id = None;
                qc.merged_to = None;
                qc.delivery_number = join_delivery_numbers(&sources);
                qc.penalties = merge_penalties(&source_qcs);
                qc.returns = merge_returns(&source_qcs);
                Some(self.insert_quality_control(qc))
            }
            None => None,
        };

        for id in &request.ticket_ids {
            let ticket = self.ticket_mut(*id)?;
            ticket.state = ScaleState::Merged;
            ticket.merged_to = Some(merged_id);
            for qc in self.quality_controls_of_mut(*id) {
                if qc.is_live() {
                    qc.state = QcState::Merged;
                    qc.merged_to = merged_qc_id;
                }
            }
        }

        self.recompute(merged_id)?;
        Ok(merged_id)
    }
}

fn validate_merge(sources: &[ScaleTicket]) -> DomainResult<()> {
    if sources.iter().any(|t| t.state != ScaleState::Draft) {
        return Err(DomainError::validation("You can only merge scale in draft state"));
    }
    let first = &sources[0];
    if sources.iter().any(|t| t.partner_id != first.partner_id) {
        return Err(DomainError::validation("You can only merge scale with the same partner"));
    }
    if sources.iter().any(|t| t.product_id != first.product_id) {
        return Err(DomainError::validation("You can only merge scale with the same product"));
    }
    if sources.iter().any(|t| t.weighbridge_id != first.weighbridge_id) {
        return Err(DomainError::validation(
            "You can only merge scale with the same weighbridge",
        ));
    }
    Ok(())
}

fn join_delivery_numbers(sources: &[ScaleTicket]) -> Option<String> {
    let numbers: Vec<&str> = sources
        .iter()
        .filter_map(|t| t.delivery_number.as_deref())
        .filter(|n| !n.is_empty())
        .collect();
    if numbers.is_empty() {
        None
    } else {
        Some(numbers.join(", "))
    }
}

/// Penalty lines summed per quality type, in first-seen order
fn merge_penalties(qcs: &[QualityControl]) -> Vec<QcPenaltyLine> {
    let mut merged: Vec<QcPenaltyLine> = Vec::new();
    for line in qcs.iter().flat_map(|qc| &qc.penalties) {
        match merged.iter_mut().find(|m| m.quality_type_id == line.quality_type_id) {
            Some(existing) => existing.penalty_qty += line.penalty_qty,
            None => merged.push(QcPenaltyLine::new(
                line.quality_type_id,
                line.calculation_type,
                line.penalty_qty,
            )),
        }
    }
    merged
}

fn merge_returns(qcs: &[QualityControl]) -> Vec<QcReturnLine> {
    let mut merged: Vec<QcReturnLine> = Vec::new();
    for line in qcs.iter().flat_map(|qc| &qc.returns) {
        match merged.iter_mut().find(|m| m.quality_type_id == line.quality_type_id) {
            Some(existing) => existing.return_qty += line.return_qty,
            None => merged.push(QcReturnLine {
                quality_type_id: line.quality_type_id,
                return_qty: line.return_qty,
            }),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::CalculationType;
    use crate::weighbridge::fixtures::{book, day, ticket};

    #[test]
    fn merged_ticket_sums_sources() {
        let mut book = book();
        book.reserve_names(["WB/2024/00010".to_string()]);
        let mut a = ticket("A", 5000, 4000);
        a.quantity = Decimal::from(10);
        a.delivery_number = Some("DO-1".into());
        let mut b = ticket("B", 3000, 2500);
        b.quantity = Decimal::from(7);
        b.delivery_number = Some("DO-2".into());
        let (a, b) = (book.insert_ticket(a), book.insert_ticket(b));

        let mut qa = QualityControl::draft("QA", Some(a), day());
        qa.penalties.push(QcPenaltyLine::new(1, CalculationType::PerQty, Decimal::from(20)));
        let mut qb = QualityControl::draft("QB", Some(b), day());
        qb.penalties.push(QcPenaltyLine::new(1, CalculationType::PerQty, Decimal::from(5)));
        qb.penalties.push(QcPenaltyLine::new(2, CalculationType::PerQty, Decimal::from(3)));
        book.insert_quality_control(qa);
        book.insert_quality_control(qb);

        let merged = book
            .merge(&MergeRequest { ticket_ids: vec![a, b], merge_to: None, date: day() })
            .unwrap();
        let t = book.ticket(merged).unwrap();
        assert_eq!(t.name, "WB/2024/00010");
        assert_eq!(t.weight_in, Decimal::from(8000));
        assert_eq!(t.weight_out, Decimal::from(6500));
        assert_eq!(t.quantity, Decimal::from(17));
        assert_eq!(t.delivery_number.as_deref(), Some("DO-1, DO-2"));
        assert_eq!(t.net_after_quality_control, Decimal::from(1472));

        let qc = book.quality_controls_of(merged).next().unwrap();
        assert_eq!(qc.penalties.len(), 2);
        assert_eq!(qc.penalties[0].penalty_qty, Decimal::from(25));

        for id in [a, b] {
            let source = book.ticket(id).unwrap();
            assert_eq!(source.state, ScaleState::Merged);
            assert_eq!(source.merged_to, Some(merged));
        }
    }

    #[test]
    fn merge_rejects_mismatched_sources() {
        let mut book = book();
        let a = book.insert_ticket(ticket("A", 5000, 4000));
        let mut other = ticket("B", 5000, 4000);
        other.product_id = 2;
        let b = book.insert_ticket(other);

        let single = MergeRequest { ticket_ids: vec![a], merge_to: None, date: day() };
        assert!(book.merge(&single).is_err());

        let err = book
            .merge(&MergeRequest { ticket_ids: vec![a, b], merge_to: None, date: day() })
            .unwrap_err();
        assert_eq!(err, DomainError::validation("You can only merge scale with the same product"));
        assert_eq!(book.ticket(a).unwrap().state, ScaleState::Draft);
    }

    #[test]
    fn merge_rejects_the_same_ticket_twice() {
        let mut book = book();
        book.reserve_names(["WB/2024/00011".to_string()]);
        let a = book.insert_ticket(ticket("A", 5000, 4000));
        let b = book.insert_ticket(ticket("B", 3000, 2500));

        let err = book
            .merge(&MergeRequest { ticket_ids: vec![a, b, a], merge_to: None, date: day() })
            .unwrap_err();
        assert_eq!(err, DomainError::validation(DUPLICATE_MERGE_SOURCE));
        assert_eq!(book.ticket(a).unwrap().state, ScaleState::Draft);
        assert_eq!(book.ticket(a).unwrap().weight_in, Decimal::from(5000));
        assert_eq!(book.tickets().len(), 2);
    }
}
