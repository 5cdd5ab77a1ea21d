//! Weighbridge scale ticket lifecycle
//!
//! [`ScaleBook`] is the in-memory unit of work for ticket operations: the
//! service loads the tickets, quality-control records and master data an
//! operation touches, runs the operation, and persists the book only when
//! the operation succeeds. Dropping the book discards every staged change.
//!
//! Side effects outside the ticket records go through two narrow
//! collaborators, [`StockLayer`] and [`AuditLog`].

mod lifecycle;
mod merge;
mod returns;
mod split;

pub use merge::{ensure_distinct_tickets, MergeRequest, DUPLICATE_MERGE_SOURCE};
pub use returns::{ReturnLine, ReturnMethod, ReturnRequest};
pub use split::{SplitOutcome, SplitRequest};

use std::collections::VecDeque;

use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::models::{
    MoveRequest, Partner, QualityControl, ScaleTicket, StockMove, Weighbridge, NEW_TICKET_NAME,
};

/// Inventory collaborator
pub trait StockLayer {
    /// Confirm a movement atomically
    fn confirm(&mut self, request: MoveRequest) -> DomainResult<StockMove>;

    /// Detach every movement linked to the ticket
    fn unlink_ticket(&mut self, ticket_id: Uuid) -> DomainResult<()>;
}

/// Chatter-style message log attached to tickets
pub trait AuditLog {
    fn post(&mut self, ticket_id: Uuid, message: String);
}

/// Stock layer that records movements for later persistence
#[derive(Debug, Default, Clone)]
pub struct StagedStock {
    pub moves: Vec<StockMove>,
    pub unlinked: Vec<Uuid>,
}

impl StockLayer for StagedStock {
    fn confirm(&mut self, request: MoveRequest) -> DomainResult<StockMove> {
        if request.quantity.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "Cannot move a negative quantity for {}",
                request.reference
            )));
        }
        let confirmed = StockMove::confirmed(request);
        self.moves.push(confirmed.clone());
        Ok(confirmed)
    }

    fn unlink_ticket(&mut self, ticket_id: Uuid) -> DomainResult<()> {
        for m in self.moves.iter_mut().filter(|m| m.ticket_id == Some(ticket_id)) {
            m.ticket_id = None;
        }
        self.unlinked.push(ticket_id);
        Ok(())
    }
}

/// Audit log that keeps messages in memory
#[derive(Debug, Default, Clone)]
pub struct StagedAudit {
    pub messages: Vec<(Uuid, String)>,
}

impl AuditLog for StagedAudit {
    fn post(&mut self, ticket_id: Uuid, message: String) {
        self.messages.push((ticket_id, message));
    }
}

/// Tickets, quality-control records and master data of one unit of work
#[derive(Debug, Default, Clone)]
pub struct ScaleBook {
    tickets: Vec<ScaleTicket>,
    quality_controls: Vec<QualityControl>,
    removed_quality_controls: Vec<Uuid>,
    partners: Vec<Partner>,
    weighbridges: Vec<Weighbridge>,
    reserved_names: VecDeque<String>,
}

impl ScaleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_partner(&mut self, partner: Partner) {
        if !self.partners.iter().any(|p| p.id == partner.id) {
            self.partners.push(partner);
        }
    }

    pub fn add_weighbridge(&mut self, weighbridge: Weighbridge) {
        if !self.weighbridges.iter().any(|w| w.id == weighbridge.id) {
            self.weighbridges.push(weighbridge);
        }
    }

    /// Names handed out to tickets created by merge and return
    pub fn reserve_names<I: IntoIterator<Item = String>>(&mut self, names: I) {
        self.reserved_names.extend(names);
    }

    pub(crate) fn allocate_name(&mut self) -> String {
        self.reserved_names
            .pop_front()
            .unwrap_or_else(|| NEW_TICKET_NAME.to_string())
    }

    pub fn insert_ticket(&mut self, ticket: ScaleTicket) -> Uuid {
        let id = ticket.id;
        match self.tickets.iter_mut().find(|t| t.id == id) {
            Some(existing) => *existing = ticket,
            None => self.tickets.push(ticket),
        }
        id
    }

    pub fn insert_quality_control(&mut self, quality_control: QualityControl) -> Uuid {
        let id = quality_control.id;
        match self.quality_controls.iter_mut().find(|q| q.id == id) {
            Some(existing) => *existing = quality_control,
            None => self.quality_controls.push(quality_control),
        }
        id
    }

    /// Drop the ticket's quality-control records, remembering their ids
    pub fn remove_quality_controls_of(&mut self, ticket_id: Uuid) {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.quality_controls)
            .into_iter()
            .partition(|q| q.ticket_id == Some(ticket_id));
        self.quality_controls = kept;
        self.removed_quality_controls
            .extend(removed.into_iter().map(|q| q.id));
    }

    pub fn tickets(&self) -> &[ScaleTicket] {
        &self.tickets
    }

    pub fn quality_controls(&self) -> &[QualityControl] {
        &self.quality_controls
    }

    pub fn removed_quality_controls(&self) -> &[Uuid] {
        &self.removed_quality_controls
    }

    pub fn ticket(&self, id: Uuid) -> DomainResult<&ScaleTicket> {
        self.tickets
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| DomainError::not_found("Record Not Found"))
    }

    pub fn ticket_by_name(&self, name: &str) -> Option<&ScaleTicket> {
        self.tickets.iter().find(|t| t.name == name)
    }

    pub fn quality_control(&self, id: Uuid) -> DomainResult<&QualityControl> {
        self.quality_controls
            .iter()
            .find(|q| q.id == id)
            .ok_or_else(|| DomainError::not_found("Record Not Found"))
    }

    pub fn quality_controls_of(&self, ticket_id: Uuid) -> impl Iterator<Item = &QualityControl> {
        self.quality_controls
            .iter()
            .filter(move |q| q.ticket_id == Some(ticket_id))
    }

    pub(crate) fn ticket_mut(&mut self, id: Uuid) -> DomainResult<&mut ScaleTicket> {
        find_ticket_mut(&mut self.tickets, id)
    }

    pub(crate) fn quality_control_mut(&mut self, id: Uuid) -> DomainResult<&mut QualityControl> {
        self.quality_controls
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| DomainError::not_found("Record Not Found"))
    }

    pub(crate) fn quality_controls_of_mut(
        &mut self,
        ticket_id: Uuid,
    ) -> impl Iterator<Item = &mut QualityControl> {
        self.quality_controls
            .iter_mut()
            .filter(move |q| q.ticket_id == Some(ticket_id))
    }

    /// Re-derive every computed figure of a ticket and its quality controls.
    ///
    /// Call after any write to weights, unload readings, penalty lines or
    /// quality-control states.
    pub fn recompute(&mut self, id: Uuid) -> DomainResult<()> {
        let ticket = find_ticket_mut(&mut self.tickets, id)?;
        ticket.recompute_net_weight();
        ticket.recompute_vehicle_duration()?;
        ticket.recompute_unload();
        ticket.recompute_shrinkage();
        let net_weight = ticket.net_weight;

        for qc in self
            .quality_controls
            .iter_mut()
            .filter(|q| q.ticket_id == Some(id))
        {
            qc.recompute(net_weight);
        }

        let attached = self.quality_controls.iter().filter(|q| q.ticket_id == Some(id));
        find_ticket_mut(&mut self.tickets, id)?.apply_quality_deduction(attached);
        Ok(())
    }

    /// Movement for a ticket; `reverse` swaps source and destination
    pub fn move_request(&self, ticket: &ScaleTicket, reverse: bool) -> DomainResult<MoveRequest> {
        let partner = self
            .partners
            .iter()
            .find(|p| p.id == ticket.partner_id)
            .ok_or_else(|| DomainError::not_found(format!("Partner {} not found", ticket.partner_id)))?;
        let weighbridge = self
            .weighbridges
            .iter()
            .find(|w| w.id == ticket.weighbridge_id)
            .ok_or_else(|| {
                DomainError::not_found(format!("Weighbridge {} not found", ticket.weighbridge_id))
            })?;

        let (label, source, dest) = match ticket.delivery_type {
            Some(crate::models::DeliveryType::Acceptance) => (
                "Acceptance",
                partner.supplier_location_id,
                weighbridge.stock_location_id,
            ),
            Some(crate::models::DeliveryType::Shipment) => (
                "Shipment",
                weighbridge.stock_location_id,
                partner.customer_location_id,
            ),
            None => return Err(DomainError::validation(NO_NET_WEIGHT)),
        };
        let (source, dest) = if reverse { (dest, source) } else { (source, dest) };

        Ok(MoveRequest {
            name: format!("{}: {}", label, ticket.name),
            reference: ticket.name.clone(),
            ticket_id: if reverse { None } else { Some(ticket.id) },
            product_id: ticket.product_id,
            quantity: ticket.net_after_quality_control,
            source_location_id: source,
            dest_location_id: dest,
        })
    }
}

pub(crate) const NO_NET_WEIGHT: &str =
    "Cannot post delivery, There's no net weight for this delivery.";

fn find_ticket_mut(tickets: &mut [ScaleTicket], id: Uuid) -> DomainResult<&mut ScaleTicket> {
    tickets
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| DomainError::not_found("Record Not Found"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    pub fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    pub fn book() -> ScaleBook {
        let mut book = ScaleBook::new();
        book.add_partner(Partner {
            id: 1,
            name: "KUD Maju".into(),
            company_id: None,
            supplier_location_id: 100,
            customer_location_id: 200,
        });
        book.add_weighbridge(Weighbridge {
            id: 1,
            name: "WB Pabrik".into(),
            code: "WB1".into(),
            company_id: None,
            partner_id: None,
            stock_location_id: 300,
        });
        book
    }

    pub fn ticket(name: &str, weight_in: i64, weight_out: i64) -> ScaleTicket {
        let mut t = ScaleTicket::draft(
            1,
            1,
            1,
            day(),
            Decimal::from(weight_in),
            Decimal::from(weight_out),
        );
        t.name = name.to_string();
        t
    }
}
