//! Post, lock, unlock, cancel and reset transitions

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ScaleBook, StockLayer, NO_NET_WEIGHT};
use crate::error::{DomainError, DomainResult};
use crate::models::{QcState, ScaleState};

impl ScaleBook {
    /// Post a draft ticket and generate its stock movement.
    ///
    /// Posting a posted or locked ticket does nothing.
    pub fn post(&mut self, id: Uuid, stock: &mut dyn StockLayer) -> DomainResult<()> {
        match self.ticket(id)?.state {
            ScaleState::Draft => {}
            ScaleState::Posted | ScaleState::Locked => return Ok(()),
            other => {
                return Err(DomainError::invalid_state(format!(
                    "Cannot post a ticket in {} state",
                    other
                )))
            }
        }

        self.recompute(id)?;
        let ticket = self.ticket(id)?;
        if ticket.net_weight.is_zero() {
            return Err(DomainError::validation(NO_NET_WEIGHT));
        }
        let request = self.move_request(ticket, false)?;
        stock.confirm(request)?;

        self.ticket_mut(id)?.state = ScaleState::Posted;
        for qc in self.quality_controls_of_mut(id) {
            if qc.state == QcState::Draft {
                qc.state = QcState::Posted;
            }
        }
        Ok(())
    }

    pub fn lock(&mut self, id: Uuid) -> DomainResult<()> {
        let ticket = self.ticket_mut(id)?;
        match ticket.state {
            ScaleState::Locked => return Ok(()),
            ScaleState::Posted => ticket.state = ScaleState::Locked,
            other => {
                return Err(DomainError::invalid_state(format!(
                    "Cannot lock a ticket in {} state",
                    other
                )))
            }
        }
        for qc in self.quality_controls_of_mut(id) {
            if qc.state == QcState::Posted {
                qc.state = QcState::Locked;
            }
        }
        Ok(())
    }

    pub fn unlock(&mut self, id: Uuid) -> DomainResult<()> {
        let ticket = self.ticket_mut(id)?;
        match ticket.state {
            ScaleState::Posted => return Ok(()),
            ScaleState::Locked => ticket.state = ScaleState::Posted,
            other => {
                return Err(DomainError::invalid_state(format!(
                    "Cannot unlock a ticket in {} state",
                    other
                )))
            }
        }
        for qc in self.quality_controls_of_mut(id) {
            if qc.state == QcState::Locked {
                qc.state = QcState::Posted;
            }
        }
        Ok(())
    }

    /// Cancel a ticket, reversing its stock movement when it had been posted.
    ///
    /// Cancelling a cancelled ticket does nothing.
    pub fn cancel(&mut self, id: Uuid, stock: &mut dyn StockLayer) -> DomainResult<()> {
        let previous = self.ticket(id)?.state;
        if previous == ScaleState::Cancelled {
            return Ok(());
        }

        if matches!(previous, ScaleState::Posted | ScaleState::Locked) {
            let reverse = self.move_request(self.ticket(id)?, true)?;
            stock.unlink_ticket(id)?;
            stock.confirm(reverse)?;
        }

        self.ticket_mut(id)?.state = ScaleState::Cancelled;
        for qc in self.quality_controls_of_mut(id) {
            qc.state = QcState::Cancelled;
        }
        self.recompute(id)
    }

    /// Reopen a cancelled ticket as draft
    pub fn reset_to_draft(&mut self, id: Uuid) -> DomainResult<()> {
        let ticket = self.ticket_mut(id)?;
        match ticket.state {
            ScaleState::Draft => return Ok(()),
            ScaleState::Cancelled => ticket.state = ScaleState::Draft,
            other => {
                return Err(DomainError::invalid_state(format!(
                    "Cannot reset a ticket in {} state to draft",
                    other
                )))
            }
        }
        for qc in self.quality_controls_of_mut(id) {
            qc.state = QcState::Draft;
        }
        self.recompute(id)
    }

    /// Post a single draft quality-control record
    pub fn post_quality_control(&mut self, id: Uuid) -> DomainResult<()> {
        let qc = self.quality_control_mut(id)?;
        if qc.state != QcState::Draft {
            return Err(DomainError::invalid_state("Only draft quality control can be posted"));
        }
        qc.state = QcState::Posted;
        Ok(())
    }

    /// Cancel a posted quality-control record; its ticket stops deducting it
    pub fn cancel_quality_control(&mut self, id: Uuid) -> DomainResult<()> {
        let qc = self.quality_control_mut(id)?;
        if qc.state != QcState::Posted {
            return Err(DomainError::invalid_state(
                "Only posted quality control can be cancelled",
            ));
        }
        qc.state = QcState::Cancelled;
        let ticket_id = qc.ticket_id;
        match ticket_id {
            Some(ticket_id) => self.recompute(ticket_id),
            None => Ok(()),
        }
    }

    /// Record new unload readings
    pub fn update_unload(
        &mut self,
        id: Uuid,
        unload_in: Decimal,
        unload_out: Decimal,
        additional_unload: Decimal,
    ) -> DomainResult<()> {
        let ticket = self.ticket_mut(id)?;
        if matches!(ticket.state, ScaleState::Split | ScaleState::Cancelled) {
            return Err(DomainError::validation(
                "You can't update unload data in split or cancelled state.",
            ));
        }
        ticket.unload_in = unload_in;
        ticket.unload_out = unload_out;
        ticket.additional_unload = additional_unload;
        self.recompute(id)
    }
}
