//! Inventory movement models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A movement the stock layer is asked to confirm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRequest {
    pub name: String,
    pub reference: String,
    /// `None` for offsetting moves created on cancellation
    pub ticket_id: Option<Uuid>,
    pub product_id: i64,
    pub quantity: Decimal,
    pub source_location_id: i64,
    pub dest_location_id: i64,
}

/// A confirmed movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMove {
    pub id: Uuid,
    pub name: String,
    pub reference: String,
    pub ticket_id: Option<Uuid>,
    pub product_id: i64,
    pub quantity: Decimal,
    pub source_location_id: i64,
    pub dest_location_id: i64,
}

impl StockMove {
    pub fn confirmed(request: MoveRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            reference: request.reference,
            ticket_id: request.ticket_id,
            product_id: request.product_id,
            quantity: request.quantity,
            source_location_id: request.source_location_id,
            dest_location_id: request.dest_location_id,
        }
    }
}
