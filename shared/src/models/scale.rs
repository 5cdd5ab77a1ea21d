//! Weighbridge scale ticket models

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

use super::QualityControl;

/// Placeholder name replaced by the ticket sequence on save
pub const NEW_TICKET_NAME: &str = "New";

/// Scale ticket status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleState {
    Draft,
    Posted,
    Locked,
    Split,
    Merged,
    Cancelled,
}

impl ScaleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleState::Draft => "draft",
            ScaleState::Posted => "posted",
            ScaleState::Locked => "locked",
            ScaleState::Split => "split",
            ScaleState::Merged => "merged",
            ScaleState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ScaleState::Draft),
            "posted" => Some(ScaleState::Posted),
            "locked" => Some(ScaleState::Locked),
            "split" => Some(ScaleState::Split),
            "merged" => Some(ScaleState::Merged),
            "cancelled" => Some(ScaleState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScaleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the goods, derived from the sign of `weight_in - weight_out`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Acceptance,
    Shipment,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Acceptance => "acceptance",
            DeliveryType::Shipment => "shipment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acceptance" => Some(DeliveryType::Acceptance),
            "shipment" => Some(DeliveryType::Shipment),
            _ => None,
        }
    }

    /// `None` for a zero difference
    pub fn from_difference(diff: Decimal) -> Option<Self> {
        if diff > Decimal::ZERO {
            Some(DeliveryType::Acceptance)
        } else if diff < Decimal::ZERO {
            Some(DeliveryType::Shipment)
        } else {
            None
        }
    }
}

/// How a ticket came out of another one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Split,
    Merge,
    Return,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Split => "split",
            SourceKind::Merge => "merge",
            SourceKind::Return => "return",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "split" => Some(SourceKind::Split),
            "merge" => Some(SourceKind::Merge),
            "return" => Some(SourceKind::Return),
            _ => None,
        }
    }
}

/// Supplier or customer with its stock locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub supplier_location_id: i64,
    pub customer_location_id: i64,
}

/// A physical (or mobile) scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weighbridge {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub company_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub stock_location_id: i64,
}

/// One inbound or outbound weighing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleTicket {
    pub id: Uuid,
    pub name: String,
    pub ref_id: Option<String>,
    pub company_id: Option<i64>,
    pub weighbridge_id: i64,
    pub partner_id: i64,
    pub product_id: i64,
    pub date: NaiveDate,
    pub delivery_number: Option<String>,
    pub driver_name: Option<String>,
    pub licence_plate: Option<String>,
    pub remark: Option<String>,
    pub state: ScaleState,

    pub is_return: bool,
    pub source_id: Option<Uuid>,
    pub source_kind: Option<SourceKind>,
    pub merged_to: Option<Uuid>,

    pub quantity: Decimal,
    pub weight_in: Decimal,
    pub weight_out: Decimal,
    pub net_weight: Decimal,
    pub delivery_type: Option<DeliveryType>,

    pub vehicle_in: Option<NaiveDateTime>,
    pub vehicle_out: Option<NaiveDateTime>,
    pub vehicle_duration: Decimal,

    pub unload_in: Decimal,
    pub unload_out: Decimal,
    pub additional_unload: Decimal,
    pub net_unload: Decimal,
    pub net_unload_after: Decimal,
    pub shrinkage: Decimal,
    pub shrinkage_percentage: Decimal,

    pub gross_quality_control: Decimal,
    pub total_quality_control_qty: Decimal,
    pub net_after_quality_control: Decimal,
    pub total_weight: Decimal,
}

impl ScaleTicket {
    /// A draft ticket with every derived figure zeroed
    pub fn draft(
        weighbridge_id: i64,
        partner_id: i64,
        product_id: i64,
        date: NaiveDate,
        weight_in: Decimal,
        weight_out: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: NEW_TICKET_NAME.to_string(),
            ref_id: None,
            company_id: None,
            weighbridge_id,
            partner_id,
            product_id,
            date,
            delivery_number: None,
            driver_name: None,
            licence_plate: None,
            remark: None,
            state: ScaleState::Draft,
            is_return: false,
            source_id: None,
            source_kind: None,
            merged_to: None,
            quantity: Decimal::ZERO,
            weight_in,
            weight_out,
            net_weight: Decimal::ZERO,
            delivery_type: None,
            vehicle_in: None,
            vehicle_out: None,
            vehicle_duration: Decimal::ZERO,
            unload_in: Decimal::ZERO,
            unload_out: Decimal::ZERO,
            additional_unload: Decimal::ZERO,
            net_unload: Decimal::ZERO,
            net_unload_after: Decimal::ZERO,
            shrinkage: Decimal::ZERO,
            shrinkage_percentage: Decimal::ZERO,
            gross_quality_control: Decimal::ZERO,
            total_quality_control_qty: Decimal::ZERO,
            net_after_quality_control: Decimal::ZERO,
            total_weight: Decimal::ZERO,
        }
    }

    pub fn recompute_net_weight(&mut self) {
        let diff = self.weight_in - self.weight_out;
        self.net_weight = diff.abs();
        self.delivery_type = DeliveryType::from_difference(diff);
    }

    pub fn recompute_vehicle_duration(&mut self) -> DomainResult<()> {
        self.vehicle_duration = match (self.vehicle_in, self.vehicle_out) {
            (Some(time_in), Some(time_out)) => {
                if time_out < time_in {
                    return Err(DomainError::validation(
                        "Vehicle Time Out cannot be earlier than Vehicle Time In.",
                    ));
                }
                let seconds = (time_out - time_in).num_seconds();
                Decimal::from(seconds) / Decimal::from(3600)
            }
            _ => Decimal::ZERO,
        };
        Ok(())
    }

    /// Unload readings default to the scale readings seen from the other side
    pub fn recompute_unload(&mut self) {
        if self.unload_in.is_zero() {
            self.unload_in = self.weight_out;
        }
        if self.unload_out.is_zero() {
            self.unload_out = self.weight_in;
        }
        self.net_unload = (self.unload_in - self.unload_out).abs();
        self.net_unload_after = self.net_unload - self.additional_unload;
    }

    pub fn recompute_shrinkage(&mut self) {
        self.shrinkage = (self.net_weight - self.net_unload).abs();
        self.shrinkage_percentage = if self.net_weight.is_zero() {
            Decimal::ZERO
        } else {
            self.shrinkage / self.net_weight * Decimal::from(100)
        };
    }

    /// Deduction and totals from the attached quality-control records.
    ///
    /// Cancelled records never count. When no live record carries penalty
    /// lines the manual `gross_quality_control` figure is deducted instead.
    pub fn apply_quality_deduction<'a, I>(&mut self, quality_controls: I)
    where
        I: IntoIterator<Item = &'a QualityControl>,
    {
        let live: Vec<&QualityControl> = quality_controls
            .into_iter()
            .filter(|qc| qc.is_live())
            .collect();
        self.total_quality_control_qty = if live.iter().any(|qc| !qc.penalties.is_empty()) {
            live.iter().map(|qc| qc.penalty_qty_total).sum()
        } else {
            self.gross_quality_control
        };
        self.net_after_quality_control = self.net_weight - self.total_quality_control_qty;
        self.total_weight = if self.is_return {
            -(self.net_after_quality_control + self.shrinkage)
        } else {
            self.net_after_quality_control.abs()
        };
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ScaleState::Split | ScaleState::Merged | ScaleState::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalculationType, QcPenaltyLine, QcState};

    fn ticket(weight_in: i64, weight_out: i64) -> ScaleTicket {
        ScaleTicket::draft(
            1,
            1,
            1,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            Decimal::from(weight_in),
            Decimal::from(weight_out),
        )
    }

    #[test]
    fn net_weight_and_direction() {
        let mut t = ticket(5000, 4000);
        t.recompute_net_weight();
        assert_eq!(t.net_weight, Decimal::from(1000));
        assert_eq!(t.delivery_type, Some(DeliveryType::Acceptance));

        let mut t = ticket(4000, 5000);
        t.recompute_net_weight();
        assert_eq!(t.net_weight, Decimal::from(1000));
        assert_eq!(t.delivery_type, Some(DeliveryType::Shipment));

        let mut t = ticket(4000, 4000);
        t.recompute_net_weight();
        assert_eq!(t.delivery_type, None);
    }

    #[test]
    fn unload_defaults_mirror_scale_readings() {
        let mut t = ticket(5000, 4000);
        t.recompute_net_weight();
        t.recompute_unload();
        t.recompute_shrinkage();
        assert_eq!(t.unload_in, Decimal::from(4000));
        assert_eq!(t.unload_out, Decimal::from(5000));
        assert_eq!(t.net_unload, Decimal::from(1000));
        assert_eq!(t.shrinkage, Decimal::ZERO);

        let mut t = ticket(5000, 4000);
        t.unload_in = Decimal::from(4020);
        t.recompute_net_weight();
        t.recompute_unload();
        t.recompute_shrinkage();
        assert_eq!(t.shrinkage, Decimal::from(20));
        assert_eq!(t.shrinkage_percentage, Decimal::from(2));
    }

    #[test]
    fn vehicle_out_before_in_is_rejected() {
        let mut t = ticket(1, 0);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        t.vehicle_in = day.and_hms_opt(10, 0, 0);
        t.vehicle_out = day.and_hms_opt(9, 0, 0);
        assert!(t.recompute_vehicle_duration().is_err());
        t.vehicle_out = day.and_hms_opt(11, 30, 0);
        t.recompute_vehicle_duration().unwrap();
        assert_eq!(t.vehicle_duration, Decimal::new(15, 1));
    }

    #[test]
    fn gross_deduction_applies_without_penalty_lines() {
        let mut t = ticket(5000, 4000);
        t.gross_quality_control = Decimal::from(30);
        t.recompute_net_weight();
        t.apply_quality_deduction(std::iter::empty());
        assert_eq!(t.net_after_quality_control, Decimal::from(970));

        let mut qc = QualityControl::draft("QC/1", Some(t.id), t.date);
        qc.penalties.push(QcPenaltyLine::new(1, CalculationType::PerQty, Decimal::from(50)));
        qc.recompute(t.net_weight);
        t.apply_quality_deduction([&qc]);
        assert_eq!(t.net_after_quality_control, Decimal::from(950));

        qc.state = QcState::Cancelled;
        t.apply_quality_deduction([&qc]);
        assert_eq!(t.net_after_quality_control, Decimal::from(970));
    }
}
