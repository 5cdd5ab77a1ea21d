//! WebAssembly module for the Estate Weighbridge Platform
//!
//! Provides offline previews for the field clients:
//! - Harvest premi tier bonus
//! - Net weight after quality-control deductions
//! - Payload validation before upload

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

use shared::{check_missing_or_incorrect_fields, marginal_bonus, tier_rules, FieldSchema};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::log_1(&JsValue::from_str("estate weighbridge previews loaded"));
}

fn decimal(raw: &str, field: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(raw.trim())
        .map_err(|_| JsValue::from_str(&format!("Invalid number for {}: {}", field, raw)))
}

fn parse_json<T: for<'de> Deserialize<'de>>(raw: &str, what: &str) -> Result<T, JsValue> {
    serde_json::from_str(raw).map_err(|e| JsValue::from_str(&format!("Invalid {} JSON: {}", what, e)))
}

/// Tier bonus and attendance premi for one worker's day.
///
/// Weights and amounts travel as decimal strings so nothing is rounded
/// through `f64`. Returns `{"bonus": "...", "attendance": "..."}`.
#[wasm_bindgen]
pub fn preview_tier_bonus(
    base_qty: &str,
    quantifiers_json: &str,
    harvested: &str,
) -> Result<String, JsValue> {
    let base_qty = decimal(base_qty, "base quantity")?;
    let harvested = decimal(harvested, "harvested weight")?;
    let quantifiers: Vec<PremiQuantifier> = parse_json(quantifiers_json, "quantifiers")?;

    let outcome = marginal_bonus(&tier_rules(base_qty, &quantifiers), harvested);
    Ok(json!({
        "bonus": outcome.bonus,
        "attendance": outcome.attendance,
    })
    .to_string())
}

#[derive(Deserialize)]
struct PenaltyPreview {
    #[serde(default)]
    calculation_type: CalculationType,
    qty: Decimal,
}

/// Net weight left after the given penalty lines
#[wasm_bindgen]
pub fn preview_net_after_quality_control(
    weight_in: &str,
    weight_out: &str,
    penalties_json: &str,
) -> Result<String, JsValue> {
    let net = (decimal(weight_in, "weight in")? - decimal(weight_out, "weight out")?).abs();
    let penalties: Vec<PenaltyPreview> = parse_json(penalties_json, "penalties")?;

    let deduction: Decimal = penalties
        .iter()
        .map(|p| p.calculation_type.subtotal(p.qty, net))
        .sum();
    Ok((net - deduction).to_string())
}

fn check_item(item_json: &str, schema_for: impl Fn(&Value) -> FieldSchema) -> Result<Option<String>, JsValue> {
    let item: Value = parse_json(item_json, "item")?;
    Ok(check_missing_or_incorrect_fields(&item, &schema_for(&item)))
}

/// Problem with a scale ticket item, or `undefined` when it would be accepted
#[wasm_bindgen]
pub fn check_scale_ticket_item(item_json: &str) -> Result<Option<String>, JsValue> {
    check_item(item_json, scale_ticket_schema_for)
}

#[wasm_bindgen]
pub fn check_quality_control_item(item_json: &str) -> Result<Option<String>, JsValue> {
    check_item(item_json, |_| quality_control_schema())
}

#[wasm_bindgen]
pub fn check_harvest_item(item_json: &str) -> Result<Option<String>, JsValue> {
    check_item(item_json, |_| harvest_operation_schema())
}

/// Validate a premi configuration month window
#[wasm_bindgen]
pub fn check_month_window(start_month: u32, end_month: u32) -> Option<String> {
    validate_month_window(start_month, end_month).err().map(str::to_string)
}

#[wasm_bindgen]
pub fn check_licence_plate(plate: &str) -> Option<String> {
    validate_licence_plate(plate).err().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_bonus_preview() {
        let quantifiers = r#"[
            {"quantifier": "1", "premi_extra": "500", "attendance_premi": "0"},
            {"quantifier": "1.5", "premi_extra": "800", "attendance_premi": "2500"}
        ]"#;
        let out: Value = serde_json::from_str(&preview_tier_bonus("100", quantifiers, "200").unwrap()).unwrap();
        assert_eq!(Decimal::from_str(out["bonus"].as_str().unwrap()).unwrap(), Decimal::from(65_000));
        assert_eq!(Decimal::from_str(out["attendance"].as_str().unwrap()).unwrap(), Decimal::from(2_500));
    }

    #[test]
    fn net_after_quality_control_preview() {
        let penalties = r#"[
            {"calculation_type": "per_qty", "qty": "50"},
            {"calculation_type": "per_unit", "qty": "12"}
        ]"#;
        assert_eq!(preview_net_after_quality_control("5000", "4000", penalties).unwrap(), "950");

        let percent = r#"[{"calculation_type": "percentage", "qty": "5"}]"#;
        let net = preview_net_after_quality_control("4000", "5000", percent).unwrap();
        assert_eq!(Decimal::from_str(&net).unwrap(), Decimal::from(950));
    }

    #[test]
    fn scale_ticket_item_check() {
        let item = r#"{"ref_id": 1, "name": "WB/2024/00001", "weighbridge_id": 1,
            "product_id": 2, "partner_id": 3, "weight_in": 5000, "weight_out": 4000}"#;
        assert_eq!(check_scale_ticket_item(item).unwrap(), None);

        let missing = r#"{"ref_id": 1, "name": "WB/2024/00001"}"#;
        let message = check_scale_ticket_item(missing).unwrap().unwrap();
        assert!(message.starts_with("Required Fields Not Found: weighbridge_id"));
    }

    #[test]
    fn month_window_check() {
        assert_eq!(check_month_window(1, 6), None);
        assert!(check_month_window(7, 3).is_some());
    }

    #[test]
    fn licence_plate_check() {
        assert_eq!(check_licence_plate("BK 1234 ABC"), None);
        assert!(check_licence_plate("12345").is_some());
    }
}
