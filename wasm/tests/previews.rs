//! Browser-side checks of the preview exports

use wasm_bindgen_test::*;

use estate_weighbridge_wasm::{
    check_harvest_item, check_quality_control_item, preview_net_after_quality_control,
    preview_tier_bonus,
};

#[wasm_bindgen_test]
fn malformed_numbers_are_rejected() {
    assert!(preview_tier_bonus("abc", "[]", "10").is_err());
    assert!(preview_net_after_quality_control("5000", "4000", "not json").is_err());
}

#[wasm_bindgen_test]
fn tier_bonus_below_base_is_zero() {
    let quantifiers = r#"[{"quantifier": "1", "premi_extra": "500", "attendance_premi": "3000"}]"#;
    let out = preview_tier_bonus("100", quantifiers, "80").unwrap();
    let out: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(out["bonus"], "0");
    assert_eq!(out["attendance"], "0");
}

#[wasm_bindgen_test]
fn quality_control_without_lines_is_flagged() {
    let item = r#"{"ref_id": "QC-1", "name": "QC/1", "scale_no": "WB/1", "delivery_no": "DO-1"}"#;
    assert_eq!(
        check_quality_control_item(item).unwrap().as_deref(),
        Some("Required Fields Not Found: penalty_info")
    );
}

#[wasm_bindgen_test]
fn harvest_item_with_wrong_type() {
    let item = r#"{"ref_id": 1, "type_id": "1", "name": "PANEN/1", "afdeling_id": 3,
        "foreman_id": 4, "foreman_extra_id": 5, "assistant_id": 6, "clerk_id": 7,
        "labour_ids": [{"member_id": 10, "block_id": 2}]}"#;
    assert_eq!(
        check_harvest_item(item).unwrap().as_deref(),
        Some("Incorrect Data Type: Field type_id must be int")
    );
}
