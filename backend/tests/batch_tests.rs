//! Bulk ingestion tests
//!
//! Covers:
//! - Schema screening of scale ticket, quality control and harvest items
//! - Batch status derived from per-item outcomes
//! - Item ordering and serialized shape of the batch response

use proptest::prelude::*;
use serde_json::{json, Value};

use shared::{
    check_missing_or_incorrect_fields, harvest_operation_schema, quality_control_schema,
    scale_ticket_schema_for, BatchOutcome, ItemResult, ItemStatus, RefId, RECORD_CREATED,
    RECORD_EXISTS, SOME_DATA_FAILED,
};

// ============================================================================
// Fixtures
// ============================================================================

fn ticket_item(ref_id: i64) -> Value {
    json!({
        "ref_id": ref_id,
        "name": format!("WB/2024/{:05}", ref_id),
        "weighbridge_id": 1,
        "product_id": 4,
        "partner_id": 2,
        "weight_in": 12500.5,
        "weight_out": 4200,
    })
}

/// Screen items the way the bulk endpoints do before any domain work
fn screen(items: &[Value], schema_for: impl Fn(&Value) -> shared::FieldSchema) -> (Vec<Value>, BatchOutcome) {
    let mut batch = BatchOutcome::new();
    let mut accepted = Vec::new();
    for item in items {
        match check_missing_or_incorrect_fields(item, &schema_for(item)) {
            None => accepted.push(item.clone()),
            Some(message) => batch.push_schema_failure(ItemResult::failed(
                None,
                item.get("name").and_then(Value::as_str).map(str::to_string),
                RefId::from_json(item),
                message,
            )),
        }
    }
    (accepted, batch)
}

fn created(n: i64) -> ItemResult {
    ItemResult::success(n, format!("WB/2024/{:05}", n), Some(RefId::Int(n)), RECORD_CREATED)
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Created,
    Duplicate,
    Raised,
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Created), Just(Outcome::Duplicate), Just(Outcome::Raised)]
}

proptest! {
    #[test]
    fn batch_status_follows_item_outcomes(outcomes in prop::collection::vec(outcome_strategy(), 0..=12)) {
        let mut batch = BatchOutcome::new();
        for (i, outcome) in outcomes.iter().enumerate() {
            let n = i as i64;
            match outcome {
                Outcome::Created => batch.push_success(created(n)),
                Outcome::Duplicate => batch.push_rejected(ItemResult::failed(None, None, Some(RefId::Int(n)), RECORD_EXISTS)),
                Outcome::Raised => batch.push_error(ItemResult::failed(None, None, Some(RefId::Int(n)), "boom")),
            }
        }

        let any_created = outcomes.iter().any(|o| matches!(o, Outcome::Created));
        let any_failed = outcomes.iter().any(|o| !matches!(o, Outcome::Created));
        let expected = match (any_created, any_failed) {
            (false, _) => 400,
            (true, true) => 206,
            (true, false) => 201,
        };
        prop_assert_eq!(batch.status(), expected);
        prop_assert_eq!(batch.into_items().len(), outcomes.len());
    }

    #[test]
    fn successes_are_listed_before_failures(outcomes in prop::collection::vec(any::<bool>(), 1..=12)) {
        let mut batch = BatchOutcome::new();
        for (i, ok) in outcomes.iter().enumerate() {
            if *ok {
                batch.push_success(created(i as i64));
            } else {
                batch.push_error(ItemResult::failed(None, None, Some(RefId::Int(i as i64)), "boom"));
            }
        }
        let statuses: Vec<ItemStatus> = batch.into_items().into_iter().map(|item| item.status).collect();
        let first_failure = statuses.iter().position(|s| *s == ItemStatus::Failed).unwrap_or(statuses.len());
        prop_assert!(statuses[first_failure..].iter().all(|s| *s == ItemStatus::Failed));
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn incomplete_ticket_is_dropped_and_batch_is_partial() {
    let mut incomplete = ticket_item(2);
    incomplete["partner_id"] = Value::Null;
    incomplete["weight_out"] = json!(0);
    let items = vec![ticket_item(1), incomplete];

    let (accepted, mut batch) = screen(&items, scale_ticket_schema_for);
    assert_eq!(accepted.len(), 1);

    batch.push_success(created(1));
    assert_eq!(batch.status(), 206);
    assert_eq!(batch.message(), SOME_DATA_FAILED);

    let items = batch.into_items();
    assert_eq!(items[1].message, "Required Fields Not Found: partner_id, weight_out");
    assert_eq!(items[1].ref_id, Some(RefId::Int(2)));
}

#[test]
fn string_weight_is_an_incorrect_type() {
    let mut item = ticket_item(3);
    item["weight_in"] = json!("12500");
    let message = check_missing_or_incorrect_fields(&item, &scale_ticket_schema_for(&item));
    assert_eq!(
        message.as_deref(),
        Some("Incorrect Data Type: Field weight_in must be float or int")
    );
}

#[test]
fn return_ticket_may_omit_partner() {
    let mut item = ticket_item(4);
    item.as_object_mut().unwrap().remove("partner_id");
    assert!(check_missing_or_incorrect_fields(&item, &scale_ticket_schema_for(&item)).is_some());

    item["is_return"] = json!(true);
    item["source_id"] = json!("0b6c1d5e-3c2a-4d61-9d35-2f1f0a7c9e11");
    assert_eq!(check_missing_or_incorrect_fields(&item, &scale_ticket_schema_for(&item)), None);
}

#[test]
fn quality_control_needs_penalty_lines() {
    let item = json!({
        "ref_id": "QC-1",
        "name": "QC/2024/00001",
        "scale_no": "WB/2024/00001",
        "delivery_no": "DO-77",
        "penalty_info": [],
    });
    assert_eq!(
        check_missing_or_incorrect_fields(&item, &quality_control_schema()).as_deref(),
        Some("Required Fields Not Found: penalty_info")
    );
}

#[test]
fn harvest_labour_lines_are_screened_individually() {
    let item = json!({
        "ref_id": 10,
        "type_id": 1,
        "name": "PANEN/2024/0001",
        "afdeling_id": 3,
        "foreman_id": 41,
        "foreman_extra_id": 43,
        "assistant_id": 44,
        "clerk_id": 42,
        "labour_ids": [
            {"member_id": 100, "block_id": 10},
            {"member_id": 101},
        ],
    });
    assert_eq!(
        check_missing_or_incorrect_fields(&item, &harvest_operation_schema()).as_deref(),
        Some("Required Fields Not Found: block_id")
    );
}

#[test]
fn every_item_rejected_by_schema_is_bad_request() {
    let items = vec![json!({"ref_id": 1}), json!({"ref_id": 2})];
    let (accepted, batch) = screen(&items, scale_ticket_schema_for);
    assert!(accepted.is_empty());
    assert_eq!(batch.status(), 400);
    assert_eq!(batch.message(), "Failed to create data");
    assert_eq!(batch.into_items().len(), 2);
}

#[test]
fn duplicate_beside_created_ticket_is_partial() {
    let (accepted, mut batch) = screen(&[ticket_item(1), ticket_item(2)], scale_ticket_schema_for);
    assert_eq!(accepted.len(), 2);

    batch.push_success(created(1));
    batch.push_rejected(ItemResult::failed(
        None,
        Some("WB/2024/00002".into()),
        Some(RefId::Int(2)),
        RECORD_EXISTS,
    ));
    assert_eq!(batch.status(), 206);
    assert_eq!(batch.message(), SOME_DATA_FAILED);
}

#[test]
fn item_result_serializes_for_the_mobile_client() {
    let json = serde_json::to_value(created(5)).unwrap();
    assert_eq!(
        json,
        json!({
            "id": 5,
            "name": "WB/2024/00005",
            "ref_id": 5,
            "status": "success",
            "message": RECORD_CREATED,
        })
    );
}
