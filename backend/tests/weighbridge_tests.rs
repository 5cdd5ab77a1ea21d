//! Scale ticket lifecycle property-based and scenario tests
//!
//! Covers:
//! - Net weight and delivery direction derived from the readings
//! - Posting and cancelling are idempotent
//! - Split children add up to the original net-after-QC weight
//! - Merged tickets sum the weights and quantities of their sources
//! - Quality-control deductions and the acceptance scenario

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    ensure_distinct_tickets, CalculationType, DeliveryType, DomainError, MergeRequest, Partner, QcPenaltyLine, QcState,
    QualityControl, ReturnLine, ReturnMethod, ReturnRequest, ScaleBook, ScaleState, ScaleTicket,
    SplitRequest, StagedAudit, StagedStock, Weighbridge, DUPLICATE_MERGE_SOURCE,
};

// ============================================================================
// Fixtures
// ============================================================================

fn scale_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn book() -> ScaleBook {
    let mut book = ScaleBook::new();
    book.add_partner(Partner {
        id: 1,
        name: "KUD Sawit Jaya".into(),
        company_id: None,
        supplier_location_id: 100,
        customer_location_id: 200,
    });
    book.add_weighbridge(Weighbridge {
        id: 1,
        name: "Timbangan PKS".into(),
        code: "PKS1".into(),
        company_id: None,
        partner_id: None,
        stock_location_id: 300,
    });
    book
}

fn ticket(name: &str, weight_in: i64, weight_out: i64) -> ScaleTicket {
    let mut t = ScaleTicket::draft(
        1,
        1,
        1,
        scale_day(),
        Decimal::from(weight_in),
        Decimal::from(weight_out),
    );
    t.name = name.to_string();
    t
}

fn with_penalty(book: &mut ScaleBook, ticket_id: Uuid, kind: CalculationType, qty: i64) -> Uuid {
    let mut qc = QualityControl::draft(format!("QC/{}", ticket_id), Some(ticket_id), scale_day());
    qc.penalties.push(QcPenaltyLine::new(1, kind, Decimal::from(qty)));
    book.insert_quality_control(qc)
}

fn close_enough(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= Decimal::new(1, 9)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn net_weight_is_absolute_difference(weight_in in 0..=60_000i64, weight_out in 0..=60_000i64) {
        let mut book = book();
        let id = book.insert_ticket(ticket("T", weight_in, weight_out));
        book.recompute(id).unwrap();

        let t = book.ticket(id).unwrap();
        prop_assert_eq!(t.net_weight, Decimal::from((weight_in - weight_out).abs()));
        let expected = match weight_in.cmp(&weight_out) {
            std::cmp::Ordering::Greater => Some(DeliveryType::Acceptance),
            std::cmp::Ordering::Less => Some(DeliveryType::Shipment),
            std::cmp::Ordering::Equal => None,
        };
        prop_assert_eq!(t.delivery_type, expected);
    }

    #[test]
    fn posting_twice_moves_stock_once(weight_in in 1_001..=30_000i64, weight_out in 0..=1_000i64) {
        let mut book = book();
        let id = book.insert_ticket(ticket("T", weight_in, weight_out));
        let mut stock = StagedStock::default();

        book.post(id, &mut stock).unwrap();
        book.post(id, &mut stock).unwrap();

        prop_assert_eq!(stock.moves.len(), 1);
        prop_assert_eq!(book.ticket(id).unwrap().state, ScaleState::Posted);
    }

    #[test]
    fn cancelling_twice_reverses_once(weight_in in 1_001..=30_000i64, weight_out in 0..=1_000i64) {
        let mut book = book();
        let id = book.insert_ticket(ticket("T", weight_in, weight_out));
        let mut stock = StagedStock::default();
        book.post(id, &mut stock).unwrap();

        book.cancel(id, &mut stock).unwrap();
        book.cancel(id, &mut stock).unwrap();

        prop_assert_eq!(stock.moves.len(), 2);
        prop_assert_eq!(stock.unlinked.clone(), vec![id]);
        prop_assert_eq!(stock.moves[1].ticket_id, None);
        prop_assert_eq!(stock.moves[1].source_location_id, stock.moves[0].dest_location_id);
    }

    #[test]
    fn split_children_add_up_to_original(
        weight_in in 2_000..=20_000i64,
        weight_out in 0..=1_000i64,
        penalty in 0..=500i64,
        percent in 1..=99i64,
    ) {
        let mut book = book();
        let id = book.insert_ticket(ticket("WB/2024/00007", weight_in, weight_out));
        with_penalty(&mut book, id, CalculationType::PerQty, penalty);
        book.recompute(id).unwrap();

        let original = book.ticket(id).unwrap().net_after_quality_control;
        let netto = original * Decimal::new(percent, 2);
        let outcome = book
            .split(&[id], &SplitRequest { netto, quantity: Decimal::ZERO })
            .unwrap();

        let first = book.ticket(outcome.first).unwrap().net_after_quality_control;
        let second = book.ticket(outcome.second).unwrap().net_after_quality_control;
        prop_assert!(close_enough(first + second, original));
        prop_assert!(close_enough(first, netto));
        prop_assert_eq!(book.ticket(id).unwrap().state, ScaleState::Split);
    }

    #[test]
    fn merge_sums_weights_and_quantities(
        readings in prop::collection::vec((1_000..=20_000i64, 0..=999i64, 0..=50i64), 2..=5),
    ) {
        let mut book = book();
        let mut ids = Vec::new();
        for (i, (weight_in, weight_out, quantity)) in readings.iter().enumerate() {
            let mut t = ticket(&format!("WB/2024/{:05}", i + 1), *weight_in, *weight_out);
            t.quantity = Decimal::from(*quantity);
            ids.push(book.insert_ticket(t));
        }

        let merged = book
            .merge(&MergeRequest { ticket_ids: ids.clone(), merge_to: None, date: scale_day() })
            .unwrap();

        let m = book.ticket(merged).unwrap();
        let weight_in: i64 = readings.iter().map(|r| r.0).sum();
        let weight_out: i64 = readings.iter().map(|r| r.1).sum();
        let quantity: i64 = readings.iter().map(|r| r.2).sum();
        prop_assert_eq!(m.weight_in, Decimal::from(weight_in));
        prop_assert_eq!(m.weight_out, Decimal::from(weight_out));
        prop_assert_eq!(m.quantity, Decimal::from(quantity));
        prop_assert_eq!(m.state, ScaleState::Draft);
        for id in &ids {
            let source = book.ticket(*id).unwrap();
            prop_assert_eq!(source.state, ScaleState::Merged);
            prop_assert_eq!(source.merged_to, Some(merged));
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn acceptance_ticket_with_50kg_penalty_nets_950() {
    let mut book = book();
    let id = book.insert_ticket(ticket("WB/2024/00001", 5000, 4000));
    with_penalty(&mut book, id, CalculationType::PerQty, 50);
    book.recompute(id).unwrap();

    let t = book.ticket(id).unwrap();
    assert_eq!(t.net_weight, Decimal::from(1000));
    assert_eq!(t.net_after_quality_control, Decimal::from(950));
    assert_eq!(t.delivery_type, Some(DeliveryType::Acceptance));
    assert_eq!(
        serde_json::to_value(t.delivery_type).unwrap(),
        serde_json::json!("acceptance")
    );
}

#[test]
fn zero_net_weight_cannot_be_posted() {
    let mut book = book();
    let id = book.insert_ticket(ticket("WB/2024/00002", 4000, 4000));
    let mut stock = StagedStock::default();

    let err = book.post(id, &mut stock).unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    assert_eq!(book.ticket(id).unwrap().state, ScaleState::Draft);
    assert!(stock.moves.is_empty());
}

#[test]
fn cancelled_quality_control_stops_deducting() {
    let mut book = book();
    let id = book.insert_ticket(ticket("WB/2024/00003", 5000, 4000));
    let qc = with_penalty(&mut book, id, CalculationType::Percentage, 5);
    let mut stock = StagedStock::default();
    book.post(id, &mut stock).unwrap();

    assert_eq!(book.ticket(id).unwrap().net_after_quality_control, Decimal::from(950));
    assert_eq!(book.quality_control(qc).unwrap().state, QcState::Posted);

    book.cancel_quality_control(qc).unwrap();
    assert_eq!(book.ticket(id).unwrap().net_after_quality_control, Decimal::from(1000));
}

#[test]
fn per_unit_penalty_deducts_nothing() {
    let mut book = book();
    let id = book.insert_ticket(ticket("WB/2024/00004", 5000, 4000));
    with_penalty(&mut book, id, CalculationType::PerUnit, 12);
    book.recompute(id).unwrap();

    assert_eq!(book.ticket(id).unwrap().net_after_quality_control, Decimal::from(1000));
}

#[test]
fn split_requires_a_single_draft_ticket() {
    let mut book = book();
    let a = book.insert_ticket(ticket("A", 5000, 4000));
    let b = book.insert_ticket(ticket("B", 5000, 4000));
    let request = SplitRequest { netto: Decimal::from(100), quantity: Decimal::ZERO };

    assert!(book.split(&[a, b], &request).is_err());

    let mut stock = StagedStock::default();
    book.post(a, &mut stock).unwrap();
    assert!(book.split(&[a], &request).is_err());

    let too_heavy = SplitRequest { netto: Decimal::from(1000), quantity: Decimal::ZERO };
    assert!(book.split(&[b], &too_heavy).is_err());
}

#[test]
fn merge_rejects_mixed_partners() {
    let mut book = book();
    let a = book.insert_ticket(ticket("A", 5000, 4000));
    let mut other = ticket("B", 6000, 4000);
    other.partner_id = 2;
    let b = book.insert_ticket(other);

    let err = book
        .merge(&MergeRequest { ticket_ids: vec![a, b], merge_to: None, date: scale_day() })
        .unwrap_err();
    assert_eq!(err, DomainError::validation("You can only merge scale with the same partner"));
    assert_eq!(book.ticket(a).unwrap().state, ScaleState::Draft);
}

#[test]
fn merge_of_a_repeated_ticket_is_a_validation_error() {
    let mut book = book();
    let a = book.insert_ticket(ticket("A", 5000, 4000));

    let repeated = vec![a, a];
    assert_eq!(
        ensure_distinct_tickets(&repeated),
        Err(DomainError::validation(DUPLICATE_MERGE_SOURCE))
    );

    let err = book
        .merge(&MergeRequest { ticket_ids: repeated, merge_to: None, date: scale_day() })
        .unwrap_err();
    assert_eq!(err, DomainError::validation(DUPLICATE_MERGE_SOURCE));
    assert_eq!(book.ticket(a).unwrap().state, ScaleState::Draft);
    assert_eq!(book.tickets().len(), 1);
}

#[test]
fn full_return_swaps_weights_and_posts() {
    let mut book = book();
    let id = book.insert_ticket(ticket("WB/2024/00005", 5000, 4000));
    let mut stock = StagedStock::default();
    let mut audit = StagedAudit::default();
    book.post(id, &mut stock).unwrap();

    let request = ReturnRequest {
        method: ReturnMethod::Full,
        reason: "Wrong mill".into(),
        date: scale_day(),
        lines: vec![ReturnLine {
            ticket_id: id,
            weight_in: None,
            weight_out: None,
            driver_name: None,
            licence_plate: None,
        }],
    };
    let returns = book.return_tickets(&request, &mut stock, &mut audit).unwrap();

    let r = book.ticket(returns[0]).unwrap();
    assert!(r.is_return);
    assert_eq!(r.source_id, Some(id));
    assert_eq!(r.weight_in, Decimal::from(4000));
    assert_eq!(r.weight_out, Decimal::from(5000));
    assert_eq!(r.state, ScaleState::Posted);
    assert_eq!(book.ticket(id).unwrap().state, ScaleState::Posted);
    assert!(audit
        .messages
        .iter()
        .any(|(ticket_id, message)| *ticket_id == id && message == "Scale has been returned."));
    assert_eq!(stock.moves.len(), 2);
}
