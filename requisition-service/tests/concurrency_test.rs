//! The single most important correctness property: two racing payment
//! submissions that individually fit within pending but jointly exceed it
//! must resolve to exactly one winner.

mod common;

use common::{spawn_app, TestApp};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn racing_payments_admit_exactly_one_winner() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    // Each 600.00 fits within the pending 1000.00 on its own; together
    // they exceed it. The row lock serializes the check-and-write.
    let (first, second) = tokio::join!(
        app.record_payment(&requisition_id, "600.00"),
        app.record_payment(&requisition_id, "600.00"),
    );

    let statuses = [first.status().as_u16(), second.status().as_u16()];
    let winners = statuses.iter().filter(|s| **s == 201).count();
    let losers = statuses.iter().filter(|s| **s == 409).count();
    assert_eq!(winners, 1, "exactly one submission must win: {:?}", statuses);
    assert_eq!(losers, 1, "the other must be rejected: {:?}", statuses);

    let view = app.get_view(&requisition_id).await;
    assert_eq!(view["payments"].as_array().unwrap().len(), 1);
    assert_eq!(view["pending_to_pay"], "400.00");
}

#[tokio::test]
#[serial]
async fn repeated_races_preserve_the_invariant() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("100.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    // Fire several rounds of concurrent submissions; whatever wins, the
    // committed sum can never exceed the authorized total.
    for _ in 0..5 {
        let (_a, _b) = tokio::join!(
            app.record_payment(&requisition_id, "30.00"),
            app.record_payment(&requisition_id, "30.00"),
        );
    }

    let view = app.get_view(&requisition_id).await;
    let paid: f64 = view["payments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["amount"].as_str().unwrap().parse::<f64>().unwrap())
        .sum();
    assert!(paid <= 100.0 + 1e-5, "paid {} exceeds the total", paid);
}
