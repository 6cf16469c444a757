//! Integration tests for the adjustment log.

mod common;

use common::{spawn_app, TestApp};

fn adjustment_body(kind: &str, amount: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": kind,
        "direction": "favors_requester",
        "amount": amount,
        "method": "transferencia",
        "reference": "OP-20240305",
        "reason": "Cotizacion actualizada",
    })
}

#[tokio::test]
async fn authorized_increase_unblocks_a_previously_blocked_payment() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    assert_eq!(
        app.record_payment(&requisition_id, "1000.00")
            .await
            .status()
            .as_u16(),
        201
    );
    // Blocked: would exceed the old total.
    assert_eq!(
        app.record_payment(&requisition_id, "500.00")
            .await
            .status()
            .as_u16(),
        409
    );

    let response = app
        .record_adjustment(
            &requisition_id,
            adjustment_body("authorized_increase", "500.00"),
            "resolver",
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["total"], "1500.00");
    let adjustment = &view["adjustments"][0];
    assert_eq!(adjustment["previous_total"], "1000.00");
    assert_eq!(adjustment["new_total"], "1500.00");
    assert_eq!(adjustment["status"], "aplicado");

    // The same payment now fits.
    let response = app.record_payment(&requisition_id, "500.00").await;
    assert_eq!(response.status().as_u16(), 201);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["pending_to_pay"], "0.00");
}

#[tokio::test]
async fn authorized_increase_requires_resolver_capability() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let response = app
        .record_adjustment(
            &requisition_id,
            adjustment_body("authorized_increase", "500.00"),
            "",
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    // A non-resolver role is not enough.
    let response = app
        .record_adjustment(
            &requisition_id,
            adjustment_body("authorized_increase", "500.00"),
            "reviewer",
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let view = app.get_view(&requisition_id).await;
    assert_eq!(view["requisition"]["total"], "1000.00");
    assert!(view["adjustments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn refund_is_bookkeeping_only() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("800.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let response = app
        .record_adjustment(&requisition_id, adjustment_body("refund", "120.00"), "")
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let view: serde_json::Value = response.json().await.unwrap();
    // The total is untouched and no snapshots are taken.
    assert_eq!(view["requisition"]["total"], "800.00");
    let adjustment = &view["adjustments"][0];
    assert_eq!(adjustment["status"], "pendiente");
    assert!(adjustment["previous_total"].is_null());
    assert!(adjustment["new_total"].is_null());
}

#[tokio::test]
async fn adjustment_lifecycle_moves_are_enforced() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("800.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let response = app
        .record_adjustment(&requisition_id, adjustment_body("shortfall", "50.00"), "")
        .await;
    let view: serde_json::Value = response.json().await.unwrap();
    let adjustment_id = view["adjustments"][0]["adjustment_id"].as_str().unwrap();

    // pendiente -> aplicado skips the approval step.
    let response = app.resolve_adjustment(adjustment_id, "aplicado").await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.resolve_adjustment(adjustment_id, "aprobado").await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.resolve_adjustment(adjustment_id, "aplicado").await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["adjustments"][0]["status"], "aplicado");
    assert!(!view["adjustments"][0]["resolved_utc"].is_null());

    // Terminal: no further moves, not even cancellation.
    let response = app.resolve_adjustment(adjustment_id, "cancelado").await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn pending_adjustment_can_be_cancelled() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("800.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let response = app
        .record_adjustment(&requisition_id, adjustment_body("refund", "75.00"), "")
        .await;
    let view: serde_json::Value = response.json().await.unwrap();
    let adjustment_id = view["adjustments"][0]["adjustment_id"].as_str().unwrap();

    let response = app.resolve_adjustment(adjustment_id, "cancelado").await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["adjustments"][0]["status"], "cancelado");
}

#[tokio::test]
async fn adjustment_requires_a_reason() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("800.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let mut body = adjustment_body("refund", "10.00");
    body["reason"] = serde_json::json!("");

    let response = app.record_adjustment(&requisition_id, body, "").await;
    assert_eq!(response.status().as_u16(), 422);
}
