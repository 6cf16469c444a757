//! Integration tests for the evidence ledger and the reviewer workflow.

mod common;

use common::{spawn_app, spawn_app_with_recipient, TestApp};

fn evidence_id(view: &serde_json::Value, index: usize) -> String {
    view["evidence"][index]["evidence_id"]
        .as_str()
        .expect("missing evidence_id")
        .to_string()
}

#[tokio::test]
async fn approving_full_coverage_marks_requisition_comprobada() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_payment(&requisition_id, "1000.00").await;

    let response = app.record_evidence(&requisition_id, "600.00").await;
    assert_eq!(response.status().as_u16(), 201);
    let response = app.record_evidence(&requisition_id, "400.00").await;
    assert_eq!(response.status().as_u16(), 201);

    let view = app.get_view(&requisition_id).await;
    assert_eq!(view["requisition"]["status"], "por_comprobar");
    assert_eq!(view["evidence"][0]["review_status"], "pendiente");
    assert_eq!(view["pending_to_evidence"], "0.00");

    let first = evidence_id(&view, 0);
    let second = evidence_id(&view, 1);

    let response = app.review_evidence(&first, "aprobado", None).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "por_comprobar");
    assert_eq!(view["sum_approved"], "600.00");

    let response = app.review_evidence(&second, "aprobado", None).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "comprobada");
    assert_eq!(view["sum_approved"], "1000.00");
}

#[tokio::test]
async fn deleting_approved_evidence_regresses_to_autorizada() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    app.record_evidence(&requisition_id, "600.00").await;
    app.record_evidence(&requisition_id, "400.00").await;

    let view = app.get_view(&requisition_id).await;
    let first = evidence_id(&view, 0);
    let second = evidence_id(&view, 1);
    app.review_evidence(&first, "aprobado", None).await;
    app.review_evidence(&second, "aprobado", None).await;

    let view = app.get_view(&requisition_id).await;
    assert_eq!(view["requisition"]["status"], "comprobada");

    let response = app.delete_evidence(&second).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "autorizada");
    assert_eq!(view["sum_approved"], "600.00");
    assert_eq!(view["evidence"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rejection_requires_a_comment() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_evidence(&requisition_id, "300.00").await;

    let view = app.get_view(&requisition_id).await;
    let entry = evidence_id(&view, 0);
    let status_before = view["requisition"]["status"].clone();

    let response = app.review_evidence(&entry, "rechazado", None).await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.review_evidence(&entry, "rechazado", Some("   ")).await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .review_evidence(&entry, "rechazado", Some("Monto ilegible"))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    // Rejected amounts never count toward the approved sum.
    assert_eq!(view["requisition"]["status"], status_before);
    assert_eq!(view["sum_approved"], "0");
    assert_eq!(view["evidence"][0]["review_status"], "rechazado");
    assert_eq!(view["evidence"][0]["review_comment"], "Monto ilegible");
}

#[tokio::test]
async fn approval_clears_a_previous_rejection_comment() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("300.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_evidence(&requisition_id, "300.00").await;

    let view = app.get_view(&requisition_id).await;
    let entry = evidence_id(&view, 0);

    app.review_evidence(&entry, "rechazado", Some("Fecha equivocada"))
        .await;
    let response = app.review_evidence(&entry, "aprobado", None).await;
    assert_eq!(response.status().as_u16(), 200);

    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["evidence"][0]["review_status"], "aprobado");
    assert!(view["evidence"][0]["review_comment"].is_null());
    assert!(!view["evidence"][0]["reviewer_id"].is_null());
}

#[tokio::test]
async fn re_approving_is_idempotent() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("500.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_evidence(&requisition_id, "500.00").await;

    let view = app.get_view(&requisition_id).await;
    let entry = evidence_id(&view, 0);

    let response = app.review_evidence(&entry, "aprobado", None).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "comprobada");

    // A second identical verdict changes nothing further.
    let response = app.review_evidence(&entry, "aprobado", None).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "comprobada");
    assert_eq!(view["sum_approved"], "500.00");
}

#[tokio::test]
async fn review_without_reviewer_capability_is_forbidden() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("100.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_evidence(&requisition_id, "100.00").await;

    let view = app.get_view(&requisition_id).await;
    let entry = evidence_id(&view, 0);

    let response = app
        .client
        .post(format!("{}/evidence/{}/review", app.address, entry))
        .header("x-user-id", app.actor_id.to_string())
        .json(&serde_json::json!({ "decision": "aprobado" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn evidence_sum_is_capped_by_the_total() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("1000.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    assert_eq!(
        app.record_evidence(&requisition_id, "800.00")
            .await
            .status()
            .as_u16(),
        201
    );
    // All statuses count toward the cap, not only approved entries.
    let response = app.record_evidence(&requisition_id, "300.00").await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn accept_review_requires_comprobada_and_resolver() {
    let Some(app) = spawn_app().await else { return };

    let view = app.create_requisition("400.00").await;
    let requisition_id = TestApp::requisition_id(&view);
    app.record_evidence(&requisition_id, "400.00").await;

    // Not yet reviewed: acceptance is premature.
    let response = app.accept_review(&requisition_id).await;
    assert_eq!(response.status().as_u16(), 409);

    let view = app.get_view(&requisition_id).await;
    let entry = evidence_id(&view, 0);
    app.review_evidence(&entry, "aprobado", None).await;

    // Without the resolver role the sign-off is forbidden.
    let response = app
        .client
        .post(format!(
            "{}/requisitions/{}/accept-review",
            app.address, requisition_id
        ))
        .header("x-user-id", app.actor_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app.accept_review(&requisition_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "comprobacion_aceptada");

    // Removing the evidence afterwards regresses the requisition.
    let response = app.delete_evidence(&entry).await;
    assert_eq!(response.status().as_u16(), 200);
    let view: serde_json::Value = response.json().await.unwrap();
    assert_eq!(view["requisition"]["status"], "autorizada");
}

#[tokio::test]
async fn missing_review_recipient_fails_the_operation() {
    let Some(app) = spawn_app_with_recipient(None).await else {
        return;
    };

    let view = app.create_requisition("100.00").await;
    let requisition_id = TestApp::requisition_id(&view);

    let response = app.record_evidence(&requisition_id, "100.00").await;
    assert_eq!(response.status().as_u16(), 500);

    // Nothing was persisted.
    let view = app.get_view(&requisition_id).await;
    assert!(view["evidence"].as_array().unwrap().is_empty());
}
