//! Common test utilities for requisition-service integration tests.
//!
//! These tests need a running PostgreSQL pointed to by `TEST_DATABASE_URL`.
//! When the variable is unset the tests skip with a notice instead of
//! failing, so the unit suite stays runnable without infrastructure.

use requisition_service::config::{
    DatabaseConfig, RequisitionConfig, SmtpConfig, StorageBackend, StorageConfig,
};
use requisition_service::startup::Application;
use service_core::config::Config as CommonConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,requisition_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(database_url: &str, review_recipient: Option<String>) -> RequisitionConfig {
    RequisitionConfig {
        common: CommonConfig { port: 0 },
        service_name: "requisition-service-test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 4,
            min_connections: 1,
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_path: std::env::temp_dir()
                .join(format!("requis-test-{}", Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
            s3_bucket: None,
        },
        smtp: SmtpConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "requisitions@localhost".to_string(),
            from_name: "Requisitions".to_string(),
            review_recipient,
        },
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub pool: PgPool,
    pub actor_id: Uuid,
}

/// Spawn a test application. Returns `None` (skipping the test) when
/// `TEST_DATABASE_URL` is not set.
pub async fn spawn_app() -> Option<TestApp> {
    spawn_app_with_recipient(Some("revision@example.com".to_string())).await
}

/// Spawn a test application with an explicit review recipient, or none to
/// exercise the misconfiguration path.
pub async fn spawn_app_with_recipient(review_recipient: Option<String>) -> Option<TestApp> {
    init_tracing();

    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let config = test_config(&database_url, review_recipient);

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect test pool");

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        pool,
        actor_id: Uuid::new_v4(),
    })
}

#[allow(dead_code)]
impl TestApp {
    /// Create a requisition with the given total and return its view.
    pub async fn create_requisition(&self, total: &str) -> serde_json::Value {
        let response = self
            .client
            .post(format!("{}/requisitions", self.address))
            .header("x-user-id", self.actor_id.to_string())
            .json(&serde_json::json!({
                "folio": format!("REQ-{}", Uuid::new_v4()),
                "kind": "advance",
                "subtotal": total,
                "total": total,
                "captured_on": "2024-03-01",
                "requester_id": Uuid::new_v4(),
            }))
            .send()
            .await
            .expect("Failed to create requisition");

        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Invalid requisition view")
    }

    pub fn requisition_id(view: &serde_json::Value) -> String {
        view["requisition"]["requisition_id"]
            .as_str()
            .expect("missing requisition_id")
            .to_string()
    }

    /// Fetch the aggregate view.
    pub async fn get_view(&self, requisition_id: &str) -> serde_json::Value {
        let response = self
            .client
            .get(format!("{}/requisitions/{}", self.address, requisition_id))
            .send()
            .await
            .expect("Failed to fetch view");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Invalid view")
    }

    /// Record a payment with a stub receipt file.
    pub async fn record_payment(&self, requisition_id: &str, amount: &str) -> reqwest::Response {
        let form = reqwest::multipart::Form::new()
            .text("amount", amount.to_string())
            .text("paid_on", "2024-03-05")
            .text("beneficiary_name", "Proveedora del Norte SA")
            .text("beneficiary_bank", "BBVA")
            .text("beneficiary_account", "012345678901234567")
            .part(
                "receipt",
                reqwest::multipart::Part::bytes(b"transfer receipt".to_vec())
                    .file_name("transfer.pdf")
                    .mime_str("application/pdf")
                    .unwrap(),
            );

        self.client
            .post(format!(
                "{}/requisitions/{}/payments",
                self.address, requisition_id
            ))
            .header("x-user-id", self.actor_id.to_string())
            .multipart(form)
            .send()
            .await
            .expect("Failed to post payment")
    }

    /// Record an evidence entry with a stub invoice file.
    pub async fn record_evidence(&self, requisition_id: &str, amount: &str) -> reqwest::Response {
        let form = reqwest::multipart::Form::new()
            .text("amount", amount.to_string())
            .text("doc_kind", "invoice")
            .text("issued_on", "2024-03-06")
            .text("note", "Factura adjunta")
            .part(
                "file",
                reqwest::multipart::Part::bytes(b"invoice xml".to_vec())
                    .file_name("factura.xml")
                    .mime_str("application/xml")
                    .unwrap(),
            );

        self.client
            .post(format!(
                "{}/requisitions/{}/evidence",
                self.address, requisition_id
            ))
            .header("x-user-id", self.actor_id.to_string())
            .multipart(form)
            .send()
            .await
            .expect("Failed to post evidence")
    }

    /// Review an evidence entry with the reviewer capability.
    pub async fn review_evidence(
        &self,
        evidence_id: &str,
        decision: &str,
        comment: Option<&str>,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}/evidence/{}/review", self.address, evidence_id))
            .header("x-user-id", self.actor_id.to_string())
            .header("x-roles", "reviewer")
            .json(&serde_json::json!({
                "decision": decision,
                "comment": comment,
            }))
            .send()
            .await
            .expect("Failed to post review")
    }

    pub async fn delete_evidence(&self, evidence_id: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}/evidence/{}", self.address, evidence_id))
            .header("x-user-id", self.actor_id.to_string())
            .send()
            .await
            .expect("Failed to delete evidence")
    }

    pub async fn accept_review(&self, requisition_id: &str) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/requisitions/{}/accept-review",
                self.address, requisition_id
            ))
            .header("x-user-id", self.actor_id.to_string())
            .header("x-roles", "resolver")
            .send()
            .await
            .expect("Failed to accept review")
    }

    /// Record an adjustment; `roles` carries the capability header.
    pub async fn record_adjustment(
        &self,
        requisition_id: &str,
        body: serde_json::Value,
        roles: &str,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!(
                "{}/requisitions/{}/adjustments",
                self.address, requisition_id
            ))
            .header("x-user-id", self.actor_id.to_string());
        if !roles.is_empty() {
            request = request.header("x-roles", roles);
        }
        request
            .json(&body)
            .send()
            .await
            .expect("Failed to post adjustment")
    }

    pub async fn resolve_adjustment(
        &self,
        adjustment_id: &str,
        resolution: &str,
    ) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/adjustments/{}/resolve",
                self.address, adjustment_id
            ))
            .header("x-user-id", self.actor_id.to_string())
            .json(&serde_json::json!({ "resolution": resolution }))
            .send()
            .await
            .expect("Failed to resolve adjustment")
    }

    /// Force a requisition into a given status, bypassing the ledgers.
    pub async fn force_status(&self, requisition_id: &str, status: &str) {
        sqlx::query("UPDATE requisitions SET status = $2 WHERE requisition_id = $1::uuid")
            .bind(requisition_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .expect("Failed to force status");
    }
}
