//! Activity audit sink.
//!
//! Called once per committed ledger mutation, after the transaction. The
//! write is fire-and-forget: a failed audit insert is logged and never
//! rolls back or fails the business operation.

use crate::models::AuditAction;
use sqlx::postgres::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ActivityAudit {
    pool: PgPool,
}

impl ActivityAudit {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an activity event asynchronously (non-blocking).
    pub fn record(&self, actor: &str, action: AuditAction, entity_table: &str, entity_id: Uuid) {
        let pool = self.pool.clone();
        let actor = actor.to_string();
        let entity_table = entity_table.to_string();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO activity_events (event_id, actor, action, entity_table, entity_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&actor)
            .bind(action.as_str())
            .bind(&entity_table)
            .bind(entity_id.to_string())
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::error!(
                    error = %e,
                    actor = %actor,
                    action = %action,
                    entity_table = %entity_table,
                    "Failed to write activity event"
                );
            }
        });
    }
}
