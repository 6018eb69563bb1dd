use async_trait::async_trait;
use dispatch_core::{AuditFilter, AuditLogEntry, AuditStore, CoreResult};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::enums::{actor_type_to_str, str_to_actor_type};
use crate::error::map_sqlx_err;

#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> AuditLogEntry {
    AuditLogEntry {
        id: row.get::<Uuid, _>("id").to_string(),
        actor_id: row.get("actor_id"),
        actor_type: str_to_actor_type(row.get("actor_type")),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        action: row.get("action"),
        reason: row.get("reason"),
        previous_value: row.get("previous_value"),
        new_value: row.get("new_value"),
        ip_address: row.get("ip_address"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> CoreResult<()> {
        let id: Uuid = entry.id.parse().unwrap_or_else(|_| Uuid::new_v4());
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, actor_id, actor_type, entity_type, entity_id, action, reason, previous_value, new_value, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(&entry.actor_id)
        .bind(actor_type_to_str(entry.actor_type))
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.reason)
        .bind(&entry.previous_value)
        .bind(&entry.new_value)
        .bind(&entry.ip_address)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list(&self, filter: AuditFilter, offset: u64, limit: u64) -> CoreResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM audit_log
            WHERE ($1::text IS NULL OR entity_type = $1)
              AND ($2::text IS NULL OR entity_id = $2)
              AND ($3::text IS NULL OR actor_id = $3)
              AND ($4::text IS NULL OR action = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY created_at DESC
            OFFSET $7
            LIMIT $8
            "#,
        )
        .bind(&filter.entity_type)
        .bind(&filter.entity_id)
        .bind(&filter.actor_id)
        .bind(&filter.action)
        .bind(filter.since)
        .bind(filter.until)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(row_to_entry).collect())
    }
}
