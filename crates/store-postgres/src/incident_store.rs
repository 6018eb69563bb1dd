use async_trait::async_trait;
use dispatch_core::{CoreResult, Incident, IncidentStatus, IncidentStore, IncidentType};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::enums::{
    incident_status_to_str, incident_type_to_str, severity_to_str, str_to_incident_status,
    str_to_incident_type, str_to_severity,
};
use crate::error::map_sqlx_err;

#[derive(Clone)]
pub struct PgIncidentStore {
    pool: PgPool,
}

impl PgIncidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_incident(row: sqlx::postgres::PgRow) -> Incident {
    Incident {
        id: row.get::<Uuid, _>("id").to_string(),
        incident_type: str_to_incident_type(row.get("incident_type")),
        severity: str_to_severity(row.get("severity")),
        queue_name: row.get("queue_name"),
        title: row.get("title"),
        description: row.get("description"),
        recommended_action: row.get("recommended_action"),
        affected_jobs: row.get::<i64, _>("affected_jobs") as u64,
        status: str_to_incident_status(row.get("status")),
        started_at: row.get("started_at"),
        updated_at: row.get("updated_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
    }
}

#[async_trait]
impl IncidentStore for PgIncidentStore {
    async fn find_open(
        &self,
        incident_type: IncidentType,
        queue_name: Option<&str>,
    ) -> CoreResult<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM incidents
            WHERE incident_type = $1
              AND status <> 'RESOLVED'
              AND queue_name IS NOT DISTINCT FROM $2
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(incident_type_to_str(incident_type))
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(row_to_incident))
    }

    async fn insert(&self, incident: Incident) -> CoreResult<Incident> {
        let id: Uuid = incident.id.parse().unwrap_or_else(|_| Uuid::new_v4());
        let row = sqlx::query(
            r#"
            INSERT INTO incidents
                (id, incident_type, severity, queue_name, title, description, recommended_action, affected_jobs, status, started_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(incident_type_to_str(incident.incident_type))
        .bind(severity_to_str(incident.severity))
        .bind(&incident.queue_name)
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(&incident.recommended_action)
        .bind(incident.affected_jobs as i64)
        .bind(incident_status_to_str(incident.status))
        .bind(incident.started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row_to_incident(row))
    }

    /// Severity is intentionally absent from this `SET` — it is fixed at
    /// `insert` time and never revised by a later observation (spec.md §9
    /// "one-shot" escalation, preserved as specified).
    async fn update_observation(&self, id: &str, affected_jobs: u64) -> CoreResult<()> {
        let id: Uuid = id
            .parse()
            .map_err(|_| dispatch_core::CoreError::Validation(format!("invalid incident id: {id}")))?;
        sqlx::query(
            r#"
            UPDATE incidents
            SET affected_jobs = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(affected_jobs as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: IncidentStatus,
        resolved_by: Option<&str>,
    ) -> CoreResult<Incident> {
        let uuid: Uuid = id
            .parse()
            .map_err(|_| dispatch_core::CoreError::Validation(format!("invalid incident id: {id}")))?;
        let resolved_at_clause = if status == IncidentStatus::Resolved {
            "resolved_at = NOW()"
        } else {
            "resolved_at = resolved_at"
        };
        let query = format!(
            r#"
            UPDATE incidents
            SET status = $2, resolved_by = $3, {resolved_at_clause}
            WHERE id = $1
            RETURNING *
            "#
        );
        let row = sqlx::query(&query)
            .bind(uuid)
            .bind(incident_status_to_str(status))
            .bind(resolved_by)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row_to_incident(row))
    }

    async fn list(&self, status: Option<IncidentStatus>) -> CoreResult<Vec<Incident>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM incidents WHERE status = $1 ORDER BY started_at DESC")
                    .bind(incident_status_to_str(status))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM incidents ORDER BY started_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(row_to_incident).collect())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Incident>> {
        let uuid: Uuid = match id.parse() {
            Ok(u) => u,
            Err(_) => return Ok(None),
        };
        let row = sqlx::query("SELECT * FROM incidents WHERE id = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.map(row_to_incident))
    }
}
