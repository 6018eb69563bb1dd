//! `AuditLogEntry` — append-only record of mutating operations (spec.md
//! §3/§4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Admin,
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_type: ActorType,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub reason: Option<String>,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        actor_type: ActorType,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: None,
            actor_type,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            reason: None,
            previous_value: None,
            new_value: None,
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_values(mut self, previous: Option<Value>, new: Option<Value>) -> Self {
        self.previous_value = previous;
        self.new_value = new;
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}

/// Filter accepted by `AuditStore::list` (spec.md §4.9 read path).
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
