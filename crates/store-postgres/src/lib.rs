//! PostgreSQL implementation of the `dispatch-core` relational stores.
//!
//! This crate holds the four entities that are canonical in Postgres
//! rather than Redis — `ScheduleRun`, `QueueStatsSnapshot`, `Incident`, and
//! `AuditLogEntry` (see SPEC_FULL.md §3 for why the split falls there).
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TYPE run_status AS ENUM ('PENDING', 'RUNNING', 'COMPLETED', 'FAILED', 'CANCELLED');
//! CREATE TYPE incident_type AS ENUM ('QUEUE_BACKLOG', 'HIGH_FAILURE_RATE', 'WORKER_DOWN', 'SLOW_PROCESSING');
//! CREATE TYPE incident_severity AS ENUM ('LOW', 'MEDIUM', 'HIGH', 'CRITICAL');
//! CREATE TYPE incident_status AS ENUM ('ACTIVE', 'ACKNOWLEDGED', 'RESOLVED');
//! CREATE TYPE actor_type AS ENUM ('ADMIN', 'USER', 'SYSTEM');
//!
//! CREATE TABLE schedule_runs (
//!     id UUID PRIMARY KEY,
//!     schedule_id TEXT NOT NULL,
//!     user_id TEXT NOT NULL,
//!     run_date DATE NOT NULL,
//!     status run_status NOT NULL DEFAULT 'PENDING',
//!     total_jobs INTEGER NOT NULL,
//!     completed_jobs INTEGER NOT NULL DEFAULT 0,
//!     failed_jobs INTEGER NOT NULL DEFAULT 0,
//!     triggered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     started_at TIMESTAMPTZ,
//!     finished_at TIMESTAMPTZ
//! );
//! CREATE UNIQUE INDEX idx_schedule_runs_open ON schedule_runs (schedule_id, run_date)
//!     WHERE status IN ('PENDING', 'RUNNING');
//!
//! CREATE TABLE queue_stats_snapshots (
//!     id BIGSERIAL PRIMARY KEY,
//!     queue_name TEXT NOT NULL,
//!     waiting BIGINT NOT NULL,
//!     active BIGINT NOT NULL,
//!     delayed BIGINT NOT NULL,
//!     completed BIGINT NOT NULL,
//!     failed BIGINT NOT NULL,
//!     paused BOOLEAN NOT NULL,
//!     jobs_per_min BIGINT,
//!     clamped BOOLEAN NOT NULL,
//!     online_workers BIGINT NOT NULL,
//!     timestamp TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_snapshots_queue_ts ON queue_stats_snapshots (queue_name, timestamp DESC);
//!
//! CREATE TABLE incidents (
//!     id UUID PRIMARY KEY,
//!     incident_type incident_type NOT NULL,
//!     severity incident_severity NOT NULL,
//!     queue_name TEXT,
//!     title TEXT NOT NULL,
//!     description TEXT,
//!     recommended_action TEXT,
//!     affected_jobs BIGINT NOT NULL,
//!     status incident_status NOT NULL DEFAULT 'ACTIVE',
//!     started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     resolved_at TIMESTAMPTZ,
//!     resolved_by TEXT
//! );
//! CREATE UNIQUE INDEX idx_incidents_open ON incidents (incident_type, COALESCE(queue_name, ''))
//!     WHERE status <> 'RESOLVED';
//!
//! CREATE TABLE audit_log (
//!     id UUID PRIMARY KEY,
//!     actor_id TEXT,
//!     actor_type actor_type NOT NULL,
//!     entity_type TEXT NOT NULL,
//!     entity_id TEXT NOT NULL,
//!     action TEXT NOT NULL,
//!     reason TEXT,
//!     previous_value JSONB,
//!     new_value JSONB,
//!     ip_address TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX idx_audit_entity ON audit_log (entity_type, entity_id);
//! CREATE INDEX idx_audit_created ON audit_log (created_at DESC);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dispatch_store_postgres::PgRunStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/dispatch").await?;
//! let runs = PgRunStore::new(pool);
//! ```

mod audit_store;
mod enums;
mod error;
mod incident_store;
mod run_store;
mod snapshot_store;

pub use audit_store::PgAuditStore;
pub use incident_store::PgIncidentStore;
pub use run_store::PgRunStore;
pub use snapshot_store::PgSnapshotStore;
