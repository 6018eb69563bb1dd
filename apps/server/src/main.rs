//! Binary entrypoint: loads config, constructs the Queue, Heartbeat
//! Registry, relational stores and external seams, then spawns the
//! Worker Pool, Schedule Planner tick, Snapshot Collector tick, Incident
//! Detector tick and the admin HTTP surface side by side, shutting all of
//! them down together on SIGTERM (spec.md §9 "constructed at process
//! start after config is loaded... disposed on SIGTERM after workers
//! have drained").
//!
//! Grounded on `fourthplaces-mntogether/packages/server/src/server/main.rs`'s
//! "load config, connect, build, serve" shape and
//! `.../kernel/jobs/runner.rs`'s background-service-as-spawned-task pattern.

mod config;
mod directory;
mod post_handler;
mod system_tick_handler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_api::AppState;
use dispatch_core::{EnqueueOptions, HandlerRegistry, JobQueue, RepeatOptions};
use dispatch_queue_redis::{RedisHeartbeatRegistry, RedisJobQueue};
use dispatch_scheduler::{IncidentDetector, RunProgressTracker, SchedulePlanner, SnapshotCollector};
use dispatch_store_postgres::{PgAuditStore, PgIncidentStore, PgRunStore, PgSnapshotStore};
use dispatch_worker::{WorkerPool, WorkerPoolConfig};

use config::Config;
use directory::{PgScheduleDirectory, PgSessionStatusSink};
use post_handler::UnimplementedCreatePostHandler;
use system_tick_handler::SystemTickHandler;

/// Fixed id for the single-instance repeatable snapshot-collector job
/// (spec.md §4.6 "system repeatable job with fixed id").
const SNAPSHOT_COLLECTOR_JOB_ID: &str = "stats-snapshot-collector";
const SYSTEM_QUEUE: &str = "system";
const SNAPSHOT_TICK_JOB_TYPE: &str = "SNAPSHOT_TICK";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dispatch_core=debug,dispatch_worker=debug,dispatch_scheduler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting dispatch-server");

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!("connecting to postgres");
    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;

    tracing::info!("connecting to redis");
    let redis_client = redis::Client::open(config.redis_url.clone()).context("invalid REDIS_URL")?;
    let redis_conn = redis_client
        .get_connection_manager()
        .await
        .context("failed to connect to redis")?;

    let queue: Arc<dyn dispatch_core::JobQueue> = Arc::new(RedisJobQueue::new(redis_conn.clone()));
    let registry: Arc<dyn dispatch_core::HeartbeatRegistry> =
        Arc::new(RedisHeartbeatRegistry::new(redis_conn));

    let run_store: Arc<dyn dispatch_core::RunStore> = Arc::new(PgRunStore::new(pg_pool.clone()));
    let snapshot_store: Arc<dyn dispatch_core::SnapshotStore> = Arc::new(PgSnapshotStore::new(pg_pool.clone()));
    let incident_store: Arc<dyn dispatch_core::IncidentStore> = Arc::new(PgIncidentStore::new(pg_pool.clone()));
    let audit: Arc<dyn dispatch_core::AuditStore> = Arc::new(PgAuditStore::new(pg_pool.clone()));

    let directory: Arc<dyn dispatch_core::ScheduleDirectory> =
        Arc::new(PgScheduleDirectory::new(pg_pool.clone()));
    let session_sink: Arc<dyn dispatch_core::SessionStatusSink> =
        Arc::new(PgSessionStatusSink::new(pg_pool.clone()));

    let primary_queue = config
        .queue_names
        .first()
        .cloned()
        .unwrap_or_else(|| "cafe-jobs".to_string());

    let planner = Arc::new(
        SchedulePlanner::new(
            queue.clone(),
            directory,
            run_store.clone(),
            audit.clone(),
            primary_queue.clone(),
            config.schedule_timezone,
        )
        .with_auto_suspend_threshold(config.auto_suspend_threshold),
    );
    let run_progress = Arc::new(RunProgressTracker::new(run_store.clone(), planner.clone()));

    let snapshot_collector = Arc::new(SnapshotCollector::new(
        queue.clone(),
        registry.clone(),
        snapshot_store.clone(),
        config.queue_names.clone(),
    ));
    let incident_detector = Arc::new(IncidentDetector::new(
        snapshot_store.clone(),
        incident_store.clone(),
        audit.clone(),
        config.queue_names.clone(),
    ));

    let mut handlers = HandlerRegistry::new();
    handlers.register("CREATE_POST", Arc::new(UnimplementedCreatePostHandler));
    handlers.register(
        SNAPSHOT_TICK_JOB_TYPE,
        Arc::new(SystemTickHandler::new(snapshot_collector.clone(), incident_detector.clone())),
    );
    let handlers = Arc::new(handlers);

    let state = AppState {
        queue: queue.clone(),
        registry: registry.clone(),
        run_store,
        snapshot_store,
        incident_store,
        incident_detector: incident_detector.clone(),
        audit,
        queue_names: Arc::new(config.queue_names.clone()),
        admin_api_key: Arc::from(config.admin_api_key.as_str()),
        dashboard_cache: Arc::new(dispatch_api::DashboardCache::new()),
    };
    let router = dispatch_api::build_router(state);

    let shutdown = CancellationToken::new();

    let worker_pool = Arc::new(
        WorkerPool::new(
            queue.clone(),
            registry.clone(),
            handlers.clone(),
            Some(session_sink),
            WorkerPoolConfig::new(primary_queue).with_poll_loops(config.worker_poll_loops),
        )
        .with_run_progress(run_progress),
    );
    let worker_handle = tokio::spawn({
        let pool = worker_pool.clone();
        let shutdown = shutdown.clone();
        async move { pool.run(shutdown).await }
    });

    // The "system" queue carries the repeatable `SNAPSHOT_TICK` job
    // (spec.md §4.6); system jobs may run at concurrency >= 1, but a
    // single poll loop is plenty for one tick every 60s.
    let system_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        registry,
        handlers,
        None,
        WorkerPoolConfig::new(SYSTEM_QUEUE),
    ));
    let system_pool_handle = tokio::spawn({
        let pool = system_pool.clone();
        let shutdown = shutdown.clone();
        async move { pool.run(shutdown).await }
    });

    let planner_handle = tokio::spawn(tick_loop(shutdown.clone(), Duration::from_secs(60), {
        let planner = planner.clone();
        move || {
            let planner = planner.clone();
            async move {
                if let Err(e) = planner.tick(chrono::Utc::now()).await {
                    tracing::warn!(error = %e, "schedule planner tick failed");
                }
            }
        }
    }));

    // Re-attempts the `SNAPSHOT_TICK` enqueue every 60s; the Queue's
    // repeatable contract makes this a no-op while an instance is still
    // non-terminal, so exactly one instance is ever live (spec.md §4.1
    // "at-most-one-live per repeatable"). Seeded once up front so the
    // system pool has work within the first minute rather than waiting
    // for the loop's first tick.
    if let Err(e) = seed_snapshot_collector_repeat(queue.as_ref()).await {
        tracing::warn!(error = %e, "failed to seed initial snapshot-collector repeatable job");
    }
    let snapshot_seed_handle = tokio::spawn(tick_loop(shutdown.clone(), Duration::from_secs(60), {
        let queue = queue.clone();
        move || {
            let queue = queue.clone();
            async move {
                if let Err(e) = seed_snapshot_collector_repeat(queue.as_ref()).await {
                    tracing::warn!(error = %e, "failed to seed snapshot-collector repeatable job");
                }
            }
        }
    }));

    let addr = format!("0.0.0.0:{}", config.http_port);
    tracing::info!(%addr, "binding admin HTTP surface");
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind HTTP listener")?;

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining workers");
    shutdown.cancel();

    let _ = worker_handle.await;
    let _ = system_pool_handle.await;
    let _ = planner_handle.await;
    let _ = snapshot_seed_handle.await;
    if let Err(e) = server_handle.await.context("http server task panicked")? {
        tracing::warn!(error = %e, "http server exited with error");
    }

    pg_pool.close().await;
    tracing::info!("dispatch-server stopped");
    Ok(())
}

/// Seeds the Snapshot Collector's repeatable-job registration (spec.md
/// §4.1 "repeatable jobs" / §4.6): idempotent on restart because
/// `RepeatOptions::job_id` is fixed, so re-seeding after a crash never
/// produces a second live instance.
async fn seed_snapshot_collector_repeat(queue: &dyn dispatch_core::JobQueue) -> Result<()> {
    let opts = EnqueueOptions {
        repeat: Some(RepeatOptions {
            every_ms: 60_000,
            job_id: SNAPSHOT_COLLECTOR_JOB_ID.to_string(),
        }),
        ..Default::default()
    };
    queue
        .enqueue(SYSTEM_QUEUE, SNAPSHOT_TICK_JOB_TYPE, serde_json::json!({}), opts)
        .await
        .context("failed to seed snapshot-collector repeatable job")?;
    Ok(())
}

/// Runs `f` on `period` until `shutdown` fires, same "tick until
/// cancelled" shape the Worker Pool uses for its poll loops.
async fn tick_loop<F, Fut>(shutdown: CancellationToken, period: Duration, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => f().await,
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
