//! Process configuration loaded from the environment, grounded on
//! `fourthplaces-mntogether/packages/server/src/config.rs`'s
//! `Config::from_env` shape.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Configuration for `dispatch-server` (spec.md §9 "constructed at process
/// start after config is loaded").
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub http_port: u16,
    pub admin_api_key: String,
    /// Queues this process knows about — closes the set the control plane
    /// and Snapshot Collector iterate over (spec.md §9 "close the set").
    pub queue_names: Vec<String>,
    /// Fixed zone Schedule `runTime`s and `runDate`s are interpreted in
    /// (spec.md §3 "calendar day in a fixed zone").
    pub schedule_timezone: chrono_tz::Tz,
    pub worker_poll_loops: usize,
    pub auto_suspend_threshold: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let queue_names = env::var("DISPATCH_QUEUE_NAMES")
            .unwrap_or_else(|_| "cafe-jobs,system".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let schedule_timezone: chrono_tz::Tz = env::var("DISPATCH_SCHEDULE_TZ")
            .unwrap_or_else(|_| "Asia/Seoul".to_string())
            .parse()
            .context("DISPATCH_SCHEDULE_TZ must be a valid IANA timezone name")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            http_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            admin_api_key: env::var("ADMIN_API_KEY").context("ADMIN_API_KEY must be set")?,
            queue_names,
            schedule_timezone,
            worker_poll_loops: env::var("DISPATCH_WORKER_POLL_LOOPS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("DISPATCH_WORKER_POLL_LOOPS must be a valid number")?,
            auto_suspend_threshold: env::var("DISPATCH_AUTO_SUSPEND_THRESHOLD")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DISPATCH_AUTO_SUSPEND_THRESHOLD must be a valid number")?,
        })
    }
}
