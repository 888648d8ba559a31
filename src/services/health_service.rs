use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::Executor;
use tokio::time::timeout;

use crate::config::Config;
use crate::db::SessionProvider;

const DATABASE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const REDIS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Unhealthy,
}

impl OverallStatus {
    /// A skipped cache counts as healthy; only an outright failure degrades.
    pub fn from_probes(database: ProbeStatus, redis: ProbeStatus) -> Self {
        if database == ProbeStatus::Up && redis != ProbeStatus::Down {
            OverallStatus::Healthy
        } else {
            OverallStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub database: ProbeStatus,
    pub redis: ProbeStatus,
    pub version: String,
}

pub struct HealthService {
    config: Arc<Config>,
    sessions: Arc<dyn SessionProvider>,
}

impl HealthService {
    pub fn new(config: Arc<Config>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self { config, sessions }
    }

    /// Never fails: each probe degrades to `down` on error.
    pub async fn check(&self) -> HealthReport {
        let (database, redis) = tokio::join!(self.check_database(), self.check_redis());

        HealthReport {
            status: OverallStatus::from_probes(database, redis),
            database,
            redis,
            version: self.config.app_env.clone(),
        }
    }

    async fn check_database(&self) -> ProbeStatus {
        match timeout(DATABASE_PROBE_TIMEOUT, self.ping_database()).await {
            Ok(Ok(())) => ProbeStatus::Up,
            Ok(Err(e)) => {
                tracing::error!("Database health check failed: {}", e);
                ProbeStatus::Down
            }
            Err(_) => {
                tracing::error!("Database health check timed out");
                ProbeStatus::Down
            }
        }
    }

    async fn ping_database(&self) -> Result<(), sqlx::Error> {
        let mut session = self.sessions.acquire().await?;
        session.connection()?.execute("SELECT 1").await?;
        Ok(())
    }

    async fn check_redis(&self) -> ProbeStatus {
        let Some(url) = self.config.redis_url.as_deref() else {
            return ProbeStatus::Skipped;
        };

        match timeout(REDIS_PROBE_TIMEOUT, ping_redis(url)).await {
            Ok(Ok(())) => ProbeStatus::Up,
            Ok(Err(e)) => {
                tracing::error!("Redis health check failed: {}", e);
                ProbeStatus::Down
            }
            Err(_) => {
                tracing::error!("Redis health check timed out");
                ProbeStatus::Down
            }
        }
    }
}

async fn ping_redis(url: &str) -> redis::RedisResult<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
