//! PostgreSQL 连接池
//!
//! 延迟步骤存储的多个 worker 实例共用一张表，连接以服务名作为
//! `application_name` 登记，便于在 `pg_stat_activity` 中区分认领方。

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建连接池并确认数据库可用
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig, application_name: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)?.application_name(application_name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.health_check().await?;
        info!(
            max_connections = config.max_connections,
            "数据库连接池已就绪"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
