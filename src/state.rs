use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, pool_of},
    khalti::KhaltiClient,
    mailer::Mailer,
    security_log::SecurityLogger,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub mailer: Mailer,
    pub khalti: KhaltiClient,
    pub security: SecurityLogger,
    /// Shared client for outbound verification calls such as reCAPTCHA.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(orm: OrmConn, config: AppConfig) -> anyhow::Result<Self> {
        let pool = pool_of(&orm);
        Self::assemble(orm, pool, config)
    }

    /// State whose database handles never connect. Handlers that stop before
    /// touching the database (auth guards, rate limits, validation) work as usual.
    pub fn without_database(config: AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(&config.database_url)?;
        Self::assemble(DatabaseConnection::default(), pool, config)
    }

    fn assemble(orm: OrmConn, pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let mailer = Mailer::from_config(config.email.as_ref())?;
        let khalti = KhaltiClient::new(&config.khalti)?;
        let security = SecurityLogger::new(config.security_log_path.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            orm,
            pool,
            config: Arc::new(config),
            mailer,
            khalti,
            security,
            http,
        })
    }
}
