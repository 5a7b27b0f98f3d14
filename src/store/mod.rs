//! Authoritative relational store.
//!
//! `Store` wraps a `sqlx::PgPool` sized per `config::StoreConfig` and
//! exposes one method group per entity. Every statement uses the runtime
//! `sqlx::query!`-free API (`query`/`query_as`) because there is no
//! `DATABASE_URL` available to the compile-time macros in this
//! environment.

pub mod alerts;
pub mod audit;
pub mod devices;
pub mod models;
pub mod networks;
pub mod organizations;
pub mod psk;
pub mod sessions;

use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{Pool, Transaction};
use std::time::Duration;

use crate::config::StoreConfig;

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: Pool<Postgres>,
}

impl Store {
    pub async fn connect(cfg: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_open)
            .min_connections(cfg.max_idle)
            .max_lifetime(cfg.max_lifetime)
            .idle_timeout(cfg.max_idle_time)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&cfg.dsn)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}
