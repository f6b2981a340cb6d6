//! MySQL/MariaDB store.
//!
//! [`MysqlStore`] wraps a single-connection `mysql_async` pool. The same type
//! serves as the source reader (opened [`StoreAccess::ReadOnly`]) and the
//! target store (opened [`StoreAccess::ReadWrite`]).
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;
mod writer;

use std::time::Instant;

use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

pub use reader::stringify_value;
pub use writer::{exists_query, match_query};

/// Whether a store may execute mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAccess {
    ReadOnly,
    ReadWrite,
}

/// MySQL store backed by `mysql_async`.
pub struct MysqlStore {
    pool: Pool,
    access: StoreAccess,
    label: String,
}

impl MysqlStore {
    /// Connect to the database described by `config`.
    pub async fn connect(config: &DatabaseConfig, access: StoreAccess) -> Result<Self> {
        let label = format!("{}:{}/{}", config.host, config.port, config.database);
        let ssl_opts = ssl_opts(&config.ssl_mode);

        let mut init = vec!["SET NAMES utf8mb4"];
        if access == StoreAccess::ReadOnly {
            init.push("SET SESSION TRANSACTION READ ONLY");
        }

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(init);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        // Statements run strictly one after another on one connection.
        let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
            MigrateError::store("invalid pool constraints", "creating MySQL pool")
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::store(e, format!("connecting to {}", label)))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::store(e, format!("testing connection to {}", label)))?;
        drop(conn);

        info!(
            "Connected to MySQL {}: {}",
            match access {
                StoreAccess::ReadOnly => "source",
                StoreAccess::ReadWrite => "target",
            },
            label
        );

        Ok(Self { pool, access, label })
    }

    /// Access level the store was opened with.
    pub fn access(&self) -> StoreAccess {
        self.access
    }

    /// `host:port/database` of the store.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run `SELECT 1` and return the round-trip latency in milliseconds.
    pub async fn health_check(&self) -> Result<u64> {
        let start = Instant::now();
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::store(e, format!("health check on {}", self.label)))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::store(e, format!("health check on {}", self.label)))?;
        Ok(start.elapsed().as_millis() as u64)
    }

    /// Close every connection of the pool.
    pub async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

fn ssl_opts(mode: &str) -> Option<SslOpts> {
    match mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            None
        }
        "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to prefer", other);
            Some(SslOpts::default().with_danger_accept_invalid_certs(true))
        }
    }
}
