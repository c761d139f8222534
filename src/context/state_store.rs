//! Read-only access to the persisted infrastructure state.

use crate::config::{PostgresSettings, StateStoreBackend, StateStoreConfig};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Fragment text when the store answered with zero rows.
pub const NO_STATE_FOUND: &str = "No state found.";

/// A query source returning one JSON text per row.
pub trait StateStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_rows(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>>;
}

/// Pretty-print each row and join them with newlines.
pub fn render_rows(rows: &[String]) -> String {
    if rows.is_empty() {
        return NO_STATE_FOUND.to_string();
    }

    rows.iter()
        .map(|row| {
            serde_json::from_str::<serde_json::Value>(row)
                .ok()
                .and_then(|value| serde_json::to_string_pretty(&value).ok())
                .unwrap_or_else(|| row.clone())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Postgres ─────────────────────────────────────────────────────────────────

/// Opens one connection per fetch and wraps the configured query in
/// `row_to_json` so any column set renders as JSON.
///
/// A missing host is reported by every fetch rather than at construction,
/// so requests degrade to running without state.
pub struct PostgresStateStore {
    options: Option<PgConnectOptions>,
    sql: String,
}

impl PostgresStateStore {
    pub fn new(settings: &PostgresSettings, query: &str) -> Self {
        let options = settings
            .host
            .as_deref()
            .filter(|host| !host.trim().is_empty())
            .map(|host| {
                let options = PgConnectOptions::new()
                    .host(host)
                    .port(settings.port)
                    .database(&settings.database)
                    .username(&settings.user)
                    .ssl_mode(if settings.require_tls {
                        PgSslMode::Require
                    } else {
                        PgSslMode::Prefer
                    })
                    .disable_statement_logging();
                match settings.password.as_deref() {
                    Some(password) => options.password(password),
                    None => options,
                }
            });
        if options.is_none() {
            tracing::warn!(
                "state_store postgres host is not set (AWS_DB_HOST); state fetches will fail"
            );
        }

        Self {
            options,
            sql: wrap_row_to_json(query),
        }
    }

    async fn fetch_impl(&self) -> Result<Vec<String>> {
        let options = self
            .options
            .as_ref()
            .context("host is not set (AWS_DB_HOST)")?;
        let mut conn = sqlx::PgConnection::connect_with(options)
            .await
            .context("connect")?;
        let rows = sqlx::query_scalar::<_, String>(&self.sql)
            .fetch_all(&mut conn)
            .await;
        if let Err(e) = conn.close().await {
            tracing::debug!("closing state store connection failed: {e}");
        }
        Ok(rows?)
    }
}

fn wrap_row_to_json(query: &str) -> String {
    let inner = query.trim().trim_end_matches(';');
    format!("SELECT row_to_json(t)::text FROM ({inner}) t")
}

impl StateStore for PostgresStateStore {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn fetch_rows(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        Box::pin(self.fetch_impl())
    }
}

// ── SQLite ───────────────────────────────────────────────────────────────────

/// The configured query must select a single text column.
pub struct SqliteStateStore {
    pool: SqlitePool,
    query: String,
}

impl SqliteStateStore {
    /// Lazily-connecting pool; a missing file fails on the first fetch.
    pub fn open(path: &str, query: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(shellexpand::tilde(path).into_owned())
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);
        Ok(Self::from_pool(pool, query))
    }

    pub fn from_pool(pool: SqlitePool, query: &str) -> Self {
        Self {
            pool,
            query: query.to_string(),
        }
    }
}

impl StateStore for SqliteStateStore {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn fetch_rows(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query_scalar::<_, String>(&self.query)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        })
    }
}

/// `None` when the store is disabled.
pub fn from_config(config: &StateStoreConfig) -> Result<Option<Arc<dyn StateStore>>> {
    if !config.enabled {
        return Ok(None);
    }

    let store: Arc<dyn StateStore> = match &config.backend {
        StateStoreBackend::Postgres(settings) => {
            Arc::new(PostgresStateStore::new(settings, &config.query))
        }
        StateStoreBackend::Sqlite { path } => Arc::new(SqliteStateStore::open(path, &config.query)?),
    };
    Ok(Some(store))
}
