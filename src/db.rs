//! PostgreSQL database capability
//!
//! Concrete `DatabaseCapability` backed by a deadpool-postgres pool.
//! Introspection reads `information_schema`; execution enforces the
//! per-query time budget and cancels the server-side query on timeout via
//! the connection's cancel token.

use crate::capability::DatabaseCapability;
use crate::error::{AppError, ExecutionError};
use crate::pipeline::types::QueryResult;
use crate::schema::{ColumnDescriptor, SchemaDescriptor, TableDescriptor};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use futures_util::TryStreamExt;
use std::time::Duration;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{CancelToken, NoTls, Row};
use tracing::{debug, info, warn};

/// Pooled PostgreSQL connection implementing the database capability.
pub struct PostgresCapability {
    pool: Pool,
    tls_config: Option<rustls::ClientConfig>,
}

impl PostgresCapability {
    /// Build a pool from a `postgres://` connection string and verify it
    /// with a test query.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| AppError::Config(format!("Failed to parse DATABASE_URL: {}", e)))?;

        let hosts = config.get_hosts();
        let host_str = match hosts.first() {
            Some(tokio_postgres::config::Host::Tcp(s)) => s.clone(),
            Some(tokio_postgres::config::Host::Unix(_)) => {
                return Err(AppError::Config(
                    "Unix socket connections are not supported".to_string(),
                ));
            }
            None => return Err(AppError::Config("No host in DATABASE_URL".to_string())),
        };

        let port = config.get_ports().first().copied().unwrap_or(5432);

        let user = config
            .get_user()
            .map(|u| u.to_string())
            .ok_or_else(|| AppError::Config("No user in DATABASE_URL".to_string()))?;

        let password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string())
            .unwrap_or_default();

        let database = config
            .get_dbname()
            .map(|db| db.to_string())
            .ok_or_else(|| AppError::Config("No database name in DATABASE_URL".to_string()))?;

        let use_tls = host_str.contains("neon.tech") || database_url.contains("sslmode=require");

        let mut cfg = Config::new();
        cfg.host = Some(host_str);
        cfg.port = Some(port);
        cfg.user = Some(user);
        cfg.password = Some(password);
        cfg.dbname = Some(database);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let (pool, tls_config) = if use_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config.clone());
            let pool = cfg
                .create_pool(Some(Runtime::Tokio1), tls)
                .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))?;
            (pool, Some(tls_config))
        } else {
            let pool = cfg
                .create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;
            (pool, None)
        };

        // Verify the connection works before handing the pool out
        let client = pool.get().await?;
        client.query_one("SELECT 1 as ok", &[]).await?;

        info!("Database connection successful (TLS: {})", use_tls);
        Ok(Self { pool, tls_config })
    }

    /// Best-effort server-side cancellation of a timed-out query.
    async fn cancel_in_flight(&self, token: CancelToken) {
        let result = match &self.tls_config {
            Some(tls_config) => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config.clone());
                token.cancel_query(tls).await
            }
            None => token.cancel_query(NoTls).await,
        };
        if let Err(e) = result {
            warn!("Failed to cancel timed-out query: {}", e);
        }
    }
}

#[async_trait]
impl DatabaseCapability for PostgresCapability {
    async fn introspect_schema(&self) -> Result<SchemaDescriptor, ExecutionError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ExecutionError::Failed(e.to_string()))?;

        let table_query = r#"
            SELECT t.table_name
            FROM information_schema.tables t
            WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
              AND t.table_type = 'BASE TABLE'
            ORDER BY t.table_name
        "#;

        let table_rows = client
            .query(table_query, &[])
            .await
            .map_err(|e| ExecutionError::Failed(e.to_string()))?;

        let column_query = r#"
            SELECT c.column_name, c.data_type
            FROM information_schema.columns c
            WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
              AND c.table_name = $1
            ORDER BY c.ordinal_position
        "#;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in table_rows {
            let name: String = row.get("table_name");

            let column_rows = client
                .query(column_query, &[&name])
                .await
                .map_err(|e| ExecutionError::Failed(e.to_string()))?;

            let columns = column_rows
                .iter()
                .map(|r| ColumnDescriptor {
                    name: r.get("column_name"),
                    data_type: r.get("data_type"),
                })
                .collect();

            tables.push(TableDescriptor { name, columns });
        }

        let schema = SchemaDescriptor::new(tables);
        debug!(
            "Introspected schema with {} tables (checksum {})",
            schema.tables.len(),
            schema.checksum
        );
        Ok(schema)
    }

    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        max_rows: usize,
    ) -> Result<QueryResult, ExecutionError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ExecutionError::Failed(e.to_string()))?;

        let cancel_token = client.cancel_token();

        // Stream rows so a large result set never gets buffered past the
        // row cap; the stream is dropped as soon as the cap is hit.
        let run = async {
            let statement = client.prepare(sql).await?;
            let stream = client.query_raw(&statement, std::iter::empty::<&str>()).await?;
            tokio::pin!(stream);

            let mut rows = Vec::new();
            let mut truncated = false;
            while let Some(row) = stream.try_next().await? {
                if rows.len() == max_rows {
                    truncated = true;
                    break;
                }
                rows.push(row);
            }

            Ok::<_, tokio_postgres::Error>((statement, rows, truncated))
        };

        let (statement, rows, truncated) = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(ExecutionError::Failed(e.to_string())),
            Err(_) => {
                self.cancel_in_flight(cancel_token).await;
                return Err(ExecutionError::Timeout);
            }
        };

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| cell_text(row, idx)).collect())
            .collect();

        Ok(QueryResult {
            columns,
            rows,
            truncated,
        })
    }
}

/// Stringify one cell, handling the common PostgreSQL types. Anything the
/// driver cannot decode becomes a typed placeholder instead of an error.
fn cell_text(row: &Row, idx: usize) -> String {
    let ty = row.columns()[idx].type_();

    if *ty == Type::BOOL {
        typed::<bool>(row, idx)
    } else if *ty == Type::INT2 {
        typed::<i16>(row, idx)
    } else if *ty == Type::INT4 {
        typed::<i32>(row, idx)
    } else if *ty == Type::INT8 {
        typed::<i64>(row, idx)
    } else if *ty == Type::FLOAT4 {
        typed::<f32>(row, idx)
    } else if *ty == Type::FLOAT8 {
        typed::<f64>(row, idx)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        typed::<String>(row, idx)
    } else if *ty == Type::UUID {
        typed::<uuid::Uuid>(row, idx)
    } else if *ty == Type::TIMESTAMP {
        typed::<chrono::NaiveDateTime>(row, idx)
    } else if *ty == Type::TIMESTAMPTZ {
        typed::<chrono::DateTime<chrono::Utc>>(row, idx)
    } else if *ty == Type::DATE {
        typed::<chrono::NaiveDate>(row, idx)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        typed::<serde_json::Value>(row, idx)
    } else {
        format!("<{}>", ty.name())
    }
}

fn typed<'a, T>(row: &'a Row, idx: usize) -> String
where
    T: FromSql<'a> + ToString,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(value)) => value.to_string(),
        Ok(None) => "NULL".to_string(),
        Err(_) => format!("<{}>", row.columns()[idx].type_().name()),
    }
}
