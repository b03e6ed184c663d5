//! Database seam and its tokio-postgres implementation
//!
//! The export worker and the table manager each own one [`Database`];
//! statements on a connection are never interleaved by other callers.

use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::config::TimescaleConfig;
use crate::error::DatabaseError;
use crate::types::ColumnValue;

/// Parameterized statement
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<ColumnValue>,
}

/// Failure inside a transaction; `statement` is `None` when begin or
/// commit failed rather than one of the statements
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct TransactionError {
    pub statement: Option<usize>,
    #[source]
    pub error: DatabaseError,
}

impl TransactionError {
    pub fn outside_statements(error: DatabaseError) -> Self {
        Self {
            statement: None,
            error,
        }
    }
}

#[async_trait]
pub trait Database: Send {
    /// Run a `;`-separated script in one round-trip
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Run all statements in one transaction and commit.
    /// Returns the total number of affected rows.
    async fn execute_in_transaction(
        &mut self,
        statements: &[SqlStatement],
    ) -> Result<u64, TransactionError>;
}

/// TimescaleDB connection that reconnects lazily once the previous
/// connection has closed
pub struct PgDatabase {
    config: tokio_postgres::Config,
    label: &'static str,
    client: Option<Client>,
}

impl PgDatabase {
    /// `label` names the connection in logs
    pub fn new(config: &TimescaleConfig, label: &'static str) -> Self {
        Self {
            config: config.pg_config(),
            label,
            client: None,
        }
    }

    /// Create and connect, failing fast when the database is unreachable
    pub async fn connect(config: &TimescaleConfig, label: &'static str) -> Result<Self, DatabaseError> {
        let mut db = Self::new(config, label);
        db.client().await?;
        Ok(db)
    }

    async fn client(&mut self) -> Result<&mut Client, DatabaseError> {
        let reconnect = match &self.client {
            Some(client) => client.is_closed(),
            None => true,
        };

        if reconnect {
            debug!("[{}] Opening database connection", self.label);
            let (client, connection) = self
                .config
                .connect(NoTls)
                .await
                .map_err(|e| DatabaseError::Connection(format!("connect failed: {}", e)))?;

            // Spawn connection handler
            let label = self.label;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("[{}] PostgreSQL connection error: {}", label, e);
                }
            });

            info!("[{}] Connected to TimescaleDB", self.label);
            self.client = Some(client);
        }

        self.client
            .as_mut()
            .ok_or_else(|| DatabaseError::Connection("no connection available".to_string()))
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let client = self.client().await?;
        client.batch_execute(sql).await.map_err(DatabaseError::from)
    }

    async fn execute_in_transaction(
        &mut self,
        statements: &[SqlStatement],
    ) -> Result<u64, TransactionError> {
        let client = self
            .client()
            .await
            .map_err(TransactionError::outside_statements)?;
        let transaction = client
            .transaction()
            .await
            .map_err(|e| TransactionError::outside_statements(e.into()))?;

        let mut affected = 0;
        for (index, statement) in statements.iter().enumerate() {
            let params: Vec<&(dyn ToSql + Sync)> = statement
                .params
                .iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();

            // Dropping the transaction on error rolls it back
            affected += transaction
                .execute(statement.sql.as_str(), &params)
                .await
                .map_err(|e| TransactionError {
                    statement: Some(index),
                    error: e.into(),
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| TransactionError::outside_statements(e.into()))?;

        Ok(affected)
    }
}
