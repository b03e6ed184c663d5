//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use timescale_export::{
    BatchError, Database, DatabaseError, PollBatch, RawExportDefinition, Record, RecordSource,
    SourceError, SqlStatement, TransactionError,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MockState {
    /// DDL attempts, successful or not
    pub ddl_attempts: usize,
    /// DDL scripts that succeeded
    pub scripts: Vec<String>,
    /// Failures returned by the next DDL attempts, in order
    pub ddl_failures: VecDeque<DatabaseError>,
    /// Committed transactions
    pub transactions: Vec<Vec<SqlStatement>>,
    /// Failure returned by the next transaction
    pub transaction_failure: Option<TransactionError>,
}

/// In-memory database; clones share state
#[derive(Clone, Default)]
pub struct MockDatabase {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_ddl(failures: Vec<DatabaseError>) -> Self {
        let db = Self::new();
        db.state.lock().ddl_failures = failures.into();
        db
    }

    pub fn ddl_attempts(&self) -> usize {
        self.state.lock().ddl_attempts
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    pub fn transactions(&self) -> Vec<Vec<SqlStatement>> {
        self.state.lock().transactions.clone()
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock();
        state.ddl_attempts += 1;
        if let Some(err) = state.ddl_failures.pop_front() {
            return Err(err);
        }
        state.scripts.push(sql.to_string());
        Ok(())
    }

    async fn execute_in_transaction(
        &mut self,
        statements: &[SqlStatement],
    ) -> Result<u64, TransactionError> {
        let mut state = self.state.lock();
        if let Some(err) = state.transaction_failure.take() {
            return Err(err);
        }
        state.transactions.push(statements.to_vec());
        Ok(statements.len() as u64)
    }
}

#[derive(Default)]
pub struct SourceState {
    pub polls: usize,
    pub offsets_advanced: usize,
}

/// Replays scripted poll results, then cancels `stop` once drained
pub struct ScriptedSource {
    script: VecDeque<Result<Option<PollBatch>, SourceError>>,
    stop: Option<CancellationToken>,
    pub state: Arc<Mutex<SourceState>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Option<PollBatch>, SourceError>>) -> Self {
        Self {
            script: script.into(),
            stop: None,
            state: Arc::default(),
        }
    }

    pub fn stop_when_drained(mut self, stop: CancellationToken) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn batches(batches: Vec<Vec<Record>>) -> Self {
        Self::new(
            batches
                .into_iter()
                .map(|records| {
                    Ok(Some(PollBatch {
                        records,
                        errors: vec![],
                    }))
                })
                .collect(),
        )
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn poll(
        &mut self,
        timeout: Duration,
        _max_count: usize,
        _ignore_missing_keys: bool,
    ) -> Result<Option<PollBatch>, SourceError> {
        self.state.lock().polls += 1;
        match self.script.pop_front() {
            Some(result) => result,
            None => {
                if let Some(stop) = &self.stop {
                    stop.cancel();
                }
                tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
                Ok(None)
            }
        }
    }

    async fn advance_offsets(&mut self) -> Result<(), SourceError> {
        self.state.lock().offsets_advanced += 1;
        Ok(())
    }
}

pub fn readings(time_unique: bool) -> RawExportDefinition {
    RawExportDefinition {
        table_name: "readings".to_string(),
        table_columns: vec![
            vec!["t".into(), "bigint".into(), "NOT NULL".into()],
            vec!["v".into(), "integer".into()],
        ],
        time_column: "t".to_string(),
        time_format: None,
        time_unique,
        mappings: Default::default(),
    }
}

pub fn record(ids: &[&str], data: Value) -> Record {
    let Value::Object(map) = data else {
        panic!("record data must be an object")
    };
    Record::data(ids.iter().map(|s| s.to_string()).collect(), map)
}

pub fn source_error(code: i32) -> PollBatch {
    PollBatch {
        records: vec![],
        errors: vec![BatchError::new(code, "broker reported an error")],
    }
}

/// Poll `condition` until it holds or `limit` passes
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
