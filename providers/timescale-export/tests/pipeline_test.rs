//! Export worker end to end against the in-memory database

mod common;

use common::{readings, record, source_error, MockDatabase, ScriptedSource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use timescale_export::{
    ColumnValue, DatabaseError, ExportCatalog, ExportWorker, PollBatch, Record, SourceError,
    SyncOutcome, TransactionError, WorkerConfig, WorkerError,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

fn config() -> WorkerConfig {
    WorkerConfig {
        poll_timeout: Duration::from_millis(20),
        ..Default::default()
    }
}

fn catalog(time_unique: bool) -> Arc<ExportCatalog> {
    let catalog = Arc::new(ExportCatalog::new());
    catalog.install("e1", readings(time_unique)).unwrap();
    catalog
}

fn ready() -> oneshot::Receiver<SyncOutcome> {
    let (tx, rx) = oneshot::channel();
    tx.send(SyncOutcome::Ready).unwrap();
    rx
}

/// Run a worker over `source` until its script is drained.
/// Returns the worker result and how many offset advances happened.
async fn drive(
    source: ScriptedSource,
    catalog: Arc<ExportCatalog>,
    db: &MockDatabase,
    sync: oneshot::Receiver<SyncOutcome>,
) -> (Result<(), WorkerError>, usize) {
    let stop = CancellationToken::new();
    let source = source.stop_when_drained(stop.clone());
    let source_state = source.state.clone();

    let worker = ExportWorker::new(Box::new(source), catalog, Box::new(db.clone()), config())
        .with_cancel_token(stop);
    let result = tokio::time::timeout(Duration::from_secs(5), worker.run(sync))
        .await
        .expect("worker did not finish");

    let offsets = source_state.lock().offsets_advanced;
    (result, offsets)
}

fn t_v(t: i64, v: i32) -> Vec<ColumnValue> {
    vec![ColumnValue::BigInt(t), ColumnValue::Integer(v)]
}

#[tokio::test]
async fn test_latest_row_per_time_value_is_written() {
    let db = MockDatabase::new();
    let source = ScriptedSource::batches(vec![vec![
        record(&["e1"], json!({"t": 100, "v": 1})),
        record(&["e1"], json!({"t": 100, "v": 2})),
        record(&["e1"], json!({"t": 101, "v": 3})),
    ]]);

    let (result, offsets) = drive(source, catalog(true), &db, ready()).await;
    assert_eq!(result, Ok(()));
    assert_eq!(offsets, 1);

    let transactions = db.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].len(), 1);
    let statement = &transactions[0][0];
    assert_eq!(
        statement.sql,
        "INSERT INTO \"readings\" (\"t\", \"v\") VALUES ($1, $2), ($3, $4)"
    );
    assert_eq!(statement.params, [t_v(100, 2), t_v(101, 3)].concat());
}

#[tokio::test]
async fn test_duplicates_kept_without_time_unique() {
    let db = MockDatabase::new();
    let source = ScriptedSource::batches(vec![vec![
        record(&["e1"], json!({"t": 100, "v": 1})),
        record(&["e1"], json!({"t": 100, "v": 2})),
    ]]);

    let (result, _) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(result, Ok(()));
    assert_eq!(db.transactions()[0][0].params.len(), 4);
}

#[tokio::test]
async fn test_failed_record_does_not_abort_batch() {
    let db = MockDatabase::new();
    let source = ScriptedSource::batches(vec![vec![
        record(&["e1"], json!({"t": 1, "v": 10})),
        Record::failed(vec!["e1".to_string()], "undecodable payload"),
        record(&["e1"], json!({"t": 2, "v": 20})),
    ]]);

    let (result, offsets) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(result, Ok(()));
    assert_eq!(offsets, 1);
    assert_eq!(
        db.transactions()[0][0].params,
        [t_v(1, 10), t_v(2, 20)].concat()
    );
}

#[tokio::test]
async fn test_pages_share_one_transaction() {
    let db = MockDatabase::new();
    let records = (0..250)
        .map(|i| record(&["e1"], json!({"t": i, "v": 0})))
        .collect();
    let source = ScriptedSource::batches(vec![records]);

    let (result, _) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(result, Ok(()));

    let transactions = db.transactions();
    assert_eq!(transactions.len(), 1);
    let rows: Vec<usize> = transactions[0].iter().map(|s| s.params.len() / 2).collect();
    assert_eq!(rows, vec![100, 100, 50]);
}

#[tokio::test]
async fn test_unmatched_records_still_advance_offsets() {
    let db = MockDatabase::new();
    let source = ScriptedSource::batches(vec![vec![record(&["deleted"], json!({"t": 1}))]]);

    let (result, offsets) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(result, Ok(()));
    assert_eq!(offsets, 1);
    assert!(db.transactions().is_empty());
}

#[tokio::test]
async fn test_write_failure_is_fatal_and_keeps_offsets() {
    let db = MockDatabase::new();
    db.state.lock().transaction_failure = Some(TransactionError {
        statement: Some(0),
        error: DatabaseError::Connection("server closed the connection".to_string()),
    });
    let source = ScriptedSource::batches(vec![
        vec![
            record(&["e1"], json!({"t": 1, "v": 1})),
            record(&["e1"], json!({"t": 2, "v": 2})),
        ],
        vec![record(&["e1"], json!({"t": 3, "v": 3}))],
    ]);

    let (result, offsets) = drive(source, catalog(false), &db, ready()).await;
    match result {
        Err(WorkerError::Write(err)) => {
            assert_eq!(err.rows, 2);
            assert_eq!(err.export_id, "e1");
        }
        other => panic!("expected write error, got {:?}", other),
    }
    assert_eq!(offsets, 0);
    assert!(db.transactions().is_empty());
}

#[tokio::test]
async fn test_source_error_is_fatal() {
    let db = MockDatabase::new();
    let source = ScriptedSource::new(vec![
        Ok(Some(source_error(5))),
        Ok(Some(PollBatch {
            records: vec![record(&["e1"], json!({"t": 1, "v": 1}))],
            errors: vec![],
        })),
    ]);

    let (result, offsets) = drive(source, catalog(false), &db, ready()).await;
    assert!(matches!(
        result,
        Err(WorkerError::Source(SourceError::Batch { code: 5, .. }))
    ));
    assert_eq!(offsets, 0);
    assert!(db.transactions().is_empty());
}

#[tokio::test]
async fn test_ignored_source_error_is_dropped() {
    let db = MockDatabase::new();
    let mut with_error = source_error(3);
    with_error.records = vec![record(&["e1"], json!({"t": 1, "v": 1}))];
    let source = ScriptedSource::new(vec![Ok(Some(with_error))]);

    let (result, offsets) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(result, Ok(()));
    assert_eq!(offsets, 1);
    assert_eq!(db.transactions().len(), 1);
}

#[tokio::test]
async fn test_poll_failure_is_fatal() {
    let db = MockDatabase::new();
    let source = ScriptedSource::new(vec![Err(SourceError::Failed("broker gone".to_string()))]);

    let (result, _) = drive(source, catalog(false), &db, ready()).await;
    assert_eq!(
        result,
        Err(WorkerError::Source(SourceError::Failed("broker gone".to_string())))
    );
}

#[tokio::test]
async fn test_failed_sync_never_consumes() {
    let db = MockDatabase::new();
    let source = ScriptedSource::batches(vec![vec![record(&["e1"], json!({"t": 1, "v": 1}))]]);
    let source_state = source.state.clone();
    let (tx, rx) = oneshot::channel();
    tx.send(SyncOutcome::Failed("filters unavailable".to_string()))
        .unwrap();

    let worker = ExportWorker::new(Box::new(source), catalog(false), Box::new(db.clone()), config());
    let handle = worker.start(rx);

    assert_eq!(
        handle.join().await,
        Err(WorkerError::SyncFailed("filters unavailable".to_string()))
    );
    assert_eq!(source_state.lock().polls, 0);
}

#[tokio::test]
async fn test_dropped_sync_sender_counts_as_failure() {
    let (tx, rx) = oneshot::channel::<SyncOutcome>();
    drop(tx);
    let worker = ExportWorker::new(
        Box::new(ScriptedSource::new(vec![])),
        catalog(false),
        Box::new(MockDatabase::new()),
        config(),
    );
    assert!(matches!(
        worker.run(rx).await,
        Err(WorkerError::SyncFailed(_))
    ));
}

#[tokio::test]
async fn test_stop_while_waiting_for_sync() {
    let (_tx, rx) = oneshot::channel::<SyncOutcome>();
    let worker = ExportWorker::new(
        Box::new(ScriptedSource::new(vec![])),
        catalog(false),
        Box::new(MockDatabase::new()),
        config(),
    );
    let handle = worker.start(rx);
    assert!(handle.is_alive());

    handle.stop();
    let result = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("stop did not interrupt the sync wait");
    assert_eq!(result, Ok(()));
}
