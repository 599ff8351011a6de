//! Inserter worker pool: N threads each owning a client connection and
//! draining blocks off the `filled` queue into a remote column store (spec
//! §4.7 InserterPool).
//!
//! Directly grounded on the original collector's `Worker`/`Inserter`: the
//! stop-signal/stop-timestamp pattern becomes a [`WorkerHandle`] with an
//! `Arc<AtomicBool>` stop flag and an `Arc<Mutex<Option<InsertError>>>`
//! terminal-error slot, replacing the original's exception-based error
//! flow (spec §9 redesign note). `ensure_schema`'s column-by-column
//! compare and `CREATE TABLE` hint are carried over in spirit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::block::{Block, BlockPool, QueueItem};
use crate::config::{Column, Endpoint};
use crate::error::InsertError;

/// A server error code meaning "the table does not exist", per the
/// original's `ERR_TABLE_NOT_FOUND`.
const ERR_TABLE_NOT_FOUND: i32 = 60;

/// The remote column-store connection an inserter worker drives. An
/// embedding binary supplies a concrete implementation (e.g. wired to a
/// real client library); this crate only defines the boundary (spec §6.3)
/// and a `tests`-only mock.
pub trait Client: Send {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), InsertError>;

    /// Returns `(name, type)` pairs as the remote store currently sees
    /// them, or an error whose `code` is `ERR_TABLE_NOT_FOUND` if the
    /// table does not exist.
    fn describe_table(&mut self, table: &str) -> Result<Vec<(String, String)>, DescribeError>;

    fn insert(&mut self, table: &str, columns: &[Column], block: &Block) -> Result<(), InsertError>;
}

/// Error from [`Client::describe_table`], distinguishing "table missing"
/// from any other failure so `ensure_schema` can build the right hint.
#[derive(Debug)]
pub struct DescribeError {
    pub code: i32,
    pub message: String,
}

/// Per-worker lifecycle state, mirrored for observability only — the
/// control flow itself lives in `run_worker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Connecting,
    SchemaCheck,
    Ready,
    Inserting,
    Retrying,
    Stopped,
}

/// A handle to a running inserter worker thread.
pub struct WorkerHandle {
    pub id: usize,
    join: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    stop_requested_at: Arc<Mutex<Option<Instant>>>,
    error: Arc<Mutex<Option<InsertError>>>,
    state: Arc<Mutex<WorkerState>>,
}

impl WorkerHandle {
    /// Requests the worker stop; it will keep retrying in-flight work
    /// until `stop_timeout` elapses, then abandon it (spec §4.7).
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            *self.stop_requested_at.lock().expect("poisoned") = Some(Instant::now());
        }
    }

    /// Returns the worker's terminal error, if it has failed fatally.
    pub fn check_error(&self) -> Option<InsertError> {
        self.error.lock().expect("poisoned").take()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("poisoned")
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn schema_hint(table: &str, columns: &[Column]) -> String {
    let column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} <type>{}", c.wire_name(), if c.nullable { " NULL" } else { "" }))
        .collect();
    format!("CREATE TABLE {table} ({})", column_defs.join(", "))
}

fn ensure_schema(
    client: &mut dyn Client,
    endpoint: &Endpoint,
    table: &str,
    columns: &[Column],
) -> Result<(), InsertError> {
    let db_columns = match client.describe_table(table) {
        Ok(cols) => cols,
        Err(e) if e.code == ERR_TABLE_NOT_FOUND => {
            return Err(InsertError::TableNotFound {
                table: table.to_string(),
                endpoint: endpoint.addr,
                schema_hint: schema_hint(table, columns),
            });
        }
        Err(e) => {
            return Err(InsertError::Connection {
                endpoint: endpoint.addr,
                reason: e.message,
            });
        }
    };

    if db_columns.len() != columns.len()
        || db_columns
            .iter()
            .zip(columns.iter())
            .any(|((db_name, _db_type), column)| db_name != column.wire_name())
    {
        return Err(InsertError::SchemaMismatch {
            table: table.to_string(),
            endpoint: endpoint.addr,
            expected: columns.len(),
            found: db_columns.len(),
            schema_hint: schema_hint(table, columns),
        });
    }
    Ok(())
}

struct WorkerContext {
    id: usize,
    endpoints: Vec<Endpoint>,
    table: String,
    columns: Vec<Column>,
    stop_timeout: Duration,
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    ctx: WorkerContext,
    mut client: Box<dyn Client>,
    avail: Arc<crate::block::SyncQueue<Block>>,
    filled: Arc<crate::block::SyncQueue<Block>>,
    stop: Arc<AtomicBool>,
    stop_requested_at: Arc<Mutex<Option<Instant>>>,
    error_slot: Arc<Mutex<Option<InsertError>>>,
    state_slot: Arc<Mutex<WorkerState>>,
) {
    let set_state = |s: WorkerState| *state_slot.lock().expect("poisoned") = s;
    let stop_elapsed = || {
        stop_requested_at
            .lock()
            .expect("poisoned")
            .map(|at| at.elapsed())
    };
    let is_stopping_and_expired = |stop_timeout: Duration| -> bool {
        match stop_elapsed() {
            Some(elapsed) => elapsed > stop_timeout,
            None => false,
        }
    };

    set_state(WorkerState::Starting);
    let mut endpoint_idx = 0usize;

    // Mandatory startup transition (spec §4.7: `Starting → Connecting →
    // SchemaCheck → Ready`). A schema mismatch here must fail the worker
    // permanently before it ever touches `filled` (spec §4.7, §7, scenario
    // S6) — the reconnect path below handles every transition *after* this
    // one, but the very first connection has to happen up front.
    set_state(WorkerState::Connecting);
    let start_endpoint = &ctx.endpoints[endpoint_idx % ctx.endpoints.len()];
    if let Err(conn_err) = client.connect(start_endpoint) {
        error!(worker_id = ctx.id, error = %conn_err, "initial connect failed");
        *error_slot.lock().expect("poisoned") = Some(conn_err);
        set_state(WorkerState::Stopped);
        info!(worker_id = ctx.id, "inserter worker stopped");
        return;
    }
    set_state(WorkerState::SchemaCheck);
    if let Err(schema_err) = ensure_schema(client.as_mut(), start_endpoint, &ctx.table, &ctx.columns) {
        error!(worker_id = ctx.id, error = %schema_err, "fatal schema mismatch at startup");
        *error_slot.lock().expect("poisoned") = Some(schema_err);
        set_state(WorkerState::Stopped);
        info!(worker_id = ctx.id, "inserter worker stopped");
        return;
    }
    set_state(WorkerState::Ready);

    'outer: loop {
        if stop.load(Ordering::SeqCst) && is_stopping_and_expired(ctx.stop_timeout) {
            break;
        }

        let block = match filled.get() {
            QueueItem::Stop => break,
            QueueItem::Item(block) => block,
        };

        set_state(WorkerState::Inserting);
        let mut current_block = block;
        loop {
            if stop.load(Ordering::SeqCst) && is_stopping_and_expired(ctx.stop_timeout) {
                warn!(worker_id = ctx.id, dropped_rows = current_block.len(), "abandoning block past stop timeout");
                *error_slot.lock().expect("poisoned") =
                    Some(InsertError::EndpointsExhausted {
                        stop_timeout_secs: ctx.stop_timeout.as_secs(),
                    });
                set_state(WorkerState::Stopped);
                break 'outer;
            }

            let attempt = client.insert(&ctx.table, &ctx.columns, &current_block);
            match attempt {
                Ok(()) => {
                    debug!(worker_id = ctx.id, rows = current_block.len(), "inserted block");
                    current_block.reset();
                    avail.put(current_block);
                    set_state(WorkerState::Ready);
                    break;
                }
                Err(e) => {
                    warn!(worker_id = ctx.id, error = %e, "insert failed, rotating endpoint");
                    set_state(WorkerState::Retrying);
                    endpoint_idx = endpoint_idx.wrapping_add(1);
                    let next_endpoint = &ctx.endpoints[endpoint_idx % ctx.endpoints.len()];
                    set_state(WorkerState::Connecting);
                    if let Err(conn_err) = client.connect(next_endpoint) {
                        error!(worker_id = ctx.id, error = %conn_err, "reconnect failed");
                    } else {
                        set_state(WorkerState::SchemaCheck);
                        if let Err(schema_err) =
                            ensure_schema(client.as_mut(), next_endpoint, &ctx.table, &ctx.columns)
                        {
                            error!(worker_id = ctx.id, error = %schema_err, "fatal schema mismatch after reconnect");
                            *error_slot.lock().expect("poisoned") = Some(schema_err);
                            set_state(WorkerState::Stopped);
                            break 'outer;
                        }
                    }
                    if stop.load(Ordering::SeqCst) && is_stopping_and_expired(ctx.stop_timeout) {
                        continue;
                    }
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }

    set_state(WorkerState::Stopped);
    info!(worker_id = ctx.id, "inserter worker stopped");
}

/// Spawns and supervises the configured number of inserter workers.
pub struct InserterPool {
    pub block_pool: BlockPool,
    workers: Vec<WorkerHandle>,
}

impl InserterPool {
    /// Spawns `thread_count` workers, each built from `client_factory`,
    /// sharing the same `endpoints`/`table`/`columns` configuration and
    /// the given block pool.
    pub fn spawn(
        thread_count: usize,
        block_pool: BlockPool,
        endpoints: Vec<Endpoint>,
        table: String,
        columns: Vec<Column>,
        stop_timeout: Duration,
        client_factory: Arc<dyn Fn() -> Box<dyn Client> + Send + Sync>,
    ) -> Self {
        let mut workers = Vec::with_capacity(thread_count);
        for id in 0..thread_count {
            let stop = Arc::new(AtomicBool::new(false));
            let stop_requested_at = Arc::new(Mutex::new(None));
            let error_slot = Arc::new(Mutex::new(None));
            let state_slot = Arc::new(Mutex::new(WorkerState::Starting));

            let ctx = WorkerContext {
                id,
                endpoints: endpoints.clone(),
                table: table.clone(),
                columns: columns.clone(),
                stop_timeout,
            };
            let client = client_factory();
            let avail = block_pool.avail.clone();
            let filled = block_pool.filled.clone();
            let stop_clone = stop.clone();
            let stop_requested_at_clone = stop_requested_at.clone();
            let error_slot_clone = error_slot.clone();
            let state_slot_clone = state_slot.clone();

            let join = thread::Builder::new()
                .name(format!("inserter-{id}"))
                .spawn(move || {
                    run_worker(
                        ctx,
                        client,
                        avail,
                        filled,
                        stop_clone,
                        stop_requested_at_clone,
                        error_slot_clone,
                        state_slot_clone,
                    )
                })
                .expect("failed to spawn inserter worker thread");

            workers.push(WorkerHandle {
                id,
                join: Some(join),
                stop,
                stop_requested_at,
                error: error_slot,
                state: state_slot,
            });
        }

        Self { block_pool, workers }
    }

    /// Polls every worker for a terminal error without blocking.
    pub fn poll_errors(&self) -> Vec<(usize, InsertError)> {
        self.workers
            .iter()
            .filter_map(|w| w.check_error().map(|e| (w.id, e)))
            .collect()
    }

    /// Requests every worker stop, pushing one stop sentinel per worker so
    /// a worker blocked in `filled.get()` wakes up (spec §4.7).
    pub fn request_stop(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
        for _ in &self.workers {
            self.block_pool.filled.put_stop();
        }
    }

    pub fn join_all(&mut self) {
        for worker in &mut self.workers {
            worker.join();
        }
    }

    pub fn worker_states(&self) -> Vec<(usize, WorkerState)> {
        self.workers.iter().map(|w| (w.id, w.state())).collect()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// An in-memory [`Client`] used by tests: tracks connect/insert calls
    /// and can be configured to fail schema checks or inserts on demand.
    pub struct MockClient {
        pub schema: Vec<(String, String)>,
        pub fail_inserts: usize,
        pub inserted_rows: Arc<StdMutex<Vec<usize>>>,
        pub connected_to: Option<SocketAddr>,
    }

    impl MockClient {
        pub fn new(schema: Vec<(String, String)>) -> Self {
            Self {
                schema,
                fail_inserts: 0,
                inserted_rows: Arc::new(StdMutex::new(Vec::new())),
                connected_to: None,
            }
        }
    }

    impl Client for MockClient {
        fn connect(&mut self, endpoint: &Endpoint) -> Result<(), InsertError> {
            self.connected_to = Some(endpoint.addr);
            Ok(())
        }

        fn describe_table(&mut self, _table: &str) -> Result<Vec<(String, String)>, DescribeError> {
            Ok(self.schema.clone())
        }

        fn insert(&mut self, _table: &str, _columns: &[Column], block: &Block) -> Result<(), InsertError> {
            if self.fail_inserts > 0 {
                self.fail_inserts -= 1;
                return Err(InsertError::Insert {
                    table: "flows".to_string(),
                    endpoint: self.connected_to.unwrap_or("0.0.0.0:0".parse().unwrap()),
                    rows: block.len(),
                    reason: "mock failure".to_string(),
                });
            }
            self.inserted_rows.lock().unwrap().push(block.len());
            Ok(())
        }
    }

    pub fn table_not_found() -> DescribeError {
        DescribeError {
            code: super::ERR_TABLE_NOT_FOUND,
            message: "table not found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::ColumnSource;
    use crate::types::DataType;

    fn column() -> Column {
        Column {
            name: "src_addr".to_string(),
            target_name: None,
            source: ColumnSource::Element { enterprise: 0, id: 8 },
            target_type: DataType::Ipv4,
            nullable: false,
            reverse: false,
        }
    }

    #[test]
    fn schema_hint_contains_create_table_and_column_names() {
        let hint = schema_hint("flows", &[column()]);
        assert!(hint.starts_with("CREATE TABLE flows ("));
        assert!(hint.contains("src_addr"));
    }

    #[test]
    fn ensure_schema_passes_when_columns_match() {
        let mut client = MockClient::new(vec![("src_addr".to_string(), "UInt32".to_string())]);
        let endpoint = Endpoint::new("127.0.0.1:9000".parse().unwrap());
        let columns = vec![column()];
        assert!(ensure_schema(&mut client, &endpoint, "flows", &columns).is_ok());
    }

    #[test]
    fn ensure_schema_reports_table_not_found_with_hint() {
        struct MissingTableClient;
        impl Client for MissingTableClient {
            fn connect(&mut self, _e: &Endpoint) -> Result<(), InsertError> {
                Ok(())
            }
            fn describe_table(&mut self, _t: &str) -> Result<Vec<(String, String)>, DescribeError> {
                Err(table_not_found())
            }
            fn insert(&mut self, _t: &str, _c: &[Column], _b: &Block) -> Result<(), InsertError> {
                Ok(())
            }
        }
        let mut client = MissingTableClient;
        let endpoint = Endpoint::new("127.0.0.1:9000".parse().unwrap());
        let columns = vec![column()];
        let err = ensure_schema(&mut client, &endpoint, "flows", &columns).unwrap_err();
        match err {
            InsertError::TableNotFound { schema_hint, .. } => {
                assert!(schema_hint.contains("CREATE TABLE"));
            }
            other => panic!("expected TableNotFound, got {other:?}"),
        }
    }

    #[test]
    fn ensure_schema_detects_column_count_mismatch() {
        let mut client = MockClient::new(vec![]);
        let endpoint = Endpoint::new("127.0.0.1:9000".parse().unwrap());
        let columns = vec![column()];
        let err = ensure_schema(&mut client, &endpoint, "flows", &columns).unwrap_err();
        assert!(matches!(err, InsertError::SchemaMismatch { .. }));
    }

    #[test]
    fn pool_spawns_requested_worker_count_and_stops_cleanly() {
        let block_pool = BlockPool::new(2, 16);
        let columns = vec![column()];
        let schema: Vec<(String, String)> = columns
            .iter()
            .map(|c| (c.wire_name().to_string(), "UInt32".to_string()))
            .collect();
        let factory: Arc<dyn Fn() -> Box<dyn Client> + Send + Sync> =
            Arc::new(move || Box::new(MockClient::new(schema.clone())));

        let mut pool = InserterPool::spawn(
            2,
            block_pool,
            vec![Endpoint::new("127.0.0.1:9000".parse().unwrap())],
            "flows".to_string(),
            columns,
            Duration::from_secs(1),
            factory,
        );

        assert_eq!(pool.worker_states().len(), 2);
        pool.request_stop();
        pool.join_all();
        assert!(pool.poll_errors().is_empty());
    }

    /// Scenario S6 (spec §8): a worker whose table schema mismatches the
    /// configured columns must fail permanently at startup, before ever
    /// reaching `filled.get()` / `insert()` — not merely on first
    /// reconnect after a failed insert.
    #[test]
    fn worker_fails_permanently_at_startup_on_schema_mismatch() {
        let block_pool = BlockPool::new(1, 16);
        let columns = vec![column()];
        // Mismatched schema: wrong column count vs. `columns`.
        let factory: Arc<dyn Fn() -> Box<dyn Client> + Send + Sync> =
            Arc::new(|| Box::new(MockClient::new(vec![])));

        let filled = block_pool.filled.clone();
        let mut pool = InserterPool::spawn(
            1,
            block_pool,
            vec![Endpoint::new("127.0.0.1:9000".parse().unwrap())],
            "flows".to_string(),
            columns,
            Duration::from_secs(1),
            factory,
        );

        // Give the worker a block it must never touch.
        filled.put(Block::new(16));

        let deadline = Instant::now() + Duration::from_secs(5);
        let error = loop {
            if let Some((_, err)) = pool.poll_errors().into_iter().next() {
                break err;
            }
            assert!(Instant::now() < deadline, "worker never reported a startup error");
            thread::sleep(Duration::from_millis(10));
        };
        assert!(matches!(error, InsertError::SchemaMismatch { .. }));

        pool.join_all();
        // The block handed to `filled` was never drained back to `avail`:
        // only the one block `BlockPool::new` seeded there is present.
        assert_eq!(pool.block_pool.avail.len(), 1);
        assert_eq!(pool.block_pool.filled.len(), 1);
    }
}
