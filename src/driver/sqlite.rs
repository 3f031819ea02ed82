use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, ErrorCode, params_from_iter};

use super::{Driver, ExecResult, Row, Rows, Transaction};
use crate::{context::Context, dialect::Dialect, errors::EntError, sql::Statement, value::Value};

/// VM instructions between two context checks of a running statement.
const PROGRESS_OPS: i32 = 1_000;

/// Upper bound on one wait for the connection lock before the context is re-checked.
const LOCK_POLL: Duration = Duration::from_millis(5);

/// Idle transaction connections kept per driver.
const MAX_IDLE_TX_CONNS: usize = 4;

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// URI parameters SQLite itself understands; passed through untouched.
const SQLITE_URI_PARAMS: &[&str] = &["mode", "cache", "vfs", "immutable", "psow", "nolock"];

/// Connection settings parsed from a DSN.
///
/// Accepted forms are `:memory:`, a plain path, or `file:<path>?<params>`.
/// Driver parameters are prefixed with an underscore (`_fk`, `_busy_timeout`,
/// `_journal_mode`, `_synchronous`); SQLite's own URI parameters are kept in
/// [`SqliteConfig::path`]. Anything else is recorded in `ignored`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: String,
    pub foreign_keys: bool,
    pub busy_timeout: Option<Duration>,
    /// Applied as `PRAGMA key = value` after the connection is opened.
    pub pragma_settings: HashMap<String, String>,
    pub ignored: Vec<String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            foreign_keys: true,
            busy_timeout: None,
            pragma_settings: HashMap::new(),
            ignored: Vec::new(),
        }
    }
}

impl SqliteConfig {
    pub fn parse(dsn: &str) -> Result<Self, EntError> {
        let mut config = SqliteConfig::default();
        let Some(rest) = dsn.strip_prefix("file:") else {
            if !dsn.is_empty() {
                config.path = dsn.to_string();
            }
            return Ok(config);
        };
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut passthrough = Vec::new();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "_fk" | "_foreign_keys" => config.foreign_keys = parse_flag(key, value)?,
                "_busy_timeout" | "_timeout" => {
                    let millis: u64 = value.parse().map_err(|_| {
                        EntError::invalid_input(format!("invalid {key} value {value:?}"))
                    })?;
                    config.busy_timeout = Some(Duration::from_millis(millis));
                }
                "_journal_mode" | "_journal" => {
                    config
                        .pragma_settings
                        .insert("journal_mode".to_string(), value.to_string());
                }
                "_synchronous" | "_sync" => {
                    config
                        .pragma_settings
                        .insert("synchronous".to_string(), value.to_string());
                }
                _ if SQLITE_URI_PARAMS.contains(&key) => passthrough.push(pair),
                _ => config.ignored.push(key.to_string()),
            }
        }
        let in_memory = passthrough.iter().any(|pair| *pair == "mode=memory");
        if in_memory && !passthrough.iter().any(|pair| pair.starts_with("cache=")) {
            passthrough.push("cache=shared");
        }
        config.path = if passthrough.is_empty() {
            format!("file:{name}")
        } else {
            format!("file:{name}?{}", passthrough.join("&"))
        };
        Ok(config)
    }

    /// Config another connection can open to reach the same database.
    ///
    /// A bare `:memory:` database is private to its connection, so it is
    /// replaced by a uniquely named shared-cache memory database.
    fn shareable(&self) -> SqliteConfig {
        let mut config = self.clone();
        if config.path == ":memory:" || config.path.is_empty() {
            let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
            config.path = format!(
                "file:entgraph-{}-{seq}?mode=memory&cache=shared",
                std::process::id()
            );
        }
        config
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, EntError> {
    match value {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(EntError::invalid_input(format!(
            "invalid {key} value {other:?}"
        ))),
    }
}

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// SQLite driver over `rusqlite` connections.
///
/// Statements issued through the driver are serialized through one shared
/// connection. Each transaction runs on a connection of its own, opened
/// against the same database and pooled once the transaction ends, so a
/// statement issued through the driver while a transaction is open is never
/// part of it.
#[derive(Clone)]
pub struct SqliteDriver {
    conn: SharedConnection,
    config: Arc<SqliteConfig>,
    idle: Arc<Mutex<Vec<Connection>>>,
}

impl SqliteDriver {
    pub fn open(dsn: &str) -> Result<Self, EntError> {
        Self::with_config(&SqliteConfig::parse(dsn)?)
    }

    pub fn open_in_memory() -> Result<Self, EntError> {
        Self::with_config(&SqliteConfig::default())
    }

    pub fn with_config(config: &SqliteConfig) -> Result<Self, EntError> {
        for key in &config.ignored {
            tracing::debug!(param = %key, "ignoring unrecognized sqlite dsn parameter");
        }
        let config = config.shareable();
        let conn = connect(&config)?;
        tracing::debug!(path = %config.path, foreign_keys = config.foreign_keys, "opened sqlite database");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            config: Arc::new(config),
            idle: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn tx_connection(&self, ctx: &Context) -> Result<Connection, EntError> {
        if lock(&self.conn, ctx)?.is_none() {
            return Err(EntError::driver("sql: database is closed"));
        }
        match self.idle.lock().pop() {
            Some(conn) => Ok(conn),
            None => connect(&self.config),
        }
    }
}

fn connect(config: &SqliteConfig) -> Result<Connection, EntError> {
    let conn = Connection::open(&config.path).map_err(|e| EntError::driver(e.to_string()))?;
    configure(&conn, config)?;
    conn.set_prepared_statement_cache_capacity(128);
    Ok(conn)
}

fn configure(conn: &Connection, config: &SqliteConfig) -> Result<(), EntError> {
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(|e| EntError::driver(format!("PRAGMA foreign_keys: {e}")))?;
    if let Some(timeout) = config.busy_timeout {
        conn.busy_timeout(timeout)
            .map_err(|e| EntError::driver(format!("busy timeout: {e}")))?;
    }
    for (key, value) in &config.pragma_settings {
        let pragma_sql = format!("PRAGMA {key} = {value}");
        match conn.execute(&pragma_sql, []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(EntError::driver(format!("PRAGMA {key} = {value}: {e}")));
            }
        }
    }
    Ok(())
}

/// Runs `op` on the shared connection while a progress handler watches `ctx`.
fn run<T>(
    conn: &SharedConnection,
    ctx: &Context,
    op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> Result<T, EntError> {
    let guard = lock(conn, ctx)?;
    let conn = guard
        .as_ref()
        .ok_or_else(|| EntError::driver("sql: database is closed"))?;
    let watched = ctx.clone();
    conn.progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));
    let outcome = op(conn);
    conn.progress_handler(0, None::<fn() -> bool>);
    match outcome {
        Ok(value) => {
            ctx.check()?;
            Ok(value)
        }
        Err(e) if is_interrupt(&e) => Err(ctx.err().unwrap_or(EntError::Cancelled)),
        Err(e) => Err(EntError::driver(e.to_string())),
    }
}

/// Waits for the connection without outliving `ctx`.
fn lock<'a>(
    conn: &'a SharedConnection,
    ctx: &Context,
) -> Result<MutexGuard<'a, Option<Connection>>, EntError> {
    loop {
        ctx.check()?;
        let wait = match ctx.deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(LOCK_POLL),
            None => LOCK_POLL,
        };
        if let Some(guard) = conn.try_lock_for(wait) {
            return Ok(guard);
        }
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted)
}

fn exec_statement(conn: &Connection, stmt: &Statement) -> rusqlite::Result<ExecResult> {
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    let rows_affected = prepared.execute(params_from_iter(stmt.args.iter()))?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: conn.last_insert_rowid(),
    })
}

fn query_statement(conn: &Connection, stmt: &Statement) -> rusqlite::Result<Rows> {
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    let columns: Arc<[String]> = prepared
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let width = columns.len();
    let mut rows = prepared.query(params_from_iter(stmt.args.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(row.get::<_, Value>(idx)?);
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(out)
}

impl Driver for SqliteDriver {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError> {
        run(&self.conn, ctx, |conn| exec_statement(conn, stmt))
    }

    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError> {
        run(&self.conn, ctx, |conn| query_statement(conn, stmt))
    }

    fn tx(&self, ctx: &Context) -> Result<Box<dyn Transaction>, EntError> {
        let conn: SharedConnection = Arc::new(Mutex::new(Some(self.tx_connection(ctx)?)));
        run(&conn, ctx, |conn| conn.execute_batch("BEGIN"))?;
        tracing::debug!("sqlite transaction started");
        Ok(Box::new(SqliteTransaction {
            conn,
            idle: Arc::clone(&self.idle),
        }))
    }

    fn close(&self) -> Result<(), EntError> {
        self.idle.lock().clear();
        let conn = self.conn.lock().take();
        match conn {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| EntError::driver(e.to_string())),
            None => Ok(()),
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

struct SqliteTransaction {
    conn: SharedConnection,
    idle: Arc<Mutex<Vec<Connection>>>,
}

impl SqliteTransaction {
    /// Runs `sql` to end the transaction, then hands the connection back to
    /// the pool. A failed `COMMIT` keeps the connection so it can still be
    /// rolled back; a failed `ROLLBACK` closes it.
    fn finish(&self, sql: &str) -> Result<(), EntError> {
        let outcome = run(&self.conn, &Context::background(), |conn| {
            conn.execute_batch(sql)
        });
        if outcome.is_err() && sql == "COMMIT" {
            return outcome;
        }
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            let mut idle = self.idle.lock();
            if outcome.is_ok() && conn.is_autocommit() && idle.len() < MAX_IDLE_TX_CONNS {
                idle.push(conn);
            }
        }
        outcome
    }
}

impl Transaction for SqliteTransaction {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError> {
        run(&self.conn, ctx, |conn| exec_statement(conn, stmt))
    }

    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError> {
        run(&self.conn, ctx, |conn| query_statement(conn, stmt))
    }

    fn commit(&self) -> Result<(), EntError> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> Result<(), EntError> {
        self.finish("ROLLBACK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_memory_dsn() {
        let config = SqliteConfig::parse(":memory:").unwrap();
        assert_eq!(config.path, ":memory:");
        assert!(config.foreign_keys);

        let config = SqliteConfig::parse("/tmp/app.db").unwrap();
        assert_eq!(config.path, "/tmp/app.db");
    }

    #[test]
    fn test_parse_uri_splits_driver_params() {
        let config =
            SqliteConfig::parse("file:ent?mode=memory&cache=shared&_fk=0&_busy_timeout=250&x=1")
                .unwrap();
        assert_eq!(config.path, "file:ent?mode=memory&cache=shared");
        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.ignored, vec!["x".to_string()]);
    }

    #[test]
    fn test_memory_uri_gets_shared_cache() {
        let config = SqliteConfig::parse("file:ent?mode=memory&_fk=1").unwrap();
        assert_eq!(config.path, "file:ent?mode=memory&cache=shared");

        let config = SqliteConfig::default().shareable();
        assert!(config.path.starts_with("file:entgraph-"));
        assert!(config.path.ends_with("?mode=memory&cache=shared"));
        assert_ne!(config.path, SqliteConfig::default().shareable().path);
    }

    #[test]
    fn test_transaction_runs_on_its_own_connection() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        let ctx = Context::background();
        driver
            .exec(&ctx, &Statement::new("CREATE TABLE t (id INTEGER PRIMARY KEY)"))
            .unwrap();
        let tx = driver.tx(&ctx).unwrap();
        driver
            .exec(&ctx, &Statement::new("INSERT INTO t (id) VALUES (1)"))
            .unwrap();
        tx.rollback().unwrap();
        let rows = driver
            .query(&ctx, &Statement::new("SELECT COUNT(*) AS n FROM t"))
            .unwrap();
        assert_eq!(rows[0].int("n").unwrap(), 1);
        assert_eq!(driver.idle.lock().len(), 1);

        let tx = driver.tx(&ctx).unwrap();
        assert!(driver.idle.lock().is_empty());
        tx.commit().unwrap();
        assert_eq!(driver.idle.lock().len(), 1);
    }

    #[test]
    fn test_parse_rejects_bad_flag() {
        let err = SqliteConfig::parse("file:ent?_fk=maybe").unwrap_err();
        assert!(matches!(err, EntError::InvalidInput(_)));
    }

    #[test]
    fn test_exec_and_query_roundtrip() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        let ctx = Context::background();
        driver
            .exec(&ctx, &Statement::new("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)"))
            .unwrap();
        let res = driver
            .exec(
                &ctx,
                &Statement::with_args("INSERT INTO t (name) VALUES (?)", vec![Value::from("a")]),
            )
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        assert_eq!(res.last_insert_id, 1);
        let rows = driver
            .query(&ctx, &Statement::new("SELECT id, name FROM t"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].string("name").unwrap(), "a");
    }

    #[test]
    fn test_closed_driver_reports_error() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver.close().unwrap();
        driver.close().unwrap();
        let err = driver
            .query(&Context::background(), &Statement::new("SELECT 1"))
            .unwrap_err();
        assert!(matches!(err, EntError::DriverError(_)));
    }
}
