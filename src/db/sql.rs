//! Admission-controlled SQLite access.
//!
//! # Responsibilities
//! - Bound concurrent statements with an admission gate
//! - Reuse connections through an [`IdlePool`]
//! - Run rusqlite calls on the blocking pool
//!
//! # Design Decisions
//! - A transaction holds its slot until commit, rollback or drop
//! - A connection returned mid-transaction is treated as broken and closed
//! - Every connection to `":memory:"` is a separate database
//! - A statement keeps its session until SQLite returns, even if the caller
//!   stops waiting

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::admission::{AdmissionControl, AdmissionError, DoneSignal, Session};
use crate::config::SqlConfig;
use crate::pool::{idle_capacity, IdlePool, Manager};

/// Idle connections kept when the gate is too small to derive a count.
const DEFAULT_IDLE: usize = 2;

/// Errors from SQL operations.
#[derive(Debug, Error)]
pub enum SqlError {
    /// Admission was refused, or the admitted work panicked.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking task running the statement failed.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<AdmissionError<SqlError>> for SqlError {
    fn from(err: AdmissionError<SqlError>) -> Self {
        match err {
            AdmissionError::Refused(refusal) => SqlError::Admission(AdmissionError::Refused(refusal)),
            AdmissionError::Borrow(e) => e,
            AdmissionError::Fault(fault) => SqlError::Admission(AdmissionError::Fault(fault)),
        }
    }
}

/// Summary of a data-modifying statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// A pooled SQLite connection.
#[derive(Clone)]
pub struct SqlConn(Arc<Mutex<Connection>>);

impl SqlConn {
    /// Run `f` against the connection on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, SqlError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await?
        .map_err(SqlError::Sqlite)
    }

    fn in_transaction(&self) -> bool {
        let guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        !guard.is_autocommit()
    }
}

impl std::fmt::Debug for SqlConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConn").finish_non_exhaustive()
    }
}

/// Opens SQLite connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
}

impl SqliteManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Manager for SqliteManager {
    type Connection = SqlConn;
    type Error = SqlError;

    async fn connect(&self) -> Result<SqlConn, SqlError> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || Connection::open(path)).await??;
        tracing::debug!(path = %self.path.display(), "Opened sqlite connection");
        Ok(SqlConn(Arc::new(Mutex::new(conn))))
    }

    async fn check(&self, conn: &mut SqlConn, _idle_for: Duration) -> Result<(), SqlError> {
        conn.run(|c| c.query_row("SELECT 1", [], |_| Ok(()))).await
    }

    fn has_broken(&self, conn: &mut SqlConn) -> bool {
        conn.in_transaction()
    }
}

type SqlSession = Session<IdlePool<SqliteManager>>;

/// An admission-controlled SQLite database.
#[derive(Clone)]
pub struct SqlDb {
    admission: AdmissionControl,
    pool: Arc<IdlePool<SqliteManager>>,
}

impl SqlDb {
    pub fn new(config: &SqlConfig) -> Self {
        let manager = SqliteManager::new(&config.path);
        let max_idle = idle_capacity(config.admission.capacity, DEFAULT_IDLE);
        let pool = IdlePool::new(manager, max_idle, Duration::from_secs(config.idle_timeout_secs));
        Self {
            admission: AdmissionControl::new("sql", &config.admission),
            pool: Arc::new(pool),
        }
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Connections currently idle in the pool.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    /// Execute a data-modifying statement.
    pub async fn exec(
        &self,
        cancel: Option<&DoneSignal>,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult, SqlError> {
        let session = self.session(cancel).await?;
        let (_, res) = run_in(session, exec_job(sql.to_owned(), params)).await?;
        Ok(res)
    }

    /// Run a query, mapping every row with `map`.
    pub async fn query<T, F>(
        &self,
        cancel: Option<&DoneSignal>,
        sql: &str,
        params: Vec<Value>,
        map: F,
    ) -> Result<Vec<T>, SqlError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session(cancel).await?;
        let (_, rows) = run_in(session, query_job(sql.to_owned(), params, map)).await?;
        Ok(rows)
    }

    /// Run a query expected to return at most one row.
    pub async fn query_row<T, F>(
        &self,
        cancel: Option<&DoneSignal>,
        sql: &str,
        params: Vec<Value>,
        map: F,
    ) -> Result<Option<T>, SqlError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session(cancel).await?;
        let sql = sql.to_owned();
        let (_, row) = run_in(session, move |c| {
            let mut stmt = c.prepare_cached(&sql)?;
            let row = stmt.query_row(params_from_iter(params.iter()), map).optional();
            row
        })
        .await?;
        Ok(row)
    }

    /// Verify the database is reachable.
    pub async fn ping(&self, cancel: Option<&DoneSignal>) -> Result<(), SqlError> {
        let session = self.session(cancel).await?;
        run_in(session, |c| c.query_row("SELECT 1", [], |_| Ok(()))).await?;
        Ok(())
    }

    /// Validate `sql` and return a statement that can be run repeatedly.
    ///
    /// Each run takes its own admission slot and reuses the connection's
    /// prepared-statement cache.
    pub async fn prepare(&self, cancel: Option<&DoneSignal>, sql: &str) -> Result<SqlStmt, SqlError> {
        let session = self.session(cancel).await?;
        let owned = sql.to_owned();
        run_in(session, move |c| c.prepare_cached(&owned).map(|_| ())).await?;
        Ok(SqlStmt {
            db: self.clone(),
            sql: Arc::from(sql),
        })
    }

    /// Start a transaction. The admission slot is held until it ends.
    pub async fn begin(&self, cancel: Option<&DoneSignal>) -> Result<SqlTx, SqlError> {
        let session = self.session(cancel).await?;
        let (session, ()) = run_in(session, |c| c.execute_batch("BEGIN")).await?;
        Ok(SqlTx {
            session: Some(session),
        })
    }

    /// Stop admitting, wait for in-flight statements, then close idle connections.
    pub async fn close(&self) {
        self.admission.stop();
        self.admission.wait_drain().await;
        self.pool.clear();
    }

    async fn session(&self, cancel: Option<&DoneSignal>) -> Result<SqlSession, SqlError> {
        Ok(self.admission.open(&self.pool, cancel).await?)
    }
}

impl std::fmt::Debug for SqlDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDb")
            .field("path", &self.pool.manager().path())
            .field("admission", &self.admission)
            .finish()
    }
}

/// Run `f` on the session's connection on the blocking pool.
///
/// The session moves into the job and comes back with its result. A caller
/// that stops waiting leaves the session with the job, so its slot and
/// connection are released only once SQLite is done.
async fn run_in<F, T>(session: SqlSession, f: F) -> Result<(SqlSession, T), SqlError>
where
    F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (session, res) = tokio::task::spawn_blocking(move || {
        let res = {
            let mut guard = session.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        };
        (session, res)
    })
    .await?;
    Ok((session, res?))
}

fn exec_job(
    sql: String,
    params: Vec<Value>,
) -> impl FnOnce(&mut Connection) -> rusqlite::Result<ExecResult> + Send + 'static {
    move |c| {
        let rows_affected = c.prepare_cached(&sql)?.execute(params_from_iter(params.iter()))?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: c.last_insert_rowid(),
        })
    }
}

fn query_job<T, F>(
    sql: String,
    params: Vec<Value>,
    mut map: F,
) -> impl FnOnce(&mut Connection) -> rusqlite::Result<Vec<T>> + Send + 'static
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    move |c| {
        let mut stmt = c.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| map(row))?
            .collect::<rusqlite::Result<Vec<T>>>();
        rows
    }
}

/// A validated statement bound to its database.
#[derive(Debug, Clone)]
pub struct SqlStmt {
    db: SqlDb,
    sql: Arc<str>,
}

impl SqlStmt {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn exec(&self, cancel: Option<&DoneSignal>, params: Vec<Value>) -> Result<ExecResult, SqlError> {
        self.db.exec(cancel, &self.sql, params).await
    }

    pub async fn query<T, F>(
        &self,
        cancel: Option<&DoneSignal>,
        params: Vec<Value>,
        map: F,
    ) -> Result<Vec<T>, SqlError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db.query(cancel, &self.sql, params, map).await
    }
}

/// An open transaction holding one admission slot.
///
/// Dropping without [`SqlTx::commit`] rolls back.
#[derive(Debug)]
#[must_use = "dropping a transaction rolls it back"]
pub struct SqlTx {
    session: Option<SqlSession>,
}

impl SqlTx {
    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult, SqlError> {
        self.conn().run(exec_job(sql.to_owned(), params)).await
    }

    pub async fn query<T, F>(&self, sql: &str, params: Vec<Value>, map: F) -> Result<Vec<T>, SqlError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn().run(query_job(sql.to_owned(), params, map)).await
    }

    pub async fn commit(mut self) -> Result<(), SqlError> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), SqlError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, verb: &'static str) -> Result<(), SqlError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        // A connection left mid-transaction reports broken and is not pooled again.
        run_in(session, move |c| c.execute_batch(verb)).await?;
        Ok(())
    }

    fn conn(&self) -> &SqlConn {
        match &self.session {
            Some(session) => &**session,
            None => unreachable!("transaction used after it ended"),
        }
    }
}

impl Drop for SqlTx {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let rollback = move || {
            let ok = {
                let guard = session.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.execute_batch("ROLLBACK").is_ok()
            };
            if ok {
                session.close();
            } else {
                session.discard();
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(rollback);
            }
            Err(_) => rollback(),
        }
    }
}
