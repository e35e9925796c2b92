//! Blocking single-connection PostgreSQL helper.
//!
//! [`PostgresHelper`] opens one connection when it is constructed and keeps it
//! until [`PostgresHelper::close`] is called or the value is dropped. Every
//! operation blocks the caller until the driver round trip completes; the
//! async driver is driven on a current-thread runtime owned by the helper.
//!
//! # Failure handling
//!
//! Every failure is logged before it is returned. Statement, count and bulk
//! insert failures additionally roll back the pending transaction before the
//! error is returned, so the connection is always left on a clean transaction
//! boundary. Nothing is retried.
//!
//! # Async callers
//!
//! The helper must not be used from inside an async task: blocking on the
//! internal runtime from a runtime worker panics. Move it to a blocking
//! thread (for example with `tokio::task::spawn_blocking`) instead.
//!
//! # Example
//!
//! ```no_run
//! use pg_helper::{ConnectionConfig, PostgresHelper, ResultShape, params};
//!
//! let config = ConnectionConfig::new("localhost", 5432, "mydb", "user", "pass")
//!     .with_autocommit(false)
//!     .with_result_shape(ResultShape::Named);
//!
//! PostgresHelper::scoped(config, None, |db| {
//!     db.update("UPDATE my_table SET name = $1 WHERE id = $2", &params!["value", 1])?;
//!     let count = db.count_query("SELECT COUNT(*) AS count FROM my_table", &[])?;
//!     println!("Row count: {count}");
//!     db.commit()
//! })?;
//! # Ok::<(), pg_helper::HelperError>(())
//! ```

use crate::config::ConnectionConfig;
use crate::db::session::Session;
use crate::db::statement::{is_select, leading_keyword};
use crate::db::types::{decode_count, shape_rows};
use crate::error::{DbResult, HelperError};
use crate::logging::{LOGGER_NAME, default_logger};
use crate::models::{DEFAULT_CHUNK_SIZE, QueryParam, QueryRows, ResultShape};
use tokio::runtime::Runtime;
use tracing::dispatcher::{self, DefaultGuard};
use tracing::{Dispatch, debug, error, info};

/// Column read by [`PostgresHelper::count_query`] in named shape.
const COUNT_COLUMN: &str = "count";

pub struct PostgresHelper {
    runtime: Runtime,
    session: Option<Session>,
    autocommit: bool,
    result_shape: ResultShape,
    logger: Dispatch,
}

impl PostgresHelper {
    /// Open a connection, logging through the default stream logger.
    pub fn connect(config: ConnectionConfig) -> DbResult<Self> {
        Self::new(config, None)
    }

    /// Open a connection, logging through `logger` if given.
    ///
    /// Without a logger a default one is built for this instance: stdout,
    /// timestamped, INFO and above.
    pub fn new(config: ConnectionConfig, logger: Option<Dispatch>) -> DbResult<Self> {
        let logger = logger.unwrap_or_else(default_logger);
        let _log = dispatcher::set_default(&logger);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connect_failed(sqlx::Error::Io(e)))?;

        debug!(
            target: LOGGER_NAME,
            target_url = %config.masked_url(),
            autocommit = config.autocommit,
            result_shape = %config.result_shape,
            "Connecting to database"
        );

        let session = runtime
            .block_on(Session::connect(&config.connect_options(), config.autocommit))
            .map_err(connect_failed)?;

        info!(target: LOGGER_NAME, "Database connection established successfully.");

        Ok(Self {
            runtime,
            session: Some(session),
            autocommit: config.autocommit,
            result_shape: config.result_shape,
            logger,
        })
    }

    /// Run `body` with a freshly opened helper and always close it afterwards.
    ///
    /// An error from `body` takes precedence over an error while closing.
    pub fn scoped<T, F>(config: ConnectionConfig, logger: Option<Dispatch>, body: F) -> DbResult<T>
    where
        F: FnOnce(&mut Self) -> DbResult<T>,
    {
        let mut helper = Self::new(config, logger)?;
        let result = body(&mut helper);
        let closed = helper.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn result_shape(&self) -> ResultShape {
        self.result_shape
    }

    /// Whether the connection is still held.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Whether uncommitted work is pending on the connection.
    pub fn in_transaction(&self) -> bool {
        self.session.as_ref().is_some_and(Session::in_transaction)
    }

    /// Execute a statement, returning rows when it is a SELECT.
    ///
    /// Rows come back in the configured [`ResultShape`]. Any other statement
    /// returns `None` without fetching.
    pub fn execute_query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<QueryRows>> {
        let _log = self.log_scope();
        let shape = self.result_shape;
        let session = self.session.as_mut().ok_or_else(closed)?;

        let result = if is_select(sql) {
            self.runtime
                .block_on(session.fetch_all(sql, params))
                .map(|rows| Some(shape_rows(&rows, shape)))
        } else {
            self.runtime
                .block_on(session.execute(sql, params))
                .map(|_| None)
        };

        result.map_err(|e| self.fail("Error executing query", e))
    }

    /// Execute a statement returning a single count value.
    ///
    /// Reads the `count` column in named shape and the first column in
    /// positional shape. A statement that returns no row fails with a
    /// [`HelperError::QueryExecution`] whose cause is
    /// [`sqlx::Error::RowNotFound`].
    pub fn count_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let _log = self.log_scope();
        let shape = self.result_shape;
        let session = self.session.as_mut().ok_or_else(closed)?;

        let result = self
            .runtime
            .block_on(session.fetch_optional(sql, params))
            .and_then(|row| row.ok_or(sqlx::Error::RowNotFound))
            .and_then(|row| match shape {
                ResultShape::Named => decode_count(&row, COUNT_COLUMN),
                ResultShape::Positional => decode_count(&row, 0),
            });

        result.map_err(|e| self.fail("Error getting row count", e))
    }

    /// Execute an INSERT statement. Returns the number of rows inserted.
    pub fn insert(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.execute_mutation("Error executing insert", sql, params)
    }

    /// Execute an UPDATE statement. Returns the number of rows updated.
    pub fn update(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.execute_mutation("Error executing update", sql, params)
    }

    /// Execute a DELETE statement. Returns the number of rows deleted.
    pub fn delete(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.execute_mutation("Error executing delete", sql, params)
    }

    /// [`PostgresHelper::bulk_insert`] with chunks of [`DEFAULT_CHUNK_SIZE`] rows.
    pub fn bulk_insert_default(&mut self, sql: &str, rows: &[Vec<QueryParam>]) -> DbResult<u64> {
        self.bulk_insert(sql, rows, DEFAULT_CHUNK_SIZE)
    }

    /// Execute the same insert once per parameter row, `chunk_size` rows at a time.
    ///
    /// Rows are applied in input order. All chunks run in one transaction:
    /// with autocommit enabled it is committed once at the end, otherwise it
    /// stays pending until [`PostgresHelper::commit`]. A failing chunk rolls
    /// back everything pending on the connection.
    pub fn bulk_insert(
        &mut self,
        sql: &str,
        rows: &[Vec<QueryParam>],
        chunk_size: usize,
    ) -> DbResult<u64> {
        const CONTEXT: &str = "Error executing bulk insert";

        let _log = self.log_scope();
        if chunk_size == 0 {
            let err = sqlx::Error::Configuration("chunk size must be greater than zero".into());
            error!(target: LOGGER_NAME, "{CONTEXT}: {err}");
            return Err(HelperError::query_execution(CONTEXT, err));
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let session = self.session.as_mut().ok_or_else(closed)?;
        let result = self.runtime.block_on(async {
            session.begin().await?;
            let mut inserted = 0;
            for (index, chunk) in rows.chunks(chunk_size).enumerate() {
                inserted += session.execute_batch(sql, chunk).await?;
                debug!(
                    target: LOGGER_NAME,
                    chunk = index,
                    rows = chunk.len(),
                    "Bulk insert chunk applied"
                );
            }
            session.autocommit_pending().await?;
            Ok::<_, sqlx::Error>(inserted)
        });

        result.map_err(|e| self.fail(CONTEXT, e))
    }

    /// Commit the pending transaction.
    pub fn commit(&mut self) -> DbResult<()> {
        let _log = self.log_scope();
        let session = self.session.as_mut().ok_or_else(closed)?;
        self.runtime.block_on(session.commit()).map_err(|e| {
            error!(target: LOGGER_NAME, "Error committing transaction: {e}");
            HelperError::query_execution("Error committing transaction", e)
        })
    }

    /// Roll back the pending transaction.
    pub fn rollback(&mut self) -> DbResult<()> {
        let _log = self.log_scope();
        let session = self.session.as_mut().ok_or_else(closed)?;
        self.runtime.block_on(session.rollback()).map_err(|e| {
            error!(target: LOGGER_NAME, "Error rolling back transaction: {e}");
            HelperError::query_execution("Error rolling back transaction", e)
        })
    }

    /// Release the connection.
    ///
    /// Safe to call more than once; later calls do nothing. Work that was not
    /// committed is discarded by the server.
    pub fn close(&mut self) -> DbResult<()> {
        let _log = self.log_scope();
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        match self.runtime.block_on(session.close()) {
            Ok(()) => {
                info!(target: LOGGER_NAME, "Database connection closed.");
                Ok(())
            }
            Err(e) => {
                error!(target: LOGGER_NAME, "Error closing connection: {e}");
                Err(HelperError::connection("Error closing connection", e))
            }
        }
    }

    fn execute_mutation(
        &mut self,
        context: &'static str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let _log = self.log_scope();
        let session = self.session.as_mut().ok_or_else(closed)?;

        debug!(
            target: LOGGER_NAME,
            statement = %leading_keyword(sql),
            params = params.len(),
            "Executing mutation"
        );

        let result = self.runtime.block_on(async {
            let rows_affected = session.execute(sql, params).await?;
            session.autocommit_pending().await?;
            Ok::<_, sqlx::Error>(rows_affected)
        });

        result.map_err(|e| self.fail(context, e))
    }

    /// Log a failed operation, roll back, and wrap the cause.
    fn fail(&mut self, context: &'static str, err: sqlx::Error) -> HelperError {
        error!(target: LOGGER_NAME, "{context}: {err}");

        if let Some(session) = self.session.as_mut() {
            if let Err(rollback_err) = self.runtime.block_on(session.rollback()) {
                error!(target: LOGGER_NAME, "Error rolling back transaction: {rollback_err}");
            }
        }

        HelperError::query_execution(context, err)
    }

    /// Route events to this helper's logger until the guard is dropped.
    fn log_scope(&self) -> DefaultGuard {
        dispatcher::set_default(&self.logger)
    }
}

impl Drop for PostgresHelper {
    fn drop(&mut self) {
        // Errors are already logged by close()
        let _ = self.close();
    }
}

impl std::fmt::Debug for PostgresHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresHelper")
            .field("open", &self.is_open())
            .field("autocommit", &self.autocommit())
            .field("in_transaction", &self.in_transaction())
            .field("result_shape", &self.result_shape)
            .finish()
    }
}

fn connect_failed(err: sqlx::Error) -> HelperError {
    error!(target: LOGGER_NAME, "Error connecting to the database: {err}");
    HelperError::connection("Error connecting to the database", err)
}

fn closed() -> HelperError {
    let err = HelperError::closed();
    error!(target: LOGGER_NAME, "{err}");
    err
}
