//! Single-connection session.
//!
//! A `Session` owns the one `PgConnection` a helper works with and tracks the
//! implicit transaction scope on top of it:
//! - With autocommit enabled every statement commits on its own.
//! - With autocommit disabled a `BEGIN` is issued lazily before the first
//!   statement after a commit or rollback, so changes stay pending until
//!   `commit()`.
//!
//! Transaction control statements sent by the caller (`BEGIN`, `COMMIT`,
//! `ROLLBACK`, ...) keep the tracked scope in sync. A scope the caller opened
//! is never committed on their behalf.
//!
//! Statements without parameters are sent unprepared, which lets callers run
//! multi-statement scripts and DDL. Parameterized statements are described
//! first so each value can be encoded as the type the server expects, then
//! executed through the driver's statement cache.

use crate::db::params::{bind_all, declared_type};
use crate::db::statement::{TransactionControl, transaction_control};
use crate::models::QueryParam;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Connection, Either, Executor, PgConnection, Postgres, Statement};
use std::time::Instant;
use tracing::debug;

pub struct Session {
    conn: PgConnection,
    autocommit: bool,
    in_transaction: bool,
    caller_scope: bool,
}

impl Session {
    /// Open a connection.
    pub async fn connect(options: &PgConnectOptions, autocommit: bool) -> Result<Self, sqlx::Error> {
        let conn = PgConnection::connect_with(options).await?;
        Ok(Self {
            conn,
            autocommit,
            in_transaction: false,
            caller_scope: false,
        })
    }

    /// Whether a transaction is pending on the connection.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Open a transaction unless one is already pending.
    pub async fn begin(&mut self) -> Result<(), sqlx::Error> {
        if !self.in_transaction {
            self.conn.execute("BEGIN").await?;
            self.in_transaction = true;
            debug!("Transaction started");
        }
        Ok(())
    }

    /// Commit the pending transaction. No-op when nothing is pending.
    pub async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            // The server ends the transaction even when COMMIT fails
            self.end_scope();
            self.conn.execute("COMMIT").await?;
            debug!("Transaction committed");
        }
        Ok(())
    }

    /// Commit after a statement when autocommit is enabled.
    ///
    /// A transaction the caller opened with their own `BEGIN` stays open.
    pub async fn autocommit_pending(&mut self) -> Result<(), sqlx::Error> {
        if self.autocommit && !self.caller_scope {
            self.commit().await?;
        }
        Ok(())
    }

    /// Roll back the pending transaction. No-op when nothing is pending.
    pub async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            // The scope is gone either way once ROLLBACK has been sent
            self.end_scope();
            self.conn.execute("ROLLBACK").await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }

    /// Fetch every row produced by a statement.
    pub async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<PgRow>, sqlx::Error> {
        let control = self.enter(sql).await?;
        let start = Instant::now();

        let rows = if params.is_empty() {
            self.conn.fetch_all(sql).await?
        } else {
            self.bound(sql, params).await?.fetch_all(&mut self.conn).await?
        };

        self.leave(control);
        debug!(
            rows = rows.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query fetched"
        );
        Ok(rows)
    }

    /// Fetch the first row of a statement, if any.
    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Option<PgRow>, sqlx::Error> {
        let control = self.enter(sql).await?;

        let row = if params.is_empty() {
            self.conn.fetch_optional(sql).await?
        } else {
            self.bound(sql, params)
                .await?
                .fetch_optional(&mut self.conn)
                .await?
        };

        self.leave(control);
        Ok(row)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> Result<u64, sqlx::Error> {
        let control = self.enter(sql).await?;
        let start = Instant::now();

        let result = if params.is_empty() {
            self.conn.execute(sql).await?
        } else {
            self.bound(sql, params).await?.execute(&mut self.conn).await?
        };

        self.leave(control);
        debug!(
            rows_affected = result.rows_affected(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(result.rows_affected())
    }

    /// Execute one statement per parameter row, in order.
    ///
    /// Must run inside a transaction opened with [`Session::begin`]; the
    /// caller decides when to commit.
    pub async fn execute_batch(
        &mut self,
        sql: &str,
        rows: &[Vec<QueryParam>],
    ) -> Result<u64, sqlx::Error> {
        let mut rows_affected = 0;
        for row in rows {
            rows_affected += self
                .bound(sql, row)
                .await?
                .execute(&mut self.conn)
                .await?
                .rows_affected();
        }
        Ok(rows_affected)
    }

    /// Close the connection, sending a graceful terminate message.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }

    /// Describe `sql` and bind `params` as the parameter types it reports.
    ///
    /// The description is served from the statement cache after the first
    /// call, so repeated execution costs no extra round trip.
    async fn bound<'q>(
        &mut self,
        sql: &'q str,
        params: &'q [QueryParam],
    ) -> Result<Query<'q, Postgres, PgArguments>, sqlx::Error> {
        let declared: Vec<PgTypeInfo> = params.iter().map(declared_type).collect();
        let statement = (&mut self.conn).prepare_with(sql, &declared).await?;
        let expected = match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        };
        bind_all(sql, params, &expected)
    }

    /// Prepare the scope for a statement and report whether it is a
    /// transaction control statement.
    async fn enter(&mut self, sql: &str) -> Result<Option<TransactionControl>, sqlx::Error> {
        let control = transaction_control(sql);
        match control {
            // COMMIT and ROLLBACK end the scope even when they fail
            Some(TransactionControl::End) => self.end_scope(),
            Some(TransactionControl::Begin) => {}
            None if !self.autocommit => self.begin().await?,
            None => {}
        }
        Ok(control)
    }

    fn leave(&mut self, control: Option<TransactionControl>) {
        if control == Some(TransactionControl::Begin) {
            self.in_transaction = true;
            self.caller_scope = true;
            debug!("Transaction started by statement");
        }
    }

    fn end_scope(&mut self) {
        self.in_transaction = false;
        self.caller_scope = false;
    }
}
