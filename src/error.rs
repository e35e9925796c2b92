//! Error types for the PostgreSQL helper.
//!
//! Every failure surfaces as one of two kinds, each carrying the driver error
//! that caused it:
//! - [`HelperError::Connection`] for connecting, releasing the connection, or
//!   using a helper that has already been closed
//! - [`HelperError::QueryExecution`] for statement execution, count retrieval,
//!   commit and rollback

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelperError {
    #[error("{context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{context}: {source}")]
    QueryExecution {
        context: String,
        #[source]
        source: sqlx::Error,
    },
}

impl HelperError {
    /// Create a connection error.
    pub fn connection(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            context: context.into(),
            source,
        }
    }

    /// Create a query execution error.
    pub fn query_execution(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::QueryExecution {
            context: context.into(),
            source,
        }
    }

    /// Error returned when an operation is attempted on a closed helper.
    pub fn closed() -> Self {
        Self::connection(
            "Database connection is closed",
            sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "connection already released",
            )),
        )
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// The operation description this error was raised with.
    pub fn context(&self) -> &str {
        match self {
            Self::Connection { context, .. } | Self::QueryExecution { context, .. } => context,
        }
    }

    /// The underlying driver error.
    pub fn cause(&self) -> &sqlx::Error {
        match self {
            Self::Connection { source, .. } | Self::QueryExecution { source, .. } => source,
        }
    }

    /// SQLSTATE code reported by the server, e.g. "42P01" for undefined table.
    pub fn sql_state(&self) -> Option<String> {
        match self.cause() {
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.to_string()),
            _ => None,
        }
    }

    /// A short hint about what to check, based on the driver error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.cause() {
            sqlx::Error::Configuration(_) => {
                Some("Check the connection parameters and credentials")
            }
            sqlx::Error::Database(_) => Some("Check the SQL syntax and referenced objects"),
            sqlx::Error::RowNotFound => Some("Verify the query conditions match existing data"),
            sqlx::Error::Io(_) => Some("Check network connectivity and database server status"),
            sqlx::Error::Tls(_) => Some("Verify TLS configuration and certificates"),
            sqlx::Error::Protocol(_) => Some("Check database server compatibility"),
            sqlx::Error::ColumnNotFound(_) => Some("Check the column names selected by the query"),
            sqlx::Error::Encode(_) => {
                Some("Pass parameter values that match the placeholder types, or cast the placeholder")
            }
            _ => None,
        }
    }
}

/// Result type alias for helper operations.
pub type DbResult<T> = Result<T, HelperError>;
