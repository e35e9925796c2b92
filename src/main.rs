//! pg-helper - Main entry point.
//!
//! Runs a single statement (or a bulk insert) through a `PostgresHelper` and
//! prints the outcome as JSON on stdout.

use clap::Parser;
use pg_helper::config::{BulkInsertArgs, Command, Config, StatementArgs};
use pg_helper::{DbResult, HelperError, PostgresHelper, QueryParam};
use serde_json::{Value as JsonValue, json};
use std::path::Path;
use tracing::{Dispatch, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries the command output
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Parse `--param` values. Anything that is not valid JSON is bound as a string.
fn parse_params(raw: &[String]) -> Vec<QueryParam> {
    raw.iter()
        .map(|s| match serde_json::from_str::<JsonValue>(s) {
            Ok(value) => QueryParam::from_json(value),
            Err(_) => QueryParam::String(s.clone()),
        })
        .collect()
}

/// Load bulk insert rows from a JSON file holding an array of arrays.
fn load_rows(path: &Path) -> Result<Vec<Vec<QueryParam>>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read rows file {}: {e}", path.display()))?;
    let rows: Vec<Vec<JsonValue>> = serde_json::from_str(&content)
        .map_err(|e| format!("Rows file must be a JSON array of arrays: {e}"))?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(QueryParam::from_json).collect())
        .collect())
}

fn run(
    db: &mut PostgresHelper,
    command: &Command,
    bulk_rows: &[Vec<QueryParam>],
) -> DbResult<JsonValue> {
    let output = match command {
        Command::Query(StatementArgs { sql, params }) => {
            match db.execute_query(sql, &parse_params(params))? {
                Some(rows) => json!({ "row_count": rows.len(), "rows": rows }),
                None => json!({ "rows": null }),
            }
        }
        Command::Count(StatementArgs { sql, params }) => {
            json!({ "count": db.count_query(sql, &parse_params(params))? })
        }
        Command::Insert(StatementArgs { sql, params }) => {
            json!({ "rows_affected": db.insert(sql, &parse_params(params))? })
        }
        Command::Update(StatementArgs { sql, params }) => {
            json!({ "rows_affected": db.update(sql, &parse_params(params))? })
        }
        Command::Delete(StatementArgs { sql, params }) => {
            json!({ "rows_affected": db.delete(sql, &parse_params(params))? })
        }
        Command::BulkInsert(BulkInsertArgs {
            sql, chunk_size, ..
        }) => {
            json!({ "rows_affected": db.bulk_insert(sql, bulk_rows, *chunk_size)? })
        }
    };

    if !db.autocommit() {
        db.commit()?;
    }
    Ok(output)
}

/// JSON error report printed on stdout when an operation fails.
fn error_report(err: &HelperError) -> JsonValue {
    json!({
        "error": {
            "kind": if err.is_connection() { "connection" } else { "query_execution" },
            "message": err.to_string(),
            "sql_state": err.sql_state(),
            "suggestion": err.suggestion(),
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let connection = config.connection_config()?;
    let bulk_rows = match &config.command {
        Command::BulkInsert(args) => load_rows(&args.rows)?,
        _ => Vec::new(),
    };

    info!(
        url = %connection.masked_url(),
        autocommit = connection.autocommit,
        result_shape = %connection.result_shape,
        "Starting pg-helper v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Log through the subscriber installed above
    let logger = tracing::dispatcher::get_default(Dispatch::clone);
    let result = PostgresHelper::scoped(connection, Some(logger), |db| {
        run(db, &config.command, &bulk_rows)
    });

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&error_report(&err))?);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_params_json_and_fallback() {
        let params = parse_params(&[
            "42".to_string(),
            "\"quoted\"".to_string(),
            "bare words".to_string(),
            "null".to_string(),
        ]);
        assert_eq!(
            params,
            vec![
                QueryParam::Int(42),
                QueryParam::String("quoted".into()),
                QueryParam::String("bare words".into()),
                QueryParam::Null,
            ]
        );
    }

    #[test]
    fn test_load_rows() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[[1, "a"], [2, "b"]]"#).unwrap();

        let rows = load_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![QueryParam::Int(2), QueryParam::String("b".into())]);
    }

    #[test]
    fn test_load_rows_rejects_non_array() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"a": 1}}"#).unwrap();

        let err = load_rows(file.path()).unwrap_err();
        assert!(err.to_string().contains("JSON array of arrays"));
    }

    #[test]
    fn test_error_report_includes_suggestion() {
        let err = HelperError::query_execution("Error getting row count", sqlx::Error::RowNotFound);
        let report = error_report(&err);
        assert_eq!(report["error"]["kind"], "query_execution");
        assert_eq!(report["error"]["sql_state"], JsonValue::Null);
        assert_eq!(
            report["error"]["suggestion"],
            "Verify the query conditions match existing data"
        );
        assert!(
            report["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Error getting row count")
        );

        let closed = error_report(&HelperError::closed());
        assert_eq!(closed["error"]["kind"], "connection");
    }
}
