//! Logging sink for helper instances.
//!
//! Each helper logs through a `tracing::Dispatch` it owns. Callers can inject
//! their own dispatch; otherwise [`default_logger`] builds a stream logger
//! that writes lines shaped like
//!
//! ```text
//! 2024-05-01 12:00:00,123 - PostgresHelper - INFO - Database connection established successfully.
//! ```
//!
//! The default dispatch is private to the instance. Nothing is installed as a
//! global subscriber.

use chrono::Local;
use std::fmt;
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Logger name used as the event target and in the default line format.
pub const LOGGER_NAME: &str = "PostgresHelper";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Event formatter producing `<timestamp> - PostgresHelper - <LEVEL> - <message>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelperFormat;

impl<S, N> FormatEvent<S, N> for HelperFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format(TIMESTAMP_FORMAT),
            LOGGER_NAME,
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Build the default logger: stdout, timestamped, INFO and above.
pub fn default_logger() -> Dispatch {
    logger_with_writer(std::io::stdout, Level::INFO)
}

/// Build a logger in the default format that writes to `make_writer`.
pub fn logger_with_writer<W>(make_writer: W, max_level: Level) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_max_level(max_level)
        .with_ansi(false)
        .event_format(HelperFormat)
        .finish();
    Dispatch::new(subscriber)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory writer for asserting on log output.
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CapturedLogs;
    use super::*;

    fn captured_logger(level: Level) -> (Dispatch, CapturedLogs) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        (logger_with_writer(move || writer.clone(), level), logs)
    }

    #[test]
    fn test_default_format_info_line() {
        let (dispatch, logs) = captured_logger(Level::INFO);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: LOGGER_NAME, "Database connection established successfully.");
        });

        let output = logs.contents();
        let line = output.lines().next().expect("one line logged");
        let parts: Vec<&str> = line.splitn(4, " - ").collect();
        assert_eq!(parts.len(), 4);
        // YYYY-mm-dd HH:MM:SS,mmm
        assert_eq!(parts[0].len(), 23, "unexpected timestamp: {}", parts[0]);
        assert_eq!(&parts[0][19..20], ",");
        assert_eq!(parts[1], "PostgresHelper");
        assert_eq!(parts[2], "INFO");
        assert_eq!(parts[3], "Database connection established successfully.");
    }

    #[test]
    fn test_default_format_error_level() {
        let (dispatch, logs) = captured_logger(Level::INFO);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(target: LOGGER_NAME, "Error executing query: boom");
        });
        assert!(
            logs.contents()
                .contains(" - PostgresHelper - ERROR - Error executing query: boom")
        );
    }

    #[test]
    fn test_debug_filtered_at_info() {
        let (dispatch, logs) = captured_logger(Level::INFO);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!(target: LOGGER_NAME, "hidden");
            tracing::info!(target: LOGGER_NAME, "shown");
        });
        let output = logs.contents();
        assert!(!output.contains("hidden"));
        assert!(output.contains("shown"));
    }
}
