//! Statement classification by leading keyword.

/// Keyword that marks a statement whose rows are fetched.
const READ_KEYWORD: &str = "select";

/// Check whether a statement starts with `select`.
///
/// Matching is case-insensitive and ignores leading whitespace. Only the
/// leading characters are inspected; the statement is not parsed.
pub fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..READ_KEYWORD.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(READ_KEYWORD))
}

/// Leading keyword of a statement, lowercased, for log output.
pub fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| {
            word.chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .unwrap_or_default()
}

/// Effect of a transaction control statement on the session's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionControl {
    /// `BEGIN` or `START TRANSACTION`
    Begin,
    /// `COMMIT`, `END`, `ROLLBACK`, `ABORT` or `PREPARE TRANSACTION`
    End,
}

/// Classify a statement that opens or closes a transaction.
///
/// `ROLLBACK TO SAVEPOINT` and the two-phase `COMMIT PREPARED` /
/// `ROLLBACK PREPARED` forms leave the current scope alone and return `None`.
pub fn transaction_control(sql: &str) -> Option<TransactionControl> {
    let words: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|w| !w.is_empty())
        .take(3)
        .map(str::to_ascii_lowercase)
        .collect();
    let first = words.first()?.as_str();
    // ROLLBACK [WORK | TRANSACTION] TO ...
    let modifier = words[1..]
        .iter()
        .map(String::as_str)
        .find(|w| !matches!(*w, "work" | "transaction"));

    match (first, words.get(1).map(String::as_str)) {
        ("begin", _) => Some(TransactionControl::Begin),
        ("start", Some("transaction")) => Some(TransactionControl::Begin),
        ("commit" | "rollback", _) if matches!(modifier, Some("to" | "prepared")) => None,
        ("commit" | "end" | "rollback" | "abort", _) => Some(TransactionControl::End),
        ("prepare", Some("transaction")) => Some(TransactionControl::End),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_select_plain() {
        assert!(is_select("SELECT * FROM users"));
        assert!(is_select("select 1"));
        assert!(is_select("SeLeCt count(*) AS count FROM t"));
    }

    #[test]
    fn test_is_select_ignores_leading_whitespace() {
        assert!(is_select("   \n\tselect id FROM t"));
    }

    #[test]
    fn test_is_select_other_statements() {
        assert!(!is_select("INSERT INTO t VALUES (1)"));
        assert!(!is_select("update t SET a = 1"));
        assert!(!is_select("DELETE FROM t"));
        assert!(!is_select("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_select("CREATE TABLE t (id int)"));
    }

    #[test]
    fn test_is_select_short_and_empty() {
        assert!(!is_select(""));
        assert!(!is_select("   "));
        assert!(!is_select("sel"));
    }

    #[test]
    fn test_is_select_multibyte_prefix() {
        // Byte slicing must not panic on a non-ASCII boundary
        assert!(!is_select("ééé select"));
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  INSERT INTO t"), "insert");
        assert_eq!(leading_keyword("select(1)"), "select");
        assert_eq!(leading_keyword(""), "");
    }

    #[test]
    fn test_transaction_control() {
        use TransactionControl::{Begin, End};

        assert_eq!(transaction_control("BEGIN"), Some(Begin));
        assert_eq!(transaction_control("  begin isolation level serializable"), Some(Begin));
        assert_eq!(transaction_control("START TRANSACTION READ ONLY"), Some(Begin));
        assert_eq!(transaction_control("commit;"), Some(End));
        assert_eq!(transaction_control("END"), Some(End));
        assert_eq!(transaction_control("ROLLBACK"), Some(End));
        assert_eq!(transaction_control("abort work"), Some(End));
        assert_eq!(transaction_control("PREPARE TRANSACTION 'tx1'"), Some(End));
    }

    #[test]
    fn test_transaction_control_ignores_other_statements() {
        assert_eq!(transaction_control("ROLLBACK TO SAVEPOINT sp"), None);
        assert_eq!(transaction_control("rollback work to sp"), None);
        assert_eq!(transaction_control("COMMIT PREPARED 'tx1'"), None);
        assert_eq!(transaction_control("SAVEPOINT sp"), None);
        assert_eq!(transaction_control("DO $$ BEGIN NULL; END $$"), None);
        assert_eq!(transaction_control("SELECT 1"), None);
        assert_eq!(transaction_control(""), None);
    }
}
