//! Parameter list macros.
//!
//! `params!` builds a `Vec<QueryParam>` from heterogeneous expressions so call
//! sites read like the statement's placeholder list.

/// Build an ordered parameter list.
///
/// Each expression is converted with `QueryParam::from`, so anything with a
/// `From` impl (integers, floats, strings, `Option<T>`, JSON values) works.
///
/// # Example
///
/// ```
/// use pg_helper::{QueryParam, params};
///
/// let params = params![1, "alice", None::<i64>];
/// assert_eq!(params[1], QueryParam::String("alice".into()));
/// assert!(params[2].is_null());
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::models::QueryParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::QueryParam::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use crate::models::QueryParam;

    #[test]
    fn test_params_empty() {
        let params = params![];
        assert!(params.is_empty());
    }

    #[test]
    fn test_params_mixed() {
        let params = params![42, 1.5, "x", true, Some("y"),];
        assert_eq!(
            params,
            vec![
                QueryParam::Int(42),
                QueryParam::Float(1.5),
                QueryParam::String("x".into()),
                QueryParam::Bool(true),
                QueryParam::String("y".into()),
            ]
        );
    }
}
