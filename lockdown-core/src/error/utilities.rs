use crate::{Error, error::StorageError};

/// Extension trait for Result types to simplify database error mapping
///
/// Storage backends use this to turn driver errors into lockdown storage errors.
///
/// # Example
///
/// ```rust,ignore
/// use lockdown_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to record failure")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a lockdown storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a lockdown storage error with additional context
    ///
    /// The underlying error is logged and replaced by the context, so driver
    /// details never leak into the returned error.
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::Storage(StorageError::Database(context.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_result_ext() {
        let error_result: Result<i32, &str> = Err("database is locked");
        let mapped = error_result.map_db_err();

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "database is locked");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_database_result_ext_with_context_hides_driver_error() {
        let error_result: Result<i32, &str> = Err("no such table: lockdowns");
        let mapped = error_result.map_db_err_with_context("Failed to impose lockout");

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Failed to impose lockout");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_ok_passes_through() {
        let ok: Result<i32, &str> = Ok(7);
        assert_eq!(ok.map_db_err().unwrap(), 7);
    }
}
