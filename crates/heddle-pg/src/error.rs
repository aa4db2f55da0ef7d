//! sqlx エラー → `CoordinationError` の対応付け

use heddle_core::CoordinationError;

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

pub(crate) fn db_err(err: sqlx::Error) -> CoordinationError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => CoordinationError::Connectivity(err.to_string()),
        sqlx::Error::Database(ref db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                CoordinationError::validation(format!("duplicate key: {}", db.message()))
            }
            Some(CHECK_VIOLATION) => {
                CoordinationError::validation(format!("rejected by store: {}", db.message()))
            }
            _ => CoordinationError::Storage(err.to_string()),
        },
        _ => CoordinationError::Storage(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heddle_core::ErrorKind;

    #[test]
    fn pool_exhaustion_is_infrastructure() {
        let err = db_err(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, CoordinationError::Connectivity(_)));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn decode_failure_is_storage() {
        let err = db_err(sqlx::Error::ColumnNotFound("status".into()));
        assert!(matches!(err, CoordinationError::Storage(_)));
    }
}
