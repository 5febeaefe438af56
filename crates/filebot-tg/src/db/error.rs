/// Most likely unrecoverable errors from database communication layer
#[derive(Debug, thiserror::Error)]
pub(crate) enum DbError {
    #[error("Failed to connect to the database ({target})")]
    Connect {
        target: &'static str,
        source: sqlx::Error,
    },

    #[error("Failed to create the database schema ({target})")]
    EnsureSchema {
        target: &'static str,
        source: sqlx::Error,
    },

    #[error("Database query failed")]
    Query {
        #[from]
        source: sqlx::Error,
    },

    #[error("Database value is out of range for `{app_ty}`: {db_val}")]
    OutOfRange { app_ty: &'static str, db_val: i64 },
}
