use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Duplicate key {key} in incoming '{entity}' collection")]
    DuplicateKey { entity: String, key: String },

    #[error("Incoming '{entity}' with key {key} matches no existing element")]
    DanglingReference { entity: String, key: String },

    #[error("Cannot map '{entity}' {source_key} onto {destination_key}")]
    KeyMismatch {
        entity: String,
        source_key: String,
        destination_key: String,
    },

    #[error("No mapping configured for '{0}'")]
    MappingNotConfigured(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Row {key} not found in table '{table}'")]
    RowNotFound { table: String, key: i64 },

    #[error("Entity {key} of table '{table}' is not tracked by this context")]
    UntrackedEntity { table: String, key: i64 },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
