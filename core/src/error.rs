use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Schema error in '{table}': {detail}")]
    Schema { table: String, detail: String },

    #[error("Referential integrity violation in '{table}': {count} orphaned key(s), e.g. {sample:?}")]
    Referential {
        table:  String,
        count:  usize,
        sample: Vec<String>,
    },

    #[error("Degenerate input: {context}")]
    DegenerateInput { context: String },

    #[error("Model output has {actual} rows, expected {expected}")]
    ModelContract { expected: usize, actual: usize },

    #[error("Model output at row {row} is not a probability: {value}")]
    ModelOutOfRange { row: usize, value: f64 },

    #[error("Invalid value in '{table}' row {row}: {detail}")]
    InvalidValue {
        table:  String,
        row:    usize,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn schema(table: &str, detail: impl Into<String>) -> Self {
        Self::Schema { table: table.to_string(), detail: detail.into() }
    }

    pub fn invalid(table: &str, row: usize, detail: impl Into<String>) -> Self {
        Self::InvalidValue { table: table.to_string(), row, detail: detail.into() }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
