use thiserror::Error;

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error(
        "Insufficient stock for category {category_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        category_id: i64,
        requested: u32,
        available: u32,
    },
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl FulfillmentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for FulfillmentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;
