use thiserror::Error;

/// Error type for every client, builder and driver operation.
#[derive(Debug, Error)]
pub enum EntError {
    #[error("unsupported dialect: {0:?}")]
    UnsupportedDialect(String),
    #[error("cannot start a transaction within a transaction")]
    NestedTransaction,
    #[error("transaction has already been committed or rolled back")]
    TransactionClosed,
    #[error("validation error: field {field:?}: {reason}")]
    ValidationError { field: String, reason: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} not singular")]
    NotSingular(String),
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("driver error: {0}")]
    DriverError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("unknown edge {edge:?} on {entity}")]
    UnknownEdge { entity: String, edge: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl EntError {
    pub fn unsupported_dialect<T: Into<String>>(name: T) -> Self {
        EntError::UnsupportedDialect(name.into())
    }

    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        EntError::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found<T: Into<String>>(label: T) -> Self {
        EntError::NotFound(label.into())
    }

    pub fn not_singular<T: Into<String>>(label: T) -> Self {
        EntError::NotSingular(label.into())
    }

    pub fn driver<T: Into<String>>(msg: T) -> Self {
        EntError::DriverError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        EntError::SchemaError(msg.into())
    }

    pub fn unknown_edge<E: Into<String>, N: Into<String>>(entity: E, edge: N) -> Self {
        EntError::UnknownEdge {
            entity: entity.into(),
            edge: edge.into(),
        }
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        EntError::InvalidInput(msg.into())
    }

    pub fn decode<T: Into<String>>(msg: T) -> Self {
        EntError::DecodeError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EntError::NotFound(_))
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self, EntError::NotSingular(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EntError::ValidationError { .. })
    }

    /// True for `Cancelled` and `DeadlineExceeded`.
    pub fn is_context_error(&self) -> bool {
        matches!(self, EntError::Cancelled | EntError::DeadlineExceeded)
    }
}
