use thiserror::Error;

/// Failure reported by a `RecordStore` backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// A stored item that does not have the shape of a provider record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("unexpected item without a '{attribute}' attribute")]
    MissingAttribute { attribute: &'static str },

    #[error("unexpected value type of '{found}' for '{attribute}' attribute (expected {expected})")]
    TypeMismatch {
        attribute: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("record_ttl must be at least one second")]
    ZeroRecordTtl,

    #[error("query_page_limit must be greater than zero")]
    ZeroPageLimit,

    #[error("invalid self_id: {0}")]
    InvalidSelfId(String),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("failed to store provider record")]
    StoreWrite(#[source] StorageError),

    #[error("failed to read provider records")]
    StoreRead(#[source] StorageError),

    #[error("malformed provider record")]
    MalformedRecord(#[from] MalformedRecord),

    #[error("content key must not be empty")]
    InvalidKey,

    #[error("invalid directory configuration")]
    Config(#[from] ConfigError),
}
