use thiserror::Error;

/// Durable-store failures. Every variant means the mutation did NOT take
/// effect: the prior durable state is intact on disk and in memory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Unique-phone constraint violated on user creation.
    #[error("phone number already registered")]
    PhoneTaken,

    #[error("store document encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}
