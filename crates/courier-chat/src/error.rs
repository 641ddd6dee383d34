use thiserror::Error;
use uuid::Uuid;

use courier_store::StoreError;

/// Failures surfaced by the chat services. Transport layers map these to
/// status codes (Validation -> 400, NotFound -> 404, Storage -> 500) or
/// to a `message-error` event on the real-time channel.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("user not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
