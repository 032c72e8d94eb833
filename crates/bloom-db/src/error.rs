use thiserror::Error;

/// Typed store failures. Domain variants carry the state-machine conflicts
/// detected inside a transaction; the API layer maps them to status codes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Flower not found")]
    FlowerNotFound,
    #[error("Flower already sent")]
    FlowerAlreadySent,
    #[error("Flower already has a delivery")]
    DeliveryExists,
    #[error("Flower already watered today")]
    AlreadyWateredToday,
    #[error("Flower is not ready to send")]
    FlowerNotReady,
    #[error("Gift not found")]
    GiftNotFound,
    #[error("Gift is no longer available")]
    GiftRevoked,
    #[error("Gift has expired")]
    GiftExpired,
    #[error("Gift is not available yet")]
    GiftNotYetAvailable,
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
