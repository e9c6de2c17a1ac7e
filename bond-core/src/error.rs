//! Error taxonomy shared by the bond crates

use thiserror::Error;

/// Result type for bond operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bond errors
///
/// Guard and identity errors are local and non-retryable: re-running the
/// same operation with the same inputs always fails the same way.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted by a party other than the one it requires
    #[error("identity mismatch: {0}")]
    IdentityMismatch(String),

    /// Transfer attempted while the matching allow flag is false
    #[error("transfer not allowed: {0}")]
    TransferNotAllowed(String),

    /// Cryptographic signature verification failed
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Annulment attempted on a fully annulled bond
    #[error("bond already annulled: {0}")]
    AlreadyAnnulled(String),

    /// Encryption fan-out violation (zero or more than one recipient)
    #[error("invalid recipients: {0}")]
    InvalidRecipients(String),

    /// Decrypted envelope is not addressed to the local identity
    #[error("not the recipient: {0}")]
    NotRecipient(String),

    /// Index lookup / update of an unknown bond or peer
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert-only add of an already present bond id
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Truncated or corrupt envelope bytes
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Cryptographic primitive failure (key material, AEAD)
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
