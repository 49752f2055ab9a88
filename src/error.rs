//! Error types for relaybox operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sealed-box primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material had the wrong length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// The key agreement produced an all-zero secret (low-order point).
    #[error("Public key is not usable for key agreement")]
    InvalidPublicKey,

    /// Sealed frame is shorter than its fixed header.
    #[error("Sealed frame too short: {0} bytes")]
    MalformedFrame(usize),

    /// Encryption failed.
    #[error("Encryption failed")]
    Encryption,

    /// Decryption or authentication failed.
    #[error("Decryption failed")]
    Decryption,

    /// Decrypt was called on a box built from a public key only.
    #[error("No private key available for decryption")]
    MissingPrivateKey,
}

/// Errors surfaced by the send and receive pipelines.
#[derive(Error, Debug)]
pub enum RelayboxError {
    /// Filesystem or stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport text could not be decoded.
    #[error("Decoding error: {0}")]
    Codec(#[from] base64::DecodeError),

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The relay rejected a request or could not be reached.
    #[error("Relay error: {0}")]
    Relay(String),

    /// A key file was missing, unreadable or malformed.
    #[error("Key file {}: {reason}", .path.display())]
    KeyFile {
        /// Path of the offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The checkpoint store could not be read or written.
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    /// The inter-chunk delay is not a usable duration.
    #[error("Invalid delay: {0} seconds")]
    InvalidDelay(f64),

    /// A chunk failed while sending with continue-on-error disabled.
    #[error("Chunk {index} failed: {source}")]
    ChunkFailed {
        /// Zero-based chunk index.
        index: usize,
        /// Underlying failure.
        #[source]
        source: Box<RelayboxError>,
    },

    /// A frame failed while receiving with continue-on-error disabled.
    #[error("Frame {index} failed: {source}")]
    FrameFailed {
        /// Zero-based frame index in poll order.
        index: usize,
        /// Underlying failure.
        #[source]
        source: Box<RelayboxError>,
    },
}

impl From<serde_json::Error> for RelayboxError {
    fn from(e: serde_json::Error) -> Self {
        RelayboxError::Checkpoint(e.to_string())
    }
}

/// Result type for relaybox operations.
pub type Result<T> = std::result::Result<T, RelayboxError>;
