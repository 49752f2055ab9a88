pub mod bytes;
pub mod commands;
pub mod config;
pub mod cryptography;
pub mod error;
pub mod keys;
pub mod mark;
pub mod networking;
pub mod testing;

pub use error::{CryptoError, RelayboxError, Result};

pub const MAX_CHUNK_LIMIT: usize = 900;
pub const MIN_CHUNK_LIMIT: usize = 50;
pub const DEFAULT_CHUNK_SIZE: usize = 140;
pub const DEFAULT_DELAY_SECS: f64 = 1.0;
pub const MIN_DELAY_SECS: f64 = 0.0;

pub const DEFAULT_RELAY: &str = "https://ntfy.sh";
