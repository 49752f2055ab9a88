//! # Commands Module
//!
//! Handlers behind each relaybox subcommand:
//!
//! ## `send`
//! Sends a stream to a recipient's public key:
//! - Resolves the recipient key and derives its relay topic
//! - Splits the input into bounded chunks
//! - Encodes, seals and encodes each chunk again
//! - Publishes one frame per chunk, pacing between chunks
//!
//! ## `receive`
//! Receives everything addressed to a local keypair:
//! - Loads the keypair and its mark
//! - Polls the topic once, filtered by the mark
//! - Opens each frame, skipping frames meant for other keys
//! - Commits the mark
//!
//! ## `keys`
//! Keypair management: generate, re-derive the public key file, print a topic.

pub mod keys;
pub mod receive;
pub mod send;
