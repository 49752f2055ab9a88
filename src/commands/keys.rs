use std::fs;
use std::path::Path;

use log::debug;

use crate::cryptography::Sha256Hasher;
use crate::keys::{public_key_path, Keypair, PublicKeyFile};
use crate::{RelayboxError, Result};

/// Generate and save a new keypair, returning its topic.
pub fn generate(keys_dir: &Path, name: &str) -> Result<String> {
    if !keys_dir.is_dir() {
        debug!("Creating keys directory {}", keys_dir.display());
        fs::create_dir_all(keys_dir)?;
    }
    let keypair = Keypair::generate(name);
    keypair.save(keys_dir)?;
    Ok(keypair.public_file(keys_dir).topic(&Sha256Hasher))
}

/// Public key file contents derived from the private key alone.
pub fn derive_public(keys_dir: &Path, name: &str) -> Result<String> {
    let keypair = Keypair::load(keys_dir, name)?;
    String::from_utf8(keypair.public_file_bytes()).map_err(|e| RelayboxError::KeyFile {
        path: public_key_path(keys_dir, name),
        reason: e.to_string(),
    })
}

/// Topic for a public key file, given as a path or a keypair name.
pub fn topic(keys_dir: &Path, recipient: &str) -> Result<String> {
    Ok(PublicKeyFile::resolve(keys_dir, recipient)?.topic(&Sha256Hasher))
}
