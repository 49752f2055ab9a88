//! Keypair artifacts on disk.
//!
//! A keypair named `alice` lives in two files in the keys directory:
//! `alice.key` (private, owner read/write only) and `alice.pub`. Each holds
//! a single base64 line with the raw 32-byte X25519 key.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::OsRng;
use log::{debug, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::bytes::{Base64Codec, Codec};
use crate::cryptography::{topic_id, Hasher, SealedBox, KEY_SIZE};
use crate::{CryptoError, RelayboxError, Result};

pub const PUBLIC_KEY_EXTENSION: &str = "pub";
pub const PRIVATE_KEY_EXTENSION: &str = "key";

pub fn public_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, PUBLIC_KEY_EXTENSION))
}

pub fn private_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, PRIVATE_KEY_EXTENSION))
}

fn key_file_error(path: &Path, reason: impl ToString) -> RelayboxError {
    RelayboxError::KeyFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn render_key(bytes: &[u8; KEY_SIZE]) -> Vec<u8> {
    let mut line = Base64Codec.encode(bytes).into_bytes();
    line.push(b'\n');
    line
}

fn parse_key(path: &Path, contents: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let text = std::str::from_utf8(contents).map_err(|e| key_file_error(path, e))?;
    let raw = Base64Codec
        .decode(text)
        .map_err(|e| key_file_error(path, e))?;
    raw.as_slice().try_into().map_err(|_| {
        key_file_error(
            path,
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: raw.len(),
            },
        )
    })
}

/// A recipient's public key together with the exact file bytes it was read
/// from. The topic is a hash of those bytes, not of the decoded key.
#[derive(Clone)]
pub struct PublicKeyFile {
    pub key: PublicKey,
    pub bytes: Vec<u8>,
}

impl PublicKeyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| key_file_error(path, e))?;
        let key = PublicKey::from(parse_key(path, &bytes)?);
        Ok(PublicKeyFile { key, bytes })
    }

    /// A keypair named `recipient` in `dir` wins; otherwise `recipient` is
    /// taken as a path to a public key file.
    pub fn resolve(dir: &Path, recipient: &str) -> Result<Self> {
        let by_name = public_key_path(dir, recipient);
        if by_name.is_file() {
            return Self::load(&by_name);
        }
        let as_path = Path::new(recipient);
        if as_path.is_file() {
            return Self::load(as_path);
        }
        Self::load(&by_name)
    }

    pub fn topic<H: Hasher>(&self, hasher: &H) -> String {
        topic_id(hasher, &self.bytes)
    }

    pub fn sealer(&self) -> SealedBox {
        SealedBox::for_recipient(self.key)
    }
}

pub struct Keypair {
    name: String,
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Keypair {
    pub fn generate(name: &str) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Keypair {
            name: name.to_string(),
            secret,
            public,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Contents of the `.pub` file for this keypair.
    pub fn public_file_bytes(&self) -> Vec<u8> {
        render_key(self.public.as_bytes())
    }

    /// Load a keypair from its private file, deriving the public key.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = private_key_path(dir, name);
        let contents = fs::read(&path).map_err(|e| key_file_error(&path, e))?;
        let secret = StaticSecret::from(parse_key(&path, &contents)?);
        let public = PublicKey::from(&secret);
        debug!("Loaded keypair {} from {}", name, path.display());
        Ok(Keypair {
            name: name.to_string(),
            secret,
            public,
        })
    }

    /// Write both key files. The private file is created owner-only and
    /// empty before any key material goes into it; existing files are
    /// never overwritten. A failed `.pub` write removes the new private
    /// file so the name can be reused.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let private_path = private_key_path(dir, &self.name);
        let public_path = public_key_path(dir, &self.name);
        if public_path.exists() {
            return Err(key_file_error(&public_path, "already exists"));
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut private_file = options
            .open(&private_path)
            .map_err(|e| key_file_error(&private_path, e))?;
        private_file.write_all(&render_key(&self.secret.to_bytes()))?;
        private_file.sync_all()?;

        if let Err(e) = fs::write(&public_path, self.public_file_bytes()) {
            let _ = fs::remove_file(&private_path);
            return Err(key_file_error(&public_path, e));
        }
        debug!(
            "Wrote {} and {}",
            private_path.display(),
            public_path.display()
        );
        Ok(())
    }

    /// Bytes of the public key file as the topic source. Falls back to the
    /// derived rendering when the `.pub` file is absent.
    pub fn public_file(&self, dir: &Path) -> PublicKeyFile {
        let path = public_key_path(dir, &self.name);
        match PublicKeyFile::load(&path) {
            Ok(file) if file.key == self.public => file,
            Ok(_) => {
                warn!(
                    "{} does not match the private key, using derived public key",
                    path.display()
                );
                self.derived_public_file()
            }
            Err(_) => self.derived_public_file(),
        }
    }

    fn derived_public_file(&self) -> PublicKeyFile {
        PublicKeyFile {
            key: self.public,
            bytes: self.public_file_bytes(),
        }
    }

    pub fn opener(&self) -> SealedBox {
        SealedBox::for_secret(self.secret.clone())
    }
}
