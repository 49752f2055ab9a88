use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::CryptoError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const ENCRYPTION_OVERHEAD: usize = 16;
/// Ephemeral public key plus nonce, prepended to every sealed frame.
pub const SEALED_HEADER_SIZE: usize = KEY_SIZE + NONCE_SIZE;

const SEALED_BOX_INFO: &[u8] = b"relaybox sealed frame v1";

/// Public-key encryption of a single chunk.
pub trait Encryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Content hash used to derive relay topics.
pub trait Hasher {
    fn hash(&self, bytes: &[u8]) -> String;
}

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::default();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Derive the relay topic for a public key file.
///
/// Topics are public: anyone holding the public key file computes the same one.
pub fn topic_id<H: Hasher>(hasher: &H, public_key_bytes: &[u8]) -> String {
    hasher.hash(public_key_bytes)
}

/// Anonymous sealed box over X25519 + HKDF-SHA256 + ChaCha20-Poly1305.
///
/// Each call to `encrypt` uses a fresh ephemeral key, so the sender needs
/// no key material of its own. Frame layout:
/// `ephemeral_pub(32) || nonce(12) || ciphertext || tag(16)`.
pub struct SealedBox {
    recipient: PublicKey,
    secret: Option<StaticSecret>,
}

impl SealedBox {
    /// Encrypt-only box for a recipient.
    pub fn for_recipient(recipient: PublicKey) -> Self {
        SealedBox {
            recipient,
            secret: None,
        }
    }

    /// Box able to open frames sealed to `secret`'s public key.
    pub fn for_secret(secret: StaticSecret) -> Self {
        SealedBox {
            recipient: PublicKey::from(&secret),
            secret: Some(secret),
        }
    }

    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }
}

fn derive_frame_key(
    shared_secret: &[u8; KEY_SIZE],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut info = Vec::with_capacity(SEALED_BOX_INFO.len() + 2 * KEY_SIZE);
    info.extend_from_slice(SEALED_BOX_INFO);
    info.extend_from_slice(ephemeral.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut key)
        .map_err(|_| CryptoError::Encryption)?;
    Ok(key)
}

impl Encryptor for SealedBox {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral = PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(&self.recipient);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }

        let key = derive_frame_key(shared.as_bytes(), &ephemeral, &self.recipient)?;
        let cipher = ChaCha20Poly1305::new(&key.into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut sealed = Vec::with_capacity(SEALED_HEADER_SIZE + ciphertext.len());
        sealed.extend_from_slice(ephemeral.as_bytes());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let secret = self.secret.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
        if sealed.len() < SEALED_HEADER_SIZE + ENCRYPTION_OVERHEAD {
            return Err(CryptoError::MalformedFrame(sealed.len()));
        }

        let (ephemeral_bytes, rest) = sealed.split_at(KEY_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
        let mut ephemeral = [0u8; KEY_SIZE];
        ephemeral.copy_from_slice(ephemeral_bytes);
        let ephemeral = PublicKey::from(ephemeral);

        let shared = secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            return Err(CryptoError::Decryption);
        }

        let key = derive_frame_key(shared.as_bytes(), &ephemeral, &self.recipient)?;
        let cipher = ChaCha20Poly1305::new(&key.into());
        // Authentication failure means wrong recipient or a damaged frame.
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}
