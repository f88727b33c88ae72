//! Key-exchange and encryption collaborator.
//!
//! The default provider derives a per-connection shared secret via X25519
//! and encrypts with ChaCha20-Poly1305.  Ciphertext travels as
//! base64(nonce ‖ ciphertext).

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

const NONCE_LEN: usize = 12;

pub trait CryptoProvider: Send + Sync {
    /// Perform the server side of a key exchange against a client public
    /// key.  Returns `(server_public, shared_secret)`.
    fn exchange_keys(&self, client_public: &[u8; 32]) -> ([u8; 32], [u8; 32]);

    fn encrypt(&self, plaintext: &str, secret: &[u8; 32]) -> Result<String>;

    fn decrypt(&self, encoded: &str, secret: &[u8; 32]) -> Result<String>;
}

pub struct X25519ChaCha;

impl CryptoProvider for X25519ChaCha {
    fn exchange_keys(&self, client_public: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
        let server_secret = EphemeralSecret::random_from_rng(OsRng);
        let server_public = PublicKey::from(&server_secret);
        let shared = server_secret.diffie_hellman(&PublicKey::from(*client_public));
        // Hash the raw DH output into the symmetric key.
        let key: [u8; 32] = Sha256::digest(shared.as_bytes()).into();
        (server_public.to_bytes(), key)
    }

    fn encrypt(&self, plaintext: &str, secret: &[u8; 32]) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(secret.into());
        let mut nonce_bytes = [0u8; NONCE_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("encryption failed"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&combined))
    }

    fn decrypt(&self, encoded: &str, secret: &[u8; 32]) -> Result<String> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|_| anyhow!("invalid encoding"))?;
        if combined.len() < NONCE_LEN {
            return Err(anyhow!("invalid encoding"));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(secret.into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("decryption failed"))?;
        String::from_utf8(plaintext).map_err(|_| anyhow!("invalid UTF-8"))
    }
}

/// The reconnect credential: lowercase hex of
/// `sha256(previous_session_id + username)`.
pub fn reconnect_digest(session_id: &str, username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(username.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}
