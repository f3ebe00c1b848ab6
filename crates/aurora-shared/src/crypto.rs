use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{
    FINGERPRINT_SIZE, KDF_CONTEXT_CONVERSATION_KEY, NONCE_SIZE, PAIR_SEPARATOR,
    SYMMETRIC_KEY_SIZE, TAG_SIZE,
};
use crate::error::CryptoError;
use crate::identity::Identity;

/// Symmetric secret shared by the two participants of a conversation.
///
/// Both sides compute it independently from the pair of identities, so no
/// key exchange takes place. Anyone who knows both names can compute it
/// too; it only hides content from the transport and storage layers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SharedKey([u8; SYMMETRIC_KEY_SIZE]);

impl SharedKey {
    /// Derive the conversation key for an unordered pair of identities.
    pub fn derive(a: &Identity, b: &Identity) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };

        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CONVERSATION_KEY);
        hasher.update(first.as_str().as_bytes());
        hasher.update(PAIR_SEPARATOR.as_bytes());
        hasher.update(second.as_str().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Short public digest of the key, for comparing out of band that both
    /// sides derived the same conversation key. Reveals nothing about the
    /// key bytes.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.0);
        hex::encode(&digest.as_bytes()[..FINGERPRINT_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns base64(nonce || ciphertext), the nonce travels with the message
pub fn encrypt(key: &SharedKey, plaintext: &str) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(output))
}

pub fn decrypt(key: &SharedKey, ciphertext: &str) -> Result<String, CryptoError> {
    let data = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext(format!(
            "{} bytes is shorter than nonce and tag",
            data.len()
        )));
    }

    let (nonce_bytes, sealed) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, sealed)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}
