use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy::primitives::Bytes;
use p256::ecdh::diffie_hellman;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use rusty_wallet_sdk_core::{EncryptedData, ProviderError};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &export_public_key_hex(&self.public).ok())
            .finish_non_exhaustive()
    }
}

/// AES-256-GCM key agreed through ECDH. The key bytes never leave this module.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    key: [u8; 32],
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

impl SharedSecret {
    fn cipher(&self) -> Result<Aes256Gcm, ProviderError> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ProviderError::Internal(format!("aes-gcm init failed: {e}")))
    }
}

pub fn random_bytes<const N: usize>() -> Result<[u8; N], ProviderError> {
    let mut out = [0u8; N];
    getrandom::getrandom(&mut out)
        .map_err(|e| ProviderError::Internal(format!("random generation failed: {e}")))?;
    Ok(out)
}

pub fn random_bytes_hex<const N: usize>() -> Result<String, ProviderError> {
    Ok(alloy::hex::encode(random_bytes::<N>()?))
}

pub fn generate_key_pair() -> Result<KeyPair, ProviderError> {
    // A uniformly random 32-byte string is a valid scalar with overwhelming
    // probability; retry the rare zero / out-of-range draw.
    for _ in 0..8 {
        let seed = random_bytes::<32>()?;
        if let Ok(secret) = SecretKey::from_slice(&seed) {
            let public = secret.public_key();
            return Ok(KeyPair { secret, public });
        }
    }
    Err(ProviderError::Internal(
        "failed to generate p-256 key pair".to_owned(),
    ))
}

pub fn derive_shared_secret(own: &SecretKey, peer: &PublicKey) -> SharedSecret {
    let shared = diffie_hellman(own.to_nonzero_scalar(), peer.as_affine());
    let mut key = [0u8; 32];
    key.copy_from_slice(shared.raw_secret_bytes().as_slice());
    SharedSecret { key }
}

pub fn export_public_key_hex(public: &PublicKey) -> Result<String, ProviderError> {
    let der = public
        .to_public_key_der()
        .map_err(|e| ProviderError::Internal(format!("public key export failed: {e}")))?;
    Ok(alloy::hex::encode(der.as_bytes()))
}

pub fn import_public_key_hex(raw: &str) -> Result<PublicKey, ProviderError> {
    let der = alloy::hex::decode(raw)
        .map_err(|e| ProviderError::Internal(format!("public key hex decode failed: {e}")))?;
    PublicKey::from_public_key_der(&der)
        .map_err(|e| ProviderError::Internal(format!("public key import failed: {e}")))
}

pub fn encrypt(secret: &SharedSecret, plaintext: &[u8]) -> Result<EncryptedData, ProviderError> {
    let iv = random_bytes::<IV_LEN>()?;
    let cipher_text = secret
        .cipher()?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| ProviderError::Internal(format!("aes-gcm encrypt failed: {e}")))?;
    Ok(EncryptedData {
        iv: Bytes::copy_from_slice(&iv),
        cipher_text: Bytes::from(cipher_text),
    })
}

pub fn decrypt(secret: &SharedSecret, data: &EncryptedData) -> Result<Vec<u8>, ProviderError> {
    if data.iv.len() != IV_LEN {
        return Err(ProviderError::Internal(format!(
            "invalid iv length {}",
            data.iv.len()
        )));
    }
    secret
        .cipher()?
        .decrypt(Nonce::from_slice(&data.iv), data.cipher_text.as_ref())
        .map_err(|e| ProviderError::Internal(format!("aes-gcm decrypt failed: {e}")))
}

pub fn encrypt_content<T: Serialize>(
    secret: &SharedSecret,
    content: &T,
) -> Result<EncryptedData, ProviderError> {
    let plaintext = serde_json::to_vec(content)
        .map_err(|e| ProviderError::Internal(format!("content serialization failed: {e}")))?;
    encrypt(secret, &plaintext)
}

pub fn decrypt_content<T: DeserializeOwned>(
    secret: &SharedSecret,
    data: &EncryptedData,
) -> Result<T, ProviderError> {
    let plaintext = decrypt(secret, data)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| ProviderError::Internal(format!("content deserialization failed: {e}")))
}

/// Symmetric key of a legacy relay session, as lowercase hex.
pub fn derive_session_key(id: &str, secret: &str) -> String {
    let digest = Sha256::digest(format!("{id}, {secret} WalletLink").as_bytes());
    alloy::hex::encode(digest)
}

fn session_cipher(key_hex: &str) -> Result<Aes256Gcm, ProviderError> {
    let key = alloy::hex::decode(key_hex)
        .map_err(|e| ProviderError::Internal(format!("session key decode failed: {e}")))?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| ProviderError::Internal(format!("aes-gcm init failed: {e}")))
}

/// Encrypts for the legacy relay: hex of `iv ‖ tag ‖ ciphertext`.
pub fn encrypt_with_session_key(plaintext: &str, key_hex: &str) -> Result<String, ProviderError> {
    let iv = random_bytes::<IV_LEN>()?;
    let sealed = session_cipher(key_hex)?
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|e| ProviderError::Internal(format!("aes-gcm encrypt failed: {e}")))?;
    let (cipher_text, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let mut out = Vec::with_capacity(IV_LEN + sealed.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(cipher_text);
    Ok(alloy::hex::encode(out))
}

pub fn decrypt_with_session_key(cipher_hex: &str, key_hex: &str) -> Result<String, ProviderError> {
    let raw = alloy::hex::decode(cipher_hex)
        .map_err(|e| ProviderError::Internal(format!("cipher text decode failed: {e}")))?;
    if raw.len() < IV_LEN + TAG_LEN {
        return Err(ProviderError::Internal("cipher text too short".to_owned()));
    }
    let (iv, rest) = raw.split_at(IV_LEN);
    let (tag, cipher_text) = rest.split_at(TAG_LEN);
    let mut sealed = Vec::with_capacity(rest.len());
    sealed.extend_from_slice(cipher_text);
    sealed.extend_from_slice(tag);
    let plaintext = session_cipher(key_hex)?
        .decrypt(Nonce::from_slice(iv), sealed.as_slice())
        .map_err(|e| ProviderError::Internal(format!("aes-gcm decrypt failed: {e}")))?;
    String::from_utf8(plaintext)
        .map_err(|e| ProviderError::Internal(format!("plaintext is not utf-8: {e}")))
}
