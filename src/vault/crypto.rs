//! Envelope encryption: Argon2id key derivation + AES-256-GCM authenticated
//! encryption of a raw Solana private key.
//!
//! The serialized envelope is a `{salt, iv, auth_tag, ciphertext}` tuple with
//! a 16-byte IV, but `aes-gcm`'s nonce is 12 bytes (the standard GCM size).
//! This crate generates a full 16-byte IV and uses its first 12 bytes as the
//! GCM nonce; the trailing 4 bytes add no cryptographic value but keep the
//! envelope's wire shape a fixed 16-byte IV field.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::constants::{
    AES_KEY_SIZE, AES_NONCE_SIZE, AES_TAG_SIZE, ARGON2_ITERATIONS, ARGON2_LANES,
    ARGON2_MEMORY_KIB, VAULT_SALT_SIZE,
};
use crate::errors::VaultError;

use super::policy::check_password_policy;

pub struct EncryptedKeyBlob {
    pub salt: [u8; VAULT_SALT_SIZE],
    pub iv: [u8; AES_NONCE_SIZE],
    pub tag: [u8; AES_TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedKeyBlob {
    pub fn serialize(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            B64.encode(self.salt),
            B64.encode(self.iv),
            B64.encode(self.tag),
            B64.encode(&self.ciphertext),
        )
    }

    pub fn deserialize(blob: &str) -> Result<Self, VaultError> {
        let parts: Vec<&str> = blob.split(':').collect();
        let [salt_b64, iv_b64, tag_b64, ct_b64] = parts.as_slice() else {
            return Err(VaultError::DecryptionError("malformed blob".into()));
        };
        let decode = |s: &str| {
            B64.decode(s).map_err(|e| VaultError::DecryptionError(format!("bad base64: {e}")))
        };
        let salt = decode(salt_b64)?;
        let iv = decode(iv_b64)?;
        let tag = decode(tag_b64)?;
        let ciphertext = decode(ct_b64)?;

        let salt: [u8; VAULT_SALT_SIZE] = salt
            .try_into()
            .map_err(|_| VaultError::DecryptionError("bad salt length".into()))?;
        let iv: [u8; AES_NONCE_SIZE] = iv
            .try_into()
            .map_err(|_| VaultError::DecryptionError("bad iv length".into()))?;
        let tag: [u8; AES_TAG_SIZE] = tag
            .try_into()
            .map_err(|_| VaultError::DecryptionError("bad tag length".into()))?;

        Ok(Self { salt, iv, tag, ciphertext })
    }
}

fn argon2() -> Argon2<'static> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_LANES, Some(AES_KEY_SIZE))
        .expect("static argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; AES_KEY_SIZE]>, VaultError> {
    let mut key = Zeroizing::new([0u8; AES_KEY_SIZE]);
    argon2()
        .hash_password_into(password.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| VaultError::EncryptionError(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// `Encrypt(private_key_bytes, password) -> blob`. Keys must be 32 bytes
/// (a seed) or 64 bytes (a full Solana keypair).
pub fn encrypt_private_key(private_key_bytes: &[u8], password: &str) -> Result<String, VaultError> {
    if private_key_bytes.len() != 32 && private_key_bytes.len() != 64 {
        return Err(VaultError::EncryptionError(format!(
            "private key must be 32 or 64 bytes, got {}",
            private_key_bytes.len()
        )));
    }
    check_password_policy(password).map_err(VaultError::WeakPassword)?;

    let mut salt = [0u8; VAULT_SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; AES_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let key_bytes = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes.as_slice()));
    let nonce = Nonce::from_slice(&iv[..12]);

    let mut sealed = cipher
        .encrypt(nonce, private_key_bytes)
        .map_err(|e| VaultError::EncryptionError(format!("aead seal failed: {e}")))?;
    let tag_bytes = sealed.split_off(sealed.len() - AES_TAG_SIZE);
    let tag: [u8; AES_TAG_SIZE] = tag_bytes.try_into().expect("aes-gcm tag is 16 bytes");

    let blob = EncryptedKeyBlob {
        salt,
        iv,
        tag,
        ciphertext: sealed,
    };
    Ok(blob.serialize())
}

/// `Decrypt(blob, password) -> private_key_bytes`. A tag mismatch and a
/// malformed blob are both reported as `INVALID_PASSWORD`, indistinguishably.
pub fn decrypt_private_key(blob: &str, password: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let blob = EncryptedKeyBlob::deserialize(blob).map_err(|_| VaultError::InvalidPassword)?;
    let key_bytes = derive_key(password, &blob.salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes.as_slice()));
    let nonce = Nonce::from_slice(&blob.iv[..12]);

    let mut sealed = blob.ciphertext;
    sealed.extend_from_slice(&blob.tag);

    let plaintext = cipher
        .decrypt(nonce, sealed.as_slice())
        .map_err(|_| VaultError::InvalidPassword)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "Correct-Horse-Battery-9!";

    #[test]
    fn round_trips_exactly() {
        let key: [u8; 32] = std::array::from_fn(|i| (i + 1) as u8);
        let blob = encrypt_private_key(&key, PASSWORD).unwrap();
        let decrypted = decrypt_private_key(&blob, PASSWORD).unwrap();
        assert_eq!(&*decrypted, &key);
    }

    #[test]
    fn wrong_password_case_is_invalid() {
        let key = [3u8; 32];
        let blob = encrypt_private_key(&key, PASSWORD).unwrap();
        let err = decrypt_private_key(&blob, "correct-horse-battery-9!").unwrap_err();
        assert_eq!(err, VaultError::InvalidPassword);
    }

    #[test]
    fn flipping_any_byte_invalidates() {
        let key = [4u8; 32];
        let blob = encrypt_private_key(&key, PASSWORD).unwrap();
        let parts: Vec<String> = blob.split(':').map(|s| s.to_string()).collect();
        for idx in 0..4 {
            let mut decoded = B64.decode(&parts[idx]).unwrap();
            decoded[0] ^= 0xFF;
            let mut tampered = parts.clone();
            tampered[idx] = B64.encode(&decoded);
            let tampered_blob = tampered.join(":");
            assert!(decrypt_private_key(&tampered_blob, PASSWORD).is_err());
        }
    }

    #[test]
    fn rejects_wrong_length_key() {
        let err = encrypt_private_key(&[0u8; 10], PASSWORD).unwrap_err();
        assert!(matches!(err, VaultError::EncryptionError(_)));
    }

    #[test]
    fn rejects_weak_password() {
        let err = encrypt_private_key(&[0u8; 32], "short").unwrap_err();
        assert!(matches!(err, VaultError::WeakPassword(_)));
    }
}
