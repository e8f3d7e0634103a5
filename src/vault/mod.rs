//! Credential Vault: password-derived authenticated encryption of
//! signing keys, a bounded-lifetime session, and a zeroizing guard around
//! decrypted key material.
//!
//! Grounded on `secure_wallet_manager.rs`'s AES-GCM envelope shape and
//! `wallet_manager.rs`'s base58 keypair handling, with the PBKDF2-HMAC-SHA256
//! KDF replaced by Argon2id (a memory-hard hash) and the "password lives in
//! the session struct" shape replaced with password material that only
//! ever lives on the call stack or in the K/V vault.

mod crypto;
mod policy;

pub use crypto::{decrypt_private_key, encrypt_private_key, EncryptedKeyBlob};
pub use policy::check_password_policy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::errors::VaultError;
use crate::kv_store::{keys, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Password consumed on first use; TTL ~2 minutes.
    Strict,
    /// Password persists across trades within the session TTL (~15 min).
    Reuse,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Strict
    }
}

/// Capability the vault uses to look up a user's encrypted key blob. Kept
/// as an injected trait object, so the vault depends on one capability
/// rather than reaching into the persistence gateway directly.
#[async_trait]
pub trait WalletKeyLookup: Send + Sync {
    async fn encrypted_blob_for_user(&self, user_id: i64) -> Result<String, VaultError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    user_id: i64,
    mode: SessionMode,
    expires_at: DateTime<Utc>,
}

/// A decrypted signing key, zeroized on every exit path (success, error,
/// unwind) by virtue of `Zeroizing` wrapping the backing byte array. Holding
/// the raw bytes rather than a long-lived `Keypair` means `ClearKeypair` is
/// implicit: there is nothing left to clear once this value drops.
pub struct SigningKeypair {
    bytes: Zeroizing<[u8; 64]>,
    pubkey: Pubkey,
}

impl SigningKeypair {
    fn from_bytes(bytes: [u8; 64]) -> Result<Self, VaultError> {
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| VaultError::DecryptionError(e.to_string()))?;
        let pubkey = keypair.pubkey();
        Ok(Self {
            bytes: Zeroizing::new(bytes),
            pubkey,
        })
    }

    /// Materialize a `Keypair` for a single signing call. Re-derived each
    /// time rather than cached, so the only long-lived secret is the
    /// zeroizing byte array.
    pub fn keypair(&self) -> Keypair {
        Keypair::from_bytes(&*self.bytes).expect("validated at construction")
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }
}

pub struct CredentialVault {
    kv: Arc<dyn KvStore>,
    wallets: Arc<dyn WalletKeyLookup>,
    config: VaultConfig,
}

impl CredentialVault {
    pub fn new(kv: Arc<dyn KvStore>, wallets: Arc<dyn WalletKeyLookup>, config: VaultConfig) -> Self {
        Self { kv, wallets, config }
    }

    fn session_password_ttl(&self, mode: SessionMode) -> Duration {
        match mode {
            SessionMode::Strict => Duration::from_secs(self.config.strict_session_ttl_seconds),
            SessionMode::Reuse => Duration::from_secs(self.config.reuse_session_ttl_seconds),
        }
    }

    /// `CreateSession`: validate the password via a trial decrypt, mint an
    /// opaque token, and store both the session metadata and the password
    /// entry. Failure is reported uniformly as `INVALID_PASSWORD` regardless
    /// of whether the wallet lookup or the decrypt itself failed.
    pub async fn create_session(
        &self,
        user_id: i64,
        password: &str,
        mode: SessionMode,
    ) -> Result<(String, DateTime<Utc>), VaultError> {
        let blob = self
            .wallets
            .encrypted_blob_for_user(user_id)
            .await
            .map_err(|_| VaultError::InvalidPassword)?;
        let _trial = decrypt_private_key(&blob, password).map_err(|_| VaultError::InvalidPassword)?;

        let token = generate_session_token();
        let ttl = self.session_password_ttl(mode);
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap();

        let meta = SessionMeta { user_id, mode, expires_at };
        let meta_json = serde_json::to_string(&meta)
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;
        self.kv
            .set_with_ttl(keys::session(&token), meta_json, ttl)
            .await
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;
        self.store_session_password(&token, password, mode).await?;

        if mode == SessionMode::Reuse {
            // Automatic exits need a session to sign with outside of any
            // chat round-trip; only reuse-mode sessions outlive a single
            // trade, so only they are worth remembering here.
            self.kv
                .set_with_ttl(keys::active_session(user_id), token.clone(), ttl)
                .await
                .map_err(|e| VaultError::EncryptionError(e.to_string()))?;
        }

        info!(user_id, mode = ?mode, "session created");
        Ok((token, expires_at))
    }

    /// The most recently created reuse-mode session token for a user, if
    /// one is still live. Used by automatic exit flows that have no chat
    /// round-trip to ask the user for a fresh session.
    pub async fn active_session_token(&self, user_id: i64) -> Result<Option<String>, VaultError> {
        self.kv
            .get(&keys::active_session(user_id))
            .await
            .map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    pub async fn store_session_password(
        &self,
        session_token: &str,
        password: &str,
        mode: SessionMode,
    ) -> Result<(), VaultError> {
        let ttl = self.session_password_ttl(mode);
        self.kv
            .set_with_ttl(keys::wallet_password(session_token), password.to_string(), ttl)
            .await
            .map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    /// `consume = true` deletes the entry atomically on read (strict mode);
    /// `consume = false` leaves it in place for reuse-mode sessions.
    pub async fn fetch_session_password(
        &self,
        session_token: &str,
        consume: bool,
    ) -> Result<Option<String>, VaultError> {
        let result = if consume {
            self.kv.delete(&keys::wallet_password(session_token)).await
        } else {
            self.kv.get(&keys::wallet_password(session_token)).await
        };
        result.map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    pub async fn destroy_session_password(&self, session_token: &str) -> Result<(), VaultError> {
        self.kv
            .delete(&keys::wallet_password(session_token))
            .await
            .map(|_| ())
            .map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    /// Revokes a session: destroys both the session metadata and the
    /// associated cached password entry.
    pub async fn destroy_session(&self, session_token: &str) -> Result<(), VaultError> {
        self.kv
            .delete(&keys::session(session_token))
            .await
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?;
        self.destroy_session_password(session_token).await
    }

    async fn session_meta(&self, session_token: &str) -> Result<SessionMeta, VaultError> {
        let raw = self
            .kv
            .get(&keys::session(session_token))
            .await
            .map_err(|e| VaultError::EncryptionError(e.to_string()))?
            .ok_or(VaultError::SessionExpired)?;
        serde_json::from_str(&raw).map_err(|_| VaultError::SessionExpired)
    }

    /// `KeypairForSigning(session_token)`: fetch the vaulted password
    /// (consuming it in strict mode) and derive the keypair from it.
    pub async fn keypair_for_signing(&self, session_token: &str) -> Result<SigningKeypair, VaultError> {
        let meta = self.session_meta(session_token).await?;
        if meta.expires_at < Utc::now() {
            return Err(VaultError::SessionExpired);
        }
        let consume = matches!(meta.mode, SessionMode::Strict);
        // The session itself is still live (checked above); a missing
        // password entry means it was already consumed or never stored,
        // which is indistinguishable from "no password supplied" at the
        // caller's boundary, so both map to InvalidPassword.
        let password = self
            .fetch_session_password(session_token, consume)
            .await?
            .ok_or(VaultError::InvalidPassword)?;
        self.keypair_for_signing_with_password(meta.user_id, &password).await
    }

    /// `KeypairForSigning(session_token, password)` / `unlock_wallet`: used
    /// when the caller already possesses the plaintext password.
    pub async fn keypair_for_signing_with_password(
        &self,
        user_id: i64,
        password: &str,
    ) -> Result<SigningKeypair, VaultError> {
        let blob = self.wallets.encrypted_blob_for_user(user_id).await?;
        let key_bytes = decrypt_private_key(&blob, password)?;
        let bytes = match key_bytes.len() {
            64 => {
                let mut bytes = [0u8; 64];
                bytes.copy_from_slice(&key_bytes);
                bytes
            }
            32 => {
                // 32-byte seed: Keypair::from_bytes has no way to derive the
                // public half, so use from_seed, which runs the proper
                // ed25519 expansion instead of trusting a stored pubkey.
                let kp = Keypair::from_seed(&key_bytes)
                    .map_err(|e| VaultError::DecryptionError(e.to_string()))?;
                kp.to_bytes()
            }
            other => {
                warn!(len = other, "decrypted key has unexpected length");
                return Err(VaultError::DecryptionError("unexpected key length".into()));
            }
        };
        SigningKeypair::from_bytes(bytes)
    }
}

/// Bridges the persistence gateway's `WalletRepository` into this vault's
/// `WalletKeyLookup` capability, so the vault depends only on the single
/// method it actually needs rather than the full repository surface.
pub struct RepositoryWalletLookup<R> {
    wallets: Arc<R>,
}

impl<R> RepositoryWalletLookup<R> {
    pub fn new(wallets: Arc<R>) -> Self {
        Self { wallets }
    }
}

#[async_trait]
impl<R: crate::persistence::WalletRepository> WalletKeyLookup for RepositoryWalletLookup<R> {
    async fn encrypted_blob_for_user(&self, user_id: i64) -> Result<String, VaultError> {
        let wallet = self
            .wallets
            .active_for_user(user_id)
            .await
            .map_err(|_| VaultError::WalletNotFound)?
            .ok_or(VaultError::WalletNotFound)?;
        Ok(wallet.encrypted_key_blob)
    }
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32]; // >= 128 bits
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
