//! In-process key service for offline runs and tests.
//!
//! Keys are 256-bit ChaCha20-Poly1305 keys held in memory and zeroized on
//! drop. The encryption context is bound as associated data, so a
//! ciphertext only opens under the exact context it was sealed with.
//!
//! Ciphertext blob layout:
//!
//! ```text
//! [key id length: u8][key id: UTF-8][nonce: 12 bytes][ciphertext + tag]
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, OsRng, Payload},
    ChaCha20Poly1305, KeyInit, Nonce,
};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use guardrail_contracts::remote::{
    DecryptOutput, EncryptOutput, EncryptionContext, KeyMetadata, KeyState, RemoteError,
    RemoteErrorKind,
};
use guardrail_core::traits::KeyService;

/// Algorithm name reported for every local encryption.
pub const ALGORITHM: &str = "SYMMETRIC_DEFAULT";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const ACCOUNT: &str = "000000000000";

struct LocalKey {
    material: Zeroizing<[u8; KEY_LEN]>,
    state: KeyState,
}

#[derive(Default)]
struct KeyRing {
    keys: BTreeMap<String, LocalKey>,
    /// `alias/...` name to key id.
    aliases: BTreeMap<String, String>,
}

/// Key service backed by in-memory keys. Clones share the same key ring.
#[derive(Clone)]
pub struct LocalKeyService {
    region: String,
    ring: Arc<Mutex<KeyRing>>,
}

impl LocalKeyService {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ring: Arc::default(),
        }
    }

    /// A service with one enabled key reachable through `alias`.
    pub fn with_alias(region: impl Into<String>, alias: &str) -> Result<Self, RemoteError> {
        let service = Self::new(region);
        let key_id = service.create_key();
        service.create_alias(alias, &key_id)?;
        Ok(service)
    }

    /// Generate a fresh enabled key and return its id.
    pub fn create_key(&self) -> String {
        let mut material = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *material);
        let key_id = Uuid::new_v4().to_string();

        self.lock().keys.insert(
            key_id.clone(),
            LocalKey { material, state: KeyState::Enabled },
        );
        debug!(key_id = %key_id, "local key created");
        key_id
    }

    pub fn create_alias(&self, alias: &str, key_id: &str) -> Result<(), RemoteError> {
        if !alias.starts_with("alias/") || alias.len() <= "alias/".len() {
            return Err(RemoteError::new(
                RemoteErrorKind::Validation,
                "ValidationException",
                format!("Alias must start with 'alias/': {alias}"),
            ));
        }
        let mut ring = self.lock();
        if !ring.keys.contains_key(key_id) {
            return Err(not_found(key_id));
        }
        ring.aliases.insert(alias.to_string(), key_id.to_string());
        Ok(())
    }

    pub fn set_key_state(&self, key_ref: &str, state: KeyState) -> Result<(), RemoteError> {
        let mut ring = self.lock();
        let key_id = resolve(&ring, key_ref)?;
        if let Some(key) = ring.keys.get_mut(&key_id) {
            key.state = state;
        }
        debug!(key_id = %key_id, state = %state, "local key state changed");
        Ok(())
    }

    fn key_arn(&self, key_id: &str) -> String {
        format!("arn:aws:kms:{}:{ACCOUNT}:key/{key_id}", self.region)
    }

    fn lock(&self) -> MutexGuard<'_, KeyRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyService for LocalKeyService {
    fn describe_key(&self, key_ref: &str) -> Result<KeyMetadata, RemoteError> {
        let ring = self.lock();
        let key_id = resolve(&ring, key_ref)?;
        let state = ring.keys.get(&key_id).map(|k| k.state).ok_or_else(|| not_found(key_ref))?;
        Ok(KeyMetadata {
            arn: self.key_arn(&key_id),
            key_id,
            state,
        })
    }

    fn encrypt(
        &self,
        key_ref: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<EncryptOutput, RemoteError> {
        let ring = self.lock();
        let key_id = resolve(&ring, key_ref)?;
        let cipher = usable_cipher(&ring, &key_id)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let aad = context_aad(context)?;

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad: &aad })
            .map_err(|e| {
                RemoteError::new(RemoteErrorKind::Internal, "KMSInternalException", e.to_string())
            })?;

        let mut blob = Vec::with_capacity(1 + key_id.len() + NONCE_LEN + sealed.len());
        blob.push(key_id.len() as u8);
        blob.extend_from_slice(key_id.as_bytes());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);

        Ok(EncryptOutput {
            ciphertext: blob,
            key_id: self.key_arn(&key_id),
            algorithm: ALGORITHM.to_string(),
        })
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<DecryptOutput, RemoteError> {
        let (key_id, nonce, sealed) = split_blob(ciphertext)?;
        let ring = self.lock();
        let cipher = usable_cipher(&ring, key_id)?;
        let aad = context_aad(context)?;

        // A wrong context and a corrupted blob fail the same way.
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad: &aad })
            .map_err(|_| invalid_ciphertext())?;

        Ok(DecryptOutput {
            plaintext,
            key_id: self.key_arn(key_id),
            algorithm: ALGORITHM.to_string(),
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Accepts a key id, `alias/name`, a key ARN, or an alias ARN.
fn resolve(ring: &KeyRing, key_ref: &str) -> Result<String, RemoteError> {
    let local = if key_ref.starts_with("arn:") {
        key_ref.rsplit(':').next().unwrap_or(key_ref)
    } else {
        key_ref
    };

    let key_id = if local.starts_with("alias/") {
        ring.aliases.get(local).cloned()
    } else {
        let id = local.strip_prefix("key/").unwrap_or(local);
        ring.keys.contains_key(id).then(|| id.to_string())
    };
    key_id.ok_or_else(|| not_found(key_ref))
}

fn usable_cipher(ring: &KeyRing, key_id: &str) -> Result<ChaCha20Poly1305, RemoteError> {
    let key = ring.keys.get(key_id).ok_or_else(|| not_found(key_id))?;
    match key.state {
        KeyState::Enabled => {}
        KeyState::Disabled => {
            return Err(RemoteError::new(
                RemoteErrorKind::Validation,
                "DisabledException",
                format!("{key_id} is disabled."),
            ))
        }
        other => {
            return Err(RemoteError::new(
                RemoteErrorKind::Validation,
                "KMSInvalidStateException",
                format!("{key_id} is {other}."),
            ))
        }
    }
    ChaCha20Poly1305::new_from_slice(key.material.as_slice()).map_err(|e| {
        RemoteError::new(RemoteErrorKind::Internal, "KMSInternalException", e.to_string())
    })
}

fn context_aad(context: &EncryptionContext) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(context).map_err(|e| {
        RemoteError::new(RemoteErrorKind::Validation, "ValidationException", e.to_string())
    })
}

fn split_blob(blob: &[u8]) -> Result<(&str, &[u8], &[u8]), RemoteError> {
    let (&id_len, rest) = blob.split_first().ok_or_else(invalid_ciphertext)?;
    let id_len = id_len as usize;
    if rest.len() < id_len + NONCE_LEN {
        return Err(invalid_ciphertext());
    }
    let (id, rest) = rest.split_at(id_len);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);
    let key_id = std::str::from_utf8(id).map_err(|_| invalid_ciphertext())?;
    Ok((key_id, nonce, sealed))
}

fn not_found(key_ref: &str) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::NotFound,
        "NotFoundException",
        format!("Key '{key_ref}' does not exist"),
    )
}

fn invalid_ciphertext() -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::InvalidCiphertext,
        "InvalidCiphertextException",
        "The ciphertext or encryption context is invalid",
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
