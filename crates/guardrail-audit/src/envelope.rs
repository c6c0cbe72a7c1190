//! Secure data envelope.
//!
//! Seals JSON payloads through a [`KeyService`] with an encryption context
//! bound as authenticated data, and opens them again under the same
//! context. Nothing here is retried: a failed `open` usually means the
//! context or ciphertext is wrong, and retrying cannot fix that.

use serde_json::Value;
use tracing::{debug, warn};

use guardrail_contracts::{
    envelope::EncryptedEnvelope,
    error::{GuardrailError, GuardrailResult},
    remote::{EncryptionContext, RemoteError},
};
use guardrail_core::traits::KeyService;

pub struct SecureEnvelope {
    keys: Box<dyn KeyService>,
}

impl SecureEnvelope {
    pub fn new(keys: Box<dyn KeyService>) -> Self {
        Self { keys }
    }

    /// Encrypt `payload` under `key_ref`, bound to `context`.
    ///
    /// Objects and arrays are sealed as compact JSON, strings as their raw
    /// text, and other scalars in their JSON form.
    pub fn seal(
        &self,
        payload: &Value,
        key_ref: &str,
        context: &EncryptionContext,
    ) -> GuardrailResult<EncryptedEnvelope> {
        let plaintext = to_plaintext(payload)?;
        let output = self
            .keys
            .encrypt(key_ref, plaintext.as_bytes(), context)
            .map_err(|e| envelope_failure("encryption failed", e))?;

        debug!(
            key_id = %output.key_id,
            bytes = output.ciphertext.len(),
            "payload sealed"
        );

        Ok(EncryptedEnvelope {
            ciphertext: output.ciphertext,
            key_id: output.key_id,
            algorithm: output.algorithm,
            context: context.clone(),
        })
    }

    /// Decrypt `envelope` under `context`, which must equal the sealing context.
    ///
    /// Text that parses as JSON comes back structured; anything else comes
    /// back as a JSON string.
    pub fn open(
        &self,
        envelope: &EncryptedEnvelope,
        context: &EncryptionContext,
    ) -> GuardrailResult<Value> {
        let output = self
            .keys
            .decrypt(&envelope.ciphertext, context)
            .map_err(|e| envelope_failure("decryption failed", e))?;

        let text = String::from_utf8(output.plaintext).map_err(|e| GuardrailError::Envelope {
            reason: format!("decrypted payload is not valid UTF-8: {}", e),
            diagnostics: None,
        })?;

        debug!(key_id = %output.key_id, "payload opened");
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn to_plaintext(payload: &Value) -> GuardrailResult<String> {
    match payload {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(payload).map_err(|e| GuardrailError::Envelope {
                reason: format!("failed to serialize payload: {}", e),
                diagnostics: None,
            })
        }
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn envelope_failure(what: &str, err: RemoteError) -> GuardrailError {
    warn!(kind = %err.kind, code = %err.diagnostics.code, "envelope {}", what);
    GuardrailError::Envelope {
        reason: format!("{}: {}", what, err.diagnostics.message),
        diagnostics: Some(err.diagnostics),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
