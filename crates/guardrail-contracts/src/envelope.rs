//! Encrypted envelope produced by the secure data envelope.

use serde::{Deserialize, Serialize};

use crate::remote::EncryptionContext;

/// Ciphertext plus everything needed to decrypt it again under the same
/// encryption context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    pub key_id: String,
    pub algorithm: String,
    /// The context the payload was sealed under. Informational: `open`
    /// always decrypts with the context the caller supplies.
    pub context: EncryptionContext,
}

/// Serialize byte buffers as lowercase hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
