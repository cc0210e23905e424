//! Credential types and the persisted credential record.

use crate::error::{CredentialError, CredentialResult};
use lockbox_store::{optional_str, DocumentId, DocumentMap};
use serde_json::Value;
use std::fmt;

/// Collection holding the single credential record.
pub const CREDENTIAL_COLLECTION: &str = "CredentialMeta";

/// Fixed plaintext sealed under the user's credential. Decrypting the
/// stored challenge back to this constant is what verifies a candidate
/// credential without ever storing the credential itself.
pub const UNLOCK_CHALLENGE_PLAINTEXT: &[u8] = b"lockbox unlock challenge v1: decrypting this exact message proves the entered credential";

/// Kind of credential the user chose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialType {
    /// 6+ digit numeric code.
    Pin,
    /// Free-form string password.
    #[default]
    Passphrase,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pin => "PIN",
            Self::Passphrase => "password",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "PIN" => Some(Self::Pin),
            "password" => Some(Self::Passphrase),
            _ => None,
        }
    }

    /// Detects the type from an entered value: all digits means PIN.
    pub fn detect(credential: &str) -> Self {
        if !credential.is_empty() && credential.chars().all(|c| c.is_ascii_digit()) {
            Self::Pin
        } else {
            Self::Passphrase
        }
    }

    /// The one generic message for a wrong entry of this type.
    pub fn incorrect_entry_message(&self) -> &'static str {
        match self {
            Self::Pin => "Incorrect PIN",
            Self::Passphrase => "Incorrect password",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single persisted credential record. `id` is absent until first
/// persisted; a record with an id but no challenge is invalid and must not
/// be treated as "already set up".
#[derive(Clone, Debug, Default)]
pub struct CredentialRecord {
    pub id: Option<DocumentId>,
    pub credential_type: CredentialType,
    pub challenge_armored: Option<String>,
}

impl CredentialRecord {
    /// Parses the record from its stored document. An absent type defaults
    /// to passphrase (matching the synthesized pre-setup record); an
    /// unknown type value is an error.
    pub fn from_document(map: &DocumentMap) -> CredentialResult<Self> {
        let credential_type = match optional_str(map, "credential_type") {
            None => CredentialType::default(),
            Some(raw) => CredentialType::from_str(raw).ok_or_else(|| {
                CredentialError::InvalidRecord(format!("unknown credential type {raw:?}"))
            })?,
        };
        Ok(Self {
            id: optional_str(map, "_id").map(str::to_string),
            credential_type,
            challenge_armored: optional_str(map, "challenge_ciphertext").map(str::to_string),
        })
    }

    /// Serializes the persisted fields. `_id` is stamped by the store on
    /// upsert.
    pub fn to_document(&self) -> DocumentMap {
        let mut map = DocumentMap::new();
        map.insert(
            "credential_type".to_string(),
            Value::String(self.credential_type.as_str().to_string()),
        );
        if let Some(challenge) = &self.challenge_armored {
            map.insert(
                "challenge_ciphertext".to_string(),
                Value::String(challenge.clone()),
            );
        }
        map
    }
}
