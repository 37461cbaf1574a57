//! Credential lookup for nodes that call third-party model providers.
//!
//! Credentials are fetched per use by `(id, owner)` and never cached by the
//! engine; a missing or mismatched credential is a non-retriable error.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{NodeError, NodeResult};

/// Kind of secret a credential holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "OPENAI")]
    OpenAi,
    #[serde(rename = "ANTHROPIC")]
    Anthropic,
    #[serde(rename = "GEMINI")]
    Gemini,
}

impl CredentialType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::Gemini => "GEMINI",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENAI" => Ok(Self::OpenAi),
            "ANTHROPIC" => Ok(Self::Anthropic),
            "GEMINI" => Ok(Self::Gemini),
            other => Err(format!("unknown credential type: {other}")),
        }
    }
}

/// A stored secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub value: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// External credential lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when no credential with that id belongs to `owner_id`.
    /// Store I/O failures should be reported as [`NodeError::Transient`].
    async fn get_credential(&self, id: &str, owner_id: &str) -> NodeResult<Option<Credential>>;
}

/// Fetch a credential and check that it is usable as `expected`.
pub async fn require_credential(
    store: &dyn CredentialStore,
    id: &str,
    owner_id: &str,
    expected: CredentialType,
) -> NodeResult<Credential> {
    let credential = store
        .get_credential(id, owner_id)
        .await?
        .ok_or_else(|| NodeError::credential(format!("credential '{id}' not found")))?;

    if credential.kind != expected {
        return Err(NodeError::credential(format!(
            "credential '{id}' is of type {}, expected {expected}",
            credential.kind
        )));
    }
    if credential.value.trim().is_empty() {
        return Err(NodeError::credential(format!("credential '{id}' has an empty value")));
    }

    Ok(credential)
}

/// Credentials held in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let store = Self::new();
        for credential in credentials {
            store.insert(credential);
        }
        store
    }

    pub fn insert(&self, credential: Credential) {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential.id.clone(), credential);
    }

    pub fn len(&self) -> usize {
        self.credentials.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_credential(&self, id: &str, owner_id: &str) -> NodeResult<Option<Credential>> {
        let credentials = self.credentials.read().unwrap_or_else(PoisonError::into_inner);
        Ok(credentials
            .get(id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai(id: &str, owner: &str) -> Credential {
        Credential {
            id: id.into(),
            owner_id: owner.into(),
            kind: CredentialType::OpenAi,
            value: "sk-test".into(),
        }
    }

    #[tokio::test]
    async fn lookup_is_scoped_to_owner() {
        let store = MemoryCredentialStore::from_credentials([openai("c1", "alice")]);

        assert!(store.get_credential("c1", "alice").await.unwrap().is_some());
        assert!(store.get_credential("c1", "bob").await.unwrap().is_none());

        let err = require_credential(&store, "c1", "bob", CredentialType::OpenAi)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Credential(_)));
    }

    #[tokio::test]
    async fn type_mismatch_is_a_credential_error() {
        let store = MemoryCredentialStore::from_credentials([openai("c1", "alice")]);
        let err = require_credential(&store, "c1", "alice", CredentialType::Anthropic)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Credential(msg) if msg.contains("ANTHROPIC")));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let rendered = format!("{:?}", openai("c1", "alice"));
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn credential_type_parses_storage_spelling() {
        assert_eq!("GEMINI".parse::<CredentialType>(), Ok(CredentialType::Gemini));
        assert!("gemini".parse::<CredentialType>().is_err());
        let parsed: Credential = serde_json::from_value(serde_json::json!({
            "id": "c2", "ownerId": "u", "type": "ANTHROPIC", "value": "k"
        }))
        .unwrap();
        assert_eq!(parsed.kind, CredentialType::Anthropic);
    }
}
