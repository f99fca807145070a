//! In-memory registry of OAuth client applications
//!
//! Clients are keyed by `client_id`. Secrets are hashed with argon2 before
//! they are stored; the plaintext never outlives `register`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::secret::{hash_secret, verify_secret};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Client not found: {0}")]
    NotFound(String),

    #[error("Client already exists: {0}")]
    Conflict(String),

    #[error("Client id must not be empty")]
    EmptyClientId,

    #[error("Invalid redirect URI {uri:?}: {source}")]
    InvalidRedirectUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to hash secret: {0}")]
    Hash(String),
}

/// OAuth 2.0 grant types a client may be permitted to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server endpoints a client may be permitted to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Authorization,
    Logout,
    Token,
}

/// Everything needed to register a client. The secret is plaintext here.
#[derive(Debug, Clone, Default)]
pub struct ClientDescriptor {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub display_name: String,
    pub grant_types: BTreeSet<GrantType>,
    pub endpoints: BTreeSet<Endpoint>,
    pub scopes: BTreeSet<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
}

/// A registered OAuth client
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub client_id: String,
    #[serde(skip)]
    secret_hash: Option<String>,
    pub display_name: String,
    pub grant_types: BTreeSet<GrantType>,
    pub endpoints: BTreeSet<Endpoint>,
    pub scopes: BTreeSet<String>,
    pub redirect_uris: Vec<Url>,
    pub post_logout_redirect_uris: Vec<Url>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Confidential clients hold a secret and must authenticate with it
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    pub fn permits_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    pub fn permits_endpoint(&self, endpoint: Endpoint) -> bool {
        self.endpoints.contains(&endpoint)
    }

    pub fn permits_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Concurrent client store. Reads dominate; registration is rare.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a registered client by ID
    pub fn find(&self, client_id: &str) -> Result<Arc<Client>, RegistryError> {
        self.clients
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotFound(client_id.to_string()))
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Register a new client. Fails with `Conflict` if the id is taken.
    pub fn register(&self, descriptor: ClientDescriptor) -> Result<Arc<Client>, RegistryError> {
        if descriptor.client_id.is_empty() {
            return Err(RegistryError::EmptyClientId);
        }

        let redirect_uris = parse_uris(&descriptor.redirect_uris)?;
        let post_logout_redirect_uris = parse_uris(&descriptor.post_logout_redirect_uris)?;

        if self.clients.contains_key(&descriptor.client_id) {
            return Err(RegistryError::Conflict(descriptor.client_id));
        }

        // Hash before taking the shard lock
        let secret_hash = descriptor
            .client_secret
            .as_deref()
            .map(hash_secret)
            .transpose()
            .map_err(|e| RegistryError::Hash(e.to_string()))?;

        let client = Arc::new(Client {
            client_id: descriptor.client_id,
            secret_hash,
            display_name: descriptor.display_name,
            grant_types: descriptor.grant_types,
            endpoints: descriptor.endpoints,
            scopes: descriptor.scopes,
            redirect_uris,
            post_logout_redirect_uris,
            created_at: Utc::now(),
        });

        // Only the entry check is atomic; the lookup above just skips hashing
        // for ids that are already taken.
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Conflict(client.client_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&client));
                tracing::info!(
                    created_at = %client.created_at,
                    "Registered client {} ({})",
                    client.client_id,
                    client.display_name
                );
                Ok(client)
            }
        }
    }

    /// Check a presented secret against the client's stored hash.
    ///
    /// Public clients have no secret and never pass this check.
    pub async fn verify_secret(&self, client: &Client, secret: &str) -> bool {
        match &client.secret_hash {
            Some(hash) => verify_secret(hash, secret).await,
            None => false,
        }
    }
}

fn parse_uris(uris: &[String]) -> Result<Vec<Url>, RegistryError> {
    uris.iter()
        .map(|uri| {
            Url::parse(uri).map_err(|source| RegistryError::InvalidRedirectUri {
                uri: uri.clone(),
                source,
            })
        })
        .collect()
}
