//! Resource owners that may sign in through the password grant

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::registry::RegistryError;
use crate::secret::{hash_secret, verify_secret};

/// A resource owner account
#[derive(Debug, Clone)]
pub struct ResourceOwner {
    pub username: String,
    /// Stable subject identifier placed in the `sub` claim
    pub subject: String,
    pub display_name: String,
    password_hash: String,
}

#[derive(Default)]
pub struct UserStore {
    users: DashMap<String, Arc<ResourceOwner>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Add a user with a plaintext password (hashed with argon2)
    pub fn add(
        &self,
        username: &str,
        password: &str,
        subject: &str,
        display_name: &str,
    ) -> Result<Arc<ResourceOwner>, RegistryError> {
        if self.users.contains_key(username) {
            return Err(RegistryError::Conflict(username.to_string()));
        }

        let password_hash =
            hash_secret(password).map_err(|e| RegistryError::Hash(e.to_string()))?;
        let user = Arc::new(ResourceOwner {
            username: username.to_string(),
            subject: subject.to_string(),
            display_name: display_name.to_string(),
            password_hash,
        });

        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Conflict(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&user));
                Ok(user)
            }
        }
    }

    /// Returns the user only if the password matches
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<Arc<ResourceOwner>> {
        let user = self.users.get(username).map(|e| Arc::clone(e.value()))?;
        if verify_secret(&user.password_hash, password).await {
            Some(user)
        } else {
            None
        }
    }
}
