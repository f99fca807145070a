//! Minimal OpenID Connect token issuance service
//!
//! Provides:
//! - An in-memory registry of OAuth client applications, seeded at startup
//! - `POST /connect/token` for the client credentials and password grants
//! - RS256-signed stateless access tokens
//!
//! The binary in `main.rs` wires this up behind a CLI; the library surface
//! exists so integration tests can drive the router directly.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod oauth;
pub mod registry;
pub mod secret;
pub mod seed;
pub mod users;
pub mod validator;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatcher::GrantDispatcher;
use crate::issuer::TokenIssuer;
use crate::keys::SigningKey;
use crate::registry::ClientRegistry;
use crate::users::UserStore;
use crate::validator::RegistryValidator;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub clients: Arc<ClientRegistry>,
    pub users: Arc<UserStore>,
    pub dispatcher: GrantDispatcher,
}

impl AppState {
    /// Build the state from configuration: resolve the signing key, then seed.
    pub fn from_config(config: Config, public_url: &str) -> Result<Self> {
        let key = match &config.signing.private_key_path {
            Some(path) => {
                let key = SigningKey::load(path).context("Failed to load signing key")?;
                tracing::info!("Loaded signing key {} from {:?}", key.kid(), path);
                key
            }
            None => {
                let key = SigningKey::generate().context("Failed to generate signing key")?;
                tracing::warn!(
                    "No signing key configured, generated development key {}; tokens will not survive a restart",
                    key.kid()
                );
                key
            }
        };
        Self::with_signing_key(config, public_url, key)
    }

    /// Build the state around an already-loaded key and run the seed.
    pub fn with_signing_key(config: Config, public_url: &str, key: SigningKey) -> Result<Self> {
        let clients = Arc::new(ClientRegistry::new());
        let users = Arc::new(UserStore::new());

        seed::seed_clients(&clients)?;
        seed::seed_users(&users, &config.users)?;

        let issuer = TokenIssuer::new(
            key,
            config.issuer_or(public_url),
            config.audience.clone(),
            config.tokens.access_token_lifetime_secs,
        );
        let validator = RegistryValidator::new(Arc::clone(&clients), Arc::clone(&users));
        let dispatcher = GrantDispatcher::new(Arc::new(validator), Arc::new(issuer));

        Ok(Self {
            config,
            clients,
            users,
            dispatcher,
        })
    }
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    let token_path = state.config.endpoint.token_path();

    Router::new()
        .route("/", get(root))
        .route(&token_path, post(oauth::token::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "Hello World!"
}
