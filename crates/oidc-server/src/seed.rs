//! Startup seeding of demo clients and configured resource owners
//!
//! Seeding is skip-if-present keyed by id, so running it again is a no-op.

use anyhow::{Context, Result};

use crate::config::UserConfig;
use crate::registry::{ClientDescriptor, ClientRegistry, Endpoint, GrantType, RegistryError};
use crate::users::UserStore;

/// Ids created or skipped by one seeding run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

/// The fixed set of demonstration clients
pub fn demo_clients() -> Vec<ClientDescriptor> {
    vec![
        ClientDescriptor {
            client_id: "console".into(),
            client_secret: Some("388D45FA-B36B-4988-BA59-B187D329C207".into()),
            display_name: "My client application".into(),
            grant_types: [GrantType::ClientCredentials].into(),
            endpoints: [Endpoint::Token].into(),
            ..Default::default()
        },
        ClientDescriptor {
            client_id: "password".into(),
            client_secret: Some("901564A5-E7FE-42CB-B10D-61EF6A8F3654".into()),
            display_name: "Password Flow".into(),
            grant_types: [GrantType::Password].into(),
            endpoints: [Endpoint::Token].into(),
            scopes: ["profile".to_string(), "marketing_api".to_string()].into(),
            ..Default::default()
        },
        ClientDescriptor {
            client_id: "mvc".into(),
            client_secret: Some("901564A5-E7FE-42CB-B10D-61EF6A8F3654".into()),
            display_name: "MVC client application".into(),
            endpoints: [Endpoint::Authorization, Endpoint::Logout, Endpoint::Token].into(),
            redirect_uris: vec!["http://localhost:53507/signin-oidc".into()],
            post_logout_redirect_uris: vec!["http://localhost:53507/signout-callback-oidc".into()],
            ..Default::default()
        },
    ]
}

/// Ensure every demo client exists
pub fn seed_clients(registry: &ClientRegistry) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for descriptor in demo_clients() {
        let client_id = descriptor.client_id.clone();
        if registry.contains(&client_id) {
            report.skipped.push(client_id);
            continue;
        }
        match registry.register(descriptor) {
            Ok(_) => report.created.push(client_id),
            // Lost a race with another registration; the client exists either way
            Err(RegistryError::Conflict(_)) => report.skipped.push(client_id),
            Err(e) => return Err(e).with_context(|| format!("Failed to seed client {}", client_id)),
        }
    }

    tracing::info!(
        "Seeded clients: {} created, {} already present",
        report.created.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Ensure every configured resource owner exists
pub fn seed_users(store: &UserStore, users: &[UserConfig]) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for user in users {
        if store.contains(&user.username) {
            report.skipped.push(user.username.clone());
            continue;
        }
        let subject = user.subject.as_deref().unwrap_or(&user.username);
        let display_name = user.display_name.as_deref().unwrap_or(&user.username);
        match store.add(&user.username, &user.password, subject, display_name) {
            Ok(_) => report.created.push(user.username.clone()),
            Err(RegistryError::Conflict(_)) => report.skipped.push(user.username.clone()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to seed user {}", user.username))
            }
        }
    }

    tracing::info!(
        "Seeded users: {} created, {} already present",
        report.created.len(),
        report.skipped.len()
    );
    Ok(report)
}
