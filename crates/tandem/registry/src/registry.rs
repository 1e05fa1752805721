//! The registry service

use crate::backend::{IdentityRecord, RegistryBackend};
use crate::ephemeral::EphemeralBackend;
use crate::token::TokenIssuer;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tandem_types::{
    CoordinationError, Credential, CredentialScope, Endpoint, Identity, Result, UserId,
};

/// Credential lifetimes per scope
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub session_lifetime: Duration,
    pub durable_lifetime: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(24 * 60 * 60),
            durable_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Registers identities and authenticates their credentials.
pub struct Registry {
    backend: Arc<dyn RegistryBackend>,
    issuer: TokenIssuer,
    endpoint: Endpoint,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(
        backend: Arc<dyn RegistryBackend>,
        issuer: TokenIssuer,
        endpoint: Endpoint,
        config: RegistryConfig,
    ) -> Self {
        Self {
            backend,
            issuer,
            endpoint,
            config,
        }
    }

    /// In-memory registry with a random key.
    pub fn ephemeral(endpoint: Endpoint) -> Self {
        Self::new(
            Arc::new(EphemeralBackend::new()),
            TokenIssuer::generate(),
            endpoint,
            RegistryConfig::default(),
        )
    }

    /// Endpoint handed out with every identity
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn key_id(&self) -> &str {
        self.issuer.key_id()
    }

    /// Register a fresh identity, under `requested` if given.
    pub async fn register(&self, requested: Option<UserId>) -> Result<Identity> {
        let user_id = requested.unwrap_or_else(UserId::generate);
        let scope = self.backend.credential_scope();
        let lifetime = match scope {
            CredentialScope::Session => self.config.session_lifetime,
            CredentialScope::Durable => self.config.durable_lifetime,
        };

        // Signing first so that nothing is stored if it fails.
        let credential = self.issuer.issue(&user_id, scope, lifetime)?;

        self.backend
            .insert(IdentityRecord {
                user_id: user_id.clone(),
                endpoint: self.endpoint.clone(),
                registered_at: Utc::now(),
                scope,
            })
            .await?;

        tracing::info!(user_id = %user_id, backend = self.backend.kind(), "Registered identity");

        Ok(Identity {
            user_id,
            endpoint: self.endpoint.clone(),
            credential,
        })
    }

    pub async fn resolve(&self, user_id: &UserId) -> Result<Endpoint> {
        self.backend
            .get(user_id)
            .await?
            .map(|r| r.endpoint)
            .ok_or_else(|| CoordinationError::UnknownIdentity(user_id.to_string()))
    }

    /// Verify a credential and return the user id it was issued to.
    pub async fn authenticate(&self, credential: &Credential) -> Result<UserId> {
        let claims = self.issuer.verify(credential)?;
        if !self.is_registered(&claims.sub).await? {
            tracing::warn!(user_id = %claims.sub, "Credential for unregistered identity");
            return Err(CoordinationError::Unauthorized(format!(
                "{} is not registered",
                claims.sub
            )));
        }
        Ok(claims.sub)
    }

    pub async fn is_registered(&self, user_id: &UserId) -> Result<bool> {
        Ok(self.backend.get(user_id).await?.is_some())
    }

    pub async fn identities(&self) -> Result<Vec<IdentityRecord>> {
        self.backend.list().await
    }
}
