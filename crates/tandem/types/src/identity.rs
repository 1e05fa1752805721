//! Participant identities and bearer credentials.

use crate::error::{CoordinationError, Result};
use crate::ids::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network address through which a coordinator is reached, e.g.
/// `http://127.0.0.1:7070` or `inproc://<id>` for an in-process coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for endpoints that only exist inside the current process.
    pub fn is_in_process(&self) -> bool {
        self.0.starts_with("inproc://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validity class of an issued credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialScope {
    /// Ephemeral registrations: valid for one session.
    Session,
    /// Registrations backed by a persistent registry.
    Durable,
}

/// Claims carried inside a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject user id
    pub sub: UserId,
    /// Issuer key id
    pub iss: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    pub scope: CredentialScope,
}

impl CredentialClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Opaque signed bearer token: `base64url(claims) "." base64url(signature)`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the encoded claims and the encoded signature.
    pub fn parts(&self) -> Result<(&str, &str)> {
        self.0
            .split_once('.')
            .filter(|(claims, sig)| !claims.is_empty() && !sig.is_empty())
            .ok_or_else(|| CoordinationError::Unauthorized("malformed credential".to_string()))
    }

    /// Decode the claims WITHOUT checking the signature. Clients use this to
    /// learn their own user id; the coordinator always verifies.
    pub fn unverified_claims(&self) -> Result<CredentialClaims> {
        let (claims, _) = self.parts()?;
        let bytes = URL_SAFE_NO_PAD
            .decode(claims)
            .map_err(|_| CoordinationError::Unauthorized("malformed credential".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| CoordinationError::Unauthorized("malformed credential claims".to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The identity + credential + endpoint triple a participant holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub endpoint: Endpoint,
    pub credential: Credential,
}

impl Identity {
    /// Rebuild an identity from what a launched program receives on its
    /// command line.
    pub fn from_parts(endpoint: Endpoint, credential: Credential) -> Result<Self> {
        let claims = credential.unverified_claims()?;
        Ok(Self {
            user_id: claims.sub,
            endpoint,
            credential,
        })
    }
}
