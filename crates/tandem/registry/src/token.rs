//! Signed bearer credentials
//!
//! A credential is `base64url(claims) "." base64url(signature)`, where the
//! signature is Ed25519 over the encoded claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::time::Duration;
use tandem_types::{CoordinationError, Credential, CredentialClaims, CredentialScope, Result, UserId};

/// Issues and verifies credentials with one Ed25519 key.
pub struct TokenIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    key_id: String,
}

impl TokenIssuer {
    /// Fresh random key. Credentials do not survive a restart.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        let hash = blake3::hash(verifying_key.as_bytes());
        let key_id = hex::encode(&hash.as_bytes()[..8]);
        Self {
            signing_key,
            verifying_key,
            key_id,
        }
    }

    /// Key from a 64-character hex seed, as found in configuration.
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|_| {
            CoordinationError::InvalidRequest("signing seed is not valid hex".to_string())
        })?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CoordinationError::InvalidRequest("signing seed must be 32 bytes".to_string())
        })?;
        Ok(Self::from_seed(seed))
    }

    /// First 16 hex chars of the BLAKE3 hash of the verifying key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn issue(
        &self,
        user_id: &UserId,
        scope: CredentialScope,
        lifetime: Duration,
    ) -> Result<Credential> {
        self.issue_at(user_id, scope, lifetime, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &UserId,
        scope: CredentialScope,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Result<Credential> {
        let iat = now.timestamp();
        let claims = CredentialClaims {
            sub: user_id.clone(),
            iss: self.key_id.clone(),
            iat,
            exp: iat.saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX)),
            scope,
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|e| CoordinationError::Backend(format!("encode claims: {e}")))?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let signature = self.signing_key.sign(encoded.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(Credential::new(format!("{encoded}.{sig}")))
    }

    /// Check signature, issuer and expiry.
    pub fn verify(&self, credential: &Credential) -> Result<CredentialClaims> {
        self.verify_at(credential, Utc::now())
    }

    pub fn verify_at(&self, credential: &Credential, now: DateTime<Utc>) -> Result<CredentialClaims> {
        let (claims_part, sig_part) = credential.parts()?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| unauthorized("malformed signature"))?;
        let signature =
            Signature::from_slice(&sig_bytes).map_err(|_| unauthorized("malformed signature"))?;
        self.verifying_key
            .verify(claims_part.as_bytes(), &signature)
            .map_err(|_| unauthorized("bad signature"))?;

        let claims = credential.unverified_claims()?;
        if claims.iss != self.key_id {
            return Err(unauthorized("credential issued by another registry"));
        }
        if claims.is_expired_at(now) {
            return Err(unauthorized("credential expired"));
        }
        Ok(claims)
    }
}

fn unauthorized(detail: &str) -> CoordinationError {
    CoordinationError::Unauthorized(detail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alice() -> UserId {
        UserId::parse("alice").unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::generate();
        let credential = issuer
            .issue(&alice(), CredentialScope::Session, Duration::from_secs(60))
            .unwrap();
        let claims = issuer.verify(&credential).unwrap();
        assert_eq!(claims.sub, alice());
        assert_eq!(claims.iss, issuer.key_id());
        assert_eq!(claims.scope, CredentialScope::Session);
        assert_eq!(issuer.key_id().len(), 16);
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let ours = TokenIssuer::generate();
        let theirs = TokenIssuer::generate();
        let credential = theirs
            .issue(&alice(), CredentialScope::Session, Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            ours.verify(&credential),
            Err(CoordinationError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_rejected() {
        let issuer = TokenIssuer::generate();
        let issued_at = Utc.timestamp_opt(1_000, 0).unwrap();
        let credential = issuer
            .issue_at(&alice(), CredentialScope::Durable, Duration::from_secs(10), issued_at)
            .unwrap();
        assert!(issuer
            .verify_at(&credential, Utc.timestamp_opt(1_005, 0).unwrap())
            .is_ok());
        assert!(issuer
            .verify_at(&credential, Utc.timestamp_opt(1_010, 0).unwrap())
            .is_err());
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let issuer = TokenIssuer::generate();
        let credential = issuer
            .issue(&alice(), CredentialScope::Session, Duration::from_secs(60))
            .unwrap();
        let (_, sig) = credential.parts().unwrap();

        let mut claims = credential.unverified_claims().unwrap();
        claims.sub = UserId::parse("mallory").unwrap();
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = Credential::new(format!("{forged}.{sig}"));
        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn test_hex_seed_is_deterministic() {
        let seed = "11".repeat(32);
        let a = TokenIssuer::from_hex_seed(&seed).unwrap();
        let b = TokenIssuer::from_hex_seed(&seed).unwrap();
        assert_eq!(a.key_id(), b.key_id());

        let credential = a
            .issue(&alice(), CredentialScope::Durable, Duration::from_secs(60))
            .unwrap();
        assert!(b.verify(&credential).is_ok());

        assert!(TokenIssuer::from_hex_seed("abc").is_err());
        assert!(TokenIssuer::from_hex_seed("zz").is_err());
        assert!(TokenIssuer::from_hex_seed("00").is_err());
    }

    #[test]
    fn test_key_id_is_blake3_prefix() {
        let issuer = TokenIssuer::from_seed([7u8; 32]);
        let verifying = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let expected = blake3::hash(verifying.as_bytes()).to_hex();
        assert_eq!(issuer.key_id(), &expected.as_str()[..16]);

        let upper = TokenIssuer::from_hex_seed(&"0A".repeat(32)).unwrap();
        assert_eq!(upper.key_id(), TokenIssuer::from_seed([10u8; 32]).key_id());
    }
}
