//! Bearer token verification for Clerk session JWTs.
//!
//! Production verifies RS256 tokens against the Clerk instance's PEM public key
//! (`CLERK_JWT_PUBLIC_KEY`). Development and tests can use HS256 with a shared
//! secret (`AUTH_HS256_SECRET`). The `sub` claim is the user id.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token: {0}")]
    InvalidToken(String),
    #[error("authentication is not configured")]
    NotConfigured,
}

/// Auth section of the config file. Key material comes from the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip)]
    pub public_key_pem: Option<String>,
    #[serde(skip)]
    pub hs256_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies bearer tokens and yields the authenticated user id.
#[derive(Clone)]
pub struct Authenticator {
    verifier: Option<(DecodingKey, Validation)>,
}

impl Authenticator {
    /// Build from config. RS256 wins when both keys are present.
    ///
    /// With no key configured every request is rejected with `NotConfigured`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let (key, algorithm) = if let Some(pem) = config.public_key_pem.as_deref() {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::InvalidToken(format!("bad public key: {}", e)))?;
            (key, Algorithm::RS256)
        } else if let Some(secret) = config.hs256_secret.as_deref() {
            (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
        } else {
            return Ok(Self { verifier: None });
        };

        let mut validation = Validation::new(algorithm);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            verifier: Some((key, validation)),
        })
    }

    /// Shared-secret authenticator.
    pub fn hs256(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            verifier: Some((DecodingKey::from_secret(secret.as_bytes()), validation)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.verifier.is_some()
    }

    /// Verify a raw JWT and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (key, validation) = self.verifier.as_ref().ok_or(AuthError::NotConfigured)?;
        let data = decode::<Claims>(token, key, validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(data.claims.sub)
    }

    /// Verify an `Authorization` header value of the form `Bearer <jwt>`.
    pub fn verify_header(&self, header: Option<&str>) -> Result<String, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}
