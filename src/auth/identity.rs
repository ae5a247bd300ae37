//! Users as seen by promptforge: a subject id from the identity provider plus
//! an admin flag derived from the role claims.

use super::{jwt::JwtVerifier, provider::AuthProvider};
use crate::config::AuthConfig;
use crate::credits::validate_user_id;
use crate::error::{ForgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl IdentityClaims {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role) || self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForgeUser {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct IdentityProvider {
    verifier: Arc<JwtVerifier<IdentityClaims>>,
    admin_role: Arc<str>,
}

impl IdentityProvider {
    pub fn new(verifier: JwtVerifier<IdentityClaims>, admin_role: impl Into<String>) -> Self {
        Self {
            verifier: Arc::new(verifier),
            admin_role: Arc::from(admin_role.into()),
        }
    }

    /// Build the verifier described by `config`.
    ///
    /// A JWKS url takes precedence over a shared secret.
    pub async fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut verifier = match (&config.jwks_url, &config.jwt_secret) {
            (Some(url), _) => JwtVerifier::from_jwks_url(url.clone()).await?,
            (None, Some(secret)) => JwtVerifier::from_secret(secret.as_bytes()),
            (None, None) => {
                return Err(ForgeError::internal(
                    "auth requires either FORGE_JWT_SECRET or FORGE_JWKS_URL",
                ));
            }
        };

        if let Some(issuer) = &config.issuer {
            verifier.set_issuer(issuer.clone());
        }
        if let Some(audience) = &config.audience {
            verifier.set_audience(audience.clone());
        }

        Ok(Self::new(verifier, config.admin_role.clone()))
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }
}

#[async_trait]
impl AuthProvider for IdentityProvider {
    type Claims = IdentityClaims;
    type User = ForgeUser;

    async fn verify_token(&self, token: &str) -> Result<IdentityClaims> {
        Ok(self.verifier.verify(token).await?.claims)
    }

    async fn load_user(&self, claims: &IdentityClaims) -> Result<ForgeUser> {
        validate_user_id(&claims.sub)
            .map_err(|e| ForgeError::unauthorized(format!("Invalid subject: {}", e)))?;

        Ok(ForgeUser {
            id: claims.sub.clone(),
            email: claims.email.clone().unwrap_or_default(),
            is_admin: claims.has_role(&self.admin_role),
        })
    }
}
