//! Bearer token verification against a shared secret or a JWKS endpoint.

use crate::error::{ForgeError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// JSON Web Key as published by an identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub alg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub async fn fetch(client: &Client, url: &str) -> Result<Self> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ForgeError::service_unavailable(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(ForgeError::service_unavailable(format!(
                "JWKS endpoint returned status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ForgeError::internal(format!("Failed to parse JWKS: {}", e)))
    }

    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|jwk| jwk.kid.as_deref() == Some(kid))
    }
}

enum KeySource {
    Static(DecodingKey),
    Jwks {
        url: String,
        client: Client,
        keys: Arc<RwLock<JwkSet>>,
    },
}

/// Verifies JWTs and decodes them into `C`.
///
/// Configure an issuer and audience in production; without them any token
/// with a valid signature is accepted.
pub struct JwtVerifier<C> {
    source: KeySource,
    validation: Validation,
    _claims: std::marker::PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> JwtVerifier<C> {
    /// HS256 with a shared secret.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            source: KeySource::Static(DecodingKey::from_secret(secret)),
            validation: Validation::new(Algorithm::HS256),
            _claims: std::marker::PhantomData,
        }
    }

    /// RS256 with keys fetched from `url`.
    pub async fn from_jwks_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ForgeError::internal(format!("Failed to build HTTP client: {}", e)))?;
        let keys = JwkSet::fetch(&client, &url).await?;
        tracing::info!(url = %url, keys = keys.keys.len(), "Loaded JWKS");

        Ok(Self {
            source: KeySource::Jwks {
                url,
                client,
                keys: Arc::new(RwLock::new(keys)),
            },
            validation: Validation::new(Algorithm::RS256),
            _claims: std::marker::PhantomData,
        })
    }

    pub fn set_issuer(&mut self, issuer: impl Into<String>) {
        self.validation.set_issuer(&[issuer.into()]);
    }

    pub fn set_audience(&mut self, audience: impl Into<String>) {
        self.validation.set_audience(&[audience.into()]);
    }

    pub async fn verify(&self, token: &str) -> Result<TokenData<C>> {
        let (url, client, keys) = match &self.source {
            KeySource::Static(key) => return self.decode_with(token, key),
            KeySource::Jwks { url, client, keys } => (url, client, keys),
        };

        let header = decode_header(token)
            .map_err(|e| ForgeError::unauthorized(format!("Invalid token header: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| ForgeError::unauthorized("Token missing 'kid' header"))?;

        if let Some(key) = Self::key_for(keys, &kid).await? {
            return self.decode_with(token, &key);
        }

        // Unknown kid: the provider may have rotated keys since we last fetched.
        let fresh = JwkSet::fetch(client, url).await?;
        *keys.write().await = fresh;

        match Self::key_for(keys, &kid).await? {
            Some(key) => self.decode_with(token, &key),
            None => Err(ForgeError::unauthorized(format!(
                "Key '{}' not found in JWKS",
                kid
            ))),
        }
    }

    async fn key_for(keys: &RwLock<JwkSet>, kid: &str) -> Result<Option<DecodingKey>> {
        let keys = keys.read().await;
        let Some(jwk) = keys.find_by_kid(kid) else {
            return Ok(None);
        };
        DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map(Some)
            .map_err(|e| ForgeError::internal(format!("Failed to create decoding key: {}", e)))
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> Result<TokenData<C>> {
        decode::<C>(token, key, &self.validation)
            .map_err(|e| ForgeError::unauthorized(format!("Invalid token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<String>,
    }

    const SECRET: &[u8] = b"forge_test_secret_0123456789abcdef";

    fn token(claims: &TestClaims, algorithm: Algorithm) -> String {
        encode(&Header::new(algorithm), claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn claims(exp_offset: chrono::Duration) -> TestClaims {
        TestClaims {
            sub: "user_1".into(),
            exp: (chrono::Utc::now() + exp_offset).timestamp(),
            iss: None,
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_accepted() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(SECRET);
        let data = verifier
            .verify(&token(&claims(chrono::Duration::hours(1)), Algorithm::HS256))
            .await
            .unwrap();
        assert_eq!(data.claims.sub, "user_1");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(SECRET);
        let err = verifier
            .verify(&token(&claims(-chrono::Duration::hours(1)), Algorithm::HS256))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_other_algorithm_is_rejected() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(SECRET);
        let result = verifier
            .verify(&token(&claims(chrono::Duration::hours(1)), Algorithm::HS384))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_none_algorithm_is_rejected() {
        let verifier = JwtVerifier::<TestClaims>::from_secret(SECRET);
        // {"alg":"none","typ":"JWT"} . {"sub":"user123","exp":9999999999}
        let none_token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ1c2VyMTIzIiwiZXhwIjo5OTk5OTk5OTk5fQ.";
        assert!(verifier.verify(none_token).await.is_err());
    }

    #[tokio::test]
    async fn test_issuer_is_enforced() {
        let mut verifier = JwtVerifier::<TestClaims>::from_secret(SECRET);
        verifier.set_issuer("https://id.promptforge.dev");

        let mut wrong = claims(chrono::Duration::hours(1));
        wrong.iss = Some("https://evil.example.com".into());
        assert!(verifier.verify(&token(&wrong, Algorithm::HS256)).await.is_err());

        let mut right = claims(chrono::Duration::hours(1));
        right.iss = Some("https://id.promptforge.dev".into());
        assert!(verifier.verify(&token(&right, Algorithm::HS256)).await.is_ok());
    }
}
