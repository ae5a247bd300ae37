use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Turns a bearer token into an authenticated user.
///
/// The provider is installed as a request extension and picked up by the
/// [`AuthUser`](super::AuthUser) extractor.
#[async_trait]
pub trait AuthProvider: Send + Sync + Clone + 'static {
    type Claims: DeserializeOwned + Send + Sync;

    type User: Send + Sync + Clone;

    async fn verify_token(&self, token: &str) -> Result<Self::Claims>;

    async fn load_user(&self, claims: &Self::Claims) -> Result<Self::User>;

    /// Extra checks after the user is loaded, such as rejecting banned accounts.
    async fn validate_user(&self, _user: &Self::User) -> Result<()> {
        Ok(())
    }
}
