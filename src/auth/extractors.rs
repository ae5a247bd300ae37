use super::{
    identity::{ForgeUser, IdentityProvider},
    provider::AuthProvider,
    token::bearer_token,
};
use crate::error::ForgeError;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Rejects the request with 401 unless it carries a valid bearer token.
///
/// The provider `P` must be installed as a request extension.
///
/// ```rust,ignore
/// async fn balance(AuthUser(user): AuthUser<IdentityProvider>) -> String {
///     user.id
/// }
/// ```
pub struct AuthUser<P: AuthProvider>(pub P::User);

impl<P, S> FromRequestParts<S> for AuthUser<P>
where
    P: AuthProvider,
    S: Send + Sync,
{
    type Rejection = ForgeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let provider = parts
            .extensions
            .get::<P>()
            .ok_or_else(|| ForgeError::internal("Auth provider not found in request extensions"))?
            .clone();

        let token = bearer_token(parts)?;
        let claims = provider.verify_token(&token).await?;
        let user = provider.load_user(&claims).await?;
        provider.validate_user(&user).await?;

        Ok(AuthUser(user))
    }
}

/// An authenticated user holding the configured admin role; 403 otherwise.
pub struct AdminUser(pub ForgeUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ForgeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::<IdentityProvider>::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, "Admin route refused");
            return Err(ForgeError::forbidden("Admin role required"));
        }
        Ok(AdminUser(user))
    }
}
