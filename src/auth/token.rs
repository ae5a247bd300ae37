use crate::error::ForgeError;
use axum::http::request::Parts;

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(parts: &Parts) -> Result<String, ForgeError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ForgeError::unauthorized("Missing authorization header"))?;

    let (scheme, token) = header.split_once(' ').ok_or_else(|| {
        ForgeError::unauthorized("Invalid authorization header format. Expected: Bearer <token>")
    })?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ForgeError::unauthorized(
            "Invalid authorization header format. Expected: Bearer <token>",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ForgeError::unauthorized("Empty bearer token"));
    }

    Ok(token.to_string())
}
