use crate::auth::IdentityClaims;
use jsonwebtoken::{EncodingKey, Header, encode};

/// Secret shared by [`TokenMint`] and the test application.
pub const TEST_JWT_SECRET: &str = "promptforge-test-secret-0123456789";

/// Mints HS256 tokens the way the identity provider would.
pub struct TokenMint {
    secret: String,
    admin_role: String,
}

impl Default for TokenMint {
    fn default() -> Self {
        Self::new(TEST_JWT_SECRET)
    }
}

impl TokenMint {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            admin_role: "admin".to_string(),
        }
    }

    pub fn user(&self, user_id: &str) -> String {
        self.sign(self.claims(user_id, None, chrono::Duration::hours(1)))
    }

    pub fn admin(&self, user_id: &str) -> String {
        let role = Some(self.admin_role.clone());
        self.sign(self.claims(user_id, role, chrono::Duration::hours(1)))
    }

    pub fn expired(&self, user_id: &str) -> String {
        self.sign(self.claims(user_id, None, -chrono::Duration::hours(1)))
    }

    pub fn sign(&self, claims: IdentityClaims) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HS256 signing cannot fail")
    }

    fn claims(&self, user_id: &str, role: Option<String>, ttl: chrono::Duration) -> IdentityClaims {
        IdentityClaims {
            sub: user_id.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp(),
            email: Some(format!("{}@example.com", user_id)),
            role,
            roles: Vec::new(),
        }
    }
}
