pub mod extractors;
pub mod identity;
pub mod jwt;
pub mod provider;
pub mod token;

pub use extractors::{AdminUser, AuthUser};
pub use identity::{ForgeUser, IdentityClaims, IdentityProvider};
pub use jwt::{JwkSet, JwtVerifier};
pub use provider::AuthProvider;
pub use token::bearer_token;
