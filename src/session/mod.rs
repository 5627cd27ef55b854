//! Identities and session tokens handed out after a successful verification.

pub mod identity;
pub mod issuer;
pub mod repo;
pub mod token;

pub use identity::{
    Identity, IdentityError, IdentityId, IdentityPage, IdentityStore, MemoryIdentityStore,
};
pub use issuer::{AuthenticatedSession, SessionIssuer};
pub use repo::PgIdentityStore;
pub use token::{Claims, JwtIssuer, TokenError, TokenIssuer};
