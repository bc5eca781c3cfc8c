//! Authentication and authorization
//!
//! - Argon2id password hashing
//! - HS256 bearer tokens with a configured TTL
//! - The access gate that turns a token into a live, role-checked identity

pub mod gate;
pub mod password;
pub mod tokens;

pub use gate::AccessGate;
pub use password::{hash_password, verify_password};
pub use tokens::{Claims, TokenIssuer, TokenRejection};
