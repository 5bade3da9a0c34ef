//! Tokens for the Larder backend.
//!
//! Admin tokens travel in `Authorization: Bearer`. Download tokens travel in
//! a `token` query parameter and are scoped to a single private file, so a
//! leaked link exposes one document for a short while and nothing else.

pub mod error;
pub mod options;
pub mod tokens;

pub use error::{AuthError, AuthResult};
pub use options::{JwtAlgorithm, TokenOptions};
pub use tokens::{extract_bearer_token, Claims, IssuedToken, Scope, TokenService};
