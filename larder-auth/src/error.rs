use larder_core::LarderError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Every way a request can fail to prove it is allowed in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token does not grant access to this resource")]
    WrongScope,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(err.to_string()),
        }
    }
}

impl From<AuthError> for LarderError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(_) => LarderError::general_error(err.to_string()),
            // Clients learn the category, not the verifier's reasoning.
            AuthError::Invalid(_) => LarderError::not_authenticated("Invalid token"),
            other => LarderError::not_authenticated(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::ErrorKind;

    #[test]
    fn auth_failures_are_401() {
        for err in [
            AuthError::MissingToken,
            AuthError::Invalid("bad signature".into()),
            AuthError::Expired,
            AuthError::WrongScope,
        ] {
            let larder: LarderError = err.into();
            assert_eq!(larder.kind, ErrorKind::NotAuthenticated);
            assert_eq!(larder.code(), 401);
        }
    }

    #[test]
    fn invalid_reason_is_not_exposed() {
        let larder: LarderError = AuthError::Invalid("InvalidSignature".into()).into();
        assert_eq!(larder.message, "Invalid token");
    }
}
