use chrono::{DateTime, Duration as TimeDelta, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AuthError, AuthResult, TokenOptions};

/// What a token lets its bearer do.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Scope {
    /// Manage every slot.
    Admin,
    /// Download exactly one private file.
    Download { file: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: Scope,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.scope, Scope::Admin)
    }

    /// Whether these claims may read `file` through the download route.
    pub fn allows_download(&self, file: &str) -> bool {
        match &self.scope {
            Scope::Admin => true,
            Scope::Download { file: granted } => granted == file,
        }
    }
}

/// A freshly minted download link token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: Option<&str>) -> Option<String> {
    let v = header?.trim();
    let prefix = "Bearer ";
    if v.len() <= prefix.len() || !v.starts_with(prefix) {
        return None;
    }
    Some(v[prefix.len()..].trim().to_string())
}

/// Signs and verifies admin and download tokens with one HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    options: TokenOptions,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(options: TokenOptions) -> Result<Self, String> {
        options.validate()?;
        Ok(Self {
            encoding: EncodingKey::from_secret(options.secret.as_bytes()),
            decoding: DecodingKey::from_secret(options.secret.as_bytes()),
            options,
        })
    }

    pub fn options(&self) -> &TokenOptions {
        &self.options
    }

    /// Sign a token with an explicit expiry. Expiries in the past produce
    /// tokens that never verify.
    pub fn issue_expiring_at(
        &self,
        subject: &str,
        scope: Scope,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.options.issuer.clone(),
            aud: self.options.audience.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope,
        };

        let header = Header::new(self.options.algorithm.to_jsonwebtoken());
        encode(&header, &claims, &self.encoding).map_err(|e| AuthError::Signing(e.to_string()))
    }

    pub fn issue_admin(&self, subject: &str) -> AuthResult<IssuedToken> {
        let expires_at = Utc::now() + lifetime(self.options.admin_token_expires_in);
        let token = self.issue_expiring_at(subject, Scope::Admin, expires_at)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// A link token readable only for `file`.
    pub fn issue_download(&self, subject: &str, file: &str) -> AuthResult<IssuedToken> {
        let expires_at = Utc::now() + lifetime(self.options.download_token_expires_in);
        let scope = Scope::Download {
            file: file.to_string(),
        };
        let token = self.issue_expiring_at(subject, scope, expires_at)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let mut validation = Validation::new(self.options.algorithm.to_jsonwebtoken());
        validation.set_issuer(&[self.options.issuer.as_str()]);
        validation.set_audience(&[self.options.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.options.leeway_secs;

        let decoded = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(decoded.claims)
    }

    pub fn authorize_admin(&self, token: Option<&str>) -> AuthResult<Claims> {
        let claims = self.verify(token.ok_or(AuthError::MissingToken)?)?;
        if !claims.is_admin() {
            return Err(AuthError::WrongScope);
        }
        Ok(claims)
    }

    pub fn authorize_download(&self, token: Option<&str>, file: &str) -> AuthResult<Claims> {
        let claims = self.verify(token.ok_or(AuthError::MissingToken)?)?;
        if !claims.allows_download(file) {
            return Err(AuthError::WrongScope);
        }
        Ok(claims)
    }
}

fn lifetime(d: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or_else(|_| TimeDelta::seconds(i64::from(u32::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(TokenOptions::new("test-secret-0123456789")).unwrap()
    }

    #[test]
    fn admin_token_round_trips() {
        let svc = service();
        let issued = svc.issue_admin("owner").unwrap();
        let claims = svc.authorize_admin(Some(issued.token.as_str())).unwrap();
        assert_eq!(claims.sub, "owner");
        assert!(claims.is_admin());
        assert_eq!(claims.expires_at().unwrap().timestamp(), issued.expires_at.timestamp());
    }

    #[test]
    fn download_token_is_bound_to_one_file() {
        let svc = service();
        let issued = svc.issue_download("owner", "cv-1.pdf").unwrap();

        assert!(svc.authorize_download(Some(issued.token.as_str()), "cv-1.pdf").is_ok());
        assert_eq!(
            svc.authorize_download(Some(issued.token.as_str()), "cv-2.pdf"),
            Err(AuthError::WrongScope)
        );
        assert_eq!(svc.authorize_admin(Some(issued.token.as_str())), Err(AuthError::WrongScope));
    }

    #[test]
    fn admin_tokens_open_any_download() {
        let svc = service();
        let issued = svc.issue_admin("owner").unwrap();
        assert!(svc.authorize_download(Some(issued.token.as_str()), "cv-9.pdf").is_ok());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let svc = service();
        let token = svc
            .issue_expiring_at("owner", Scope::Admin, Utc::now() - TimeDelta::hours(1))
            .unwrap();
        assert_eq!(svc.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn tokens_from_another_secret_are_invalid() {
        let other = TokenService::new(TokenOptions::new("another-secret-987654")).unwrap();
        let token = other.issue_admin("owner").unwrap().token;
        assert!(matches!(service().verify(&token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn missing_and_garbage_tokens() {
        let svc = service();
        assert_eq!(svc.authorize_admin(None), Err(AuthError::MissingToken));
        assert_eq!(svc.verify(""), Err(AuthError::MissingToken));
        assert!(matches!(svc.verify("not.a.jwt"), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(extract_bearer_token(Some("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(extract_bearer_token(Some("  Bearer  abc ")).as_deref(), Some("abc"));
        assert_eq!(extract_bearer_token(Some("Basic abc")), None);
        assert_eq!(extract_bearer_token(Some("Bearer ")), None);
        assert_eq!(extract_bearer_token(None), None);
    }
}
