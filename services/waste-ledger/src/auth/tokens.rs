//! Signed, time-limited bearer tokens (HS256 JWT).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::errors::{LedgerServiceError, Result};
use crate::models::Role;

/// Verified token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Wire shape before the subject has been checked
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    role: Role,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Why a token was refused. Only ever logged; callers see `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    BadSignature,
    Expired,
    MissingSubject,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::BadSignature => "bad_signature",
            TokenRejection::Expired => "expired",
            TokenRejection::MissingSubject => "missing_subject",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TokenRejection> for LedgerServiceError {
    fn from(_: TokenRejection) -> Self {
        LedgerServiceError::Unauthenticated
    }
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit instant in `verify_at`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        TokenIssuer {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.secret_key, config.token_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, username: &str, role: Role) -> Result<String> {
        self.issue_at(username, role, Utc::now())
    }

    pub fn issue_at(&self, username: &str, role: Role, now: DateTime<Utc>) -> Result<String> {
        self.issue_with_ttl(username, role, now, self.ttl)
    }

    pub fn issue_with_ttl(
        &self,
        username: &str,
        role: Role,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| LedgerServiceError::Internal("token lifetime out of range".to_string()))?;

        let claims = Claims {
            sub: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| LedgerServiceError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Claims, TokenRejection> {
        let data = decode::<RawClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                ErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::Malformed,
            }
        })?;

        let raw = data.claims;
        let sub = match raw.sub {
            Some(sub) if !sub.is_empty() => sub,
            _ => return Err(TokenRejection::MissingSubject),
        };

        if now.timestamp() >= raw.exp {
            return Err(TokenRejection::Expired);
        }

        Ok(Claims {
            sub,
            role: raw.role,
            iat: raw.iat,
            exp: raw.exp,
            jti: raw.jti,
        })
    }
}
