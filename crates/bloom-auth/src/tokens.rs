use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("invalid token type")]
    WrongKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Signed claims for both access and refresh tokens. `jti` is only consulted
/// server-side for refresh tokens, but every token carries one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Sign a token for `user_id` with the given kind and lifetime (HS256).
pub fn issue(
    secret: &str,
    user_id: i64,
    kind: TokenKind,
    ttl: Duration,
) -> Result<IssuedToken, TokenError> {
    let now = Utc::now();
    let expires_at = now + ttl;
    let jti = Uuid::new_v4().simple().to_string();

    let claims = Claims {
        sub: user_id.to_string(),
        kind,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: jti.clone(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Invalid)?;

    Ok(IssuedToken {
        token,
        jti,
        expires_at,
    })
}

/// Verify signature and expiry, then enforce the type claim. An access token
/// presented where a refresh token is expected must fail, and vice versa.
pub fn verify(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| TokenError::Invalid)?;

    if data.claims.kind != expected {
        return Err(TokenError::WrongKind);
    }

    Ok(data.claims)
}
