use std::fmt;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::TokenPair,
    repository::RepositoryState,
};

/// Distinguishes the two halves of a token pair. A refresh token is never
/// accepted as a bearer credential, and an access token cannot be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload signed into every token issued by `POST /token` and `POST /token/refresh`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: id of the user the token was issued to.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub token_type: TokenKind,
    /// Unique per token, so two tokens minted in the same second still differ.
    pub jti: Uuid,
}

/// TokenIssuer
///
/// Signs and verifies HS256 tokens with the configured secret and lifetimes.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        )
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenKind::Access)?,
            refresh: self.issue(user_id, TokenKind::Refresh)?,
        })
    }

    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AppError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: user_id,
            iat: now as usize,
            exp: now.saturating_add(ttl) as usize,
            token_type: kind,
            jti: Uuid::new_v4(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// Decode and validate signature, expiry and token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token has expired",
                    _ => "token is invalid",
                };
                tracing::debug!(error = %e, "token rejected");
                AppError::Unauthorized(reason.to_string())
            })?
            .claims;

        if claims.token_type != expected {
            return Err(AppError::Unauthorized("token has the wrong type".to_string()));
        }
        Ok(claims)
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request, with role flags loaded
/// fresh from the repository on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub is_admin: bool,
    pub is_author: bool,
}

/// Principal
///
/// The acting party of a request: anonymous, or an authenticated user. Stores and
/// the access policy take it as an explicit argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(AuthUser),
}

impl Principal {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|user| user.is_admin)
    }
}

impl From<AuthUser> for Principal {
    fn from(user: AuthUser) -> Self {
        Principal::User(user)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => f.write_str("anonymous"),
            Principal::User(user) => write!(f, "user:{}", user.id),
        }
    }
}

const USER_ID_HEADER: &str = "x-user-id";

/// AuthUser Extractor
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing user
///    authenticates as that user.
/// 2. Bearer token: `Authorization: Bearer <access token>`, verified by `TokenIssuer`.
/// 3. Repository lookup: the user must still exist; role flags come from the row.
///
/// Rejects with `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        is_admin: user.is_admin,
                        is_author: user.is_author,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Unauthorized("authentication credentials were not provided".to_string())
            })?;

        let claims = TokenIssuer::from_config(&config).verify(token, TokenKind::Access)?;

        // A valid token for a deleted user is not a valid session.
        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

        Ok(AuthUser {
            id: user.id,
            is_admin: user.is_admin,
            is_author: user.is_author,
        })
    }
}

/// Principal Extractor
///
/// Requests without credentials resolve to `Principal::Anonymous`. Requests that
/// present credentials must present valid ones: a bad token is a 401, never a
/// silent downgrade to anonymous.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let has_bearer = parts.headers.contains_key(header::AUTHORIZATION);
        let has_bypass = config.env == Env::Local && parts.headers.contains_key(USER_ID_HEADER);

        if !has_bearer && !has_bypass {
            return Ok(Principal::Anonymous);
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(Principal::User)
    }
}
