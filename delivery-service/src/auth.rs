//! Bearer-token verification against an external identity provider.

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid or expired credential")]
    InvalidCredential,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

pub type TokenVerifierRef = Arc<dyn TokenVerifier>;

/// Verifies ID tokens with a `tokeninfo`-style endpoint that answers with the
/// token's claims, e.g. `https://oauth2.googleapis.com/tokeninfo`.
#[derive(Clone)]
pub struct HttpTokenVerifier {
    http: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    email: Option<String>,
}

impl HttpTokenVerifier {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let url = Url::parse_with_params(&self.endpoint, &[("id_token", token)])
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::InvalidCredential);
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("identity provider returned {}", status)));
        }

        let claims: TokenClaims = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match claims.email {
            Some(email) if !email.is_empty() => Ok(VerifiedIdentity { email }),
            _ => Err(AuthError::InvalidCredential),
        }
    }
}

/// Caller identity extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub VerifiedIdentity);

impl AuthenticatedUser {
    pub fn email(&self) -> &str {
        &self.0.email
    }

    /// Ownership check: the caller may only read resources under their own email.
    pub fn ensure_owns(&self, email: &str) -> Result<(), AppError> {
        if self.email() != email {
            warn!("{} attempted to read resources of {}", self.email(), email);
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    TokenVerifierRef: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingCredential)?;
        let verifier = TokenVerifierRef::from_ref(state);
        let identity = verifier.verify(token).await?;
        Ok(AuthenticatedUser(identity))
    }
}
