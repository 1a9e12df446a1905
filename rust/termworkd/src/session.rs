//! Process-wide login session.
//!
//! Set on `session.login`, cleared on `session.logout`. The REST client holds
//! a clone of the context and reads the bearer token for every request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("token must not be empty")]
    EmptyToken,
    #[error("token is not a JWT (expected header.payload.signature)")]
    Malformed,
    #[error("token payload could not be decoded: {0}")]
    BadPayload(String),
}

#[derive(Debug, Clone)]
struct SessionUser {
    token: String,
    claims: TokenClaims,
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<SessionUser>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, token: &str) -> Result<TokenClaims, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        let claims = decode_claims(token)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(SessionUser {
            token: token.to_string(),
            claims: claims.clone(),
        });
        tracing::info!(role = ?claims.role, "session started");
        Ok(claims)
    }

    pub fn logout(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            tracing::info!("session ended");
        }
    }

    pub fn bearer_token(&self) -> Option<String> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|u| u.token.clone())
    }

    pub fn role(&self) -> Option<Role> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(|u| u.claims.role)
    }

    pub fn is_logged_in(&self) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.is_some()
    }
}

fn decode_claims(token: &str) -> Result<TokenClaims, SessionError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SessionError::Malformed);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::BadPayload(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| SessionError::BadPayload(e.to_string()))
}

#[cfg(test)]
pub(crate) fn test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}
