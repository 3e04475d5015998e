//! Request authentication.
//!
//! Resolves the acting [`Principal`] from request headers. An `x-api-key`
//! header takes precedence over an `Authorization: Bearer` session token;
//! when it is present but invalid the request is rejected outright rather
//! than falling back to the session.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use service_core::error::AppError;

use crate::services::{CredentialAuthority, Principal, SessionVerifier, WalletError};

/// Header carrying a scoped API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct Authenticator {
    credentials: CredentialAuthority,
    sessions: SessionVerifier,
}

impl Authenticator {
    pub fn new(credentials: CredentialAuthority, sessions: SessionVerifier) -> Self {
        Self {
            credentials,
            sessions,
        }
    }

    /// `Ok(None)` when the request carries no credentials at all.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Principal>, WalletError> {
        if let Some(value) = headers.get(API_KEY_HEADER) {
            let presented = value.to_str().map_err(|_| WalletError::Unauthenticated)?;
            let credential = self
                .credentials
                .validate(presented.trim())
                .await?
                .ok_or(WalletError::Unauthenticated)?;

            return Ok(Some(Principal::ScopedCredential {
                credential_id: credential.id,
                owner_id: credential.user_id,
                capabilities: credential.capabilities,
            }));
        }

        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or(WalletError::Unauthenticated)?;
            let user_id = self.sessions.verify(token.trim())?;

            return Ok(Some(Principal::SessionUser { user_id }));
        }

        Ok(None)
    }
}

/// The authenticated principal, if any.
///
/// Rejects only when credentials are present and invalid; whether a missing
/// principal is acceptable is decided per operation.
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Principal>);

impl MaybePrincipal {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = Authenticator::from_ref(state);
        let principal = authenticator.authenticate(&parts.headers).await?;

        if let Some(ref principal) = principal {
            let span = tracing::Span::current();
            span.record("user_id", principal.user_id());
            if let Principal::ScopedCredential { credential_id, .. } = principal {
                span.record("credential_id", credential_id.as_str());
            }
        }

        Ok(MaybePrincipal(principal))
    }
}
