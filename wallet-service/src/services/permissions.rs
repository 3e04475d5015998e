//! Per-operation authorization.
//!
//! Authentication produces a [`Principal`]; every operation then asks
//! [`authorize`] for the one capability it needs.

use crate::services::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Deposit,
    Transfer,
    Read,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Transfer => "transfer",
            Self::Read => "read",
        }
    }
}

/// The acting identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The account owner's own session. Holds every capability.
    SessionUser { user_id: String },
    /// A scoped API key acting on behalf of its owner.
    ScopedCredential {
        credential_id: String,
        owner_id: String,
        capabilities: Vec<String>,
    },
}

impl Principal {
    /// The user whose wallet the request acts on.
    pub fn user_id(&self) -> &str {
        match self {
            Self::SessionUser { user_id } => user_id,
            Self::ScopedCredential { owner_id, .. } => owner_id,
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        match self {
            Self::SessionUser { .. } => true,
            Self::ScopedCredential { capabilities, .. } => {
                capabilities.iter().any(|c| c == capability.as_str())
            }
        }
    }
}

/// Returns the acting user id when `principal` holds `required`.
pub fn authorize(principal: Option<&Principal>, required: Capability) -> Result<&str, WalletError> {
    let principal = principal.ok_or(WalletError::Unauthenticated)?;
    if principal.grants(required) {
        Ok(principal.user_id())
    } else {
        tracing::debug!(capability = required.as_str(), "Capability denied");
        Err(WalletError::ForbiddenCapability)
    }
}

/// Key management is reserved for the account owner's session.
pub fn require_session(principal: Option<&Principal>) -> Result<&str, WalletError> {
    match principal {
        None => Err(WalletError::Unauthenticated),
        Some(Principal::SessionUser { user_id }) => Ok(user_id),
        Some(Principal::ScopedCredential { .. }) => Err(WalletError::ForbiddenCapability),
    }
}
