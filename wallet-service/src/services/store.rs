//! Storage seams.
//!
//! Every component reaches persistence through these traits. Both the MongoDB
//! backend and the in-process backend implement all of them, and startup
//! wires one backend into a [`Stores`] bundle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Credential, LedgerEntry, TransactionStatus, User, Wallet};
use crate::services::error::StoreError;

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] on a taken `user_id` or
    /// `wallet_number`.
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError>;
    async fn find_wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError>;
    async fn find_wallet_by_number(
        &self,
        wallet_number: &str,
    ) -> Result<Option<Wallet>, StoreError>;
    async fn find_wallet_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, StoreError>;
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appends a standalone entry. Used for pending deposits, which move no
    /// balance until confirmed.
    async fn record(&self, entry: &LedgerEntry) -> Result<(), StoreError>;
    async fn find_by_reference(&self, reference: &str)
    -> Result<Option<LedgerEntry>, StoreError>;
    /// Newest first.
    async fn list_by_wallet(&self, wallet_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;
    /// Moves a `pending` entry to `failed` and records `reason` in its
    /// metadata. Returns false when the entry was no longer pending.
    async fn fail_pending(&self, reference: &str, reason: &str) -> Result<bool, StoreError>;
}

/// An atomic multi-record mutation.
///
/// Nothing written through a unit of work is visible until [`commit`]
/// succeeds. Dropping it without committing rolls everything back, so early
/// returns through `?` never leave partial writes behind.
///
/// [`commit`]: UnitOfWork::commit
#[async_trait]
pub trait UnitOfWork: Send {
    /// Adds `delta` to the wallet balance. A debit only applies while the
    /// balance covers it; returns false when it does not (or the wallet is
    /// gone), leaving the balance untouched.
    async fn adjust_balance(&mut self, wallet_id: &str, delta: i64) -> Result<bool, StoreError>;

    async fn record(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Conditional status update keyed on the current status. Returns false
    /// when the entry is missing or no longer in `from`.
    async fn transition_status(
        &mut self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, StoreError>;

    /// A failed commit leaves no write applied and reports
    /// [`StoreError::Conflict`].
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UnitOfWorkSource: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert `credential` unless its owner already holds `max_active`
    /// active credentials. The count and the insert are one atomic step.
    /// Returns `false` when the quota is full.
    async fn insert_within_quota(
        &self,
        credential: &Credential,
        max_active: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Non-revoked credentials whose expiry lies after `now`.
    async fn count_active_credentials(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    async fn find_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<Option<Credential>, StoreError>;
    async fn list_credentials(&self, user_id: &str) -> Result<Vec<Credential>, StoreError>;
    /// Every non-revoked credential, expired ones included.
    async fn list_unrevoked_credentials(&self) -> Result<Vec<Credential>, StoreError>;
    async fn touch_credential(
        &self,
        credential_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Returns false when the caller owns no such credential.
    async fn revoke_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<bool, StoreError>;
}

/// Read-only view of accounts owned by the identity service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
}

/// The storage handles the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub wallets: Arc<dyn WalletStore>,
    pub ledger: Arc<dyn Ledger>,
    pub units: Arc<dyn UnitOfWorkSource>,
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: WalletStore + Ledger + UnitOfWorkSource + CredentialStore + UserDirectory + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            wallets: backend.clone(),
            ledger: backend.clone(),
            units: backend.clone(),
            credentials: backend.clone(),
            users: backend,
        }
    }
}
