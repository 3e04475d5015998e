//! In-process storage backend.
//!
//! Holds all state behind one async mutex. A unit of work takes the lock for
//! its whole lifetime and mutates a private copy, which replaces the shared
//! state only on commit. Reads made through the store while a unit of work
//! is open wait for it to finish, so callers must not read through the store
//! from inside their own unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Credential, LedgerEntry, TransactionStatus, User, Wallet};
use crate::services::error::StoreError;
use crate::services::store::{
    CredentialStore, Ledger, UnitOfWork, UnitOfWorkSource, UserDirectory, WalletStore,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<String, User>,
    wallets: HashMap<String, Wallet>,
    entries: Vec<LedgerEntry>,
    credentials: HashMap<String, Credential>,
}

impl MemoryState {
    fn insert_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        for existing in self.wallets.values() {
            if existing.user_id == wallet.user_id {
                return Err(StoreError::Duplicate("user_id".into()));
            }
            if existing.wallet_number == wallet.wallet_number {
                return Err(StoreError::Duplicate("wallet_number".into()));
            }
        }
        self.wallets.insert(wallet.id.clone(), wallet.clone());
        Ok(())
    }

    fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if let Some(reference) = &entry.reference {
            if self.entry_mut(reference).is_some() {
                return Err(StoreError::Duplicate("reference".into()));
            }
        }
        self.entries.push(entry.clone());
        Ok(())
    }

    fn entry_mut(&mut self, reference: &str) -> Option<&mut LedgerEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.reference.as_deref() == Some(reference))
    }

    fn adjust_balance(&mut self, wallet_id: &str, delta: i64) -> bool {
        let Some(wallet) = self.wallets.get_mut(wallet_id) else {
            return false;
        };
        let Some(next) = wallet.balance.checked_add(delta) else {
            return false;
        };
        if next < 0 {
            return false;
        }
        wallet.balance = next;
        wallet.updated_at = Utc::now();
        true
    }

    fn transition(
        &mut self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        match self.entry_mut(reference) {
            Some(entry) if entry.status == from => {
                entry.status = to;
                entry.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

/// Storage backend that keeps everything in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account, standing in for the identity service.
    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }

    /// Makes the next unit of work fail at commit time, as a lost
    /// transaction would.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Overrides a credential's expiry.
    pub async fn backdate_credential(&self, credential_id: &str, expires_at: DateTime<Utc>) {
        if let Some(credential) = self.state.lock().await.credentials.get_mut(credential_id) {
            credential.expires_at = expires_at;
        }
    }

    /// Sets a wallet balance directly, bypassing the ledger. Fixture setup only.
    pub async fn set_balance(&self, wallet_id: &str, balance: i64) {
        if let Some(wallet) = self.state.lock().await.wallets.get_mut(wallet_id) {
            wallet.balance = balance;
        }
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        self.state.lock().await.insert_wallet(wallet)
    }

    async fn find_wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.wallets.values().find(|w| w.user_id == user_id).cloned())
    }

    async fn find_wallet_by_number(
        &self,
        wallet_number: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .wallets
            .values()
            .find(|w| w.wallet_number == wallet_number)
            .cloned())
    }

    async fn find_wallet_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.lock().await.wallets.get(wallet_id).cloned())
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn record(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.state.lock().await.insert_entry(entry)
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.entry_mut(reference).map(|e| e.clone()))
    }

    async fn list_by_wallet(&self, wallet_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn fail_pending(&self, reference: &str, reason: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.entry_mut(reference) {
            Some(entry) if entry.status.can_transition_to(TransactionStatus::Failed) => {
                entry.status = TransactionStatus::Failed;
                entry.metadata.failure_reason = Some(reason.to_string());
                entry.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn adjust_balance(&mut self, wallet_id: &str, delta: i64) -> Result<bool, StoreError> {
        Ok(self.working.adjust_balance(wallet_id, delta))
    }

    async fn record(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.working.insert_entry(entry)
    }

    async fn transition_status(
        &mut self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.working.transition(reference, from, to))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("injected commit failure".into()));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UnitOfWorkSource for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        }))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_within_quota(
        &self,
        credential: &Credential,
        max_active: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let active = state
            .credentials
            .values()
            .filter(|c| c.user_id == credential.user_id && c.is_active(now))
            .count() as u64;
        if active >= max_active {
            return Ok(false);
        }
        if state
            .credentials
            .values()
            .any(|c| c.key_hash == credential.key_hash)
        {
            return Err(StoreError::Duplicate("key_hash".into()));
        }
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(true)
    }

    async fn count_active_credentials(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .values()
            .filter(|c| c.user_id == user_id && c.is_active(now))
            .count() as u64)
    }

    async fn find_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .get(credential_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_credentials(&self, user_id: &str) -> Result<Vec<Credential>, StoreError> {
        let state = self.state.lock().await;
        let mut credentials: Vec<Credential> = state
            .credentials
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credentials.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(credentials)
    }

    async fn list_unrevoked_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .values()
            .filter(|c| !c.revoked)
            .cloned()
            .collect())
    }

    async fn touch_credential(
        &self,
        credential_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(credential) = self.state.lock().await.credentials.get_mut(credential_id) {
            credential.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.credentials.get_mut(credential_id) {
            Some(credential) if credential.user_id == user_id => {
                credential.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_wallet(balance: i64) -> (MemoryStore, Wallet) {
        let store = MemoryStore::new();
        let wallet = Wallet::new("user-1", "1000000001".into(), "NGN");
        store.insert_wallet(&wallet).await.unwrap();
        store.set_balance(&wallet.id, balance).await;
        (store, wallet)
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded_on_drop() {
        let (store, wallet) = store_with_wallet(100).await;

        {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.adjust_balance(&wallet.id, 50).await.unwrap());
        }

        let reloaded = store.find_wallet_by_id(&wallet.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, 100);
    }

    #[tokio::test]
    async fn debit_never_drives_balance_negative() {
        let (store, wallet) = store_with_wallet(100).await;

        let mut uow = store.begin().await.unwrap();
        assert!(!uow.adjust_balance(&wallet.id, -101).await.unwrap());
        assert!(uow.adjust_balance(&wallet.id, -100).await.unwrap());
        uow.commit().await.unwrap();

        let reloaded = store.find_wallet_by_id(&wallet.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, 0);
    }

    #[tokio::test]
    async fn injected_commit_failure_applies_nothing() {
        let (store, wallet) = store_with_wallet(100).await;
        store.fail_next_commit();

        let mut uow = store.begin().await.unwrap();
        uow.adjust_balance(&wallet.id, 25).await.unwrap();
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let reloaded = store.find_wallet_by_id(&wallet.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, 100);
    }

    #[tokio::test]
    async fn settled_entries_never_move_again() {
        let (store, wallet) = store_with_wallet(0).await;
        let entry = LedgerEntry::pending_deposit(&wallet.id, 10, "ref1".into(), "url".into());
        store.record(&entry).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(!uow
            .transition_status("ref1", TransactionStatus::Pending, TransactionStatus::Pending)
            .await
            .unwrap());
        assert!(uow
            .transition_status("ref1", TransactionStatus::Pending, TransactionStatus::Success)
            .await
            .unwrap());
        assert!(!uow
            .transition_status("ref1", TransactionStatus::Success, TransactionStatus::Pending)
            .await
            .unwrap());
        uow.commit().await.unwrap();

        assert!(!store.fail_pending("ref1", "late mismatch").await.unwrap());
        let stored = store.find_by_reference("ref1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn quota_insert_refuses_once_full() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(1);

        for i in 0..2 {
            let credential = Credential::new(
                "user-1",
                format!("hash-{i}"),
                format!("key-{i}"),
                vec!["read".into()],
                expires_at,
            );
            assert!(store.insert_within_quota(&credential, 2, now).await.unwrap());
        }

        let over = Credential::new("user-1", "hash-2".into(), "key-2".into(), vec![], expires_at);
        assert!(!store.insert_within_quota(&over, 2, now).await.unwrap());
        assert_eq!(store.count_active_credentials("user-1", now).await.unwrap(), 2);

        let elsewhere = Credential::new("user-2", "hash-3".into(), "key-3".into(), vec![], expires_at);
        assert!(store.insert_within_quota(&elsewhere, 2, now).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_references_and_wallet_numbers_are_rejected() {
        let (store, wallet) = store_with_wallet(0).await;

        let entry = LedgerEntry::pending_deposit(&wallet.id, 10, "ref1".into(), "url".into());
        store.record(&entry).await.unwrap();
        let again = LedgerEntry::pending_deposit(&wallet.id, 10, "ref1".into(), "url".into());
        assert!(matches!(
            store.record(&again).await,
            Err(StoreError::Duplicate(field)) if field == "reference"
        ));

        let clash = Wallet::new("user-2", wallet.wallet_number.clone(), "NGN");
        assert!(matches!(
            store.insert_wallet(&clash).await,
            Err(StoreError::Duplicate(field)) if field == "wallet_number"
        ));
    }
}
