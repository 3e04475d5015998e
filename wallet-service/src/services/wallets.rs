//! Wallet lifecycle, balances, deposits and history.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::models::{generate_wallet_number, LedgerEntry, TransactionKind, TransactionStatus, Wallet};
use crate::services::error::{StoreError, WalletError};
use crate::services::metrics::record_operation;
use crate::services::paystack::{GatewayVerification, PaymentGateway};
use crate::services::store::{Ledger, UserDirectory, WalletStore};

/// Tries at allocating an unused wallet number before giving up.
pub const WALLET_NUMBER_ATTEMPTS: usize = 5;

/// Checkout handle returned to the depositor.
#[derive(Debug, Clone)]
pub struct DepositHandle {
    pub reference: String,
    pub checkout_url: String,
    pub access_code: String,
    pub amount: i64,
}

/// Local ledger state of a deposit next to the gateway's answer.
#[derive(Debug, Clone)]
pub struct DepositStatus {
    pub reference: String,
    pub amount: i64,
    pub status: TransactionStatus,
    /// `None` when the gateway could not be reached.
    pub gateway: Option<GatewayVerification>,
}

#[derive(Clone)]
pub struct WalletService {
    wallets: Arc<dyn WalletStore>,
    ledger: Arc<dyn Ledger>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl WalletService {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        ledger: Arc<dyn Ledger>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        currency: String,
    ) -> Self {
        Self {
            wallets,
            ledger,
            users,
            gateway,
            currency,
        }
    }

    async fn wallet_of(&self, user_id: &str) -> Result<Wallet, WalletError> {
        self.wallets
            .find_wallet_by_user(user_id)
            .await?
            .ok_or(WalletError::NotFound("wallet"))
    }

    /// Returns the user's wallet, creating it on first use.
    #[instrument(skip(self))]
    pub async fn create_wallet(&self, user_id: &str) -> Result<Wallet, WalletError> {
        if let Some(existing) = self.wallets.find_wallet_by_user(user_id).await? {
            return Ok(existing);
        }

        for attempt in 1..=WALLET_NUMBER_ATTEMPTS {
            let wallet = Wallet::new(user_id, generate_wallet_number(), &self.currency);
            match self.wallets.insert_wallet(&wallet).await {
                Ok(()) => {
                    info!(
                        wallet_id = %wallet.id,
                        wallet_number = %wallet.wallet_number,
                        "Wallet created"
                    );
                    record_operation("create_wallet", "created");
                    return Ok(wallet);
                }
                // Lost a race with a concurrent create for the same user.
                Err(StoreError::Duplicate(field)) if field == "user_id" => {
                    return self.wallet_of(user_id).await;
                }
                Err(StoreError::Duplicate(field)) if field == "wallet_number" => {
                    warn!(attempt, "Wallet number collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!("Could not allocate a unique wallet number");
        Err(WalletError::Storage(anyhow::anyhow!(
            "wallet number allocation exhausted after {} attempts",
            WALLET_NUMBER_ATTEMPTS
        )))
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<Wallet, WalletError> {
        self.wallet_of(user_id).await
    }

    /// Start a gateway checkout and record the pending deposit.
    ///
    /// The pending entry is written only after the gateway answers, and the
    /// checkout handle is returned only after the entry is stored, so a
    /// confirmation webhook always finds its entry.
    #[instrument(skip(self))]
    pub async fn deposit(&self, user_id: &str, amount: i64) -> Result<DepositHandle, WalletError> {
        if amount < 1 {
            return Err(WalletError::Validation("amount must be at least 1".into()));
        }

        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(WalletError::NotFound("user"))?;
        let wallet = self.wallet_of(user_id).await?;

        let checkout = self.gateway.initialize(&user.email, amount).await.map_err(|e| {
            record_operation("deposit", "gateway_error");
            e
        })?;

        let entry = LedgerEntry::pending_deposit(
            &wallet.id,
            amount,
            checkout.reference.clone(),
            checkout.checkout_url.clone(),
        );
        if let Err(e) = self.ledger.record(&entry).await {
            error!(reference = %checkout.reference, error = %e, "Failed to record pending deposit");
            record_operation("deposit", "error");
            return Err(e.into());
        }

        info!(
            wallet_id = %wallet.id,
            reference = %checkout.reference,
            amount,
            "Deposit initiated"
        );
        record_operation("deposit", "initiated");

        Ok(DepositHandle {
            reference: checkout.reference,
            checkout_url: checkout.checkout_url,
            access_code: checkout.access_code,
            amount,
        })
    }

    /// Newest first.
    pub async fn list_transactions(&self, user_id: &str) -> Result<Vec<LedgerEntry>, WalletError> {
        let wallet = self.wallet_of(user_id).await?;
        Ok(self.ledger.list_by_wallet(&wallet.id).await?)
    }

    /// Report a deposit's status. Never credits, whatever the gateway says.
    #[instrument(skip(self))]
    pub async fn deposit_status(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<DepositStatus, WalletError> {
        let wallet = self.wallet_of(user_id).await?;
        let entry = self
            .ledger
            .find_by_reference(reference)
            .await?
            .filter(|e| e.wallet_id == wallet.id && e.kind == TransactionKind::Deposit)
            .ok_or(WalletError::NotFound("transaction"))?;

        let gateway = match self.gateway.verify(reference).await {
            Ok(verification) => Some(verification),
            Err(e) => {
                warn!(reference, error = %e, "Gateway verification unavailable");
                None
            }
        };

        Ok(DepositStatus {
            reference: reference.to_string(),
            amount: entry.amount,
            status: entry.status,
            gateway,
        })
    }
}
