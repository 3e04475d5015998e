//! Wallet-to-wallet transfers.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{LedgerEntry, Wallet};
use crate::services::error::WalletError;
use crate::services::metrics::record_operation;
use crate::services::store::{UnitOfWork, UnitOfWorkSource, WalletStore};

/// Result of a committed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub amount: i64,
    pub recipient_wallet_number: String,
    /// Reference of the sender's `transfer_out` entry.
    pub debit_reference: String,
    /// Reference of the recipient's `transfer_in` entry.
    pub credit_reference: String,
}

#[derive(Clone)]
pub struct TransferExecutor {
    wallets: Arc<dyn WalletStore>,
    units: Arc<dyn UnitOfWorkSource>,
}

impl TransferExecutor {
    pub fn new(wallets: Arc<dyn WalletStore>, units: Arc<dyn UnitOfWorkSource>) -> Self {
        Self { wallets, units }
    }

    /// Move `amount` from the sender's wallet to the wallet numbered
    /// `recipient_wallet_number`.
    ///
    /// Both balance changes and both ledger entries commit together or not
    /// at all. The debit re-checks the balance inside the unit of work, so a
    /// concurrent transfer that drained the wallet after the pre-check fails
    /// with `InsufficientFunds` instead of overdrawing.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        sender_user_id: &str,
        recipient_wallet_number: &str,
        amount: i64,
    ) -> Result<TransferReceipt, WalletError> {
        if amount < 1 {
            return Err(WalletError::Validation("amount must be at least 1".into()));
        }

        let sender = self
            .wallets
            .find_wallet_by_user(sender_user_id)
            .await?
            .ok_or(WalletError::NotFound("wallet"))?;
        if amount > sender.balance {
            record_operation("transfer", "insufficient_funds");
            return Err(WalletError::InsufficientFunds);
        }

        let recipient = self
            .wallets
            .find_wallet_by_number(recipient_wallet_number)
            .await?
            .ok_or(WalletError::NotFound("recipient wallet"))?;
        if sender.wallet_number == recipient.wallet_number {
            return Err(WalletError::SelfTransfer);
        }

        let token = Uuid::new_v4().simple().to_string();
        let receipt = TransferReceipt {
            amount,
            recipient_wallet_number: recipient.wallet_number.clone(),
            debit_reference: format!("trf_{}_out", token),
            credit_reference: format!("trf_{}_in", token),
        };

        let mut uow = self.units.begin().await?;
        let applied = apply(uow.as_mut(), &sender, &recipient, &receipt).await;
        match applied {
            Ok(()) => {
                if let Err(e) = uow.commit().await {
                    warn!(error = %e, "Transfer commit failed, rolled back");
                    record_operation("transfer", "conflict");
                    return Err(e.into());
                }
            }
            Err(e) => {
                if let Err(rollback_error) = uow.rollback().await {
                    warn!(error = %rollback_error, "Transfer rollback failed");
                }
                record_operation("transfer", "rejected");
                return Err(e);
            }
        }

        info!(
            sender_wallet_id = %sender.id,
            recipient_wallet_id = %recipient.id,
            amount,
            reference = %receipt.debit_reference,
            "Transfer completed"
        );
        record_operation("transfer", "success");
        Ok(receipt)
    }
}

async fn apply(
    uow: &mut dyn UnitOfWork,
    sender: &Wallet,
    recipient: &Wallet,
    receipt: &TransferReceipt,
) -> Result<(), WalletError> {
    if !uow.adjust_balance(&sender.id, -receipt.amount).await? {
        return Err(WalletError::InsufficientFunds);
    }
    if !uow.adjust_balance(&recipient.id, receipt.amount).await? {
        return Err(WalletError::NotFound("recipient wallet"));
    }

    uow.record(&LedgerEntry::transfer_out(
        &sender.id,
        receipt.amount,
        receipt.debit_reference.clone(),
        &recipient.wallet_number,
    ))
    .await?;
    uow.record(&LedgerEntry::transfer_in(
        &recipient.id,
        receipt.amount,
        receipt.credit_reference.clone(),
        &sender.wallet_number,
    ))
    .await?;
    Ok(())
}
