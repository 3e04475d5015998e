//! Payment confirmation webhooks.
//!
//! The gateway signs each delivery with `HMAC-SHA512(secret, raw body)`.
//! The signature is the only authentication on this channel, so it is
//! checked over the exact received bytes before anything is parsed.
//!
//! Crediting is idempotent: the `pending -> success` transition is a
//! conditional update, and only the delivery that wins it credits the
//! wallet.

use std::sync::Arc;

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::utils::signature::verify_payload_signature;
use tracing::{info, instrument, warn};

use crate::models::{LedgerEntry, TransactionKind, TransactionStatus};
use crate::services::error::WalletError;
use crate::services::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::services::paystack::MINOR_UNITS_PER_MAJOR;
use crate::services::store::{Ledger, UnitOfWorkSource};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// The only event that credits a wallet.
pub const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    /// Minor units.
    amount: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    #[serde(default)]
    email: Option<String>,
}

/// What a verified delivery did. Every outcome is acknowledged to the
/// gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited {
        reference: String,
        wallet_id: String,
        amount: i64,
    },
    /// The entry was already credited, possibly by a concurrent delivery.
    AlreadyProcessed,
    /// Not a payment-succeeded event.
    Ignored,
    /// No ledger entry carries this reference.
    UnknownReference,
    /// The entry is failed or is not a deposit, so it can never be credited.
    NotCreditable,
    /// The paid amount differed; the entry is now failed.
    AmountMismatch,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credited { .. } => "credited",
            Self::AlreadyProcessed => "duplicate",
            Self::Ignored => "ignored",
            Self::UnknownReference => "unknown_reference",
            Self::NotCreditable => "not_creditable",
            Self::AmountMismatch => "amount_mismatch",
        }
    }
}

/// Compare the gateway's minor-unit amount with the recorded whole units.
fn check_amount(entry: &LedgerEntry, paid_minor: i64) -> Result<(), WalletError> {
    match entry.amount.checked_mul(MINOR_UNITS_PER_MAJOR) {
        Some(expected) if expected == paid_minor => Ok(()),
        _ => Err(WalletError::AmountMismatch),
    }
}

#[derive(Clone)]
pub struct WebhookProcessor {
    ledger: Arc<dyn Ledger>,
    units: Arc<dyn UnitOfWorkSource>,
    secret: Secret<String>,
}

impl WebhookProcessor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        units: Arc<dyn UnitOfWorkSource>,
        secret: Secret<String>,
    ) -> Self {
        Self {
            ledger,
            units,
            secret,
        }
    }

    /// Verify and apply one delivery.
    ///
    /// Fails with `InvalidSignature` (no mutation) for a missing or wrong
    /// signature, `Validation` for an authenticated but malformed body, and
    /// a storage error when crediting could not commit, which the gateway
    /// retries.
    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WalletError> {
        let verified = signature.is_some_and(|signature| {
            verify_payload_signature(self.secret.expose_secret().as_bytes(), body, signature)
        });
        if !verified {
            warn!("Rejected webhook with invalid signature");
            WEBHOOK_EVENTS_TOTAL
                .with_label_values(&["invalid_signature"])
                .inc();
            return Err(WalletError::InvalidSignature);
        }

        let outcome = self.apply(body).await?;
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
        Ok(outcome)
    }

    async fn apply(&self, body: &[u8]) -> Result<WebhookOutcome, WalletError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| WalletError::Validation(format!("malformed webhook payload: {}", e)))?;

        if envelope.event != CHARGE_SUCCESS {
            info!(event = %envelope.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        let data: ChargeData = serde_json::from_value(envelope.data)
            .map_err(|e| WalletError::Validation(format!("malformed charge data: {}", e)))?;
        let customer_email = data
            .customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .unwrap_or_default();

        let Some(entry) = self.ledger.find_by_reference(&data.reference).await? else {
            warn!(reference = %data.reference, "Webhook for unknown reference");
            return Ok(WebhookOutcome::UnknownReference);
        };

        match entry.status {
            TransactionStatus::Success => {
                info!(reference = %data.reference, "Webhook already processed");
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            TransactionStatus::Failed => {
                warn!(reference = %data.reference, "Webhook for failed transaction");
                return Ok(WebhookOutcome::NotCreditable);
            }
            TransactionStatus::Pending => {}
        }
        if entry.kind != TransactionKind::Deposit {
            warn!(reference = %data.reference, kind = %entry.kind, "Webhook for non-deposit entry");
            return Ok(WebhookOutcome::NotCreditable);
        }

        if let Err(e) = check_amount(&entry, data.amount) {
            let reason = format!(
                "{}: expected {} got {} minor units",
                e,
                entry.amount.saturating_mul(MINOR_UNITS_PER_MAJOR),
                data.amount
            );
            warn!(reference = %data.reference, %reason, "Deposit amount mismatch");
            self.ledger.fail_pending(&data.reference, &reason).await?;
            return Ok(WebhookOutcome::AmountMismatch);
        }

        let mut uow = self.units.begin().await?;
        if !uow
            .transition_status(
                &data.reference,
                TransactionStatus::Pending,
                TransactionStatus::Success,
            )
            .await?
        {
            // Another delivery won the transition.
            uow.rollback().await?;
            return Ok(WebhookOutcome::AlreadyProcessed);
        }
        if !uow.adjust_balance(&entry.wallet_id, entry.amount).await? {
            uow.rollback().await?;
            return Err(WalletError::NotFound("wallet"));
        }
        uow.commit().await?;

        info!(
            reference = %data.reference,
            wallet_id = %entry.wallet_id,
            amount = entry.amount,
            gateway_status = data.status.as_deref().unwrap_or("unknown"),
            customer_email,
            "Deposit credited"
        );

        Ok(WebhookOutcome::Credited {
            reference: data.reference,
            wallet_id: entry.wallet_id,
            amount: entry.amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(amount: i64) -> LedgerEntry {
        LedgerEntry::pending_deposit("wallet-1", amount, "ref1".into(), "url".into())
    }

    #[test]
    fn amounts_compare_in_minor_units() {
        assert!(check_amount(&pending(5000), 500000).is_ok());
        assert!(check_amount(&pending(5000), 400000).is_err());
        assert!(check_amount(&pending(5000), 500050).is_err());
        assert!(check_amount(&pending(i64::MAX), 0).is_err());
    }
}
