use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Credential, EntryMetadata, LedgerEntry, TransactionKind, TransactionStatus, Wallet};
use crate::services::{DepositHandle, DepositStatus, IssuedCredential, TransferReceipt};

// -----------------------------------------------------------------------------
// Wallet
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequest {
    #[validate(length(min = 1, message = "Wallet number is required"))]
    pub wallet_number: String,
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet_number: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            wallet_number: wallet.wallet_number,
            balance: wallet.balance,
            currency: wallet.currency,
            created_at: wallet.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
    pub currency: String,
}

impl From<Wallet> for BalanceResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            balance: wallet.balance,
            currency: wallet.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
    pub amount: i64,
}

impl From<DepositHandle> for DepositResponse {
    fn from(handle: DepositHandle) -> Self {
        Self {
            reference: handle.reference,
            authorization_url: handle.checkout_url,
            access_code: handle.access_code,
            amount: handle.amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepositStatusResponse {
    pub reference: String,
    pub amount: i64,
    pub status: TransactionStatus,
    /// Gateway-reported status; absent when the gateway was unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<String>,
    /// Gateway-reported amount in minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_amount: Option<i64>,
}

impl From<DepositStatus> for DepositStatusResponse {
    fn from(status: DepositStatus) -> Self {
        let (gateway_status, gateway_amount) = match status.gateway {
            Some(verification) => (Some(verification.status), Some(verification.amount)),
            None => (None, None),
        };
        Self {
            reference: status.reference,
            amount: status.amount,
            status: status.status,
            gateway_status,
            gateway_amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub amount: i64,
    pub recipient_wallet_number: String,
    pub reference: String,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            status: "success",
            message: "Transfer completed",
            amount: receipt.amount,
            recipient_wallet_number: receipt.recipient_wallet_number,
            reference: receipt.debit_reference,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: TransactionStatus,
    pub metadata: EntryMetadata,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for TransactionResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind,
            amount: entry.amount,
            reference: entry.reference,
            status: entry.status,
            metadata: entry.metadata,
            created_at: entry.created_at,
        }
    }
}

// -----------------------------------------------------------------------------
// API keys
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "At least one permission is required"))]
    pub permissions: Vec<String>,
    /// Duration token such as `1H`, `30D`, `1M` or `1Y`.
    #[validate(length(min = 2, max = 12, message = "Expiry must look like 1H, 1D, 1M or 1Y"))]
    pub expiry: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RolloverApiKeyRequest {
    #[validate(length(min = 1, message = "Expired key id is required"))]
    pub expired_key_id: String,
    #[validate(length(min = 2, max = 12, message = "Expiry must look like 1H, 1D, 1M or 1Y"))]
    pub expiry: String,
}

/// Returned once, at creation or rollover. The secret is never shown again.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub id: String,
    pub api_key: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedCredential> for ApiKeyCreatedResponse {
    fn from(issued: IssuedCredential) -> Self {
        Self {
            id: issued.id,
            api_key: issued.api_key,
            name: issued.name,
            permissions: issued.capabilities,
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Credential> for ApiKeyResponse {
    fn from(credential: Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name,
            permissions: credential.capabilities,
            expires_at: credential.expires_at,
            revoked: credential.revoked,
            last_used_at: credential.last_used_at,
            created_at: credential.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
