//! Ledger entry model.
//!
//! Entries are append-only. After insertion only `status` (one step out of
//! `pending`) and `metadata` may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    TransferIn,
    TransferOut,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Only `pending` entries may move, and only to a terminal status.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Success) | (Self::Pending, Self::Failed)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Free-form details attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Counterparty wallet number on a `transfer_out`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Counterparty wallet number on a `transfer_in`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub wallet_id: String,
    pub kind: TransactionKind,
    /// Whole currency units, always positive.
    pub amount: i64,
    /// Unique when present. Left out of the document when absent so the
    /// sparse unique index ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: EntryMetadata,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        wallet_id: &str,
        kind: TransactionKind,
        amount: i64,
        reference: String,
        status: TransactionStatus,
        metadata: EntryMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            kind,
            amount,
            reference: Some(reference),
            status,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deposit awaiting confirmation from the payment gateway.
    pub fn pending_deposit(
        wallet_id: &str,
        amount: i64,
        reference: String,
        checkout_url: String,
    ) -> Self {
        Self::new(
            wallet_id,
            TransactionKind::Deposit,
            amount,
            reference,
            TransactionStatus::Pending,
            EntryMetadata {
                checkout_url: Some(checkout_url),
                ..Default::default()
            },
        )
    }

    pub fn transfer_out(
        wallet_id: &str,
        amount: i64,
        reference: String,
        recipient_wallet_number: &str,
    ) -> Self {
        Self::new(
            wallet_id,
            TransactionKind::TransferOut,
            amount,
            reference,
            TransactionStatus::Success,
            EntryMetadata {
                recipient: Some(recipient_wallet_number.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn transfer_in(
        wallet_id: &str,
        amount: i64,
        reference: String,
        sender_wallet_number: &str,
    ) -> Self {
        Self::new(
            wallet_id,
            TransactionKind::TransferIn,
            amount,
            reference,
            TransactionStatus::Success,
            EntryMetadata {
                sender: Some(sender_wallet_number.to_string()),
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_one_directional() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Success.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn serialized_names_match_stored_values() {
        let entry = LedgerEntry::transfer_out("w1", 300, "trf_x_out".into(), "1234567890");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "transfer_out");
        assert_eq!(json["status"], "success");
        assert_eq!(json["metadata"]["recipient"], "1234567890");
        assert!(json["metadata"].get("sender").is_none());
    }
}
