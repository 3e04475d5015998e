//! Wallet model: one balance record per user.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of digits in an externally shareable wallet number.
pub const WALLET_NUMBER_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Immutable once assigned; unique across all wallets.
    pub wallet_number: String,
    /// Whole currency units. Never negative.
    pub balance: i64,
    pub currency: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: &str, wallet_number: String, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            wallet_number,
            balance: 0,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Random ten-digit wallet number without a leading zero.
///
/// Uniqueness is enforced by the store; callers retry on collision.
pub fn generate_wallet_number() -> String {
    let mut rng = rand::thread_rng();
    let mut number = String::with_capacity(WALLET_NUMBER_LENGTH);
    number.push(char::from(b'1' + rng.gen_range(0..9u8)));
    for _ in 1..WALLET_NUMBER_LENGTH {
        number.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    number
}
