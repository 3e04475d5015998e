//! Domain models for wallet-service.

mod credential;
mod transaction;
mod user;
mod wallet;

pub use credential::Credential;
pub use transaction::{EntryMetadata, LedgerEntry, TransactionKind, TransactionStatus};
pub use user::User;
pub use wallet::{generate_wallet_number, Wallet, WALLET_NUMBER_LENGTH};

pub mod optional_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(val: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match val {
            Some(date) => {
                mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime::serialize(
                    date, serializer,
                )
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(
            #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
            DateTime<Utc>,
        );

        let wrapper: Option<Wrapper> = Option::deserialize(deserializer)?;
        Ok(wrapper.map(|Wrapper(date)| date))
    }
}
