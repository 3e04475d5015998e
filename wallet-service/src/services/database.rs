//! MongoDB storage backend.
//!
//! Units of work run as multi-document transactions on a client session,
//! which needs a replica set or sharded cluster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::error::{
    ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::options::{
    Acknowledgment, ClientOptions, FindOptions, IndexOptions, ReadConcern, TransactionOptions,
    UpdateOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use service_core::error::AppError;
use tracing::{info, instrument};

use crate::models::{Credential, LedgerEntry, TransactionStatus, User, Wallet};
use crate::services::error::StoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    CredentialStore, Ledger, UnitOfWork, UnitOfWorkSource, UserDirectory, WalletStore,
};

/// MongoDB duplicate key error code.
const DUPLICATE_KEY: i32 = 11000;
/// MongoDB WriteConflict error code.
const WRITE_CONFLICT: i32 = 112;

/// Fields guarded by unique indexes, checked against duplicate key messages.
const UNIQUE_FIELDS: [&str; 4] = ["wallet_number", "user_id", "reference", "key_hash"];

fn map_error(err: mongodb::error::Error) -> StoreError {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR)
        || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
    {
        return StoreError::Conflict(err.to_string());
    }

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY =>
        {
            let field = UNIQUE_FIELDS
                .iter()
                .find(|field| write_error.message.contains(*field))
                .copied()
                .unwrap_or("unknown");
            StoreError::Duplicate(field.to_string())
        }
        ErrorKind::Command(command_error) if command_error.code == WRITE_CONFLICT => {
            StoreError::Conflict(err.to_string())
        }
        _ => StoreError::Backend(anyhow::Error::new(err)),
    }
}

fn bson_now() -> BsonDateTime {
    BsonDateTime::from_chrono(Utc::now())
}

fn transaction_options() -> TransactionOptions {
    TransactionOptions::builder()
        .read_concern(ReadConcern::snapshot())
        .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
        .build()
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    wallets: Collection<Wallet>,
    transactions: Collection<LedgerEntry>,
    api_keys: Collection<Credential>,
    /// One document per user, written by every issuance so that concurrent
    /// issuances for the same user conflict.
    api_key_guards: Collection<Document>,
    users: Collection<User>,
}

impl MongoStore {
    /// Connect and bind the service collections.
    #[instrument(skip(uri), fields(service = "wallet-service"))]
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        client_options.app_name = Some("wallet-service".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;

        info!(database = %db_name, "MongoDB client created");
        Ok(Self::new(client, db_name))
    }

    pub fn new(client: Client, db_name: &str) -> Self {
        let db: Database = client.database(db_name);
        Self {
            wallets: db.collection("wallets"),
            transactions: db.collection("transactions"),
            api_keys: db.collection("api_keys"),
            api_key_guards: db.collection("api_key_guards"),
            users: db.collection("users"),
            client,
        }
    }

    /// Create the unique and lookup indexes the ledger relies on.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };

        self.wallets
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "user_id": 1 })
                        .options(unique("wallet_user_id_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "wallet_number": 1 })
                        .options(unique("wallet_number_unique"))
                        .build(),
                ],
                None,
            )
            .await?;

        // Sparse: entries without a reference are never indexed.
        let reference_index = IndexModel::builder()
            .keys(doc! { "reference": 1 })
            .options(
                IndexOptions::builder()
                    .name("transaction_reference_unique".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();
        let history_index = IndexModel::builder()
            .keys(doc! { "wallet_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("transaction_wallet_history_idx".to_string())
                    .build(),
            )
            .build();
        self.transactions
            .create_indexes([reference_index, history_index], None)
            .await?;

        self.api_keys
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "key_hash": 1 })
                        .options(unique("api_key_hash_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "user_id": 1 })
                        .options(
                            IndexOptions::builder()
                                .name("api_key_user_idx".to_string())
                                .build(),
                        )
                        .build(),
                ],
                None,
            )
            .await?;

        info!("Wallet service indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl WalletStore for MongoStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_wallet"])
            .start_timer();
        self.wallets
            .insert_one(wallet, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn find_wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["find_wallet_by_user"])
            .start_timer();
        self.wallets
            .find_one(doc! { "user_id": user_id }, None)
            .await
            .map_err(map_error)
    }

    async fn find_wallet_by_number(
        &self,
        wallet_number: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["find_wallet_by_number"])
            .start_timer();
        self.wallets
            .find_one(doc! { "wallet_number": wallet_number }, None)
            .await
            .map_err(map_error)
    }

    async fn find_wallet_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, StoreError> {
        self.wallets
            .find_one(doc! { "_id": wallet_id }, None)
            .await
            .map_err(map_error)
    }
}

#[async_trait]
impl Ledger for MongoStore {
    async fn record(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["record_entry"])
            .start_timer();
        self.transactions
            .insert_one(entry, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_reference"])
            .start_timer();
        self.transactions
            .find_one(doc! { "reference": reference }, None)
            .await
            .map_err(map_error)
    }

    async fn list_by_wallet(&self, wallet_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_by_wallet"])
            .start_timer();
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .transactions
            .find(doc! { "wallet_id": wallet_id }, Some(options))
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn fail_pending(&self, reference: &str, reason: &str) -> Result<bool, StoreError> {
        let filter = doc! {
            "reference": reference,
            "status": TransactionStatus::Pending.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": TransactionStatus::Failed.as_str(),
                "metadata.failure_reason": reason,
                "updated_at": bson_now(),
            }
        };
        let result = self
            .transactions
            .update_one(filter, update, None)
            .await
            .map_err(map_error)?;
        Ok(result.modified_count == 1)
    }
}

/// A client session with an open multi-document transaction.
///
/// The driver aborts the transaction when an uncommitted session is dropped.
struct MongoUnitOfWork {
    session: ClientSession,
    wallets: Collection<Wallet>,
    transactions: Collection<LedgerEntry>,
}

#[async_trait]
impl UnitOfWork for MongoUnitOfWork {
    async fn adjust_balance(&mut self, wallet_id: &str, delta: i64) -> Result<bool, StoreError> {
        let mut filter = doc! { "_id": wallet_id };
        if delta < 0 {
            filter.insert("balance", doc! { "$gte": -delta });
        }
        let update = doc! {
            "$inc": { "balance": delta },
            "$set": { "updated_at": bson_now() },
        };
        let result = self
            .wallets
            .update_one_with_session(filter, update, None, &mut self.session)
            .await
            .map_err(map_error)?;
        Ok(result.matched_count == 1)
    }

    async fn record(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.transactions
            .insert_one_with_session(entry, None, &mut self.session)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn transition_status(
        &mut self,
        reference: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let filter = doc! { "reference": reference, "status": from.as_str() };
        let update = doc! {
            "$set": { "status": to.as_str(), "updated_at": bson_now() }
        };
        let result = self
            .transactions
            .update_one_with_session(filter, update, None, &mut self.session)
            .await
            .map_err(map_error)?;
        Ok(result.modified_count == 1)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["commit"])
            .start_timer();
        self.session
            .commit_transaction()
            .await
            .map_err(|e| match map_error(e) {
                StoreError::Backend(err) => StoreError::Conflict(err.to_string()),
                other => other,
            })
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session.abort_transaction().await.map_err(map_error)
    }
}

#[async_trait]
impl UnitOfWorkSource for MongoStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut session = self.client.start_session(None).await.map_err(map_error)?;
        session
            .start_transaction(transaction_options())
            .await
            .map_err(map_error)?;

        Ok(Box::new(MongoUnitOfWork {
            session,
            wallets: self.wallets.clone(),
            transactions: self.transactions.clone(),
        }))
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn insert_within_quota(
        &self,
        credential: &Credential,
        max_active: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_within_quota"])
            .start_timer();
        let mut session = self.client.start_session(None).await.map_err(map_error)?;
        session
            .start_transaction(transaction_options())
            .await
            .map_err(map_error)?;

        // A second issuance for this user now hits a write conflict.
        self.api_key_guards
            .update_one_with_session(
                doc! { "_id": &credential.user_id },
                doc! { "$inc": { "issued": 1_i64 }, "$set": { "updated_at": bson_now() } },
                UpdateOptions::builder().upsert(true).build(),
                &mut session,
            )
            .await
            .map_err(map_error)?;

        let filter = doc! {
            "user_id": &credential.user_id,
            "revoked": false,
            "expires_at": { "$gt": BsonDateTime::from_chrono(now) },
        };
        let active = self
            .api_keys
            .count_documents_with_session(filter, None, &mut session)
            .await
            .map_err(map_error)?;
        if active >= max_active {
            session.abort_transaction().await.map_err(map_error)?;
            return Ok(false);
        }

        self.api_keys
            .insert_one_with_session(credential, None, &mut session)
            .await
            .map_err(map_error)?;
        session
            .commit_transaction()
            .await
            .map_err(|e| match map_error(e) {
                StoreError::Backend(err) => StoreError::Conflict(err.to_string()),
                other => other,
            })?;
        Ok(true)
    }

    async fn count_active_credentials(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let filter = doc! {
            "user_id": user_id,
            "revoked": false,
            "expires_at": { "$gt": BsonDateTime::from_chrono(now) },
        };
        self.api_keys
            .count_documents(filter, None)
            .await
            .map_err(map_error)
    }

    async fn find_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<Option<Credential>, StoreError> {
        self.api_keys
            .find_one(doc! { "_id": credential_id, "user_id": user_id }, None)
            .await
            .map_err(map_error)
    }

    async fn list_credentials(&self, user_id: &str) -> Result<Vec<Credential>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .api_keys
            .find(doc! { "user_id": user_id }, Some(options))
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn list_unrevoked_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_unrevoked_credentials"])
            .start_timer();
        let cursor = self
            .api_keys
            .find(doc! { "revoked": false }, None)
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn touch_credential(
        &self,
        credential_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.api_keys
            .update_one(
                doc! { "_id": credential_id },
                doc! { "$set": { "last_used_at": BsonDateTime::from_chrono(at) } },
                None,
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn revoke_credential(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .api_keys
            .update_one(
                doc! { "_id": credential_id, "user_id": user_id },
                doc! { "$set": { "revoked": true } },
                None,
            )
            .await
            .map_err(map_error)?;
        Ok(result.matched_count == 1)
    }
}

#[async_trait]
impl UserDirectory for MongoStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.users
            .find_one(doc! { "_id": user_id }, None)
            .await
            .map_err(map_error)
    }
}
