pub mod credentials;
pub mod database;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod paystack;
pub mod permissions;
pub mod session;
pub mod store;
pub mod transfer;
pub mod wallets;
pub mod webhook;

pub use credentials::{CredentialAuthority, IssuedCredential, SecretHasher, Ttl};
pub use database::MongoStore;
pub use error::{StoreError, WalletError};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use paystack::{Checkout, GatewayVerification, PaymentGateway, PaystackClient};
pub use permissions::{authorize, require_session, Capability, Principal};
pub use session::SessionVerifier;
pub use store::Stores;
pub use transfer::{TransferExecutor, TransferReceipt};
pub use wallets::{DepositHandle, DepositStatus, WalletService};
pub use webhook::{WebhookOutcome, WebhookProcessor};
