//! Application wiring and lifecycle.
//!
//! [`AppState::wire`] is the single place where storage, the payment gateway
//! and the domain services are composed.

use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{Environment, StorageBackend, WalletConfig};
use crate::handlers;
use crate::middleware::Authenticator;
use crate::services::{
    CredentialAuthority, MemoryStore, MongoStore, PaymentGateway, PaystackClient, SecretHasher,
    SessionVerifier, Stores, TransferExecutor, WalletService, WebhookProcessor,
};

/// Everything [`AppState::wire`] needs besides storage and the gateway.
#[derive(Clone)]
pub struct ServiceSettings {
    pub environment: Environment,
    pub currency: String,
    pub jwt_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub hasher: SecretHasher,
}

impl ServiceSettings {
    pub fn from_config(config: &WalletConfig) -> Result<Self, AppError> {
        let hasher = SecretHasher::new(
            config.api_keys.hash_memory_kib,
            config.api_keys.hash_iterations,
        )
        .map_err(AppError::ConfigError)?;

        Ok(Self {
            environment: config.environment,
            currency: config.wallet.currency.clone(),
            jwt_secret: config.jwt.secret.clone(),
            webhook_secret: config.paystack.secret_key.clone(),
            hasher,
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub wallets: WalletService,
    pub transfers: TransferExecutor,
    pub webhooks: WebhookProcessor,
    pub credentials: CredentialAuthority,
    pub authenticator: Authenticator,
}

impl AppState {
    pub fn wire(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        settings: ServiceSettings,
    ) -> Self {
        let credentials = CredentialAuthority::new(
            stores.credentials.clone(),
            settings.hasher,
            settings.environment,
        );
        let sessions = SessionVerifier::new(settings.jwt_secret.expose_secret().as_bytes());

        Self {
            wallets: WalletService::new(
                stores.wallets.clone(),
                stores.ledger.clone(),
                stores.users.clone(),
                gateway,
                settings.currency,
            ),
            transfers: TransferExecutor::new(stores.wallets.clone(), stores.units.clone()),
            webhooks: WebhookProcessor::new(stores.ledger, stores.units, settings.webhook_secret),
            authenticator: Authenticator::new(credentials.clone(), sessions),
            credentials,
        }
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

/// HTTP routes with request-id, metrics and tracing layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/wallet", post(handlers::wallet::ensure_wallet))
        .route("/wallet/deposit", post(handlers::wallet::deposit))
        .route(
            "/wallet/paystack/webhook",
            post(handlers::webhook::paystack_webhook),
        )
        .route("/wallet/balance", get(handlers::wallet::balance))
        .route("/wallet/transactions", get(handlers::wallet::transactions))
        .route("/wallet/transfer", post(handlers::wallet::transfer))
        .route(
            "/wallet/deposit/:reference/status",
            get(handlers::wallet::deposit_status),
        )
        .route("/keys", get(handlers::keys::list_keys))
        .route("/keys/create", post(handlers::keys::create_key))
        .route("/keys/rollover", post(handlers::keys::rollover_key))
        .route("/keys/:id/revoke", post(handlers::keys::revoke_key))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    user_id = tracing::field::Empty,
                    credential_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: WalletConfig) -> Result<Self, AppError> {
        let stores = match config.storage {
            StorageBackend::Mongo => {
                let mongo = config.mongodb.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("MONGODB_URI is required"))
                })?;
                let store = MongoStore::connect(mongo.uri.expose_secret(), &mongo.database).await?;
                store.init_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    AppError::DatabaseError(e)
                })?;
                Stores::from_backend(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; all state is lost on restart");
                Stores::from_backend(MemoryStore::new())
            }
        };

        let gateway = PaystackClient::new(config.paystack.clone()).map_err(|e| {
            tracing::error!("Failed to build Paystack client: {}", e);
            AppError::ConfigError(e)
        })?;

        let settings = ServiceSettings::from_config(&config)?;
        let state = AppState::wire(stores, Arc::new(gateway), settings);

        let address = config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Wallet service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
