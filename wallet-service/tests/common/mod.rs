#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::utils::signature::sign_payload;
use tower::ServiceExt;
use uuid::Uuid;

use wallet_service::config::Environment;
use wallet_service::models::{User, Wallet};
use wallet_service::services::session::SessionClaims;
use wallet_service::services::{
    Checkout, GatewayVerification, MemoryStore, PaymentGateway, SecretHasher, Stores,
    WalletError, WebhookOutcome,
};
use wallet_service::{router, AppState, ServiceSettings};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";

/// Payment gateway double. References are `ref_1`, `ref_2`, ...
#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicU64,
    unavailable: AtomicBool,
    /// Minor-unit amounts by reference, as Paystack would report them.
    initialized: Mutex<HashMap<String, i64>>,
}

impl FakeGateway {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn initialized_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, email: &str, amount: i64) -> Result<Checkout, WalletError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WalletError::GatewayUnavailable("timeout".into()));
        }
        assert!(!email.is_empty());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("ref_{}", n);
        self.initialized
            .lock()
            .unwrap()
            .insert(reference.clone(), amount * 100);
        Ok(Checkout {
            checkout_url: format!("https://checkout.test/{}", reference),
            access_code: format!("code_{}", n),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, WalletError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WalletError::GatewayUnavailable("timeout".into()));
        }
        let amount = self
            .initialized
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or_default();
        Ok(GatewayVerification {
            status: "success".into(),
            amount,
        })
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn spawn() -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(FakeGateway::default());
        let settings = ServiceSettings {
            environment: Environment::Dev,
            currency: "NGN".into(),
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            // Minimum cost keeps the suite fast.
            hasher: SecretHasher::new(8, 1).unwrap(),
        };
        let state = AppState::wire(Stores::from_backend(store.clone()), gateway.clone(), settings);
        let router = router(state.clone());

        Self {
            store,
            gateway,
            state,
            router,
        }
    }

    /// Registers a user without a wallet.
    pub async fn create_user(&self, email: &str) -> String {
        let user_id = Uuid::new_v4().to_string();
        self.store
            .insert_user(User {
                id: user_id.clone(),
                email: email.to_string(),
            })
            .await;
        user_id
    }

    /// Registers a user and opens their wallet with `balance`.
    pub async fn user_with_wallet(&self, email: &str, balance: i64) -> (String, Wallet) {
        let user_id = self.create_user(email).await;
        let mut wallet = self.state.wallets.create_wallet(&user_id).await.unwrap();
        if balance > 0 {
            self.store.set_balance(&wallet.id, balance).await;
            wallet.balance = balance;
        }
        (user_id, wallet)
    }

    pub async fn balance_of(&self, user_id: &str) -> i64 {
        self.state.wallets.get_balance(user_id).await.unwrap().balance
    }

    /// Deposit `amount` and deliver the matching signed webhook.
    pub async fn fund(&self, user_id: &str, amount: i64) -> WebhookOutcome {
        let handle = self.state.wallets.deposit(user_id, amount).await.unwrap();
        let body = charge_success(&handle.reference, amount * 100);
        let signature = sign(&body);
        self.state
            .webhooks
            .handle(Some(&signature), &body)
            .await
            .unwrap()
    }

    /// Drive the router with one request and decode the JSON reply.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(request).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn send_raw(
        &self,
        request: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body.to_vec())
    }
}

pub fn session_token(user_id: &str) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn charge_success(reference: &str, amount_minor: i64) -> Vec<u8> {
    event_body("charge.success", reference, amount_minor)
}

pub fn event_body(event: &str, reference: &str, amount_minor: i64) -> Vec<u8> {
    json!({
        "event": event,
        "data": {
            "reference": reference,
            "amount": amount_minor,
            "status": "success",
            "customer": { "email": "payer@example.com" }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn sign(body: &[u8]) -> String {
    sign_payload(WEBHOOK_SECRET.as_bytes(), body).unwrap()
}

pub enum Auth<'a> {
    None,
    Session(&'a str),
    ApiKey(&'a str),
}

pub fn request(method: &str, uri: &str, auth: Auth<'_>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    builder = match auth {
        Auth::None => builder,
        Auth::Session(user_id) => {
            builder.header("authorization", format!("Bearer {}", session_token(user_id)))
        }
        Auth::ApiKey(key) => builder.header("x-api-key", key),
    };
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
