//! Paystack payment gateway client.
//!
//! Hosted checkout initialisation and transaction verification. Paystack
//! amounts are in the currency's minor unit (kobo for NGN).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;

use crate::config::PaystackConfig;
use crate::services::error::WalletError;

/// Minor units per whole wallet unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Hosted checkout session returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Checkout {
    pub reference: String,
    #[serde(rename = "authorization_url")]
    pub checkout_url: String,
    pub access_code: String,
}

/// The gateway's view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayVerification {
    pub status: String,
    /// Minor units.
    pub amount: i64,
}

/// External payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a hosted checkout for `amount` whole units.
    async fn initialize(&self, email: &str, amount: i64) -> Result<Checkout, WalletError>;

    /// Ask the gateway for a transaction's status. Purely informational.
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, WalletError>;
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

/// Paystack response envelope.
#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Paystack API client.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    config: PaystackConfig,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T, WalletError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Failed to read Paystack response");
            WalletError::GatewayUnavailable(e.to_string())
        })?;

        let envelope: Option<PaystackEnvelope<T>> = serde_json::from_str(&body).ok();
        match envelope {
            Some(PaystackEnvelope {
                status: true,
                data: Some(data),
                ..
            }) if status.is_success() => Ok(data),
            Some(envelope) => {
                tracing::warn!(
                    operation,
                    status = %status,
                    message = %envelope.message,
                    "Paystack rejected request"
                );
                Err(WalletError::GatewayUnavailable(envelope.message))
            }
            None => {
                tracing::warn!(operation, status = %status, "Unexpected Paystack response");
                Err(WalletError::GatewayUnavailable(format!(
                    "unexpected response ({})",
                    status
                )))
            }
        }
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> WalletError {
    if err.is_timeout() {
        tracing::warn!(operation, "Paystack request timed out");
        WalletError::GatewayUnavailable("timeout".into())
    } else {
        tracing::warn!(operation, error = %err, "Paystack request failed");
        WalletError::GatewayUnavailable(err.to_string())
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, email: &str, amount: i64) -> Result<Checkout, WalletError> {
        let minor = amount
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .ok_or_else(|| WalletError::Validation("amount too large".into()))?;
        let request = InitializeRequest {
            email,
            amount: minor,
            callback_url: self.config.callback_url.as_deref(),
        };

        let url = format!("{}/transaction/initialize", self.config.base_url);
        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("initialize", e))?;

        let checkout: Checkout = Self::parse("initialize", response).await?;
        tracing::info!(reference = %checkout.reference, amount, "Paystack checkout initialized");
        Ok(checkout)
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, WalletError> {
        let url = format!("{}/transaction/verify/{}", self.config.base_url, reference);
        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error("verify", e))?;

        Self::parse("verify", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, timeout_seconds: u64) -> PaystackClient {
        PaystackClient::new(PaystackConfig {
            secret_key: Secret::new("sk_test_secret".to_string()),
            base_url: server.uri(),
            callback_url: None,
            timeout_seconds,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_sends_minor_units_and_parses_checkout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_secret"))
            .and(body_json(json!({ "email": "ada@example.com", "amount": 500000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "ref1"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let checkout = client(&server, 5)
            .initialize("ada@example.com", 5000)
            .await
            .unwrap();

        assert_eq!(checkout.reference, "ref1");
        assert_eq!(checkout.checkout_url, "https://checkout.paystack.com/abc");
        assert_eq!(checkout.access_code, "abc");
    }

    #[tokio::test]
    async fn gateway_rejection_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": false,
                "message": "Invalid key"
            })))
            .mount(&server)
            .await;

        let err = client(&server, 5)
            .initialize("ada@example.com", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::GatewayUnavailable(msg) if msg == "Invalid key"));
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({ "status": true, "data": {} })),
            )
            .mount(&server)
            .await;

        let err = client(&server, 1)
            .initialize("ada@example.com", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn verify_returns_gateway_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/ref1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": { "status": "success", "amount": 500000, "reference": "ref1" }
            })))
            .mount(&server)
            .await;

        let verification = client(&server, 5).verify("ref1").await.unwrap();
        assert_eq!(
            verification,
            GatewayVerification {
                status: "success".into(),
                amount: 500000
            }
        );
    }
}
