mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{charge_success, request, sign, Auth, TestApp};
use serde_json::{json, Value};

fn webhook(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/wallet/paystack/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-paystack-signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = TestApp::spawn();

    let (status, body) = app.send(request("GET", "/health", Auth::None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, _) = app
        .send_raw(request("GET", "/metrics", Auth::None, None))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::spawn();
    let req = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = app.send_raw(req).await;
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");
}

#[tokio::test]
async fn wallet_lifecycle_over_http() {
    let app = TestApp::spawn();
    let user = app.create_user("payer@example.com").await;

    let (status, created) = app
        .send(request("POST", "/wallet", Auth::Session(&user), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, again) = app
        .send(request("POST", "/wallet", Auth::Session(&user), None))
        .await;
    assert_eq!(created["wallet_number"], again["wallet_number"]);

    let (status, deposit) = app
        .send(request(
            "POST",
            "/wallet/deposit",
            Auth::Session(&user),
            Some(json!({ "amount": 5000 })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let reference = deposit["reference"].as_str().unwrap().to_string();
    assert!(deposit["authorization_url"].as_str().unwrap().contains(&reference));

    let body = charge_success(&reference, 500_000);
    let (status, ack) = app.send(webhook(body.clone(), Some(sign(&body)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "status": true, "outcome": "credited" }));

    let (status, ack) = app.send(webhook(body.clone(), Some(sign(&body)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "duplicate");

    let (_, balance) = app
        .send(request("GET", "/wallet/balance", Auth::Session(&user), None))
        .await;
    assert_eq!(balance["balance"], 5000);

    let (status, history) = app
        .send(request("GET", "/wallet/transactions", Auth::Session(&user), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["type"], "deposit");
    assert_eq!(history[0]["status"], "success");

    let (status, report) = app
        .send(request(
            "GET",
            &format!("/wallet/deposit/{}/status", reference),
            Auth::Session(&user),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "success");
}

#[tokio::test]
async fn webhook_rejects_bad_signatures_and_bad_payloads() {
    let app = TestApp::spawn();
    let body = charge_success("ref_1", 100);

    let (status, _) = app.send(webhook(body.clone(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(webhook(body.clone(), Some("00".repeat(64))))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let garbage = b"{oops".to_vec();
    let (status, _) = app.send(webhook(garbage.clone(), Some(sign(&garbage)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transfer_errors_map_to_statuses() {
    let app = TestApp::spawn();
    let (alice, alice_wallet) = app.user_with_wallet("alice@example.com", 100).await;
    let (_, bob_wallet) = app.user_with_wallet("bob@example.com", 0).await;

    let send = |wallet_number: String, amount: i64| {
        request(
            "POST",
            "/wallet/transfer",
            Auth::Session(&alice),
            Some(json!({ "wallet_number": wallet_number, "amount": amount })),
        )
    };

    let (status, _) = app.send(send(bob_wallet.wallet_number.clone(), 500)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(send(alice_wallet.wallet_number.clone(), 10)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(send("9999999999999".into(), 10)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(send(bob_wallet.wallet_number.clone(), 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.store.fail_next_commit();
    let (status, headers, _) = app
        .send_raw(send(bob_wallet.wallet_number.clone(), 10))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(headers.contains_key("retry-after"));

    let (status, receipt) = app.send(send(bob_wallet.wallet_number.clone(), 10)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["recipient_wallet_number"], Value::from(bob_wallet.wallet_number));
}

#[tokio::test]
async fn key_listing_never_exposes_secrets() {
    let app = TestApp::spawn();
    let user = app.create_user("owner@example.com").await;

    let (status, created) = app
        .send(request(
            "POST",
            "/keys/create",
            Auth::Session(&user),
            Some(json!({ "name": "ci", "permissions": ["read"], "expiry": "2H" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["api_key"].as_str().unwrap().starts_with("sk_test_"));

    let (status, listed) = app
        .send(request("GET", "/keys", Auth::Session(&user), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first = &listed.as_array().unwrap()[0];
    assert_eq!(first["id"], created["id"]);
    assert!(first.get("api_key").is_none());
    assert!(first.get("key_hash").is_none());

    let (status, _) = app
        .send(request(
            "POST",
            "/keys/rollover",
            Auth::Session(&user),
            Some(json!({ "expired_key_id": created["id"], "expiry": "1D" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(request(
            "POST",
            "/keys/create",
            Auth::Session(&user),
            Some(json!({ "name": "ci", "permissions": ["read"], "expiry": "1W" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
