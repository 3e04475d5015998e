mod common;

use common::TestApp;
use wallet_service::models::{TransactionKind, TransactionStatus};
use wallet_service::services::WalletError;

#[tokio::test]
async fn deposit_records_a_pending_entry_before_returning() {
    let app = TestApp::spawn();
    let (user, wallet) = app.user_with_wallet("payer@example.com", 0).await;

    let handle = app.state.wallets.deposit(&user, 5_000).await.unwrap();
    assert_eq!(handle.reference, "ref_1");
    assert_eq!(handle.amount, 5_000);
    assert_eq!(handle.checkout_url, "https://checkout.test/ref_1");

    let entries = app.state.wallets.list_transactions(&user).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.wallet_id, wallet.id);
    assert_eq!(entry.kind, TransactionKind::Deposit);
    assert_eq!(entry.status, TransactionStatus::Pending);
    assert_eq!(entry.amount, 5_000);
    assert_eq!(entry.reference.as_deref(), Some("ref_1"));
    assert_eq!(
        entry.metadata.checkout_url.as_deref(),
        Some("https://checkout.test/ref_1")
    );

    // Pending deposits are not spendable.
    assert_eq!(app.balance_of(&user).await, 0);
}

#[tokio::test]
async fn gateway_outage_records_nothing() {
    let app = TestApp::spawn();
    let (user, _) = app.user_with_wallet("payer@example.com", 0).await;
    app.gateway.set_unavailable(true);

    assert!(matches!(
        app.state.wallets.deposit(&user, 1_000).await,
        Err(WalletError::GatewayUnavailable(_))
    ));
    assert!(app.state.wallets.list_transactions(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn deposit_validates_amount_user_and_wallet() {
    let app = TestApp::spawn();
    let (user, _) = app.user_with_wallet("payer@example.com", 0).await;
    let walletless = app.create_user("nowallet@example.com").await;

    assert!(matches!(
        app.state.wallets.deposit(&user, 0).await,
        Err(WalletError::Validation(_))
    ));
    assert!(matches!(
        app.state.wallets.deposit("ghost", 10).await,
        Err(WalletError::NotFound("user"))
    ));
    assert!(matches!(
        app.state.wallets.deposit(&walletless, 10).await,
        Err(WalletError::NotFound("wallet"))
    ));
    assert_eq!(app.gateway.initialized_count(), 0);
}

#[tokio::test]
async fn funded_deposit_shows_up_newest_first() {
    let app = TestApp::spawn();
    let (user, _) = app.user_with_wallet("payer@example.com", 0).await;

    app.fund(&user, 1_000).await;
    let second = app.state.wallets.deposit(&user, 200).await.unwrap();

    let entries = app.state.wallets.list_transactions(&user).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].reference.as_deref(), Some(second.reference.as_str()));
    assert_eq!(entries[0].status, TransactionStatus::Pending);
    assert_eq!(entries[1].status, TransactionStatus::Success);
    assert_eq!(app.balance_of(&user).await, 1_000);
}

#[tokio::test]
async fn deposit_status_reports_without_crediting() {
    let app = TestApp::spawn();
    let (user, _) = app.user_with_wallet("payer@example.com", 0).await;
    let handle = app.state.wallets.deposit(&user, 300).await.unwrap();

    let status = app
        .state
        .wallets
        .deposit_status(&user, &handle.reference)
        .await
        .unwrap();
    assert_eq!(status.status, TransactionStatus::Pending);
    assert_eq!(status.amount, 300);
    let gateway = status.gateway.unwrap();
    assert_eq!(gateway.status, "success");
    assert_eq!(gateway.amount, 30_000);

    // The gateway says paid; only the webhook may credit.
    assert_eq!(app.balance_of(&user).await, 0);

    app.gateway.set_unavailable(true);
    let status = app
        .state
        .wallets
        .deposit_status(&user, &handle.reference)
        .await
        .unwrap();
    assert!(status.gateway.is_none());
}

#[tokio::test]
async fn deposit_status_is_scoped_to_the_callers_deposits() {
    let app = TestApp::spawn();
    let (owner, _) = app.user_with_wallet("owner@example.com", 500).await;
    let (other, other_wallet) = app.user_with_wallet("other@example.com", 0).await;
    let handle = app.state.wallets.deposit(&owner, 100).await.unwrap();

    assert!(matches!(
        app.state.wallets.deposit_status(&other, &handle.reference).await,
        Err(WalletError::NotFound(_))
    ));

    let receipt = app
        .state
        .transfers
        .transfer(&owner, &other_wallet.wallet_number, 50)
        .await
        .unwrap();
    assert!(matches!(
        app.state.wallets.deposit_status(&other, &receipt.credit_reference).await,
        Err(WalletError::NotFound(_))
    ));
}

#[tokio::test]
async fn create_wallet_is_idempotent() {
    let app = TestApp::spawn();
    let user = app.create_user("payer@example.com").await;

    let first = app.state.wallets.create_wallet(&user).await.unwrap();
    let second = app.state.wallets.create_wallet(&user).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.wallet_number, second.wallet_number);
    assert_eq!(first.balance, 0);
    assert_eq!(first.currency, "NGN");
}
