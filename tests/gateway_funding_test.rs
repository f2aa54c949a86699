//! Funding across several gateways.
//!
//! Covers:
//! - card checkout through Paystack settles once on `charge.success`
//! - Monnify reserved-account transfers over the HTTP webhook route
//! - gateways that reuse each other's transfer ids credit the right wallet
//! - one gateway cannot settle a funding opened with another

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use vtu_platform::api;
use vtu_platform::database::virtual_account_repository::{NewVirtualAccount, VirtualAccountStore};
use vtu_platform::database::{LedgerStore, TransactionStatus};
use vtu_platform::payments::gateways::{
    MonnifyGateway, MonnifyGatewayConfig, PaystackConfig, PaystackGateway, VtstackGateway,
};
use vtu_platform::payments::utils::{hmac_sha256_hex, hmac_sha512_hex};
use vtu_platform::payments::{GatewayId, GatewayRegistry};
use vtu_platform::services::{deposit_reference, ReconcileError};

const PAYSTACK_SECRET: &str = "sk_test_paystack";
const MONNIFY_SECRET: &str = "monnify_test_secret";
const VTSTACK_SECRET: &str = "vtstack_test_secret";

async fn app_with_all_gateways(paystack_url: &str) -> TestApp {
    let paystack = PaystackGateway::new(PaystackConfig {
        secret_key: PAYSTACK_SECRET.to_string(),
        base_url: paystack_url.to_string(),
        timeout_secs: 5,
        max_retries: 0,
    })
    .unwrap();
    let monnify = MonnifyGateway::new(MonnifyGatewayConfig {
        api_key: "MK_TEST".to_string(),
        secret_key: MONNIFY_SECRET.to_string(),
        contract_code: "1234567890".to_string(),
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 1,
        max_retries: 0,
    })
    .unwrap();
    let vtstack = VtstackGateway::new(
        VTSTACK_SECRET.to_string(),
        "http://127.0.0.1:9",
        Duration::from_secs(1),
        0,
    )
    .unwrap();

    let gateways = GatewayRegistry::new()
        .with_gateway(payrant_gateway())
        .with_gateway(Arc::new(paystack))
        .with_gateway(Arc::new(monnify))
        .with_gateway(Arc::new(vtstack));
    TestApp::with_gateways(ScriptedProvider::new("vtpass"), gateways).await
}

async fn user_with_account(app: &TestApp, provider: &str, account_number: &str) -> Uuid {
    let user = app.funded_user(0).await;
    app.store
        .insert(NewVirtualAccount {
            user_id: user,
            provider: provider.to_string(),
            account_number: account_number.to_string(),
            account_name: "ADA OKAFOR".to_string(),
            bank_name: "Wema Bank".to_string(),
            reference: format!("VA-{}-{}", provider.to_uppercase(), user.simple()),
        })
        .await
        .unwrap();
    user
}

async fn mock_paystack_checkout() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/xyz",
                "access_code": "xyz",
                "reference": "ignored"
            }
        })))
        .mount(&server)
        .await;
    server
}

fn webhook(uri: &str, header: &str, signature: &str, payload: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(header, signature)
        .body(Body::from(payload))
        .unwrap()
}

#[tokio::test]
async fn paystack_checkout_is_credited_once() {
    let server = mock_paystack_checkout().await;
    let app = app_with_all_gateways(&server.uri()).await;
    let user = app.funded_user(0).await;

    let session = app
        .state
        .funding
        .initialize(user, Decimal::from(5000), "ada@example.com")
        .await
        .unwrap();
    assert_eq!(app.balance(user).await, Decimal::ZERO);

    let payload = serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "reference": session.reference,
            "status": "success",
            "amount": 500000,
            "currency": "NGN"
        }
    }))
    .unwrap();
    let signature = hmac_sha512_hex(&payload, PAYSTACK_SECRET).unwrap();

    let first = app
        .state
        .reconciler
        .handle_webhook("paystack", &payload, Some(&signature))
        .await
        .unwrap();
    assert_eq!(first.status, Some(TransactionStatus::Successful));
    assert!(!first.already_processed);
    assert_eq!(app.balance(user).await, Decimal::from(5000));

    let replay = app
        .state
        .reconciler
        .handle_webhook("paystack", &payload, Some(&signature))
        .await
        .unwrap();
    assert!(replay.already_processed);
    assert_eq!(app.balance(user).await, Decimal::from(5000));

    let stored = app
        .store
        .find_transaction(&session.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Successful);
    assert_eq!(stored.external_reference.as_deref(), Some(session.reference.as_str()));
}

#[tokio::test]
async fn paystack_charge_with_another_amount_is_refused() {
    let server = mock_paystack_checkout().await;
    let app = app_with_all_gateways(&server.uri()).await;
    let user = app.funded_user(0).await;
    let session = app
        .state
        .funding
        .initialize(user, Decimal::from(5000), "ada@example.com")
        .await
        .unwrap();

    let payload = serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {"reference": session.reference, "status": "success", "amount": 50000}
    }))
    .unwrap();
    let signature = hmac_sha512_hex(&payload, PAYSTACK_SECRET).unwrap();
    let err = app
        .state
        .reconciler
        .handle_webhook("paystack", &payload, Some(&signature))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::AmountMismatch { .. }));
    assert_eq!(app.balance(user).await, Decimal::ZERO);
}

#[tokio::test]
async fn monnify_transfer_over_http_credits_once() {
    let app = app_with_all_gateways("http://127.0.0.1:9").await;
    let user = user_with_account(&app, "monnify", "5000012345").await;

    let payload = serde_json::to_vec(&json!({
        "eventType": "SUCCESSFUL_TRANSACTION",
        "eventData": {
            "transactionReference": "MNFY|20261018|000123",
            "paymentReference": "MNFY|20261018|000123",
            "amountPaid": "7500.00",
            "paymentStatus": "PAID",
            "destinationAccountInformation": {
                "bankName": "Wema Bank",
                "accountNumber": "5000012345"
            }
        }
    }))
    .unwrap();
    let signature = hmac_sha512_hex(&payload, MONNIFY_SECRET).unwrap();

    for _ in 0..2 {
        let response = api::router(app.state.clone())
            .oneshot(webhook(
                "/webhooks/monnify",
                "monnify-signature",
                &signature,
                payload.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.balance(user).await, Decimal::from(7500));
    }

    let stored = app
        .store
        .find_transaction(&deposit_reference(GatewayId::Monnify, "MNFY|20261018|000123"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Successful);
    assert_eq!(stored.user_id, user);
    assert_eq!(app.store.list_transactions(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn monnify_signature_from_another_secret_is_ignored() {
    let app = app_with_all_gateways("http://127.0.0.1:9").await;
    let user = user_with_account(&app, "monnify", "5000099999").await;

    let payload = serde_json::to_vec(&json!({
        "eventType": "SUCCESSFUL_TRANSACTION",
        "eventData": {
            "transactionReference": "MNFY|FORGED",
            "amountPaid": "9000.00",
            "paymentStatus": "PAID",
            "destinationAccountInformation": {"accountNumber": "5000099999"}
        }
    }))
    .unwrap();
    let signature = hmac_sha512_hex(&payload, PAYSTACK_SECRET).unwrap();

    let response = api::router(app.state.clone())
        .oneshot(webhook("/webhooks/monnify", "monnify-signature", &signature, payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.balance(user).await, Decimal::ZERO);
}

#[tokio::test]
async fn same_transfer_id_on_two_gateways_credits_both_owners() {
    let app = app_with_all_gateways("http://127.0.0.1:9").await;
    let payrant_user = user_with_account(&app, "payrant", "9012345678").await;
    let vtstack_user = user_with_account(&app, "vtstack", "7000000001").await;

    let payrant = serde_json::to_vec(&json!({
        "event": "virtual_account.credited",
        "data": {
            "reference": "TX-1001",
            "status": "success",
            "amount": 5000,
            "account_number": "9012345678"
        }
    }))
    .unwrap();
    let ack = app
        .state
        .reconciler
        .handle_webhook(
            "payrant",
            &payrant,
            Some(&hmac_sha256_hex(&payrant, PAYRANT_SECRET).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, Some(TransactionStatus::Successful));

    let vtstack = serde_json::to_vec(&json!({
        "type": "deposit.successful",
        "payload": {
            "transaction_id": "TX-1001",
            "amount": "3000.00",
            "account_number": "7000000001"
        }
    }))
    .unwrap();
    let ack = app
        .state
        .reconciler
        .handle_webhook(
            "vtstack",
            &vtstack,
            Some(&hmac_sha256_hex(&vtstack, VTSTACK_SECRET).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, Some(TransactionStatus::Successful));
    assert!(!ack.already_processed);

    assert_eq!(app.balance(payrant_user).await, Decimal::from(5000));
    assert_eq!(app.balance(vtstack_user).await, Decimal::from(3000));

    let payrant_row = app
        .store
        .find_transaction(&deposit_reference(GatewayId::Payrant, "TX-1001"))
        .await
        .unwrap()
        .unwrap();
    let vtstack_row = app
        .store
        .find_transaction(&deposit_reference(GatewayId::Vtstack, "TX-1001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payrant_row.user_id, payrant_user);
    assert_eq!(vtstack_row.user_id, vtstack_user);
    assert_eq!(vtstack_row.external_reference.as_deref(), Some("TX-1001"));
}

#[tokio::test]
async fn deposit_to_another_gateways_account_is_not_applied() {
    let app = app_with_all_gateways("http://127.0.0.1:9").await;
    let user = user_with_account(&app, "payrant", "9012345678").await;

    let vtstack = serde_json::to_vec(&json!({
        "type": "deposit.successful",
        "payload": {
            "transaction_id": "VS-77",
            "amount": "2500.00",
            "account_number": "9012345678"
        }
    }))
    .unwrap();
    let err = app
        .state
        .reconciler
        .handle_webhook(
            "vtstack",
            &vtstack,
            Some(&hmac_sha256_hex(&vtstack, VTSTACK_SECRET).unwrap()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::TransactionNotFound(_)));
    assert_eq!(app.balance(user).await, Decimal::ZERO);
}

#[tokio::test]
async fn payrant_event_cannot_settle_a_paystack_checkout() {
    let server = mock_paystack_checkout().await;
    let app = app_with_all_gateways(&server.uri()).await;
    let user = app.funded_user(0).await;
    let session = app
        .state
        .funding
        .initialize(user, Decimal::from(5000), "ada@example.com")
        .await
        .unwrap();

    let payload = serde_json::to_vec(&json!({
        "event": "payment.completed",
        "data": {"reference": session.reference, "status": "success", "amount": 5000}
    }))
    .unwrap();
    let err = app
        .state
        .reconciler
        .handle_webhook(
            "payrant",
            &payload,
            Some(&hmac_sha256_hex(&payload, PAYRANT_SECRET).unwrap()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::TransactionNotFound(_)));
    assert_eq!(app.balance(user).await, Decimal::ZERO);
    let stored = app
        .store
        .find_transaction(&session.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}
