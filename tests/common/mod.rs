//! Shared fixtures: a scripted VTU provider and an in-memory app.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use vtu_platform::api::AppState;
use vtu_platform::config::ServiceFees;
use vtu_platform::database::provider_config_repository::{ProviderConfig, ProviderConfigStore};
use vtu_platform::database::{
    LedgerStore, MemoryStore, NewTransaction, PaymentMethod, Settlement, Stores, TransactionKind,
    WalletEffect,
};
use vtu_platform::payments::gateways::PayrantGateway;
use vtu_platform::payments::GatewayRegistry;
use vtu_platform::vtu::{
    ProviderRegistry, ProviderReply, ReplyStatus, ServiceKind, VtuError, VtuProvider, VtuRequest,
};

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const PAYRANT_SECRET: &str = "payrant_test_secret";

pub type ScriptedResult = Result<ProviderReply, VtuError>;

/// Provider that replays queued replies and counts calls. An empty queue
/// answers with a clean success.
pub struct ScriptedProvider {
    code: &'static str,
    purchases: Mutex<VecDeque<ScriptedResult>>,
    queries: Mutex<VecDeque<ScriptedResult>>,
    purchase_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(code: &'static str) -> Self {
        Self {
            code,
            purchases: Mutex::new(VecDeque::new()),
            queries: Mutex::new(VecDeque::new()),
            purchase_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn on_purchase(self, reply: ScriptedResult) -> Self {
        self.purchases.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_query(self, reply: ScriptedResult) -> Self {
        self.queries.lock().unwrap().push_back(reply);
        self
    }

    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VtuProvider for ScriptedProvider {
    fn code(&self) -> &'static str {
        self.code
    }

    fn supports(&self, _service: ServiceKind) -> bool {
        true
    }

    async fn purchase(&self, _request: &VtuRequest) -> Result<ProviderReply, VtuError> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        self.purchases
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(delivered("EXT-DEFAULT")))
    }

    async fn query(&self, _reference: &str) -> Result<ProviderReply, VtuError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(processing()))
    }
}

pub fn delivered(external_reference: &str) -> ProviderReply {
    ProviderReply {
        http_status: 200,
        status: ReplyStatus::Success,
        message: Some("Transaction successful".to_string()),
        external_reference: Some(external_reference.to_string()),
        token: None,
        raw: json!({"status": "success"}),
    }
}

pub fn processing() -> ProviderReply {
    ProviderReply {
        http_status: 200,
        status: ReplyStatus::Processing,
        message: Some("Transaction is being processed".to_string()),
        external_reference: None,
        token: None,
        raw: json!({"status": "processing"}),
    }
}

pub fn success_with_embedded_error() -> ProviderReply {
    ProviderReply {
        http_status: 200,
        status: ReplyStatus::Success,
        message: Some("Transaction successful".to_string()),
        external_reference: Some("EXT-EMBEDDED".to_string()),
        token: None,
        raw: json!({
            "status": "success",
            "api_response": "Error: insufficient vendor balance, contact support"
        }),
    }
}

pub fn timeout(code: &str) -> VtuError {
    VtuError::Timeout {
        provider: code.to_string(),
        message: "operation timed out".to_string(),
    }
}

pub fn provider_config(code: &str, priority: i32, active: bool) -> ProviderConfig {
    ProviderConfig {
        code: code.to_string(),
        name: code.to_uppercase(),
        priority,
        active,
        supported_services: ServiceKind::ALL.to_vec(),
        credentials: json!({}),
        updated_at: chrono::Utc::now(),
    }
}

pub fn payrant_gateway() -> Arc<PayrantGateway> {
    Arc::new(
        PayrantGateway::new(
            PAYRANT_SECRET.to_string(),
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            0,
        )
        .unwrap(),
    )
}

/// In-memory app wiring one active scripted provider and, unless told
/// otherwise, the Payrant gateway.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub state: AppState,
}

impl TestApp {
    pub async fn new(provider: ScriptedProvider) -> Self {
        Self::with_gateways(provider, GatewayRegistry::new().with_gateway(payrant_gateway())).await
    }

    pub async fn with_gateways(provider: ScriptedProvider, gateways: GatewayRegistry) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        store
            .upsert(provider_config(provider.code(), 1, true))
            .await
            .unwrap();

        let stores = Stores::memory(store.clone());
        let registry = ProviderRegistry::new(stores.providers.clone()).with_client(provider.clone());
        let state = AppState::new(
            stores,
            registry,
            gateways,
            ServiceFees::default(),
            None,
            Some(ADMIN_TOKEN.to_string()),
        );

        Self {
            store,
            provider,
            state,
        }
    }

    /// A user whose wallet holds `balance`, funded through a settled card
    /// funding so the history accounts for it.
    pub async fn funded_user(&self, balance: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.create_wallet(user_id, "NGN").await.unwrap();
        if balance > 0 {
            let amount = Decimal::from(balance);
            let reference = format!("SEED-{}", user_id.simple());
            self.store
                .insert_transaction(NewTransaction {
                    reference: reference.clone(),
                    user_id,
                    kind: TransactionKind::Funding,
                    amount,
                    fee: Decimal::ZERO,
                    payment_method: PaymentMethod::Card,
                    provider: None,
                    metadata: json!({}),
                })
                .await
                .unwrap();
            self.store
                .settle(
                    &reference,
                    Settlement::successful(WalletEffect::Credit(amount)),
                )
                .await
                .unwrap();
        }
        user_id
    }

    pub async fn balance(&self, user_id: Uuid) -> Decimal {
        self.store
            .find_wallet(user_id)
            .await
            .unwrap()
            .map(|w| w.balance)
            .unwrap_or_default()
    }
}
