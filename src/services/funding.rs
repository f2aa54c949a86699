use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::ServiceError;
use crate::database::{
    LedgerStore, NewTransaction, PaymentMethod, Settlement, TransactionKind, WalletEffect,
};
use crate::payments::types::PaymentRequest;
use crate::payments::{GatewayId, GatewayRegistry};

const MIN_FUNDING: i64 = 100;

/// Checkout session handed back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct FundingSession {
    pub reference: String,
    pub amount: Decimal,
    pub authorization_url: String,
    pub access_code: Option<String>,
}

/// Card funding through Paystack checkout. The wallet is credited later by
/// the `charge.success` webhook for the same reference.
pub struct FundingService {
    ledger: Arc<dyn LedgerStore>,
    gateways: GatewayRegistry,
    callback_url: Option<String>,
}

impl FundingService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateways: GatewayRegistry,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            ledger,
            gateways,
            callback_url,
        }
    }

    pub async fn initialize(
        &self,
        user_id: Uuid,
        amount: Decimal,
        email: &str,
    ) -> Result<FundingSession, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(amount));
        }
        if amount < Decimal::from(MIN_FUNDING) {
            return Err(ServiceError::validation(
                "amount",
                format!("minimum funding is {}", MIN_FUNDING),
            ));
        }
        if amount.scale() > 2 {
            return Err(ServiceError::validation(
                "amount",
                "must have at most two decimal places",
            ));
        }
        if !email.contains('@') {
            return Err(ServiceError::validation("email", "must be a valid email address"));
        }

        let gateway = self.gateways.get(GatewayId::Paystack)?;
        let reference = format!(
            "FUND-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let transaction = self
            .ledger
            .insert_transaction(NewTransaction {
                reference: reference.clone(),
                user_id,
                kind: TransactionKind::Funding,
                amount,
                fee: Decimal::ZERO,
                payment_method: PaymentMethod::Card,
                provider: Some(GatewayId::Paystack.as_str().to_string()),
                metadata: serde_json::json!({ "email": email }),
            })
            .await?;

        let request = PaymentRequest {
            reference: reference.clone(),
            amount,
            email: email.to_string(),
            callback_url: self.callback_url.clone(),
            metadata: Some(serde_json::json!({ "user_id": user_id })),
        };

        match gateway.initialize_payment(request).await {
            Ok(response) => {
                info!(reference = %reference, user_id = %user_id, amount = %amount, "card funding initialized");
                Ok(FundingSession {
                    reference: transaction.reference,
                    amount,
                    authorization_url: response.authorization_url,
                    access_code: response.access_code,
                })
            }
            Err(e) => {
                warn!(reference = %reference, error = %e, "card funding initialization failed");
                let settlement = Settlement::failed(e.to_string(), WalletEffect::None);
                if let Err(settle_err) = self.ledger.settle(&reference, settlement).await {
                    warn!(reference = %reference, error = %settle_err, "could not close failed funding attempt");
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, TransactionStatus};
    use crate::payments::gateways::{PaystackConfig, PaystackGateway};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service(server: &MockServer, store: Arc<MemoryStore>) -> FundingService {
        let gateway = PaystackGateway::new(PaystackConfig {
            secret_key: "sk_test_123".to_string(),
            base_url: server.uri(),
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap();
        FundingService::new(
            store,
            GatewayRegistry::new().with_gateway(Arc::new(gateway)),
            None,
        )
    }

    #[tokio::test]
    async fn creates_pending_funding_and_returns_checkout_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "ignored"
                }
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();
        let funding = service(&server, store.clone()).await;

        let session = funding
            .initialize(user, Decimal::from(2500), "ada@example.com")
            .await
            .unwrap();
        assert_eq!(session.authorization_url, "https://checkout.paystack.com/abc");

        let tx = store.find_transaction(&session.reference).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.kind, TransactionKind::Funding);
        assert_eq!(tx.amount, Decimal::from(2500));
        let wallet = store.find_wallet(user).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn rejects_small_amounts_and_missing_wallets() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let funding = service(&server, store).await;

        assert!(matches!(
            funding.initialize(Uuid::new_v4(), Decimal::from(50), "a@b.c").await,
            Err(ServiceError::Validation { field: "amount", .. })
        ));
        assert!(matches!(
            funding.initialize(Uuid::new_v4(), Decimal::from(500), "a@b.c").await,
            Err(ServiceError::WalletNotFound(_))
        ));
    }
}
