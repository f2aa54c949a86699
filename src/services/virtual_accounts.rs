use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::ServiceError;
use crate::database::virtual_account_repository::{
    NewVirtualAccount, VirtualAccount, VirtualAccountStore,
};
use crate::database::LedgerStore;
use crate::payments::types::ReservedAccountRequest;
use crate::payments::{GatewayId, GatewayRegistry};

/// Name and email the gateway prints on the reserved account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountHolder {
    pub account_name: String,
    pub email: String,
}

pub struct VirtualAccountService {
    gateways: GatewayRegistry,
    accounts: Arc<dyn VirtualAccountStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl VirtualAccountService {
    pub fn new(
        gateways: GatewayRegistry,
        accounts: Arc<dyn VirtualAccountStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            gateways,
            accounts,
            ledger,
        }
    }

    /// Stable per user and gateway, so a retried reservation is recognised upstream.
    pub fn reference_for(user_id: Uuid, gateway: GatewayId) -> String {
        format!("VA-{}-{}", gateway.as_str().to_uppercase(), user_id.simple())
    }

    /// Existing account for `(user, gateway)`, or a freshly reserved one.
    pub async fn provision(
        &self,
        user_id: Uuid,
        gateway: GatewayId,
        holder: AccountHolder,
    ) -> Result<VirtualAccount, ServiceError> {
        if let Some(existing) = self.accounts.find_for_user(user_id, gateway.as_str()).await? {
            return Ok(existing);
        }
        if holder.account_name.trim().is_empty() {
            return Err(ServiceError::validation("account_name", "is required"));
        }
        if !holder.email.contains('@') {
            return Err(ServiceError::validation("email", "must be a valid email address"));
        }
        self.ledger
            .find_wallet(user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound(user_id))?;

        let client = self.gateways.get(gateway)?;
        let reference = Self::reference_for(user_id, gateway);
        let reserved = client
            .reserve_account(ReservedAccountRequest {
                reference: reference.clone(),
                account_name: holder.account_name,
                email: holder.email,
            })
            .await?;

        let new_account = NewVirtualAccount {
            user_id,
            provider: gateway.as_str().to_string(),
            account_number: reserved.account_number,
            account_name: reserved.account_name,
            bank_name: reserved.bank_name,
            reference,
        };

        match self.accounts.insert(new_account).await {
            Ok(account) => {
                info!(
                    user_id = %user_id,
                    gateway = %gateway,
                    account_number = %account.account_number,
                    bank = %account.bank_name,
                    "virtual account provisioned"
                );
                Ok(account)
            }
            Err(e) if e.is_unique_violation() => {
                warn!(user_id = %user_id, gateway = %gateway, "concurrent provisioning, returning stored account");
                self.accounts
                    .find_for_user(user_id, gateway.as_str())
                    .await?
                    .ok_or(ServiceError::Storage(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<VirtualAccount>, ServiceError> {
        Ok(self.accounts.list_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::payments::gateways::PayrantGateway;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn holder() -> AccountHolder {
        AccountHolder {
            account_name: "Ada Obi".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    async fn service(server: &MockServer, store: Arc<MemoryStore>) -> VirtualAccountService {
        let gateway =
            PayrantGateway::new("pr_secret".to_string(), &server.uri(), Duration::from_secs(5), 0)
                .unwrap();
        VirtualAccountService::new(
            GatewayRegistry::new().with_gateway(Arc::new(gateway)),
            store.clone(),
            store,
        )
    }

    #[tokio::test]
    async fn reserves_once_then_returns_existing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/virtual-accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "data": {
                    "account_number": "8012345678",
                    "account_name": "VTU/Ada Obi",
                    "bank_name": "PalmPay"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();
        let service = service(&server, store).await;

        let first = service.provision(user, GatewayId::Payrant, holder()).await.unwrap();
        let second = service.provision(user, GatewayId::Payrant, holder()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.account_number, "8012345678");
        assert_eq!(service.list(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_gateway_is_an_error() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();
        let service = service(&server, store).await;

        assert!(matches!(
            service.provision(user, GatewayId::Monnify, holder()).await,
            Err(ServiceError::Gateway(_))
        ));
    }
}
