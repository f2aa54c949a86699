use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{
    GatewayId, PaymentRequest, PaymentResponse, ReservedAccount, ReservedAccountRequest,
    WebhookEvent, WebhookVerificationResult,
};
use async_trait::async_trait;

/// A payment gateway that funds wallets: card checkout, dedicated accounts
/// and the webhooks that confirm both.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> GatewayId;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;

    async fn initialize_payment(&self, _request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        Err(PaymentError::Unsupported {
            gateway: self.id().to_string(),
            operation: "card payments",
        })
    }

    async fn reserve_account(
        &self,
        _request: ReservedAccountRequest,
    ) -> PaymentResult<ReservedAccount> {
        Err(PaymentError::Unsupported {
            gateway: self.id().to_string(),
            operation: "reserved accounts",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::WebhookOutcome;

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        fn id(&self) -> GatewayId {
            GatewayId::Payrant
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> PaymentResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            Ok(WebhookEvent {
                gateway: GatewayId::Payrant,
                event_type: "mock".to_string(),
                outcome: WebhookOutcome::Ignored,
                external_reference: None,
                amount: None,
                account_number: None,
                payload: serde_json::json!({}),
            })
        }
    }

    #[tokio::test]
    async fn default_operations_are_unsupported() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);
        let err = gateway
            .initialize_payment(PaymentRequest {
                reference: "FUND-1".to_string(),
                amount: rust_decimal::Decimal::from(100),
                email: "a@b.c".to_string(),
                callback_url: None,
                metadata: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Unsupported { .. }));
        assert!(gateway.verify_webhook(b"{}", "sig").unwrap().valid);
    }
}
