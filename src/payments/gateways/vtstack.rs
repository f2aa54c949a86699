use crate::config::GatewayCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    decimal_at, text_at, GatewayId, ReservedAccount, ReservedAccountRequest, WebhookEvent,
    WebhookOutcome, WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha256_hex, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// VTStack bank-transfer deposits into reserved accounts.
pub struct VtstackGateway {
    secret_key: String,
    base_url: String,
    http: PaymentHttpClient,
}

impl VtstackGateway {
    pub fn new(secret_key: String, base_url: &str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        Ok(Self {
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: PaymentHttpClient::new("vtstack", timeout, max_retries)?,
        })
    }

    pub fn from_credentials(
        credentials: &GatewayCredentials,
        timeout: Duration,
        max_retries: u32,
    ) -> Option<PaymentResult<Self>> {
        let secret = credentials.secret_key.clone()?;
        Some(Self::new(secret, &credentials.base_url, timeout, max_retries))
    }
}

#[async_trait]
impl PaymentGateway for VtstackGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Vtstack
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha256_hex(payload, &self.secret_key, signature);
        Ok(WebhookVerificationResult::from_check(valid, self.id()))
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue =
            serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedPayload {
                message: format!("invalid vtstack JSON payload: {}", e),
            })?;

        let event_type = text_at(&parsed, "/type").unwrap_or_else(|| "unknown".to_string());
        let outcome = match event_type.as_str() {
            "deposit.successful" => WebhookOutcome::Success,
            "deposit.failed" | "deposit.reversed" => WebhookOutcome::Failed,
            _ => WebhookOutcome::Ignored,
        };

        Ok(WebhookEvent {
            gateway: GatewayId::Vtstack,
            event_type,
            outcome,
            external_reference: text_at(&parsed, "/payload/transaction_id"),
            amount: decimal_at(&parsed, "/payload/amount"),
            account_number: text_at(&parsed, "/payload/account_number"),
            payload: parsed,
        })
    }

    async fn reserve_account(
        &self,
        request: ReservedAccountRequest,
    ) -> PaymentResult<ReservedAccount> {
        let payload = serde_json::json!({
            "customer_reference": request.reference,
            "name": request.account_name,
            "email": request.email,
        });

        let raw: VtstackEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &format!("{}/v1/accounts/reserve", self.base_url),
                None,
                Some(&payload),
                &[("x-api-key", self.secret_key.as_str())],
            )
            .await?;

        if !raw.success {
            return Err(PaymentError::provider(
                "vtstack",
                raw.message
                    .unwrap_or_else(|| "account reservation failed".to_string()),
            ));
        }
        let account = raw
            .account
            .ok_or_else(|| PaymentError::provider("vtstack", "response has no account"))?;

        info!(reference = %request.reference, bank = %account.bank, "vtstack account reserved");
        Ok(ReservedAccount {
            account_number: account.number,
            account_name: account.name,
            bank_name: account.bank,
            reference: request.reference,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VtstackEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    account: Option<VtstackAccount>,
}

#[derive(Debug, Deserialize)]
struct VtstackAccount {
    number: String,
    name: String,
    bank: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha256_hex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> VtstackGateway {
        VtstackGateway::new("vs_secret".to_string(), base_url, Duration::from_secs(5), 0).unwrap()
    }

    #[test]
    fn parses_deposit_events() {
        let gateway = gateway("https://api.vtstack.com.ng");
        let payload = br#"{"type":"deposit.successful","payload":{"transaction_id":"VS-1","amount":"1200.00","account_number":"7000000001"}}"#;
        let signature = hmac_sha256_hex(payload, "vs_secret").unwrap();
        assert!(gateway.verify_webhook(payload, &signature).unwrap().valid);

        let event = gateway.parse_webhook_event(payload).unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Success);
        assert_eq!(event.external_reference.as_deref(), Some("VS-1"));

        let failed = gateway
            .parse_webhook_event(br#"{"type":"deposit.failed","payload":{"transaction_id":"VS-2"}}"#)
            .unwrap();
        assert_eq!(failed.outcome, WebhookOutcome::Failed);
    }

    #[tokio::test]
    async fn reserve_account_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/reserve"))
            .and(header("x-api-key", "vs_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "KYC incomplete"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .reserve_account(ReservedAccountRequest {
                reference: "VA-3".to_string(),
                account_name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("KYC incomplete"));
    }
}
