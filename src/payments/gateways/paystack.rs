use crate::config::GatewayCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    decimal_at, text_at, GatewayId, PaymentRequest, PaymentResponse, WebhookEvent,
    WebhookOutcome, WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    /// `None` when no secret key is configured.
    pub fn from_credentials(
        credentials: &GatewayCredentials,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Option<Self> {
        Some(Self {
            secret_key: credentials.secret_key.clone()?,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            max_retries,
        })
    }
}

pub struct PaystackGateway {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            "paystack",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

/// Paystack amounts are in kobo.
fn to_kobo(amount: Decimal) -> PaymentResult<i64> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or(PaymentError::ValidationError {
            message: "amount is out of range".to_string(),
            field: Some("amount".to_string()),
        })
}

fn from_kobo(kobo: Decimal) -> Decimal {
    (kobo / Decimal::from(100)).round_dp(2)
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Paystack
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha512_hex(payload, &self.config.secret_key, signature);
        Ok(WebhookVerificationResult::from_check(valid, self.id()))
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue =
            serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedPayload {
                message: format!("invalid paystack JSON payload: {}", e),
            })?;

        let event_type = text_at(&parsed, "/event").unwrap_or_else(|| "unknown".to_string());
        let status = text_at(&parsed, "/data/status");
        let outcome = match (event_type.as_str(), status.as_deref()) {
            ("charge.success", Some("success")) | ("charge.success", None) => {
                WebhookOutcome::Success
            }
            ("charge.success", Some(_)) | ("charge.failed", _) => WebhookOutcome::Failed,
            _ => WebhookOutcome::Ignored,
        };

        Ok(WebhookEvent {
            gateway: GatewayId::Paystack,
            event_type,
            outcome,
            external_reference: text_at(&parsed, "/data/reference"),
            amount: decimal_at(&parsed, "/data/amount").map(from_kobo),
            account_number: text_at(&parsed, "/data/authorization/receiver_bank_account_number"),
            payload: parsed,
        })
    }

    async fn initialize_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        request.validate()?;

        let payload = serde_json::json!({
            "email": request.email,
            "amount": to_kobo(request.amount)?,
            "currency": "NGN",
            "reference": request.reference,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
        });

        let raw: PaystackEnvelope<PaystackInitializeData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if !raw.status {
            return Err(PaymentError::provider("paystack", raw.message));
        }
        let data = raw.data.ok_or_else(|| {
            PaymentError::provider("paystack", "initialize response has no data")
        })?;
        info!(reference = %data.reference, "paystack payment initiated");

        Ok(PaymentResponse {
            reference: data.reference,
            authorization_url: data.authorization_url,
            access_code: Some(data.access_code),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha512_hex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> PaystackGateway {
        PaystackGateway::new(PaystackConfig {
            secret_key: "sk_test".to_string(),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap()
    }

    #[test]
    fn webhook_signature_validation() {
        let gateway = gateway("https://api.paystack.co");
        let payload = br#"{"event":"charge.success"}"#;
        assert!(!gateway.verify_webhook(payload, "invalid_signature").unwrap().valid);

        let signature = hmac_sha512_hex(payload, "sk_test").unwrap();
        assert!(gateway.verify_webhook(payload, &signature).unwrap().valid);
    }

    #[test]
    fn parses_dedicated_account_charge() {
        let gateway = gateway("https://api.paystack.co");
        let payload = serde_json::json!({
            "event": "charge.success",
            "data": {
                "reference": "T123",
                "amount": 500000,
                "status": "success",
                "channel": "dedicated_nuban",
                "authorization": { "receiver_bank_account_number": "9912345678" }
            }
        });
        let event = gateway
            .parse_webhook_event(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Success);
        assert_eq!(event.external_reference.as_deref(), Some("T123"));
        assert_eq!(event.amount, Some(Decimal::from(5000)));
        assert_eq!(event.account_number.as_deref(), Some("9912345678"));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let gateway = gateway("https://api.paystack.co");
        let event = gateway
            .parse_webhook_event(br#"{"event":"subscription.create","data":{}}"#)
            .unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Ignored);
        assert!(gateway.parse_webhook_event(b"not json").is_err());
    }

    #[tokio::test]
    async fn initialize_sends_kobo_and_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test"))
            .and(body_partial_json(serde_json::json!({
                "amount": 150050,
                "reference": "FUND-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "FUND-1"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = gateway(&server.uri())
            .initialize_payment(PaymentRequest {
                reference: "FUND-1".to_string(),
                amount: Decimal::new(150050, 2),
                email: "ada@example.com".to_string(),
                callback_url: None,
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(response.authorization_url, "https://checkout.paystack.com/abc");
        assert_eq!(response.access_code.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn initialize_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": false,
                "message": "Invalid key"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .initialize_payment(PaymentRequest {
                reference: "FUND-2".to_string(),
                amount: Decimal::from(100),
                email: "ada@example.com".to_string(),
                callback_url: None,
                metadata: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProviderError { .. }));
    }
}
