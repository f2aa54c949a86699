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

/// Payrant dedicated accounts. Webhooks are signed with HMAC-SHA256.
pub struct PayrantGateway {
    secret_key: String,
    base_url: String,
    http: PaymentHttpClient,
}

impl PayrantGateway {
    pub fn new(secret_key: String, base_url: &str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        Ok(Self {
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: PaymentHttpClient::new("payrant", timeout, max_retries)?,
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
impl PaymentGateway for PayrantGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Payrant
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
                message: format!("invalid payrant JSON payload: {}", e),
            })?;

        let event_type = text_at(&parsed, "/event").unwrap_or_else(|| "unknown".to_string());
        let status = text_at(&parsed, "/data/status").map(|s| s.to_lowercase());
        let outcome = if event_type.starts_with("virtual_account.") || event_type.starts_with("payment.") {
            match status.as_deref() {
                Some("success") | Some("successful") | Some("completed") => WebhookOutcome::Success,
                Some("failed") | Some("reversed") => WebhookOutcome::Failed,
                _ => WebhookOutcome::Ignored,
            }
        } else {
            WebhookOutcome::Ignored
        };

        Ok(WebhookEvent {
            gateway: GatewayId::Payrant,
            event_type,
            outcome,
            external_reference: text_at(&parsed, "/data/reference"),
            amount: decimal_at(&parsed, "/data/amount"),
            account_number: text_at(&parsed, "/data/account_number"),
            payload: parsed,
        })
    }

    async fn reserve_account(
        &self,
        request: ReservedAccountRequest,
    ) -> PaymentResult<ReservedAccount> {
        let payload = serde_json::json!({
            "reference": request.reference,
            "account_name": request.account_name,
            "email": request.email,
        });

        let raw: PayrantEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &format!("{}/api/v1/virtual-accounts", self.base_url),
                Some(&self.secret_key),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        let data = match (raw.status, raw.data) {
            (true, Some(data)) => data,
            (_, _) => {
                return Err(PaymentError::provider(
                    "payrant",
                    raw.message.unwrap_or_else(|| "account reservation failed".to_string()),
                ))
            }
        };

        info!(reference = %request.reference, bank = %data.bank_name, "payrant account reserved");
        Ok(ReservedAccount {
            account_number: data.account_number,
            account_name: data.account_name,
            bank_name: data.bank_name,
            reference: request.reference,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PayrantEnvelope {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<PayrantAccount>,
}

#[derive(Debug, Deserialize)]
struct PayrantAccount {
    account_number: String,
    account_name: String,
    bank_name: String,
}
