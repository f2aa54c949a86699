use crate::config::MonnifyConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::token_cache::TokenCache;
use crate::payments::types::{
    decimal_at, text_at, GatewayId, ReservedAccount, ReservedAccountRequest, WebhookEvent,
    WebhookOutcome, WebhookVerificationResult,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MonnifyGatewayConfig {
    pub api_key: String,
    pub secret_key: String,
    pub contract_code: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl MonnifyGatewayConfig {
    /// `None` unless API key, secret key and contract code are all set.
    pub fn from_config(config: &MonnifyConfig, timeout_secs: u64, max_retries: u32) -> Option<Self> {
        Some(Self {
            api_key: config.api_key.clone()?,
            secret_key: config.secret_key.clone()?,
            contract_code: config.contract_code.clone()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            max_retries,
        })
    }
}

pub struct MonnifyGateway {
    config: MonnifyGatewayConfig,
    http: PaymentHttpClient,
    tokens: TokenCache,
}

impl MonnifyGateway {
    pub fn new(config: MonnifyGatewayConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            "monnify",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self {
            config,
            http,
            tokens: TokenCache::default(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn login(&self) -> PaymentResult<(String, Duration)> {
        let basic = BASE64.encode(format!("{}:{}", self.config.api_key, self.config.secret_key));
        let authorization = format!("Basic {}", basic);

        let raw: MonnifyEnvelope<MonnifyLoginBody> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/v1/auth/login"),
                None,
                None,
                &[("Authorization", authorization.as_str())],
            )
            .await?;

        let body = raw.into_body()?;
        info!(expires_in = body.expires_in, "monnify access token issued");
        Ok((body.access_token, Duration::from_secs(body.expires_in)))
    }

    async fn access_token(&self) -> PaymentResult<String> {
        self.tokens.get_or_refresh(|| self.login()).await
    }
}

#[async_trait]
impl PaymentGateway for MonnifyGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Monnify
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
                message: format!("invalid monnify JSON payload: {}", e),
            })?;

        let event_type = text_at(&parsed, "/eventType").unwrap_or_else(|| "unknown".to_string());
        let payment_status = text_at(&parsed, "/eventData/paymentStatus");
        let outcome = match event_type.as_str() {
            "SUCCESSFUL_TRANSACTION" => match payment_status.as_deref() {
                Some("PAID") | Some("OVERPAID") | None => WebhookOutcome::Success,
                Some(_) => WebhookOutcome::Failed,
            },
            "FAILED_TRANSACTION" => WebhookOutcome::Failed,
            _ => WebhookOutcome::Ignored,
        };

        Ok(WebhookEvent {
            gateway: GatewayId::Monnify,
            event_type,
            outcome,
            external_reference: text_at(&parsed, "/eventData/transactionReference"),
            amount: decimal_at(&parsed, "/eventData/amountPaid"),
            account_number: text_at(
                &parsed,
                "/eventData/destinationAccountInformation/accountNumber",
            ),
            payload: parsed,
        })
    }

    async fn reserve_account(
        &self,
        request: ReservedAccountRequest,
    ) -> PaymentResult<ReservedAccount> {
        let token = self.access_token().await?;
        let payload = serde_json::json!({
            "accountReference": request.reference,
            "accountName": request.account_name,
            "currencyCode": "NGN",
            "contractCode": self.config.contract_code,
            "customerEmail": request.email,
            "customerName": request.account_name,
            "getAllAvailableBanks": true,
        });

        let result: PaymentResult<MonnifyEnvelope<MonnifyReservedBody>> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/v2/bank-transfer/reserved-accounts"),
                Some(&token),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await;

        let raw = match result {
            Err(PaymentError::ProviderError {
                provider_code: Some(code),
                ..
            }) if code == "401" => {
                warn!("monnify rejected cached token");
                self.tokens.invalidate().await;
                return Err(PaymentError::ProviderError {
                    provider: "monnify".to_string(),
                    message: "access token rejected".to_string(),
                    provider_code: Some(code),
                    retryable: true,
                });
            }
            other => other?,
        };

        let body = raw.into_body()?;
        let account = body
            .accounts
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::provider("monnify", "no bank account was reserved"))?;

        info!(reference = %body.account_reference, bank = %account.bank_name, "monnify account reserved");
        Ok(ReservedAccount {
            account_number: account.account_number,
            account_name: account.account_name.unwrap_or(body.account_name),
            bank_name: account.bank_name,
            reference: body.account_reference,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonnifyEnvelope<T> {
    request_successful: bool,
    #[serde(default)]
    response_message: Option<String>,
    response_body: Option<T>,
}

impl<T> MonnifyEnvelope<T> {
    fn into_body(self) -> PaymentResult<T> {
        if !self.request_successful {
            return Err(PaymentError::provider(
                "monnify",
                self.response_message
                    .unwrap_or_else(|| "request unsuccessful".to_string()),
            ));
        }
        self.response_body
            .ok_or_else(|| PaymentError::provider("monnify", "response has no body"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonnifyLoginBody {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonnifyReservedBody {
    account_reference: String,
    account_name: String,
    #[serde(default)]
    accounts: Vec<MonnifyBankAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonnifyBankAccount {
    bank_name: String,
    account_number: String,
    #[serde(default)]
    account_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha512_hex;
    use rust_decimal::Decimal;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> MonnifyGateway {
        MonnifyGateway::new(MonnifyGatewayConfig {
            api_key: "MK_TEST".to_string(),
            secret_key: "secret".to_string(),
            contract_code: "123".to_string(),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            max_retries: 0,
        })
        .unwrap()
    }

    fn reserve_request(reference: &str) -> ReservedAccountRequest {
        ReservedAccountRequest {
            reference: reference.to_string(),
            account_name: "Ada Obi".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        let basic = format!("Basic {}", BASE64.encode("MK_TEST:secret"));
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(header("authorization", basic.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "requestSuccessful": true,
                "responseMessage": "success",
                "responseCode": "0",
                "responseBody": { "accessToken": "tok-1", "expiresIn": 3599 }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn parses_reserved_account_payment() {
        let gateway = gateway("https://sandbox.monnify.com");
        let payload = serde_json::json!({
            "eventType": "SUCCESSFUL_TRANSACTION",
            "eventData": {
                "transactionReference": "MNFY|20|123",
                "paymentReference": "MNFY|20|123",
                "amountPaid": "5000.00",
                "paymentStatus": "PAID",
                "product": { "type": "RESERVED_ACCOUNT", "reference": "VA-1" },
                "destinationAccountInformation": { "accountNumber": "5000000001", "bankName": "Wema" }
            }
        })
        .to_string();

        let signature = hmac_sha512_hex(payload.as_bytes(), "secret").unwrap();
        assert!(gateway.verify_webhook(payload.as_bytes(), &signature).unwrap().valid);

        let event = gateway.parse_webhook_event(payload.as_bytes()).unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Success);
        assert_eq!(event.external_reference.as_deref(), Some("MNFY|20|123"));
        assert_eq!(event.amount, Some(Decimal::from(5000)));
        assert_eq!(event.account_number.as_deref(), Some("5000000001"));
    }

    #[tokio::test]
    async fn reserve_account_logs_in_once_and_reuses_token() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/bank-transfer/reserved-accounts"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "requestSuccessful": true,
                "responseMessage": "success",
                "responseBody": {
                    "accountReference": "VA-1",
                    "accountName": "Ada Obi",
                    "accounts": [
                        { "bankCode": "035", "bankName": "Wema bank", "accountNumber": "5000000001", "accountName": "Ada Obi" }
                    ]
                }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let gateway = gateway(&server.uri());
        let first = gateway.reserve_account(reserve_request("VA-1")).await.unwrap();
        let second = gateway.reserve_account(reserve_request("VA-1")).await.unwrap();

        assert_eq!(first.account_number, "5000000001");
        assert_eq!(first.bank_name, "Wema bank");
        assert_eq!(second.reference, "VA-1");
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_provider_error() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/api/v2/bank-transfer/reserved-accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "requestSuccessful": false,
                "responseMessage": "Cannot create account",
                "responseCode": "99"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .reserve_account(reserve_request("VA-2"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot create account"));
    }
}
