use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::vtu::provider::{build_http_client, read_body, str_at, string_at, VtuProvider};
use crate::vtu::types::{Network, ProviderReply, ReplyStatus, ServiceKind, VtuRequest};
use crate::vtu::VtuError;

const PROVIDER: &str = "vtpass";

pub struct VtpassProvider {
    client: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
}

impl VtpassProvider {
    pub fn new(
        api_key: String,
        secret_key: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self, VtuError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            api_key,
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn network_service_id(network: Network) -> &'static str {
        match network {
            Network::Mtn => "mtn",
            Network::Glo => "glo",
            Network::Airtel => "airtel",
            Network::NineMobile => "etisalat",
        }
    }

    fn payload(request: &VtuRequest) -> Result<JsonValue, VtuError> {
        let invalid = |message: &str| VtuError::InvalidRequest {
            provider: PROVIDER.to_string(),
            message: message.to_string(),
        };

        let payload = match request.service {
            ServiceKind::Airtime => {
                let network = request.network.ok_or_else(|| invalid("network is required"))?;
                json!({
                    "request_id": request.reference,
                    "serviceID": Self::network_service_id(network),
                    "amount": request.amount,
                    "phone": request.phone_number,
                })
            }
            ServiceKind::Data => {
                let network = request.network.ok_or_else(|| invalid("network is required"))?;
                json!({
                    "request_id": request.reference,
                    "serviceID": format!("{}-data", Self::network_service_id(network)),
                    "billersCode": request.phone_number,
                    "variation_code": request.plan_code,
                    "amount": request.amount,
                    "phone": request.phone_number,
                })
            }
            ServiceKind::Cable => {
                // Bouquet codes are prefixed with the operator, e.g. `dstv-compact`.
                let plan = request
                    .plan_code
                    .as_deref()
                    .ok_or_else(|| invalid("bouquet is required"))?;
                let operator = plan.split('-').next().unwrap_or(plan);
                json!({
                    "request_id": request.reference,
                    "serviceID": operator,
                    "billersCode": request.customer_id,
                    "variation_code": plan,
                    "amount": request.amount,
                    "phone": request.phone_number,
                    "subscription_type": "change",
                })
            }
            ServiceKind::Electricity => json!({
                "request_id": request.reference,
                "serviceID": request.plan_code,
                "billersCode": request.customer_id,
                "variation_code": "prepaid",
                "amount": request.amount,
                "phone": request.phone_number,
            }),
            ServiceKind::ExamPin => json!({
                "request_id": request.reference,
                "serviceID": request.plan_code.as_deref().unwrap_or("waec"),
                "variation_code": "waecdirect",
                "quantity": request.quantity.unwrap_or(1),
                "amount": request.amount,
                "phone": request.phone_number,
            }),
        };
        Ok(payload)
    }

    /// `000` carries the real status in `content.transactions.status`; `099`
    /// means still processing; every other code is a failure.
    fn to_reply(http_status: u16, body: JsonValue) -> ProviderReply {
        let code = str_at(&body, &["code"]).unwrap_or_default();
        let status = match code {
            "000" => match str_at(&body, &["content", "transactions", "status"]) {
                Some("delivered") => ReplyStatus::Success,
                Some("pending") | Some("initiated") => ReplyStatus::Processing,
                Some("failed") | Some("reversed") => ReplyStatus::Failed,
                Some(other) => ReplyStatus::Unrecognized(other.to_string()),
                None => ReplyStatus::Success,
            },
            "099" => ReplyStatus::Processing,
            "" => ReplyStatus::Unrecognized("missing code".to_string()),
            _ => ReplyStatus::Failed,
        };

        ProviderReply {
            http_status,
            status,
            message: str_at(&body, &["response_description"]).map(str::to_string),
            external_reference: string_at(&body, &["content", "transactions", "transactionId"]),
            token: str_at(&body, &["purchased_code"])
                .or_else(|| str_at(&body, &["token"]))
                .map(str::to_string),
            raw: body,
        }
    }
}

#[async_trait]
impl VtuProvider for VtpassProvider {
    fn code(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, _service: ServiceKind) -> bool {
        true
    }

    async fn purchase(&self, request: &VtuRequest) -> Result<ProviderReply, VtuError> {
        let payload = Self::payload(request)?;
        debug!(
            provider = PROVIDER,
            reference = %request.reference,
            service = %request.service,
            "Sending purchase"
        );

        let response = self
            .client
            .post(format!("{}/api/pay", self.base_url))
            .header("api-key", &self.api_key)
            .header("secret-key", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VtuError::from_reqwest(PROVIDER, e))?;

        let (status, body) = read_body(PROVIDER, response).await?;
        Ok(Self::to_reply(status, body))
    }

    async fn query(&self, reference: &str) -> Result<ProviderReply, VtuError> {
        let response = self
            .client
            .post(format!("{}/api/requery", self.base_url))
            .header("api-key", &self.api_key)
            .header("secret-key", &self.secret_key)
            .json(&json!({ "request_id": reference }))
            .send()
            .await
            .map_err(|e| VtuError::from_reqwest(PROVIDER, e))?;

        let (status, body) = read_body(PROVIDER, response).await?;
        Ok(Self::to_reply(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn delivered_code_maps_to_success() {
        let reply = VtpassProvider::to_reply(
            200,
            json!({
                "code": "000",
                "response_description": "TRANSACTION SUCCESSFUL",
                "content": {"transactions": {"status": "delivered", "transactionId": "17000"}}
            }),
        );
        assert_eq!(reply.status, ReplyStatus::Success);
        assert_eq!(reply.external_reference.as_deref(), Some("17000"));
    }

    #[test]
    fn non_zero_code_is_failure() {
        let reply = VtpassProvider::to_reply(
            200,
            json!({"code": "016", "response_description": "TRANSACTION FAILED"}),
        );
        assert_eq!(reply.status, ReplyStatus::Failed);
    }

    #[test]
    fn data_payload_uses_network_data_service() {
        let request = VtuRequest {
            reference: "REF-9".to_string(),
            service: ServiceKind::Data,
            amount: Decimal::from(500),
            network: Some(Network::NineMobile),
            phone_number: Some("08091234567".to_string()),
            plan_code: Some("eti-500".to_string()),
            customer_id: None,
            quantity: None,
        };
        let payload = VtpassProvider::payload(&request).unwrap();
        assert_eq!(payload["serviceID"], "etisalat-data");
        assert_eq!(payload["request_id"], "REF-9");
    }

    #[test]
    fn airtime_without_network_is_invalid() {
        let request = VtuRequest {
            reference: "REF-10".to_string(),
            service: ServiceKind::Airtime,
            amount: Decimal::from(100),
            network: None,
            phone_number: Some("08031234567".to_string()),
            plan_code: None,
            customer_id: None,
            quantity: None,
        };
        assert!(matches!(
            VtpassProvider::payload(&request),
            Err(VtuError::InvalidRequest { .. })
        ));
    }
}
