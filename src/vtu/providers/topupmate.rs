use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::vtu::provider::{
    build_http_client, read_body, status_from_word, str_at, string_at, VtuProvider,
};
use crate::vtu::types::{Network, ProviderReply, ReplyStatus, ServiceKind, VtuRequest};
use crate::vtu::VtuError;

const PROVIDER: &str = "topupmate";

pub struct TopupmateProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TopupmateProvider {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self, VtuError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_key)
    }

    fn network_id(network: Network) -> u8 {
        match network {
            Network::Mtn => 1,
            Network::Glo => 2,
            Network::NineMobile => 3,
            Network::Airtel => 4,
        }
    }

    fn endpoint(service: ServiceKind) -> &'static str {
        match service {
            ServiceKind::Airtime => "topup",
            ServiceKind::Data => "data",
            ServiceKind::Cable => "cablesub",
            ServiceKind::Electricity => "billpayment",
            ServiceKind::ExamPin => "epin",
        }
    }

    fn payload(request: &VtuRequest) -> Result<JsonValue, VtuError> {
        let network = || {
            request
                .network
                .map(Self::network_id)
                .ok_or_else(|| VtuError::InvalidRequest {
                    provider: PROVIDER.to_string(),
                    message: "network is required".to_string(),
                })
        };

        Ok(match request.service {
            ServiceKind::Airtime => json!({
                "network": network()?,
                "amount": request.amount,
                "mobile_number": request.phone_number,
                "Ported_number": true,
                "airtime_type": "VTU",
                "request_id": request.reference,
            }),
            ServiceKind::Data => json!({
                "network": network()?,
                "mobile_number": request.phone_number,
                "plan": request.plan_code,
                "Ported_number": true,
                "request_id": request.reference,
            }),
            ServiceKind::Cable => json!({
                "cableplan": request.plan_code,
                "smart_card_number": request.customer_id,
                "request_id": request.reference,
            }),
            ServiceKind::Electricity => json!({
                "disco_name": request.plan_code,
                "amount": request.amount,
                "meter_number": request.customer_id,
                "MeterType": 1,
                "request_id": request.reference,
            }),
            ServiceKind::ExamPin => json!({
                "exam_name": request.plan_code.as_deref().unwrap_or("WAEC"),
                "quantity": request.quantity.unwrap_or(1),
                "request_id": request.reference,
            }),
        })
    }

    fn to_reply(http_status: u16, body: JsonValue) -> ProviderReply {
        let status = str_at(&body, &["Status"])
            .or_else(|| str_at(&body, &["status"]))
            .map(status_from_word)
            .unwrap_or_else(|| ReplyStatus::Unrecognized("missing status".to_string()));

        ProviderReply {
            http_status,
            status,
            message: str_at(&body, &["api_response"])
                .or_else(|| str_at(&body, &["message"]))
                .map(str::to_string),
            external_reference: string_at(&body, &["id"]).or_else(|| string_at(&body, &["ident"])),
            token: str_at(&body, &["token"])
                .or_else(|| str_at(&body, &["pin"]))
                .map(str::to_string),
            raw: body,
        }
    }
}

#[async_trait]
impl VtuProvider for TopupmateProvider {
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
            .post(format!(
                "{}/api/{}/",
                self.base_url,
                Self::endpoint(request.service)
            ))
            .header("Authorization", self.auth_header())
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
            .get(format!("{}/api/transaction/{}/", self.base_url, reference))
            .header("Authorization", self.auth_header())
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

    #[test]
    fn capitalised_status_field_is_read() {
        let reply = TopupmateProvider::to_reply(
            200,
            json!({"Status": "successful", "id": 4411, "api_response": "You have topped up 500"}),
        );
        assert_eq!(reply.status, ReplyStatus::Success);
        assert_eq!(reply.external_reference.as_deref(), Some("4411"));
    }

    #[test]
    fn missing_status_is_unrecognized() {
        let reply = TopupmateProvider::to_reply(200, json!({"detail": "ok"}));
        assert!(matches!(reply.status, ReplyStatus::Unrecognized(_)));
    }
}
