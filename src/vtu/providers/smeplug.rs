use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::vtu::provider::{
    build_http_client, read_body, status_from_word, str_at, string_at, VtuProvider,
};
use crate::vtu::types::{Network, ProviderReply, ReplyStatus, ServiceKind, VtuRequest};
use crate::vtu::VtuError;

const PROVIDER: &str = "smeplug";

/// SME Plug sells airtime and data only.
pub struct SmeplugProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SmeplugProvider {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self, VtuError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn network_id(network: Network) -> u8 {
        match network {
            Network::Mtn => 1,
            Network::Airtel => 2,
            Network::NineMobile => 3,
            Network::Glo => 4,
        }
    }

    /// `status` is a boolean; `data.status` (when present) refines a `true`.
    fn to_reply(http_status: u16, body: JsonValue) -> ProviderReply {
        let status = match body.get("status") {
            Some(JsonValue::Bool(false)) => ReplyStatus::Failed,
            Some(JsonValue::Bool(true)) => str_at(&body, &["data", "status"])
                .map(status_from_word)
                .unwrap_or(ReplyStatus::Success),
            Some(JsonValue::String(word)) => status_from_word(word),
            _ => ReplyStatus::Unrecognized("missing status".to_string()),
        };

        ProviderReply {
            http_status,
            status,
            message: str_at(&body, &["data", "msg"])
                .or_else(|| str_at(&body, &["msg"]))
                .map(str::to_string),
            external_reference: string_at(&body, &["data", "reference"]),
            token: None,
            raw: body,
        }
    }
}

#[async_trait]
impl VtuProvider for SmeplugProvider {
    fn code(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, service: ServiceKind) -> bool {
        matches!(service, ServiceKind::Airtime | ServiceKind::Data)
    }

    async fn purchase(&self, request: &VtuRequest) -> Result<ProviderReply, VtuError> {
        if !self.supports(request.service) {
            return Err(VtuError::Unsupported {
                provider: PROVIDER.to_string(),
                service: request.service,
            });
        }
        let network_id = request
            .network
            .map(Self::network_id)
            .ok_or_else(|| VtuError::InvalidRequest {
                provider: PROVIDER.to_string(),
                message: "network is required".to_string(),
            })?;

        let (path, payload) = match request.service {
            ServiceKind::Data => (
                "data/purchase",
                json!({
                    "network_id": network_id,
                    "plan_id": request.plan_code,
                    "phone": request.phone_number,
                    "customer_reference": request.reference,
                }),
            ),
            _ => (
                "airtime/purchase",
                json!({
                    "network_id": network_id,
                    "phone": request.phone_number,
                    "amount": request.amount,
                    "customer_reference": request.reference,
                }),
            ),
        };

        debug!(
            provider = PROVIDER,
            reference = %request.reference,
            service = %request.service,
            "Sending purchase"
        );

        let response = self
            .client
            .post(format!("{}/api/v1/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
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
            .get(format!("{}/api/v1/transactions/{}", self.base_url, reference))
            .bearer_auth(&self.api_key)
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
    fn boolean_false_is_failure() {
        let reply = SmeplugProvider::to_reply(200, json!({"status": false, "msg": "Low wallet"}));
        assert_eq!(reply.status, ReplyStatus::Failed);
        assert_eq!(reply.message.as_deref(), Some("Low wallet"));
    }

    #[test]
    fn nested_pending_status_refines_true() {
        let reply = SmeplugProvider::to_reply(
            200,
            json!({"status": true, "data": {"status": "pending", "reference": "SP-1"}}),
        );
        assert_eq!(reply.status, ReplyStatus::Processing);
        assert_eq!(reply.external_reference.as_deref(), Some("SP-1"));
    }
}
