use crate::payments::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Payment gateways that fund wallets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayId {
    Paystack,
    Monnify,
    Payrant,
    Vtstack,
}

impl GatewayId {
    pub const ALL: [GatewayId; 4] = [
        GatewayId::Paystack,
        GatewayId::Monnify,
        GatewayId::Payrant,
        GatewayId::Vtstack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Paystack => "paystack",
            GatewayId::Monnify => "monnify",
            GatewayId::Payrant => "payrant",
            GatewayId::Vtstack => "vtstack",
        }
    }

    /// Header carrying the webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            GatewayId::Paystack => "x-paystack-signature",
            GatewayId::Monnify => "monnify-signature",
            GatewayId::Payrant => "x-payrant-signature",
            GatewayId::Vtstack => "x-vtstack-signature",
        }
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayId {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "paystack" => Ok(GatewayId::Paystack),
            "monnify" => Ok(GatewayId::Monnify),
            "payrant" => Ok(GatewayId::Payrant),
            "vtstack" | "vt-stack" => Ok(GatewayId::Vtstack),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported gateway: {}", value),
                field: Some("gateway".to_string()),
            }),
        }
    }
}

/// Card checkout initialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount: Decimal,
    pub email: String,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(PaymentError::ValidationError {
                message: "a valid email is required for card payments".to_string(),
                field: Some("email".to_string()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentResponse {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
}

/// Request for a dedicated bank account that credits the user's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedAccountRequest {
    pub reference: String,
    pub account_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservedAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Success,
    Failed,
    /// Events that do not move money (subscriptions, transfers we did not start).
    Ignored,
}

/// Gateway webhook normalised for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub gateway: GatewayId,
    pub event_type: String,
    pub outcome: WebhookOutcome,
    pub external_reference: Option<String>,
    /// Naira, already converted from minor units where the gateway sends kobo.
    pub amount: Option<Decimal>,
    /// Set when the payment landed in a dedicated virtual account.
    pub account_number: Option<String>,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl WebhookVerificationResult {
    pub(crate) fn from_check(valid: bool, gateway: GatewayId) -> Self {
        Self {
            valid,
            reason: if valid {
                None
            } else {
                Some(format!("invalid {} signature", gateway))
            },
        }
    }
}

/// Read a decimal that gateways send either as a JSON number or a string.
pub(crate) fn decimal_at(value: &JsonValue, pointer: &str) -> Option<Decimal> {
    match value.pointer(pointer)? {
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        JsonValue::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn text_at(value: &JsonValue, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_parsing_accepts_known_ids() {
        assert_eq!(GatewayId::from_str("Monnify").unwrap(), GatewayId::Monnify);
        assert_eq!(GatewayId::from_str("vt-stack").unwrap(), GatewayId::Vtstack);
        assert!(GatewayId::from_str("flutterwave").is_err());
    }

    #[test]
    fn decimal_at_reads_numbers_and_strings() {
        let payload = serde_json::json!({"data": {"a": 5000, "b": "1500.50", "c": true}});
        assert_eq!(decimal_at(&payload, "/data/a"), Some(Decimal::from(5000)));
        assert_eq!(decimal_at(&payload, "/data/b"), Some(Decimal::new(150050, 2)));
        assert_eq!(decimal_at(&payload, "/data/c"), None);
        assert_eq!(decimal_at(&payload, "/data/missing"), None);
    }

    #[test]
    fn payment_request_requires_email() {
        let request = PaymentRequest {
            reference: "FUND-1".to_string(),
            amount: Decimal::from(1000),
            email: "".to_string(),
            callback_url: None,
            metadata: None,
        };
        assert!(request.validate().is_err());
    }
}
