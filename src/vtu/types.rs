use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database::transaction::TransactionKind;

/// Product lines sold through upstream VTU providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Airtime,
    Data,
    Cable,
    Electricity,
    ExamPin,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Airtime,
        ServiceKind::Data,
        ServiceKind::Cable,
        ServiceKind::Electricity,
        ServiceKind::ExamPin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Airtime => "airtime",
            ServiceKind::Data => "data",
            ServiceKind::Cable => "cable",
            ServiceKind::Electricity => "electricity",
            ServiceKind::ExamPin => "exam_pin",
        }
    }

    pub fn transaction_kind(&self) -> TransactionKind {
        match self {
            ServiceKind::Airtime => TransactionKind::Airtime,
            ServiceKind::Data => TransactionKind::Data,
            ServiceKind::Cable => TransactionKind::Cable,
            ServiceKind::Electricity => TransactionKind::Electricity,
            ServiceKind::ExamPin => TransactionKind::ExamPin,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "airtime" => Ok(ServiceKind::Airtime),
            "data" => Ok(ServiceKind::Data),
            "cable" | "cable_tv" => Ok(ServiceKind::Cable),
            "electricity" => Ok(ServiceKind::Electricity),
            "exam_pin" | "exam" => Ok(ServiceKind::ExamPin),
            other => Err(format!("unknown service: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mtn,
    Glo,
    Airtel,
    #[serde(rename = "9mobile")]
    NineMobile,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mtn => "mtn",
            Network::Glo => "glo",
            Network::Airtel => "airtel",
            Network::NineMobile => "9mobile",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "mtn" => Ok(Network::Mtn),
            "glo" => Ok(Network::Glo),
            "airtel" => Ok(Network::Airtel),
            "9mobile" | "etisalat" => Ok(Network::NineMobile),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// What gets sent upstream for one purchase.
#[derive(Debug, Clone, Serialize)]
pub struct VtuRequest {
    /// Our transaction reference; providers echo it as their request id.
    pub reference: String,
    pub service: ServiceKind,
    pub amount: Decimal,
    pub network: Option<Network>,
    pub phone_number: Option<String>,
    /// Data plan, cable bouquet, disco or exam body.
    pub plan_code: Option<String>,
    /// Smartcard or meter number.
    pub customer_id: Option<String>,
    pub quantity: Option<u32>,
}

/// The provider's own verdict, before embedded-error inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    Failed,
    Processing,
    Unrecognized(String),
}

/// A provider response normalized at the client boundary.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub http_status: u16,
    pub status: ReplyStatus,
    pub message: Option<String>,
    pub external_reference: Option<String>,
    /// Electricity token or exam pins, when the provider returns one.
    pub token: Option<String>,
    pub raw: serde_json::Value,
}

impl ProviderReply {
    /// Every string value in the raw body, depth first.
    pub fn free_text(&self) -> Vec<&str> {
        fn collect<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
            match value {
                serde_json::Value::String(s) => out.push(s),
                serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
                serde_json::Value::Object(map) => map.values().for_each(|v| collect(v, out)),
                _ => {}
            }
        }

        let mut out = Vec::new();
        if let Some(message) = &self.message {
            out.push(message.as_str());
        }
        collect(&self.raw, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_parses_aliases() {
        assert_eq!("cable_tv".parse::<ServiceKind>(), Ok(ServiceKind::Cable));
        assert_eq!("EXAM_PIN".parse::<ServiceKind>(), Ok(ServiceKind::ExamPin));
        assert!("betting".parse::<ServiceKind>().is_err());
    }

    #[test]
    fn nine_mobile_serializes_with_digit() {
        let json = serde_json::to_string(&Network::NineMobile).unwrap();
        assert_eq!(json, "\"9mobile\"");
        assert_eq!("etisalat".parse::<Network>(), Ok(Network::NineMobile));
    }

    #[test]
    fn free_text_walks_nested_values() {
        let reply = ProviderReply {
            http_status: 200,
            status: ReplyStatus::Success,
            message: Some("ok".to_string()),
            external_reference: None,
            token: None,
            raw: serde_json::json!({"content": {"notes": ["a", {"b": "c"}]}, "code": 0}),
        };
        let text = reply.free_text();
        assert!(text.contains(&"ok"));
        assert!(text.contains(&"a"));
        assert!(text.contains(&"c"));
    }
}
