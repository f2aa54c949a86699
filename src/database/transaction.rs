//! Wallet and transaction entities shared by every ledger store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A user's stored balance. Only ledger operations change `balance`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub last_transaction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Decimal::ZERO,
            currency: currency.into(),
            last_transaction_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Funding,
    Airtime,
    Data,
    Cable,
    Electricity,
    ExamPin,
    AirtimeToCash,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Funding => "funding",
            TransactionKind::Airtime => "airtime",
            TransactionKind::Data => "data",
            TransactionKind::Cable => "cable",
            TransactionKind::Electricity => "electricity",
            TransactionKind::ExamPin => "exam_pin",
            TransactionKind::AirtimeToCash => "airtime_to_cash",
            TransactionKind::Refund => "refund",
        }
    }

    /// Whether a successful transaction of this kind adds to the wallet.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Funding | TransactionKind::AirtimeToCash | TransactionKind::Refund
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "funding" => Ok(TransactionKind::Funding),
            "airtime" => Ok(TransactionKind::Airtime),
            "data" => Ok(TransactionKind::Data),
            "cable" => Ok(TransactionKind::Cable),
            "electricity" => Ok(TransactionKind::Electricity),
            "exam_pin" => Ok(TransactionKind::ExamPin),
            "airtime_to_cash" => Ok(TransactionKind::AirtimeToCash),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "successful" => Ok(TransactionStatus::Successful),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
    BankTransfer,
    Airtime,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Airtime => "airtime",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "wallet" => Ok(PaymentMethod::Wallet),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "airtime" => Ok(PaymentMethod::Airtime),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// One payment or purchase attempt. `reference` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub total_charged: Decimal,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub provider: Option<String>,
    pub external_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new `pending` transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub payment_method: PaymentMethod,
    pub provider: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    pub fn total_charged(&self) -> Decimal {
        self.amount + self.fee
    }

    pub fn into_pending(self, wallet_id: Uuid) -> Transaction {
        let now = Utc::now();
        let total_charged = self.total_charged();
        Transaction {
            id: Uuid::new_v4(),
            reference: self.reference,
            user_id: self.user_id,
            wallet_id,
            kind: self.kind,
            amount: self.amount,
            fee: self.fee,
            total_charged,
            status: TransactionStatus::Pending,
            payment_method: self.payment_method,
            provider: self.provider,
            external_reference: None,
            failure_reason: None,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Balance change applied together with a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEffect {
    None,
    Credit(Decimal),
}

/// Terminal transition for a pending transaction.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub status: TransactionStatus,
    pub effect: WalletEffect,
    pub external_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl Settlement {
    pub fn successful(effect: WalletEffect) -> Self {
        Self {
            status: TransactionStatus::Successful,
            effect,
            external_reference: None,
            failure_reason: None,
            metadata: None,
        }
    }

    pub fn failed(reason: impl Into<String>, effect: WalletEffect) -> Self {
        Self {
            status: TransactionStatus::Failed,
            effect,
            external_reference: None,
            failure_reason: Some(reason.into()),
            metadata: None,
        }
    }

    pub fn refunded(reason: impl Into<String>, amount: Decimal) -> Self {
        Self {
            status: TransactionStatus::Refunded,
            effect: WalletEffect::Credit(amount),
            external_reference: None,
            failure_reason: Some(reason.into()),
            metadata: None,
        }
    }

    pub fn with_external_reference(mut self, reference: Option<String>) -> Self {
        self.external_reference = reference;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Result of `LedgerStore::settle`.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The pending row was transitioned and the effect applied.
    Applied { transaction: Transaction, wallet: Wallet },
    /// The row had already left `pending`; nothing was changed.
    AlreadyTerminal(Transaction),
}

/// Merge `extra` into `base` when both are JSON objects, otherwise replace.
pub(crate) fn merge_metadata(base: &mut serde_json::Value, extra: serde_json::Value) {
    match (base.as_object_mut(), extra) {
        (Some(target), serde_json::Value::Object(source)) => {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        (_, other) => *base = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Successful,
            TransactionStatus::Failed,
            TransactionStatus::Refunded,
        ] {
            assert_eq!(TransactionStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(TransactionStatus::from_str("completed").is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Successful.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Refunded.is_terminal());
    }

    #[test]
    fn credit_kinds() {
        assert!(TransactionKind::Funding.is_credit());
        assert!(TransactionKind::AirtimeToCash.is_credit());
        assert!(!TransactionKind::Data.is_credit());
        assert!(!TransactionKind::ExamPin.is_credit());
    }

    #[test]
    fn new_transaction_totals_amount_and_fee() {
        let tx = NewTransaction {
            reference: "REF-1".to_string(),
            user_id: Uuid::new_v4(),
            kind: TransactionKind::Data,
            amount: Decimal::from(1000),
            fee: Decimal::from(50),
            payment_method: PaymentMethod::Wallet,
            provider: None,
            metadata: serde_json::json!({}),
        }
        .into_pending(Uuid::new_v4());

        assert_eq!(tx.total_charged, Decimal::from(1050));
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn metadata_merge_keeps_existing_keys() {
        let mut base = serde_json::json!({"phone": "08031234567"});
        merge_metadata(&mut base, serde_json::json!({"token": "1234"}));
        assert_eq!(base["phone"], "08031234567");
        assert_eq!(base["token"], "1234");
    }
}
