//! Wallet-funded VTU purchases: reserve, deliver, settle.

use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ServiceError;
use crate::config::ServiceFees;
use crate::database::{
    LedgerStore, NewTransaction, PaymentMethod, SettleOutcome, Settlement, Transaction,
    TransactionKind, TransactionStatus, Wallet, WalletEffect,
};
use crate::vtu::{interpret_reply, Network, ProviderRegistry, ServiceKind, Verdict, VtuRequest};

const MIN_AIRTIME: i64 = 50;
const MAX_EXAM_PINS: u32 = 10;
const FAILED_MESSAGE: &str = "Purchase failed. Your wallet has been refunded.";
/// Prefixes of references the platform generates for wallet credits.
const RESERVED_PREFIXES: [&str; 2] = ["FUND-", "A2C-"];

/// Transaction kinds the purchase flow owns.
pub const PURCHASE_KINDS: [TransactionKind; 5] = [
    TransactionKind::Airtime,
    TransactionKind::Data,
    TransactionKind::Cable,
    TransactionKind::Electricity,
    TransactionKind::ExamPin,
];

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseOrder {
    pub service: ServiceKind,
    pub amount: Decimal,
    #[serde(default)]
    pub network: Option<Network>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Data plan, cable bouquet, disco or exam body.
    #[serde(default)]
    pub plan_code: Option<String>,
    /// Smartcard or meter number.
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Client-chosen idempotency key; generated when absent.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub reference: String,
    pub status: TransactionStatus,
    pub service: ServiceKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub total_charged: Decimal,
    pub provider: Option<String>,
    pub external_reference: Option<String>,
    /// Electricity token or exam pins.
    pub token: Option<String>,
    pub message: String,
    pub balance: Decimal,
}

fn phone_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\+?234|0)[789][01]\d{8}$").ok())
        .as_ref()
}

pub(crate) fn valid_phone(phone: &str) -> bool {
    phone_pattern().map(|p| p.is_match(phone)).unwrap_or(false)
}

fn client_reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").ok())
        .as_ref()
}

/// Client references share the ledger's reference space with funding rows,
/// so the `gateway:reference` deposit keys are excluded by the charset.
fn valid_client_reference(reference: &str) -> bool {
    client_reference_pattern()
        .map(|p| p.is_match(reference))
        .unwrap_or(false)
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ServiceError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::validation(field, "is required"))
}

impl PurchaseOrder {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(self.amount));
        }
        if self.amount.scale() > 2 {
            return Err(ServiceError::validation(
                "amount",
                "must have at most two decimal places",
            ));
        }

        match self.service {
            ServiceKind::Airtime | ServiceKind::Data => {
                if self.network.is_none() {
                    return Err(ServiceError::validation("network", "is required"));
                }
                let phone = required(&self.phone_number, "phone_number")?;
                if !valid_phone(phone) {
                    return Err(ServiceError::validation(
                        "phone_number",
                        "must be a valid Nigerian mobile number",
                    ));
                }
                if self.service == ServiceKind::Airtime && self.amount < Decimal::from(MIN_AIRTIME) {
                    return Err(ServiceError::validation(
                        "amount",
                        format!("airtime purchases start at {}", MIN_AIRTIME),
                    ));
                }
                if self.service == ServiceKind::Data {
                    required(&self.plan_code, "plan_code")?;
                }
            }
            ServiceKind::Cable | ServiceKind::Electricity => {
                required(&self.plan_code, "plan_code")?;
                required(&self.customer_id, "customer_id")?;
            }
            ServiceKind::ExamPin => {
                required(&self.plan_code, "plan_code")?;
                match self.quantity {
                    Some(q) if (1..=MAX_EXAM_PINS).contains(&q) => {}
                    _ => {
                        return Err(ServiceError::validation(
                            "quantity",
                            format!("must be between 1 and {}", MAX_EXAM_PINS),
                        ))
                    }
                }
            }
        }

        if let Some(reference) = &self.reference {
            if !valid_client_reference(reference) {
                return Err(ServiceError::validation(
                    "reference",
                    "must be 1 to 64 letters, digits, '-' or '_'",
                ));
            }
            if RESERVED_PREFIXES.iter().any(|p| reference.starts_with(p)) {
                return Err(ServiceError::validation(
                    "reference",
                    "uses a prefix reserved for wallet funding",
                ));
            }
        }
        Ok(())
    }
}

pub fn generate_reference() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("VTU-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), &suffix[..8])
}

pub struct PurchaseService {
    store: Arc<dyn LedgerStore>,
    registry: Arc<ProviderRegistry>,
    fees: ServiceFees,
}

impl PurchaseService {
    pub fn new(store: Arc<dyn LedgerStore>, registry: Arc<ProviderRegistry>, fees: ServiceFees) -> Self {
        Self {
            store,
            registry,
            fees,
        }
    }

    pub fn registry(&self) -> Arc<ProviderRegistry> {
        self.registry.clone()
    }

    pub async fn purchase(
        &self,
        user_id: Uuid,
        order: PurchaseOrder,
    ) -> Result<PurchaseReceipt, ServiceError> {
        order.validate()?;

        let provider = self.registry.resolve(order.service).await?;
        let reference = order
            .reference
            .clone()
            .unwrap_or_else(generate_reference);

        let new_tx = NewTransaction {
            reference: reference.clone(),
            user_id,
            kind: order.service.transaction_kind(),
            amount: order.amount,
            fee: self.fees.for_service(order.service),
            payment_method: PaymentMethod::Wallet,
            provider: Some(provider.code().to_string()),
            metadata: serde_json::json!({
                "network": order.network,
                "phone_number": order.phone_number,
                "plan_code": order.plan_code,
                "customer_id": order.customer_id,
                "quantity": order.quantity,
            }),
        };

        let (transaction, wallet) = self.store.open_debit(new_tx).await?;
        info!(
            reference = %reference,
            user_id = %user_id,
            service = %order.service,
            provider = provider.code(),
            total_charged = %transaction.total_charged,
            "purchase reserved"
        );

        let request = VtuRequest {
            reference: reference.clone(),
            service: order.service,
            amount: order.amount,
            network: order.network,
            phone_number: order.phone_number.clone(),
            plan_code: order.plan_code.clone(),
            customer_id: order.customer_id.clone(),
            quantity: order.quantity,
        };

        let verdict = interpret_reply(provider.purchase(&request).await);
        self.apply_verdict(transaction, wallet, order.service, verdict)
            .await
    }

    async fn apply_verdict(
        &self,
        transaction: Transaction,
        wallet: Wallet,
        service: ServiceKind,
        verdict: Verdict,
    ) -> Result<PurchaseReceipt, ServiceError> {
        let reference = transaction.reference.clone();
        let refund = WalletEffect::Credit(transaction.total_charged);

        match verdict {
            Verdict::Delivered {
                external_reference,
                token,
            } => {
                let settlement = Settlement::successful(WalletEffect::None)
                    .with_external_reference(external_reference)
                    .with_metadata(serde_json::json!({ "token": token }));
                let (settled, wallet) = self.settle(&reference, settlement, wallet).await?;
                info!(reference = %reference, "purchase delivered");
                Ok(receipt(service, settled, wallet, token, "Purchase successful"))
            }
            Verdict::Rejected { reason } => {
                warn!(reference = %reference, reason = %reason, "purchase rejected by provider");
                let (settled, wallet) = self
                    .settle(&reference, Settlement::failed(reason, refund), wallet)
                    .await?;
                Ok(receipt(service, settled, wallet, None, FAILED_MESSAGE))
            }
            Verdict::Ambiguous { reason } => {
                warn!(reference = %reference, reason = %reason, "ambiguous provider response, reversing");
                self.settle(&reference, Settlement::failed(reason, refund), wallet)
                    .await?;
                Err(ServiceError::AmbiguousProviderResponse { reference })
            }
            Verdict::Undelivered { reason } => {
                warn!(reference = %reference, reason = %reason, "provider unreachable, reversing");
                self.settle(&reference, Settlement::failed(reason, refund), wallet)
                    .await?;
                Err(ServiceError::ProviderUnavailable { reference })
            }
            Verdict::Pending { reason } => {
                info!(reference = %reference, reason = %reason, "purchase left pending for reconciliation");
                Ok(receipt(
                    service,
                    transaction,
                    wallet,
                    None,
                    "Purchase is processing. You will be notified when it completes.",
                ))
            }
        }
    }

    /// Settle and return the row as stored. A row that was already settled
    /// elsewhere (worker, admin) is returned unchanged.
    async fn settle(
        &self,
        reference: &str,
        settlement: Settlement,
        wallet: Wallet,
    ) -> Result<(Transaction, Wallet), ServiceError> {
        match self.store.settle(reference, settlement).await {
            Ok(SettleOutcome::Applied {
                transaction,
                wallet,
            }) => Ok((transaction, wallet)),
            Ok(SettleOutcome::AlreadyTerminal(transaction)) => {
                warn!(reference = %reference, status = %transaction.status, "purchase already settled");
                Ok((transaction, wallet))
            }
            Err(e) => {
                error!(reference = %reference, error = %e, "failed to settle purchase, left pending");
                Err(e.into())
            }
        }
    }

    /// Ask the provider that handled a pending purchase for its final state.
    ///
    /// Only a definite answer settles the row; anything else leaves it pending
    /// for the next pass.
    pub async fn requery(&self, reference: &str) -> Result<Transaction, ServiceError> {
        let transaction = self
            .store
            .find_transaction(reference)
            .await?
            .ok_or_else(|| ServiceError::TransactionNotFound(reference.to_string()))?;

        if transaction.status.is_terminal() {
            return Ok(transaction);
        }
        if !PURCHASE_KINDS.contains(&transaction.kind) {
            return Err(ServiceError::InvalidState(format!(
                "{} is a {} transaction, not a purchase",
                reference, transaction.kind
            )));
        }

        let refund = WalletEffect::Credit(transaction.total_charged);
        let Some(code) = transaction.provider.clone() else {
            return self
                .settle_requery(reference, Settlement::failed("never sent to a provider", refund))
                .await;
        };
        let Some(client) = self.registry.client(&code) else {
            warn!(reference = %reference, provider = %code, "provider client no longer registered");
            return Ok(transaction);
        };

        match interpret_reply(client.query(reference).await) {
            Verdict::Delivered {
                external_reference,
                token,
            } => {
                let settlement = Settlement::successful(WalletEffect::None)
                    .with_external_reference(external_reference)
                    .with_metadata(serde_json::json!({ "token": token }));
                self.settle_requery(reference, settlement).await
            }
            Verdict::Rejected { reason } => {
                self.settle_requery(reference, Settlement::failed(reason, refund))
                    .await
            }
            other => {
                info!(
                    reference = %reference,
                    reason = other.failure_reason().unwrap_or("unknown"),
                    "requery inconclusive, still pending"
                );
                Ok(transaction)
            }
        }
    }

    async fn settle_requery(
        &self,
        reference: &str,
        settlement: Settlement,
    ) -> Result<Transaction, ServiceError> {
        let status = settlement.status;
        let transaction = match self.store.settle(reference, settlement).await? {
            SettleOutcome::Applied { transaction, .. } => transaction,
            SettleOutcome::AlreadyTerminal(transaction) => transaction,
        };
        info!(reference = %reference, status = %status, "pending purchase reconciled");
        Ok(transaction)
    }

    /// Refund a purchase stuck in `pending`.
    pub async fn manual_refund(&self, reference: &str, actor: &str) -> Result<Transaction, ServiceError> {
        let transaction = self
            .store
            .find_transaction(reference)
            .await?
            .ok_or_else(|| ServiceError::TransactionNotFound(reference.to_string()))?;

        if !PURCHASE_KINDS.contains(&transaction.kind) {
            return Err(ServiceError::InvalidState(format!(
                "{} is not a purchase and cannot be refunded",
                reference
            )));
        }

        let settlement = Settlement::refunded(
            format!("manually refunded by {}", actor),
            transaction.total_charged,
        )
        .with_metadata(serde_json::json!({ "refunded_by": actor }));

        match self.store.settle(reference, settlement).await? {
            SettleOutcome::Applied { transaction, wallet } => {
                info!(reference = %reference, actor = %actor, balance = %wallet.balance, "purchase manually refunded");
                Ok(transaction)
            }
            SettleOutcome::AlreadyTerminal(transaction) => Err(ServiceError::InvalidState(format!(
                "{} is already {}",
                reference, transaction.status
            ))),
        }
    }
}

fn receipt(
    service: ServiceKind,
    transaction: Transaction,
    wallet: Wallet,
    token: Option<String>,
    message: &str,
) -> PurchaseReceipt {
    PurchaseReceipt {
        reference: transaction.reference,
        status: transaction.status,
        service,
        amount: transaction.amount,
        fee: transaction.fee,
        total_charged: transaction.total_charged,
        provider: transaction.provider,
        external_reference: transaction.external_reference,
        token,
        message: message.to_string(),
        balance: wallet.balance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airtime(amount: i64, phone: &str) -> PurchaseOrder {
        PurchaseOrder {
            service: ServiceKind::Airtime,
            amount: Decimal::from(amount),
            network: Some(Network::Mtn),
            phone_number: Some(phone.to_string()),
            plan_code: None,
            customer_id: None,
            quantity: None,
            reference: None,
        }
    }

    #[test]
    fn validates_phone_numbers() {
        assert!(airtime(100, "08031234567").validate().is_ok());
        assert!(airtime(100, "+2348031234567").validate().is_ok());
        assert!(airtime(100, "0803123456").validate().is_err());
        assert!(airtime(100, "06031234567").validate().is_err());
    }

    #[test]
    fn rejects_small_or_fractional_airtime() {
        assert!(airtime(20, "08031234567").validate().is_err());
        assert!(matches!(
            airtime(0, "08031234567").validate(),
            Err(ServiceError::InvalidAmount(_))
        ));
        let mut order = airtime(100, "08031234567");
        order.amount = Decimal::new(100001, 3);
        assert!(order.validate().is_err());
    }

    #[test]
    fn bill_orders_need_customer_and_plan() {
        let order = PurchaseOrder {
            service: ServiceKind::Electricity,
            amount: Decimal::from(2000),
            network: None,
            phone_number: None,
            plan_code: Some("ikeja-electric".to_string()),
            customer_id: None,
            quantity: None,
            reference: None,
        };
        assert!(matches!(
            order.validate(),
            Err(ServiceError::Validation { field: "customer_id", .. })
        ));
    }

    #[test]
    fn exam_pins_need_quantity() {
        let mut order = PurchaseOrder {
            service: ServiceKind::ExamPin,
            amount: Decimal::from(3500),
            network: None,
            phone_number: None,
            plan_code: Some("waec".to_string()),
            customer_id: None,
            quantity: Some(0),
            reference: None,
        };
        assert!(order.validate().is_err());
        order.quantity = Some(2);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn validation_patterns_compile() {
        assert!(phone_pattern().is_some());
        assert!(client_reference_pattern().is_some());
    }

    #[test]
    fn client_references_stay_out_of_funding_keys() {
        let mut order = airtime(100, "08031234567");
        order.reference = Some("order_42-b".to_string());
        assert!(order.validate().is_ok());

        for taken in ["payrant:TX-1001", "FUND-20260101-abc", "A2C-1234", "has space", ""] {
            order.reference = Some(taken.to_string());
            assert!(
                matches!(order.validate(), Err(ServiceError::Validation { field: "reference", .. })),
                "{} should be refused",
                taken
            );
        }
    }

    #[test]
    fn generated_references_are_unique() {
        let a = generate_reference();
        let b = generate_reference();
        assert!(a.starts_with("VTU-"));
        assert_ne!(a, b);
    }
}
