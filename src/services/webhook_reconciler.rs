//! Gateway webhooks in, exactly one wallet mutation out.

use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::error::DatabaseError;
use crate::database::virtual_account_repository::VirtualAccountStore;
use crate::database::{
    LedgerError, LedgerStore, NewTransaction, PaymentMethod, SettleOutcome, Settlement,
    Transaction, TransactionKind, TransactionStatus, WalletEffect,
};
use crate::payments::{GatewayId, GatewayRegistry, WebhookEvent, WebhookOutcome};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook signature missing or invalid for {0}")]
    InvalidSignature(GatewayId),

    #[error("unknown gateway: {0}")]
    UnknownGateway(String),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("no transaction for external reference {0}")]
    TransactionNotFound(String),

    #[error("amount mismatch for {reference}: expected {expected}, received {received}")]
    AmountMismatch {
        reference: String,
        expected: Decimal,
        received: Decimal,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl ReconcileError {
    /// Only storage failures should make the gateway re-deliver.
    pub fn should_retry(&self) -> bool {
        matches!(self, ReconcileError::Storage(_))
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::TransactionNotFound(reference) => {
                ReconcileError::TransactionNotFound(reference)
            }
            LedgerError::Database(e) => ReconcileError::Storage(e),
            other => ReconcileError::Storage(DatabaseError::unknown(other.to_string())),
        }
    }
}

/// Result of a processed (or deliberately skipped) webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub reference: Option<String>,
    pub status: Option<TransactionStatus>,
    /// The transaction had already left `pending`; nothing changed.
    pub already_processed: bool,
    /// The event type carries no wallet effect.
    pub ignored: bool,
}

impl Ack {
    fn applied(transaction: &Transaction) -> Self {
        Self {
            reference: Some(transaction.reference.clone()),
            status: Some(transaction.status),
            already_processed: false,
            ignored: false,
        }
    }

    fn duplicate(transaction: &Transaction) -> Self {
        Self {
            already_processed: true,
            ..Self::applied(transaction)
        }
    }

    fn ignored() -> Self {
        Self {
            reference: None,
            status: None,
            already_processed: false,
            ignored: true,
        }
    }
}

pub struct WebhookReconciler {
    gateways: GatewayRegistry,
    ledger: Arc<dyn LedgerStore>,
    accounts: Arc<dyn VirtualAccountStore>,
}

impl WebhookReconciler {
    pub fn new(
        gateways: GatewayRegistry,
        ledger: Arc<dyn LedgerStore>,
        accounts: Arc<dyn VirtualAccountStore>,
    ) -> Self {
        Self {
            gateways,
            ledger,
            accounts,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub async fn handle_webhook(
        &self,
        gateway: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Ack, ReconcileError> {
        let gateway = self
            .gateways
            .get_by_name(gateway)
            .map_err(|_| ReconcileError::UnknownGateway(gateway.to_string()))?;
        let gateway_id = gateway.id();

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ReconcileError::InvalidSignature(gateway_id))?;
        let verified = gateway
            .verify_webhook(payload, signature)
            .map(|result| result.valid)
            .unwrap_or(false);
        if !verified {
            return Err(ReconcileError::InvalidSignature(gateway_id));
        }

        let event = gateway
            .parse_webhook_event(payload)
            .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

        if event.outcome == WebhookOutcome::Ignored {
            debug!(gateway = %gateway_id, event_type = %event.event_type, "webhook event ignored");
            return Ok(Ack::ignored());
        }

        let external_reference = event
            .external_reference
            .clone()
            .ok_or_else(|| ReconcileError::MalformedPayload("missing transaction reference".to_string()))?;

        let (transaction, created_here) = match self.find_funding(gateway_id, &external_reference).await? {
            Some(tx) => (tx, false),
            None => self.open_deposit(&event, &external_reference).await?,
        };

        if transaction.status.is_terminal() {
            info!(
                gateway = %gateway_id,
                reference = %transaction.reference,
                status = %transaction.status,
                "webhook already processed"
            );
            return Ok(Ack::duplicate(&transaction));
        }
        match event.outcome {
            WebhookOutcome::Success => self.credit(&event, transaction, created_here).await,
            WebhookOutcome::Failed => {
                let settlement = Settlement::failed(
                    format!("{} reported {}", gateway_id, event.event_type),
                    WalletEffect::None,
                )
                .with_external_reference(Some(external_reference))
                .with_metadata(serde_json::json!({ "gateway_event": event.event_type }));
                let outcome = self.ledger.settle(&transaction.reference, settlement).await?;
                Ok(ack_for(outcome))
            }
            WebhookOutcome::Ignored => Ok(Ack::ignored()),
        }
    }

    /// A funding row owned by this gateway: either opened at checkout under our
    /// own reference, or a deposit recorded under the gateway-scoped key.
    async fn find_funding(
        &self,
        gateway_id: GatewayId,
        external_reference: &str,
    ) -> Result<Option<Transaction>, ReconcileError> {
        if let Some(tx) = self.ledger.find_transaction(external_reference).await? {
            if tx.kind == TransactionKind::Funding
                && tx.provider.as_deref() == Some(gateway_id.as_str())
            {
                return Ok(Some(tx));
            }
            warn!(
                gateway = %gateway_id,
                reference = %external_reference,
                kind = %tx.kind,
                provider = ?tx.provider,
                "reference belongs to another transaction, not applying it"
            );
        }
        Ok(self
            .ledger
            .find_transaction(&deposit_reference(gateway_id, external_reference))
            .await?)
    }

    /// Record the pending deposit for a transfer into a virtual account before
    /// any credit. A concurrent delivery that inserted first wins; its row is
    /// re-read and processed like any other.
    async fn open_deposit(
        &self,
        event: &WebhookEvent,
        external_reference: &str,
    ) -> Result<(Transaction, bool), ReconcileError> {
        let not_found = || ReconcileError::TransactionNotFound(external_reference.to_string());

        if event.outcome != WebhookOutcome::Success {
            warn!(gateway = %event.gateway, reference = %external_reference, "failure event for unknown transaction");
            return Err(not_found());
        }
        let Some(account_number) = event.account_number.as_deref() else {
            warn!(gateway = %event.gateway, reference = %external_reference, "no transaction and no account number");
            return Err(not_found());
        };
        let account = self
            .accounts
            .find_by_account_number(account_number)
            .await?
            .filter(|a| a.provider == event.gateway.as_str());
        let Some(account) = account else {
            warn!(gateway = %event.gateway, account_number = %account_number, "deposit to unknown virtual account");
            return Err(not_found());
        };
        let amount = event
            .amount
            .filter(|a| *a > Decimal::ZERO)
            .ok_or_else(|| ReconcileError::MalformedPayload("missing or invalid amount".to_string()))?;

        let reference = deposit_reference(event.gateway, external_reference);
        let deposit = NewTransaction {
            reference: reference.clone(),
            user_id: account.user_id,
            kind: TransactionKind::Funding,
            amount,
            fee: Decimal::ZERO,
            payment_method: PaymentMethod::BankTransfer,
            provider: Some(event.gateway.as_str().to_string()),
            metadata: serde_json::json!({
                "account_number": account.account_number,
                "gateway_event": event.event_type,
                "gateway_reference": external_reference,
            }),
        };

        match self.ledger.insert_transaction(deposit).await {
            Ok(tx) => {
                info!(reference = %tx.reference, user_id = %tx.user_id, amount = %amount, "virtual account deposit recorded");
                Ok((tx, true))
            }
            Err(LedgerError::DuplicateReference(_)) => {
                debug!(reference = %reference, "concurrent delivery recorded the deposit first");
                let tx = self
                    .ledger
                    .find_transaction(&reference)
                    .await?
                    .ok_or_else(not_found)?;
                Ok((tx, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn credit(
        &self,
        event: &WebhookEvent,
        transaction: Transaction,
        created_here: bool,
    ) -> Result<Ack, ReconcileError> {
        if !created_here {
            if let Some(received) = event.amount {
                if received != transaction.amount {
                    warn!(
                        reference = %transaction.reference,
                        expected = %transaction.amount,
                        received = %received,
                        "webhook amount does not match transaction"
                    );
                    let settlement = Settlement::failed("amount mismatch", WalletEffect::None)
                        .with_metadata(serde_json::json!({ "received_amount": received }));
                    if let SettleOutcome::AlreadyTerminal(tx) =
                        self.ledger.settle(&transaction.reference, settlement).await?
                    {
                        return Ok(Ack::duplicate(&tx));
                    }
                    return Err(ReconcileError::AmountMismatch {
                        reference: transaction.reference,
                        expected: transaction.amount,
                        received,
                    });
                }
            }
        }

        let settlement = Settlement::successful(WalletEffect::Credit(transaction.amount))
            .with_external_reference(event.external_reference.clone())
            .with_metadata(serde_json::json!({ "gateway_event": event.event_type }));
        let outcome = self.ledger.settle(&transaction.reference, settlement).await?;
        if let SettleOutcome::Applied { transaction, wallet } = &outcome {
            info!(
                gateway = %event.gateway,
                reference = %transaction.reference,
                user_id = %transaction.user_id,
                amount = %transaction.amount,
                balance = %wallet.balance,
                "wallet funded"
            );
        }
        Ok(ack_for(outcome))
    }
}

/// Ledger reference of a transfer into a virtual account. Gateways number
/// their transfers independently, so the key carries the gateway.
pub fn deposit_reference(gateway: GatewayId, external_reference: &str) -> String {
    format!("{}:{}", gateway.as_str(), external_reference)
}

fn ack_for(outcome: SettleOutcome) -> Ack {
    match outcome {
        SettleOutcome::Applied { transaction, .. } => Ack::applied(&transaction),
        SettleOutcome::AlreadyTerminal(transaction) => Ack::duplicate(&transaction),
    }
}
