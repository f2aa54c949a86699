//! Airtime-to-cash conversions: users transfer airtime to the platform number
//! and an admin confirms receipt. The payout reaches the wallet on approval.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::purchase::valid_phone;
use super::ServiceError;
use crate::database::airtime_to_cash_repository::{
    AirtimeToCashRequest, AirtimeToCashSetting, AirtimeToCashStore, ConversionStatus, Review,
};
use crate::database::{
    LedgerError, LedgerStore, NewTransaction, PaymentMethod, SettleOutcome, Settlement,
    TransactionKind, WalletEffect,
};
use crate::vtu::Network;

const MIN_AIRTIME: i64 = 100;
const MAX_AIRTIME: i64 = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionSubmission {
    pub network: Network,
    pub phone_number: String,
    pub amount: Decimal,
}

pub struct AirtimeToCashService {
    ledger: Arc<dyn LedgerStore>,
    conversions: Arc<dyn AirtimeToCashStore>,
}

impl AirtimeToCashService {
    pub fn new(ledger: Arc<dyn LedgerStore>, conversions: Arc<dyn AirtimeToCashStore>) -> Self {
        Self {
            ledger,
            conversions,
        }
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        submission: ConversionSubmission,
    ) -> Result<AirtimeToCashRequest, ServiceError> {
        let amount = submission.amount;
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(amount));
        }
        if amount < Decimal::from(MIN_AIRTIME) || amount > Decimal::from(MAX_AIRTIME) {
            return Err(ServiceError::validation(
                "amount",
                format!("must be between {} and {}", MIN_AIRTIME, MAX_AIRTIME),
            ));
        }
        if !valid_phone(submission.phone_number.trim()) {
            return Err(ServiceError::validation(
                "phone_number",
                "must be a valid Nigerian mobile number",
            ));
        }

        let setting = self
            .conversions
            .find_setting(submission.network)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "airtime to cash is not available for {}",
                    submission.network
                ))
            })?;
        self.ledger
            .find_wallet(user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound(user_id))?;

        let now = Utc::now();
        let request = AirtimeToCashRequest {
            id: Uuid::new_v4(),
            user_id,
            network: submission.network,
            phone_number: submission.phone_number.trim().to_string(),
            airtime_amount: amount,
            rate_percent: setting.rate_percent,
            payout_amount: setting.payout_for(amount),
            status: ConversionStatus::Pending,
            reviewed_by: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        let request = self.conversions.insert_request(request).await?;
        info!(
            request_id = %request.id,
            user_id = %user_id,
            network = %request.network,
            airtime = %request.airtime_amount,
            payout = %request.payout_amount,
            "airtime to cash request submitted"
        );
        Ok(request)
    }

    /// Mark the request approved, then credit the payout. The claim is taken
    /// first so a concurrent reject can never leave a paid-out rejection.
    /// Approving again re-runs the credit, which is keyed on the request id
    /// and lands at most once.
    pub async fn approve(&self, id: Uuid, admin: &str) -> Result<AirtimeToCashRequest, ServiceError> {
        let review = Review {
            status: ConversionStatus::Approved,
            reviewed_by: admin.to_string(),
            rejection_reason: None,
        };
        let approved = match self.conversions.review(id, review).await? {
            Some(claimed) => {
                info!(request_id = %id, admin = %admin, payout = %claimed.payout_amount, "airtime to cash approved");
                claimed
            }
            None => {
                let current = self.find(id).await?;
                if current.status != ConversionStatus::Approved {
                    warn!(request_id = %id, status = current.status.as_str(), "cannot approve reviewed request");
                    return Err(ServiceError::InvalidState(format!(
                        "request {} is already {}",
                        id,
                        current.status.as_str()
                    )));
                }
                current
            }
        };

        self.credit_payout(&approved, admin).await?;
        Ok(approved)
    }

    async fn credit_payout(
        &self,
        request: &AirtimeToCashRequest,
        admin: &str,
    ) -> Result<(), ServiceError> {
        let reference = request.credit_reference();
        let credit = NewTransaction {
            reference: reference.clone(),
            user_id: request.user_id,
            kind: TransactionKind::AirtimeToCash,
            amount: request.payout_amount,
            fee: Decimal::ZERO,
            payment_method: PaymentMethod::Airtime,
            provider: None,
            metadata: serde_json::json!({
                "request_id": request.id,
                "network": request.network,
                "airtime_amount": request.airtime_amount,
            }),
        };
        match self.ledger.insert_transaction(credit).await {
            Ok(_) | Err(LedgerError::DuplicateReference(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let settlement = Settlement::successful(WalletEffect::Credit(request.payout_amount))
            .with_metadata(serde_json::json!({ "approved_by": admin }));
        if let SettleOutcome::Applied { wallet, .. } = self.ledger.settle(&reference, settlement).await? {
            info!(request_id = %request.id, reference = %reference, balance = %wallet.balance, "airtime to cash payout credited");
        }
        Ok(())
    }

    pub async fn reject(
        &self,
        id: Uuid,
        admin: &str,
        reason: &str,
    ) -> Result<AirtimeToCashRequest, ServiceError> {
        let review = Review {
            status: ConversionStatus::Rejected,
            reviewed_by: admin.to_string(),
            rejection_reason: Some(reason.to_string()),
        };
        if let Some(rejected) = self.conversions.review(id, review).await? {
            info!(request_id = %id, admin = %admin, reason = %reason, "airtime to cash rejected");
            return Ok(rejected);
        }

        let current = self.find(id).await?;
        match current.status {
            ConversionStatus::Rejected => Ok(current),
            _ => {
                warn!(request_id = %id, status = current.status.as_str(), "cannot reject reviewed request");
                Err(ServiceError::InvalidState(format!(
                    "request {} is already {}",
                    id,
                    current.status.as_str()
                )))
            }
        }
    }

    pub async fn configure(
        &self,
        setting: AirtimeToCashSetting,
    ) -> Result<AirtimeToCashSetting, ServiceError> {
        if setting.rate_percent <= Decimal::ZERO || setting.rate_percent > Decimal::ONE_HUNDRED {
            return Err(ServiceError::validation(
                "rate_percent",
                "must be greater than 0 and at most 100",
            ));
        }
        Ok(self.conversions.upsert_setting(setting).await?)
    }

    async fn find(&self, id: Uuid) -> Result<AirtimeToCashRequest, ServiceError> {
        self.conversions
            .find_request(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "airtime to cash request",
                id: id.to_string(),
            })
    }
}
