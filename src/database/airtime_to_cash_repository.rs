use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::vtu::types::Network;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Approved => "approved",
            ConversionStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ConversionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ConversionStatus::Pending),
            "approved" => Ok(ConversionStatus::Approved),
            "rejected" => Ok(ConversionStatus::Rejected),
            other => Err(format!("unknown conversion status: {}", other)),
        }
    }
}

/// Conversion rate for one network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirtimeToCashSetting {
    pub network: Network,
    /// Share of the airtime value paid out, e.g. `80` for 80%.
    pub rate_percent: Decimal,
    /// Number users transfer the airtime to.
    pub receiving_number: String,
    pub active: bool,
}

impl AirtimeToCashSetting {
    pub fn payout_for(&self, airtime_amount: Decimal) -> Decimal {
        (airtime_amount * self.rate_percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirtimeToCashRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub network: Network,
    pub phone_number: String,
    pub airtime_amount: Decimal,
    pub rate_percent: Decimal,
    pub payout_amount: Decimal,
    pub status: ConversionStatus,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AirtimeToCashRequest {
    /// Ledger reference of the payout credit.
    pub fn credit_reference(&self) -> String {
        format!("A2C-{}", self.id)
    }
}

/// Review decision applied to a pending request.
#[derive(Debug, Clone)]
pub struct Review {
    pub status: ConversionStatus,
    pub reviewed_by: String,
    pub rejection_reason: Option<String>,
}

#[async_trait]
pub trait AirtimeToCashStore: Send + Sync {
    async fn find_setting(
        &self,
        network: Network,
    ) -> Result<Option<AirtimeToCashSetting>, DatabaseError>;

    async fn upsert_setting(
        &self,
        setting: AirtimeToCashSetting,
    ) -> Result<AirtimeToCashSetting, DatabaseError>;

    async fn insert_request(
        &self,
        request: AirtimeToCashRequest,
    ) -> Result<AirtimeToCashRequest, DatabaseError>;

    async fn find_request(&self, id: Uuid) -> Result<Option<AirtimeToCashRequest>, DatabaseError>;

    /// Applies `review` only while the request is still pending. Returns
    /// `None` when it was not pending (or does not exist).
    async fn review(
        &self,
        id: Uuid,
        review: Review,
    ) -> Result<Option<AirtimeToCashRequest>, DatabaseError>;
}

#[derive(Debug, FromRow)]
struct SettingRow {
    network: String,
    rate_percent: Decimal,
    receiving_number: String,
    active: bool,
}

impl TryFrom<SettingRow> for AirtimeToCashSetting {
    type Error = DatabaseError;

    fn try_from(row: SettingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            network: row.network.parse().map_err(DatabaseError::unknown)?,
            rate_percent: row.rate_percent,
            receiving_number: row.receiving_number,
            active: row.active,
        })
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    user_id: Uuid,
    network: String,
    phone_number: String,
    airtime_amount: Decimal,
    rate_percent: Decimal,
    payout_amount: Decimal,
    status: String,
    reviewed_by: Option<String>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for AirtimeToCashRequest {
    type Error = DatabaseError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            network: row.network.parse().map_err(DatabaseError::unknown)?,
            phone_number: row.phone_number,
            airtime_amount: row.airtime_amount,
            rate_percent: row.rate_percent,
            payout_amount: row.payout_amount,
            status: row.status.parse().map_err(DatabaseError::unknown)?,
            reviewed_by: row.reviewed_by,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REQUEST_COLUMNS: &str = "id, user_id, network, phone_number, airtime_amount, rate_percent, \
     payout_amount, status, reviewed_by, rejection_reason, created_at, updated_at";

pub struct AirtimeToCashRepository {
    pool: PgPool,
}

impl AirtimeToCashRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AirtimeToCashStore for AirtimeToCashRepository {
    async fn find_setting(
        &self,
        network: Network,
    ) -> Result<Option<AirtimeToCashSetting>, DatabaseError> {
        sqlx::query_as::<_, SettingRow>(
            "SELECT network, rate_percent, receiving_number, active
             FROM airtime_to_cash_settings WHERE network = $1",
        )
        .bind(network.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(AirtimeToCashSetting::try_from)
        .transpose()
    }

    async fn upsert_setting(
        &self,
        setting: AirtimeToCashSetting,
    ) -> Result<AirtimeToCashSetting, DatabaseError> {
        sqlx::query_as::<_, SettingRow>(
            "INSERT INTO airtime_to_cash_settings (network, rate_percent, receiving_number, active)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (network)
             DO UPDATE SET rate_percent = $2, receiving_number = $3, active = $4
             RETURNING network, rate_percent, receiving_number, active",
        )
        .bind(setting.network.as_str())
        .bind(setting.rate_percent)
        .bind(&setting.receiving_number)
        .bind(setting.active)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()
    }

    async fn insert_request(
        &self,
        request: AirtimeToCashRequest,
    ) -> Result<AirtimeToCashRequest, DatabaseError> {
        sqlx::query_as::<_, RequestRow>(&format!(
            "INSERT INTO airtime_to_cash_requests
             (id, user_id, network, phone_number, airtime_amount, rate_percent, payout_amount, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.network.as_str())
        .bind(&request.phone_number)
        .bind(request.airtime_amount)
        .bind(request.rate_percent)
        .bind(request.payout_amount)
        .bind(request.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<AirtimeToCashRequest>, DatabaseError> {
        sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {} FROM airtime_to_cash_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(AirtimeToCashRequest::try_from)
        .transpose()
    }

    async fn review(
        &self,
        id: Uuid,
        review: Review,
    ) -> Result<Option<AirtimeToCashRequest>, DatabaseError> {
        if review.status == ConversionStatus::Pending {
            return Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: "a review must approve or reject".to_string(),
            }));
        }

        sqlx::query_as::<_, RequestRow>(&format!(
            "UPDATE airtime_to_cash_requests
             SET status = $2, reviewed_by = $3, rejection_reason = $4, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .bind(review.status.as_str())
        .bind(&review.reviewed_by)
        .bind(&review.rejection_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(AirtimeToCashRequest::try_from)
        .transpose()
    }
}
