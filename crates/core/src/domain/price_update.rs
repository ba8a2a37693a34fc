use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceUpdateJobId(pub String);

impl fmt::Display for PriceUpdateJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PriceUpdateJobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceUpdateEventId(pub String);

/// A deferred price change waiting in the scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateJob {
    pub id: PriceUpdateJobId,
    pub product_id: ProductId,
    pub new_price: Decimal,
    /// Monotonic across the process; a larger value was scheduled later.
    pub sequence: u64,
    pub scheduled_at: DateTime<Utc>,
    pub fires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUpdateOutcome {
    Armed,
    Applied,
    ProductMissing,
    Superseded,
    Cancelled,
    Failed,
    Abandoned,
}

impl PriceUpdateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::Applied => "applied",
            Self::ProductMissing => "product_missing",
            Self::Superseded => "superseded",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "armed" => Some(Self::Armed),
            "applied" => Some(Self::Applied),
            "product_missing" => Some(Self::ProductMissing),
            "superseded" => Some(Self::Superseded),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// Audit row describing one state change of a [`PriceUpdateJob`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateEvent {
    pub id: PriceUpdateEventId,
    pub job_id: PriceUpdateJobId,
    pub product_id: ProductId,
    pub new_price: Decimal,
    pub sequence: u64,
    pub outcome: PriceUpdateOutcome,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PriceUpdateEvent {
    pub fn for_job(
        job: &PriceUpdateJob,
        outcome: PriceUpdateOutcome,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: PriceUpdateEventId(Uuid::new_v4().to_string()),
            job_id: job.id.clone(),
            product_id: job.product_id,
            new_price: job.new_price,
            sequence: job.sequence,
            outcome,
            detail,
            occurred_at: Utc::now(),
        }
    }
}

/// How overlapping jobs for the same product resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Every fired job writes its price; whichever fires last wins.
    #[default]
    LastFireWins,
    /// A job is skipped if a job scheduled after it has already been applied.
    LastScheduledWins,
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastFireWins => "last_fire_wins",
            Self::LastScheduledWins => "last_scheduled_wins",
        }
    }

    /// Decides whether a firing job may write, given the sequence of the last
    /// job applied to the same product.
    pub fn should_apply(&self, sequence: u64, last_applied: Option<u64>) -> bool {
        match self {
            Self::LastFireWins => true,
            Self::LastScheduledWins => last_applied.map_or(true, |applied| sequence > applied),
        }
    }
}

impl std::str::FromStr for OverlapPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "last_fire_wins" => Ok(Self::LastFireWins),
            "last_scheduled_wins" => Ok(Self::LastScheduledWins),
            other => Err(DomainError::UnknownOverlapPolicy(other.to_string())),
        }
    }
}
