use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use fsp_common::Cents;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------  InvestmentStatus  ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum InvestmentStatus {
    /// The pledge has been created and no verified payment event has arrived yet.
    Pending,
    /// A verified payment success event has been applied. Terminal, except for the refund path.
    Confirmed,
    /// The payment failed or the pledge was voided. Terminal.
    Cancelled,
    /// The investor was refunded after confirmation. Terminal.
    Refunded,
}

impl InvestmentStatus {
    /// The explicit transition table for investments. Anything not listed here is rejected rather
    /// than written.
    pub fn can_transition_to(&self, new: InvestmentStatus) -> bool {
        use InvestmentStatus::*;
        matches!((self, new), (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Refunded))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvestmentStatus::Pending)
    }
}

impl Display for InvestmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvestmentStatus::Pending => write!(f, "Pending"),
            InvestmentStatus::Confirmed => write!(f, "Confirmed"),
            InvestmentStatus::Cancelled => write!(f, "Cancelled"),
            InvestmentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for InvestmentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid investment status: {s}"))),
        }
    }
}

impl From<String> for InvestmentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid investment status in storage: {value}. Defaulting to Pending");
            InvestmentStatus::Pending
        })
    }
}

//--------------------------------------   PaymentMethod    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Hosted card checkout. 2.9% + 30¢ processing fee.
    CardGateway,
    /// Mobile money push. 1% processing fee.
    MobileMoney,
    /// Manual bank transfer. No processing fee.
    BankTransfer,
}

impl PaymentMethod {
    /// Methods that redirect the investor to a gateway-hosted page and confirm asynchronously via
    /// webhook. Bank transfers are confirmed out of band.
    pub fn uses_hosted_checkout(&self) -> bool {
        matches!(self, PaymentMethod::CardGateway | PaymentMethod::MobileMoney)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::CardGateway => write!(f, "CardGateway"),
            PaymentMethod::MobileMoney => write!(f, "MobileMoney"),
            PaymentMethod::BankTransfer => write!(f, "BankTransfer"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CardGateway" => Ok(Self::CardGateway),
            "MobileMoney" => Ok(Self::MobileMoney),
            "BankTransfer" => Ok(Self::BankTransfer),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment method in storage: {value}. Defaulting to BankTransfer");
            PaymentMethod::BankTransfer
        })
    }
}

//--------------------------------------   ProjectStatus    ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ProjectStatus {
    Draft,
    Published,
    Approved,
    /// The funding goal has been reached. Set only by the funding aggregator.
    Funded,
    /// Escrow has been released. Set only by the escrow settlement operation.
    Completed,
    Cancelled,
}

impl ProjectStatus {
    /// Statuses from which a project can accept new pledges or be advanced to `Funded`.
    pub fn is_fundable(&self) -> bool {
        matches!(self, ProjectStatus::Published | ProjectStatus::Approved)
    }

    /// The explicit transition table for projects. `Funded` is reached only through the
    /// aggregator and `Completed` only through escrow settlement; arbitrary writes are rejected.
    pub fn can_transition_to(&self, new: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, new),
            (Draft, Published)
                | (Draft, Approved)
                | (Draft, Cancelled)
                | (Published, Funded)
                | (Published, Cancelled)
                | (Approved, Funded)
                | (Approved, Cancelled)
                | (Funded, Completed)
                | (Funded, Published)
        )
    }
}

impl Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Draft => write!(f, "Draft"),
            ProjectStatus::Published => write!(f, "Published"),
            ProjectStatus::Approved => write!(f, "Approved"),
            ProjectStatus::Funded => write!(f, "Funded"),
            ProjectStatus::Completed => write!(f, "Completed"),
            ProjectStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(Self::Draft),
            "Published" => Ok(Self::Published),
            "Approved" => Ok(Self::Approved),
            "Funded" => Ok(Self::Funded),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid project status: {s}"))),
        }
    }
}

impl From<String> for ProjectStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid project status in storage: {value}. Defaulting to Draft");
            ProjectStatus::Draft
        })
    }
}

//--------------------------------------     Investment     ----------------------------------------------------------
/// A pledge by a user toward a project. Mutated only by the investment ledger and the escrow
/// settlement operation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Investment {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub amount: Cents,
    pub payment_method: PaymentMethod,
    pub status: InvestmentStatus,
    /// The gateway session/intent id. Unique; doubles as the dedup key for webhook replay.
    pub external_ref: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub escrow_released: bool,
    pub escrow_released_at: Option<DateTime<Utc>>,
    /// Opaque key-value payload, carried through the gateway session so webhooks can resolve the
    /// investment.
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    NewInvestment   ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewInvestment {
    pub user_id: i64,
    pub project_id: i64,
    pub amount: Cents,
    pub payment_method: PaymentMethod,
    pub metadata: Option<String>,
}

impl NewInvestment {
    pub fn new(user_id: i64, project_id: i64, amount: Cents, payment_method: PaymentMethod) -> Self {
        Self { user_id, project_id, amount, payment_method, metadata: None }
    }

    pub fn with_metadata(mut self, metadata: String) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

//--------------------------------------      Project       ----------------------------------------------------------
/// The funding-relevant view of a project. Funding totals are never stored on this record; they
/// are recomputed from confirmed investments on every read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub funding_goal: Cents,
    pub funding_deadline: DateTime<Utc>,
    pub status: ProjectStatus,
    pub escrow_amount: Option<Cents>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn can_receive_funding(&self, now: DateTime<Utc>) -> bool {
        self.status.is_fundable() && self.funding_deadline > now
    }

    pub fn escrow_released(&self) -> bool {
        self.escrow_released_at.is_some()
    }
}

//--------------------------------------     NewProject     ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub funding_goal: Cents,
    pub funding_deadline: DateTime<Utc>,
}

impl NewProject {
    pub fn new(title: impl Into<String>, funding_goal: Cents, funding_deadline: DateTime<Utc>) -> Self {
        Self { title: title.into(), funding_goal, funding_deadline }
    }
}
