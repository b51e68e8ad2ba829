//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// User role
///
/// Closed set; unrecognized strings are rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Citizen,
    Contractor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "CITIZEN",
            Role::Contractor => "CONTRACTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CITIZEN" => Ok(Role::Citizen),
            "CONTRACTOR" => Ok(Role::Contractor),
            "ADMIN" => Ok(Role::Admin),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// Report triage status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "OPEN",
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ReportStatus::Open),
            "IN_PROGRESS" => Ok(ReportStatus::InProgress),
            "RESOLVED" => Ok(ReportStatus::Resolved),
            other => Err(Error::InvalidInput(format!("Unknown status: {}", other))),
        }
    }
}

/// Language-model judgment stored on a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidEvaluation {
    Reasonable,
    Unreasonable,
}

impl BidEvaluation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidEvaluation::Reasonable => "Reasonable",
            BidEvaluation::Unreasonable => "Unreasonable",
        }
    }
}

impl fmt::Display for BidEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidEvaluation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reasonable" => Ok(BidEvaluation::Reasonable),
            "Unreasonable" => Ok(BidEvaluation::Unreasonable),
            other => Err(Error::InvalidInput(format!("Unknown bid evaluation: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Registered account
///
/// Credential columns are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Owning-user summary embedded in report, comment and bid views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

/// Report row
///
/// `severity`, `urgency` and `processed_image` are written once at creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub status: ReportStatus,
    pub severity: String,
    pub urgency: String,
    pub processed_image: Option<String>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub url: String,
    pub report_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub report_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: i64,
    pub amount: f64,
    pub description: String,
    pub contractor_id: i64,
    pub report_id: i64,
    pub ai_evaluation: BidEvaluation,
    pub created_at: DateTime<Utc>,
    pub contractor: UserSummary,
}
