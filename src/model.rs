//! Canonical records produced by every provider adapter

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OriginType {
    Exchange,
    Wallet,
}

/// Normalized activity kind. Providers that report a label outside the
/// canonical set keep it verbatim under `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Bought,
    Sold,
    Deposit,
    Withdraw,
    Transferred,
    In,
    Out,
    Unknown,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Bought => "Bought",
            Action::Sold => "Sold",
            Action::Deposit => "Deposit",
            Action::Withdraw => "Withdraw",
            Action::Transferred => "Transferred",
            Action::In => "In",
            Action::Out => "Out",
            Action::Unknown => "Unknown",
            Action::Other(label) => label,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A held balance of one currency/token on one origin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub origin_type: OriginType,
    pub origin_name: String,
    pub name: String,
    pub symbol: String,
    pub balance: Decimal,
    pub value: Decimal,
}

/// One historical transaction/event on one origin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub origin_type: OriginType,
    pub origin_name: String,
    pub action: Action,
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Activity {
    /// The sort key for merged activity lists. `None` when the date is
    /// absent or not RFC 3339.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.date
            .as_deref()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
    }
}
