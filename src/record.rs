//! Stamps canonical records with origin provenance and a fresh identifier

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::{Action, Activity, Asset, OriginType};

/// Everything an adapter knows about an activity before provenance is added.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub action: Action,
    pub amount: Decimal,
    pub currency: String,
    pub date: Option<String>,
    pub transaction_type: Option<String>,
    pub status: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Composed into each adapter; carries the fixed origin tag.
#[derive(Debug, Clone)]
pub struct RecordStamper {
    origin_type: OriginType,
    origin_name: String,
}

impl RecordStamper {
    pub fn exchange(name: &str) -> Self {
        RecordStamper {
            origin_type: OriginType::Exchange,
            origin_name: name.to_string(),
        }
    }

    pub fn wallet(name: &str) -> Self {
        RecordStamper {
            origin_type: OriginType::Wallet,
            origin_name: name.to_string(),
        }
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn asset(&self, name: &str, symbol: &str, balance: Decimal, value: Decimal) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            origin_type: self.origin_type,
            origin_name: self.origin_name.clone(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            balance,
            value,
        }
    }

    pub fn activity(&self, draft: ActivityDraft) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            origin_type: self.origin_type,
            origin_name: self.origin_name.clone(),
            action: draft.action,
            amount: draft.amount,
            currency: draft.currency,
            date: draft.date,
            transaction_type: draft.transaction_type,
            status: draft.status,
            details: draft.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_asset_carries_origin_and_unique_id() {
        let stamper = RecordStamper::exchange("Binance");

        let first = stamper.asset("Bitcoin", "BTC", dec!(1), dec!(30000));
        let second = stamper.asset("Ethereum", "ETH", dec!(2), dec!(4000));

        assert_eq!(first.origin_type, OriginType::Exchange);
        assert_eq!(first.origin_name, "Binance");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_activity_carries_origin() {
        let stamper = RecordStamper::wallet("cold storage");

        let activity = stamper.activity(ActivityDraft {
            action: Action::Out,
            amount: dec!(0.25),
            currency: "BTC".to_string(),
            date: Some("2023-01-01T00:00:00.000Z".to_string()),
            transaction_type: Some("Transaction".to_string()),
            status: Some("Confirmed".to_string()),
            details: None,
        });

        assert_eq!(activity.origin_type, OriginType::Wallet);
        assert_eq!(activity.origin_name, "cold storage");
        assert_eq!(activity.action, Action::Out);
    }
}
