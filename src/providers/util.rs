use chrono::{SecondsFormat, TimeZone, Utc};

use crate::model::Action;

/// Infers transfer direction by comparing the wallet address against the
/// transaction endpoints, case-insensitively.
pub fn tx_direction(address: &str, from: &str, to: &str) -> Action {
    let address = address.to_lowercase();

    if address == from.to_lowercase() {
        return Action::Out;
    }
    if address == to.to_lowercase() {
        return Action::In;
    }
    Action::Unknown
}

pub fn status_from_confirmations(confirmations: u64) -> &'static str {
    if confirmations > 0 { "Confirmed" } else { "Pending" }
}

/// RFC 3339 with millisecond precision, e.g. `2023-04-01T10:30:00.000Z`.
pub fn format_timestamp_secs(secs: i64) -> Option<String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn format_timestamp_millis(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
