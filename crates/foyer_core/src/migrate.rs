//! crates/foyer_core/src/migrate.rs
//!
//! One-time schema upgrade run at load. Earlier deployments stored users as
//! bare strings and payments as a flat array; this module promotes those
//! shapes to the current typed document exactly once, instead of re-inferring
//! them on every read.

use crate::domain::{AppData, Payment, User, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("stored document is not an object")]
    NotAnObject,
    #[error("stored document does not deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Upgrades a raw stored document to the current schema and stamps
/// `schema_version`. Already-current documents pass through unchanged apart
/// from the stamp.
pub fn upgrade(mut raw: Value) -> Result<AppData, MigrateError> {
    let obj = raw.as_object_mut().ok_or(MigrateError::NotAnObject)?;

    promote_string_users(obj);
    promote_flat_payments(obj);
    promote_numeric_group_ids(obj);
    promote_ledger_dates(obj);

    obj.insert("schemaVersion".into(), Value::from(SCHEMA_VERSION));
    let data: AppData = serde_json::from_value(raw)?;
    Ok(data)
}

/// `users: ["Ahmed", ...]` -> `users: [{id, name, createdAt}, ...]`.
/// Synthesized ids reuse the name; they stay stable across reloads.
fn promote_string_users(obj: &mut serde_json::Map<String, Value>) {
    let Some(Value::Array(users)) = obj.get_mut("users") else {
        return;
    };
    for user in users.iter_mut() {
        if let Value::String(name) = user {
            let promoted = User {
                id: format!("legacy-{}", name),
                name: name.clone(),
                created_at: Utc::now(),
            };
            *user = serde_json::to_value(promoted).unwrap_or(Value::Null);
        }
    }
}

/// `payments: [{id, userName, amount, date, week}, ...]` -> week-keyed,
/// id-keyed maps. Later records for the same user and week replace earlier
/// ones, preserving the one-payment-per-user-per-week rule.
fn promote_flat_payments(obj: &mut serde_json::Map<String, Value>) {
    let Some(Value::Array(flat)) = obj.get("payments") else {
        return;
    };

    let mut weeks: BTreeMap<String, BTreeMap<String, Payment>> = BTreeMap::new();
    for entry in flat {
        let Ok(payment) = serde_json::from_value::<Payment>(entry.clone()) else {
            continue;
        };
        let week = weeks.entry(payment.week.clone()).or_default();
        week.retain(|_, p| p.user_name != payment.user_name);
        week.insert(payment.id.clone(), payment);
    }

    obj.insert(
        "payments".into(),
        serde_json::to_value(weeks).unwrap_or(Value::Null),
    );
}

/// Older documents generated group ids from a millisecond clock and stored
/// them as numbers.
fn promote_numeric_group_ids(obj: &mut serde_json::Map<String, Value>) {
    let Some(Value::Array(groups)) = obj.get_mut("groups") else {
        return;
    };
    for group in groups.iter_mut() {
        let Some(group) = group.as_object_mut() else {
            continue;
        };
        if let Some(Value::Number(n)) = group.get("id") {
            let id = n.to_string();
            group.insert("id".into(), Value::String(id));
        }
    }
}

/// Ledger entries once carried date-only strings. Rewrite them to full
/// timestamps at midnight UTC so the typed document deserializes.
fn promote_ledger_dates(obj: &mut serde_json::Map<String, Value>) {
    let Some(Value::Object(months)) = obj.get_mut("monthlyPayments") else {
        return;
    };
    for ledgers in months.values_mut() {
        let Some(ledgers) = ledgers.as_object_mut() else {
            continue;
        };
        for ledger in ledgers.values_mut() {
            let Some(Value::Array(entries)) = ledger.get_mut("payments") else {
                continue;
            };
            for entry in entries.iter_mut() {
                let Some(entry) = entry.as_object_mut() else {
                    continue;
                };
                if let Some(Value::String(raw)) = entry.get("date") {
                    if let Some(ts) = parse_loose_timestamp(raw) {
                        entry.insert("date".into(), Value::String(ts.to_rfc3339()));
                    }
                }
            }
        }
    }
}

/// Parses a stored timestamp, tolerating the date-only strings older
/// ledgers used.
pub fn parse_loose_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = s.parse::<DateTime<Utc>>() {
        return Some(ts);
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_documents_pass_through() {
        let doc = AppData::default();
        let raw = serde_json::to_value(&doc).unwrap();
        let upgraded = upgrade(raw).unwrap();
        assert_eq!(upgraded, doc);
    }

    #[test]
    fn bare_string_users_are_promoted() {
        let raw = json!({
            "adminPassword": "admin123",
            "weeklyAmount": 100.0,
            "siteTitle": "Gestion Cotisation",
            "users": ["Ahmed", "Fatima"],
        });
        let data = upgrade(raw).unwrap();
        assert_eq!(data.users.len(), 2);
        assert_eq!(data.users[0].name, "Ahmed");
        assert!(!data.users[0].id.is_empty());
        assert_eq!(data.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn flat_payment_arrays_become_week_keyed_maps() {
        let raw = json!({
            "adminPassword": "admin123",
            "weeklyAmount": 100.0,
            "siteTitle": "Gestion Cotisation",
            "payments": [
                {"id": "1", "userName": "Ahmed", "amount": 100.0,
                 "date": "2026-08-24T10:00:00Z", "week": "2026-08-24"},
                {"id": "2", "userName": "Fatima", "amount": 80.0,
                 "date": "2026-08-24T11:00:00Z", "week": "2026-08-24"},
                // Later record for Ahmed in the same week replaces the first.
                {"id": "3", "userName": "Ahmed", "amount": 120.0,
                 "date": "2026-08-24T12:00:00Z", "week": "2026-08-24"},
            ],
        });
        let data = upgrade(raw).unwrap();
        let week = data.payments.get("2026-08-24").unwrap();
        assert_eq!(week.len(), 2);
        assert_eq!(data.payment_for("2026-08-24", "Ahmed").unwrap().amount, 120.0);
        assert_eq!(data.payment_for("2026-08-24", "Fatima").unwrap().amount, 80.0);
    }

    #[test]
    fn missing_sections_default() {
        let raw = json!({
            "adminPassword": "pw",
            "weeklyAmount": 50.0,
            "siteTitle": "t",
        });
        let data = upgrade(raw).unwrap();
        assert!(data.history.is_empty());
        assert!(data.group_rotation.start_week.is_none());
        assert_eq!(data.monthly_settings.loyer_defaut, 4500.0);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(matches!(
            upgrade(json!([1, 2, 3])),
            Err(MigrateError::NotAnObject)
        ));
    }

    #[test]
    fn numeric_group_ids_become_strings() {
        let raw = json!({
            "adminPassword": "pw",
            "weeklyAmount": 100.0,
            "siteTitle": "t",
            "groups": [
                {"id": 1724500000000u64, "name": "Groupe 1",
                 "task": "marche", "members": ["Ahmed"]},
            ],
        });
        let data = upgrade(raw).unwrap();
        assert_eq!(data.groups[0].id, "1724500000000");
    }

    #[test]
    fn date_only_ledger_entries_are_normalized() {
        let raw = json!({
            "adminPassword": "pw",
            "weeklyAmount": 100.0,
            "siteTitle": "t",
            "monthlyPayments": {
                "2026-08": {
                    "Ahmed": {
                        "paid": 500.0,
                        "remaining": 737.5,
                        "payments": [
                            {"amount": 500.0, "date": "2026-08-10"},
                        ],
                    },
                },
            },
        });
        let data = upgrade(raw).unwrap();
        let ledger = &data.monthly_payments["2026-08"]["Ahmed"];
        assert_eq!(
            ledger.payments[0].date,
            parse_loose_timestamp("2026-08-10").unwrap()
        );
    }

    #[test]
    fn loose_timestamps_accept_date_only_strings() {
        assert!(parse_loose_timestamp("2026-08-24").is_some());
        assert!(parse_loose_timestamp("2026-08-24T10:00:00Z").is_some());
        assert!(parse_loose_timestamp("not a date").is_none());
    }
}
