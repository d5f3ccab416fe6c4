//! Expiry notifications.
//!
//! Bank accounts, credit cards, general documents and insurance policies with
//! an `expiry_date` inside the next 30 days (or already past) become
//! [`ExpiringItem`]s, unless their notification id was dismissed.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::records::{VaultEntity, VaultRecord};
use crate::schema::RecordKind;

/// Look-ahead window in days.
pub const EXPIRY_WINDOW_DAYS: i64 = 30;

/// A record that is about to expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringItem {
    pub id: String,
    pub kind: RecordKind,
    pub name: String,
    pub description: String,
    pub expiry_date: NaiveDate,
}

impl ExpiringItem {
    /// Stable id used for dismissal: `{table}-{id}`.
    pub fn notification_id(&self) -> String {
        notification_id(self.kind, &self.id)
    }

    /// Days from `today` until expiry (negative when already expired).
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }
}

pub fn notification_id(kind: RecordKind, id: &str) -> String {
    format!("{}-{id}", kind.table_name())
}

/// Parse `YYYY-MM-DD`, an RFC 3339 timestamp, or a card-style `MM/YY` /
/// `MM/YYYY` (read as the last day of that month).
pub fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }

    let (month, year) = raw.split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let year = year.trim();
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next_month.pred_opt()
}

/// Collect expiring items across `records`, excluding `dismissed` ids,
/// sorted by expiry date (soonest first).
pub fn collect_expiring(
    records: &[VaultRecord],
    dismissed: &BTreeSet<String>,
    today: NaiveDate,
) -> Vec<ExpiringItem> {
    let mut items: Vec<ExpiringItem> = records
        .iter()
        .filter(|record| record.kind().tracks_expiry())
        .filter_map(|record| {
            let expiry_date = parse_expiry(record.expiry_date()?)?;
            if (expiry_date - today).num_days() > EXPIRY_WINDOW_DAYS {
                return None;
            }
            if dismissed.contains(&notification_id(record.kind(), record.id())) {
                return None;
            }
            let (name, description) = describe(record);
            Some(ExpiringItem {
                id: record.id().to_string(),
                kind: record.kind(),
                name,
                description,
                expiry_date,
            })
        })
        .collect();

    items.sort_by_key(|item| item.expiry_date);
    items
}

fn describe(record: &VaultRecord) -> (String, String) {
    match record {
        VaultRecord::BankAccount(account) => {
            let number = account
                .card_number
                .as_deref()
                .or(account.account_number.as_deref());
            let mut description = last_four(number);
            if let Some(owner) = account.account_owner.as_deref().filter(|o| !o.is_empty()) {
                description = format!("{description} - {owner}");
            }
            (account.title(), description)
        }
        VaultRecord::CreditCard(card) => (
            card.title(),
            last_four(card.credit_card_number.as_deref()),
        ),
        VaultRecord::GeneralDocument(doc) => {
            let owner = if doc.account_owner.is_empty() {
                "Document".to_string()
            } else {
                doc.account_owner.clone()
            };
            (doc.document_name.clone(), owner)
        }
        VaultRecord::InsurancePolicy(policy) => {
            let number = if policy.policy_number.is_empty()
                || securevault_crypto::crypto::is_encrypted_field(&policy.policy_number)
            {
                policy.policy_type.clone()
            } else {
                policy.policy_number.clone()
            };
            (policy.title(), number)
        }
        other => (other.title(), String::new()),
    }
}

/// `****1234`, or an empty string when the number is missing or unreadable.
fn last_four(number: Option<&str>) -> String {
    let Some(number) = number else {
        return String::new();
    };
    if securevault_crypto::crypto::is_encrypted_field(number)
        || number == securevault_crypto::UNREADABLE_SENTINEL
    {
        return String::new();
    }
    let digits: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() < 4 {
        return String::new();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("****{tail}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
