//! Typed vault records.
//!
//! One struct per [`RecordKind`]. Field names match the backend columns.
//! Secure fields hold plaintext after a successful decrypt, the opaque
//! envelope when no session key was available, or the `***` sentinel when
//! decryption failed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::schema::RecordKind;

/// Common behaviour of every typed record.
pub trait VaultEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    /// Server-assigned id; empty until the record has been saved.
    fn id(&self) -> &str;

    /// Short label for listings.
    fn title(&self) -> String;

    /// Raw `expiry_date`, for kinds that have one.
    fn expiry_date(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub bank_name: String,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub branch: Option<String>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvv: Option<String>,
    pub issue_date: Option<String>,
    pub atm_pin: Option<String>,
    pub customer_id: Option<String>,
    pub username: Option<String>,
    pub login_password: Option<String>,
    pub transaction_password: Option<String>,
    pub account_owner: Option<String>,
    pub upi_pin: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub bank_name: String,
    pub credit_card_number: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub cvv_number: Option<String>,
    pub billing_cycle: Option<String>,
    pub last_date: Option<String>,
    pub transaction_limit: Option<f64>,
    pub pin: Option<String>,
    pub internet_banking_id: Option<String>,
    pub login_password: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralDocument {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub account_owner: String,
    pub document_number: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub file_attachment: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub policy_type: String,
    #[serde(default)]
    pub policy_name: String,
    #[serde(default)]
    pub policy_number: String,
    #[serde(default)]
    pub start_date: String,
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub insured_amount: f64,
    #[serde(default)]
    pub premium_amount: f64,
    pub policy_year: Option<String>,
    pub payment_year: Option<String>,
    pub frequency: Option<String>,
    pub nominee_name: Option<String>,
    pub nominee_dob: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub policy_documents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub deposit_date: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub bank_name: String,
    pub branch: Option<String>,
    pub deposit_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Website {
    #[serde(default)]
    pub id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub account_owner: String,
    pub account_type: Option<String>,
    #[serde(default)]
    pub short_web_name: String,
    pub number: Option<String>,
    #[serde(default)]
    pub website_address: String,
    pub login_id: Option<String>,
    pub login_password: Option<String>,
    pub two_step_password: Option<String>,
    pub other_password: Option<String>,
    pub notes: Option<String>,
}

impl VaultEntity for BankAccount {
    const KIND: RecordKind = RecordKind::BankAccount;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        let kind = if self.card_number.is_some() {
            "Debit Card"
        } else {
            "Bank Account"
        };
        format!("{} - {kind}", self.bank_name)
    }

    fn expiry_date(&self) -> Option<&str> {
        self.expiry_date.as_deref()
    }
}

impl VaultEntity for CreditCard {
    const KIND: RecordKind = RecordKind::CreditCard;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        format!("{} - Credit Card", self.bank_name)
    }

    fn expiry_date(&self) -> Option<&str> {
        self.expiry_date.as_deref()
    }
}

impl VaultEntity for GeneralDocument {
    const KIND: RecordKind = RecordKind::GeneralDocument;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.document_name.clone()
    }

    fn expiry_date(&self) -> Option<&str> {
        self.expiry_date.as_deref()
    }
}

impl VaultEntity for InsurancePolicy {
    const KIND: RecordKind = RecordKind::InsurancePolicy;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        if self.policy_name.is_empty() {
            self.policy_type.clone()
        } else {
            self.policy_name.clone()
        }
    }

    fn expiry_date(&self) -> Option<&str> {
        self.expiry_date.as_deref()
    }
}

impl VaultEntity for Deposit {
    const KIND: RecordKind = RecordKind::Deposit;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        format!("{} - {} ({})", self.bank_name, self.amount, self.deposit_date)
    }
}

impl VaultEntity for Website {
    const KIND: RecordKind = RecordKind::Website;

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        format!("{} ({})", self.short_web_name, self.website_address)
    }
}

// ---------------------------------------------------------------------------
// Untyped wrapper
// ---------------------------------------------------------------------------

/// Any record, tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VaultRecord {
    BankAccount(BankAccount),
    CreditCard(CreditCard),
    GeneralDocument(GeneralDocument),
    InsurancePolicy(InsurancePolicy),
    Deposit(Deposit),
    Website(Website),
}

macro_rules! with_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            VaultRecord::BankAccount($inner) => $body,
            VaultRecord::CreditCard($inner) => $body,
            VaultRecord::GeneralDocument($inner) => $body,
            VaultRecord::InsurancePolicy($inner) => $body,
            VaultRecord::Deposit($inner) => $body,
            VaultRecord::Website($inner) => $body,
        }
    };
}

impl VaultRecord {
    /// Build a record from an already-decoded wire object.
    pub fn from_value(kind: RecordKind, value: Value) -> StoreResult<Self> {
        Ok(match kind {
            RecordKind::BankAccount => Self::BankAccount(decode(value)?),
            RecordKind::CreditCard => Self::CreditCard(decode(value)?),
            RecordKind::GeneralDocument => Self::GeneralDocument(decode(value)?),
            RecordKind::InsurancePolicy => Self::InsurancePolicy(decode(value)?),
            RecordKind::Deposit => Self::Deposit(decode(value)?),
            RecordKind::Website => Self::Website(decode(value)?),
        })
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::BankAccount(_) => RecordKind::BankAccount,
            Self::CreditCard(_) => RecordKind::CreditCard,
            Self::GeneralDocument(_) => RecordKind::GeneralDocument,
            Self::InsurancePolicy(_) => RecordKind::InsurancePolicy,
            Self::Deposit(_) => RecordKind::Deposit,
            Self::Website(_) => RecordKind::Website,
        }
    }

    pub fn id(&self) -> &str {
        with_record!(self, r => r.id())
    }

    pub fn title(&self) -> String {
        with_record!(self, r => r.title())
    }

    pub fn expiry_date(&self) -> Option<&str> {
        with_record!(self, r => r.expiry_date())
    }

    pub fn to_value(&self) -> StoreResult<Value> {
        Ok(with_record!(self, r => serde_json::to_value(r)?))
    }
}

/// Decode a wire object into a typed record.
pub fn decode<T: VaultEntity>(value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::MalformedRecord {
        kind: T::KIND.table_name(),
        reason: e.to_string(),
    })
}

macro_rules! impl_from_record {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for VaultRecord {
                fn from(record: $variant) -> Self {
                    Self::$variant(record)
                }
            }
        )*
    };
}

impl_from_record!(
    BankAccount,
    CreditCard,
    GeneralDocument,
    InsurancePolicy,
    Deposit,
    Website
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let card: CreditCard = decode(json!({
            "id": "c1",
            "bank_name": "Axis",
            "transaction_limit": 50000.0,
        }))
        .unwrap();
        assert_eq!(card.id, "c1");
        assert_eq!(card.transaction_limit, Some(50000.0));
        assert!(card.cvv_number.is_none());
        assert_eq!(card.title(), "Axis - Credit Card");
    }

    #[test]
    fn decode_reports_kind_on_mismatch() {
        let err = decode::<Deposit>(json!({"amount": "lots"})).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedRecord { kind: "deposits", .. }
        ));
    }

    #[test]
    fn bank_title_depends_on_card() {
        let mut account = BankAccount {
            bank_name: "HDFC".into(),
            ..Default::default()
        };
        assert_eq!(account.title(), "HDFC - Bank Account");
        account.card_number = Some("4111".into());
        assert_eq!(account.title(), "HDFC - Debit Card");
    }

    #[test]
    fn policy_title_falls_back_to_type() {
        let policy = InsurancePolicy {
            policy_type: "Health".into(),
            ..Default::default()
        };
        assert_eq!(policy.title(), "Health");
    }

    #[test]
    fn vault_record_dispatch() {
        let record = VaultRecord::from_value(
            RecordKind::GeneralDocument,
            json!({"id": "d1", "document_name": "Passport", "account_owner": "Asha", "expiry_date": "2030-01-01"}),
        )
        .unwrap();
        assert_eq!(record.kind(), RecordKind::GeneralDocument);
        assert_eq!(record.id(), "d1");
        assert_eq!(record.title(), "Passport");
        assert_eq!(record.expiry_date(), Some("2030-01-01"));
        assert_eq!(record.to_value().unwrap()["account_owner"], "Asha");

        let website: VaultRecord = Website::default().into();
        assert_eq!(website.expiry_date(), None);
    }
}
