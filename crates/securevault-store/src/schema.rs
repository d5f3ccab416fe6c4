//! Declarative record schema.
//!
//! Every record kind has a static table of [`FieldSpec`]s. The table is the
//! single place that decides which fields are secure (encrypted client-side),
//! which carry numbers or dates, which hold document lists, and which are
//! required on create. Repositories, the codec and the shell all read it.

use std::fmt;

/// How a field's value is shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    /// `YYYY-MM-DD` (or `MM/YY` for card expiry dates).
    Date,
    /// A list of attachment URLs.
    DocumentList,
}

/// Metadata for one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub secure: bool,
    pub required: bool,
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        secure: false,
        required: false,
    }
}

const fn secure(name: &'static str) -> FieldSpec {
    FieldSpec {
        secure: true,
        ..text(name)
    }
}

const fn date(name: &'static str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Date,
        ..text(name)
    }
}

const fn number(name: &'static str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Number,
        ..text(name)
    }
}

const fn documents(name: &'static str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::DocumentList,
        ..text(name)
    }
}

const fn required(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        required: true,
        ..spec
    }
}

const BANK_ACCOUNT_FIELDS: &[FieldSpec] = &[
    required(text("bank_name")),
    secure("account_number"),
    text("ifsc_code"),
    text("branch"),
    secure("card_number"),
    date("expiry_date"),
    secure("cvv"),
    date("issue_date"),
    secure("atm_pin"),
    secure("customer_id"),
    text("username"),
    secure("login_password"),
    secure("transaction_password"),
    text("account_owner"),
    secure("upi_pin"),
    text("status"),
];

const CREDIT_CARD_FIELDS: &[FieldSpec] = &[
    required(text("bank_name")),
    secure("credit_card_number"),
    date("issue_date"),
    date("expiry_date"),
    secure("cvv_number"),
    text("billing_cycle"),
    text("last_date"),
    number("transaction_limit"),
    secure("pin"),
    secure("internet_banking_id"),
    secure("login_password"),
    text("status"),
];

const GENERAL_DOCUMENT_FIELDS: &[FieldSpec] = &[
    required(text("document_name")),
    required(text("account_owner")),
    secure("document_number"),
    date("issue_date"),
    date("expiry_date"),
    documents("file_attachment"),
    text("notes"),
];

const INSURANCE_POLICY_FIELDS: &[FieldSpec] = &[
    required(text("policy_type")),
    required(text("policy_name")),
    required(secure("policy_number")),
    required(date("start_date")),
    date("expiry_date"),
    required(number("insured_amount")),
    required(number("premium_amount")),
    text("policy_year"),
    text("payment_year"),
    text("frequency"),
    text("nominee_name"),
    date("nominee_dob"),
    text("notes"),
    documents("policy_documents"),
];

const DEPOSIT_FIELDS: &[FieldSpec] = &[
    required(date("deposit_date")),
    required(number("amount")),
    required(text("bank_name")),
    text("branch"),
    text("deposit_type"),
];

const WEBSITE_FIELDS: &[FieldSpec] = &[
    required(text("account_owner")),
    text("account_type"),
    required(text("short_web_name")),
    text("number"),
    required(text("website_address")),
    secure("login_id"),
    secure("login_password"),
    secure("two_step_password"),
    secure("other_password"),
    text("notes"),
];

/// Server-managed fields present on every record.
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// The closed set of record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    BankAccount,
    CreditCard,
    GeneralDocument,
    InsurancePolicy,
    Deposit,
    Website,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        Self::BankAccount,
        Self::CreditCard,
        Self::GeneralDocument,
        Self::InsurancePolicy,
        Self::Deposit,
        Self::Website,
    ];

    /// Backend table name, also used in notification ids.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::BankAccount => "bank_accounts",
            Self::CreditCard => "credit_cards",
            Self::GeneralDocument => "general_documents",
            Self::InsurancePolicy => "insurance_policies",
            Self::Deposit => "deposits",
            Self::Website => "websites",
        }
    }

    /// REST collection path.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::BankAccount => "/api/bank-accounts",
            Self::CreditCard => "/api/credit-cards",
            Self::GeneralDocument => "/api/general-documents",
            Self::InsurancePolicy => "/api/insurance-policies",
            Self::Deposit => "/api/deposits",
            Self::Website => "/api/websites",
        }
    }

    /// Human label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BankAccount => "bank account",
            Self::CreditCard => "credit card",
            Self::GeneralDocument => "document",
            Self::InsurancePolicy => "insurance policy",
            Self::Deposit => "deposit",
            Self::Website => "website",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::BankAccount => BANK_ACCOUNT_FIELDS,
            Self::CreditCard => CREDIT_CARD_FIELDS,
            Self::GeneralDocument => GENERAL_DOCUMENT_FIELDS,
            Self::InsurancePolicy => INSURANCE_POLICY_FIELDS,
            Self::Deposit => DEPOSIT_FIELDS,
            Self::Website => WEBSITE_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn secure_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().filter(|f| f.secure).map(|f| f.name)
    }

    /// Whether this kind participates in expiry notifications.
    pub fn tracks_expiry(&self) -> bool {
        matches!(
            self,
            Self::BankAccount | Self::CreditCard | Self::GeneralDocument | Self::InsurancePolicy
        )
    }

    /// Parse a table name (`bank_accounts`) or path segment (`bank-accounts`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.table_name() == normalized)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_fields_per_kind() {
        let bank: Vec<_> = RecordKind::BankAccount.secure_fields().collect();
        assert_eq!(
            bank,
            [
                "account_number",
                "card_number",
                "cvv",
                "atm_pin",
                "customer_id",
                "login_password",
                "transaction_password",
                "upi_pin",
            ]
        );
        assert_eq!(RecordKind::Deposit.secure_fields().count(), 0);
        assert_eq!(
            RecordKind::GeneralDocument.secure_fields().collect::<Vec<_>>(),
            ["document_number"]
        );
        assert_eq!(RecordKind::Website.secure_fields().count(), 4);
    }

    #[test]
    fn field_names_are_unique_and_not_system_fields() {
        for kind in RecordKind::ALL {
            let fields = kind.fields();
            for (i, spec) in fields.iter().enumerate() {
                assert!(!SYSTEM_FIELDS.contains(&spec.name), "{kind}: {}", spec.name);
                assert!(
                    fields[i + 1..].iter().all(|other| other.name != spec.name),
                    "{kind}: duplicate {}",
                    spec.name
                );
            }
        }
    }

    #[test]
    fn document_lists_and_numbers() {
        let spec = RecordKind::InsurancePolicy.field("policy_documents").unwrap();
        assert_eq!(spec.kind, FieldKind::DocumentList);
        let spec = RecordKind::Deposit.field("amount").unwrap();
        assert_eq!(spec.kind, FieldKind::Number);
        assert!(spec.required);
        assert!(RecordKind::Deposit.field("cvv").is_none());
    }

    #[test]
    fn parse_accepts_table_and_path_forms() {
        assert_eq!(RecordKind::parse("credit_cards"), Some(RecordKind::CreditCard));
        assert_eq!(RecordKind::parse("credit-cards"), Some(RecordKind::CreditCard));
        assert_eq!(
            RecordKind::parse(" Insurance-Policies "),
            Some(RecordKind::InsurancePolicy)
        );
        assert_eq!(RecordKind::parse("cards"), None);
    }

    #[test]
    fn endpoints_match_tables() {
        for kind in RecordKind::ALL {
            assert_eq!(
                kind.endpoint().trim_start_matches("/api/").replace('-', "_"),
                kind.table_name()
            );
        }
    }

    #[test]
    fn expiry_tracking_kinds() {
        assert!(RecordKind::CreditCard.tracks_expiry());
        assert!(!RecordKind::Deposit.tracks_expiry());
        assert!(!RecordKind::Website.tracks_expiry());
    }
}
