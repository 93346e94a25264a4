//! Canonical transaction record shared by every tally crate

use serde::{Deserialize, Serialize};

use crate::time::parse_record_time;
use chrono::NaiveDateTime;

/// One transaction, normalized from a provider export.
///
/// Field names on disk follow the existing ledger files, so a ledger written by
/// older imports loads without migration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Timestamp text, canonically `YYYY-MM-DD HH:MM:SS`; kept verbatim when unparseable
    #[serde(rename = "transactionTime")]
    pub time: String,
    /// Provider transaction type, later the spending category
    #[serde(rename = "transactionType")]
    pub kind: String,
    pub counterparty: String,
    pub item: String,
    /// Income/expense marker as written by the provider
    #[serde(rename = "incExp")]
    pub direction: String,
    pub amount: f64,
    #[serde(rename = "paymentMethod")]
    pub payment_method: String,
    pub status: String,
    /// Provider transaction id, the merge key
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    pub note: String,
}

impl Record {
    /// Normalized merge key, `None` when the record carries no usable id.
    pub fn merge_key(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(clean_id)
            .filter(|id| !id.is_empty())
    }

    /// Parsed timestamp, `None` for mangled or missing time text.
    pub fn parsed_time(&self) -> Option<NaiveDateTime> {
        parse_record_time(&self.time)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = time.into();
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = counterparty.into();
        self
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = direction.into();
        self
    }
}

/// Strip quotes and surrounding whitespace from a provider id.
///
/// Exports wrap ids in quotes or pad them with tabs to stop spreadsheets from
/// mangling long numbers.
pub fn clean_id(raw: &str) -> String {
    raw.replace('"', "").trim().to_string()
}
