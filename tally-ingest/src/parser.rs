//! Parse delimited statement exports into canonical records.
//!
//! Exports prepend a free-form preamble (account holder, date range, totals)
//! before the real header, so nothing is read until a row carrying all three
//! header markers shows up. After that, rows too short for the layout are
//! dropped and every other row becomes a record.

use std::path::Path;

use tally_core::{clean_id, Record};

use crate::decode::decode;
use crate::error::ParseError;
use crate::types::{ColumnLayout, Profile};

const CURRENCY_CHARS: &[char] = &['¥', '￥', '$', '€', '£', ','];

/// Read, decode, and parse a statement file with the given profile.
pub fn parse_statement(path: impl AsRef<Path>, profile: &Profile) -> Result<Vec<Record>, ParseError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ParseError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ParseError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let text = decode(&bytes, profile.encoding).ok_or_else(|| ParseError::Encoding {
        path: path.to_path_buf(),
        encoding: profile.encoding.name(),
    })?;

    let records = parse_statement_text(&text, profile);
    tracing::debug!(
        path = %path.display(),
        profile = profile.name,
        records = records.len(),
        "parsed statement"
    );
    Ok(records)
}

/// Parse already-decoded statement text.
pub fn parse_statement_text(text: &str, profile: &Profile) -> Vec<Record> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    let mut header_found = false;

    for (line, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!(line, error = %e, "skipping unreadable row");
                continue;
            }
        };

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        if !header_found {
            let joined = row.iter().collect::<Vec<_>>().join(",");
            if profile.markers.matches(&joined) {
                header_found = true;
            }
            continue;
        }

        if row.len() < profile.layout.min_columns {
            tracing::debug!(line, columns = row.len(), "skipping short row");
            continue;
        }

        out.push(to_record(&row, &profile.layout));
    }

    out
}

fn to_record(row: &csv::StringRecord, layout: &ColumnLayout) -> Record {
    let field = |idx: usize| clean_text(row.get(idx).unwrap_or(""));

    let id = clean_id(row.get(layout.id).unwrap_or(""));

    Record {
        time: field(layout.time),
        kind: field(layout.kind),
        counterparty: field(layout.counterparty),
        item: field(layout.item),
        direction: field(layout.direction),
        amount: parse_amount(row.get(layout.amount).unwrap_or("")),
        payment_method: field(layout.payment_method),
        status: field(layout.status),
        id: (!id.is_empty()).then_some(id),
        merchant_id: clean_id(row.get(layout.merchant_id).unwrap_or("")),
        note: field(layout.note),
    }
}

/// Trim, then collapse internal whitespace runs to one space.
fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Amount with currency symbols removed; anything unparseable is 0.0.
fn parse_amount(raw: &str) -> f64 {
    raw.replace(CURRENCY_CHARS, "").trim().parse().unwrap_or(0.0)
}
