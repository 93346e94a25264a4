//! Read-only queries over an in-memory ledger

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

use crate::record::{clean_id, Record};
use crate::time::{is_in_month, parse_record_time};

/// Direction marker of an outgoing payment.
pub const EXPENSE: &str = "支出";
/// Direction marker of an incoming payment.
pub const INCOME: &str = "收入";

/// Records whose time parses and falls inside `year`-`month`.
pub fn by_month(records: &[Record], year: i32, month: u32) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| is_in_month(&r.time, year, month))
        .collect()
}

/// First record whose normalized id equals the normalized `id`.
pub fn find_by_id<'a>(records: &'a [Record], id: &str) -> Option<&'a Record> {
    let wanted = clean_id(id);
    if wanted.is_empty() {
        return None;
    }
    records
        .iter()
        .find(|r| r.merge_key().as_deref() == Some(wanted.as_str()))
}

/// Direction text without the quotes some exports leave around it.
pub fn direction_of(record: &Record) -> String {
    clean_id(&record.direction)
}

pub fn is_expense(record: &Record) -> bool {
    direction_of(record) == EXPENSE
}

/// Spend in one category and its percentage of all spending.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategorySpend {
    pub amount: f64,
    /// 0.0..=100.0; zero when nothing was spent at all
    pub share: f64,
}

/// Expense totals per type label, sorted by label. Income and neutral rows are ignored.
pub fn spending_by_category<'a, I>(records: I) -> BTreeMap<String, CategorySpend>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut totals: BTreeMap<String, CategorySpend> = BTreeMap::new();
    for r in records.into_iter().filter(|r| is_expense(r)) {
        totals.entry(r.kind.clone()).or_default().amount += r.amount;
    }

    let spent: f64 = totals.values().map(|c| c.amount).sum();
    if spent != 0.0 {
        for c in totals.values_mut() {
            c.share = c.amount / spent * 100.0;
        }
    }
    totals
}

/// Totals per direction for the first 7 and 30 days of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingCycleSummary {
    /// Day of the earliest parseable transaction; day one of both windows
    pub start: NaiveDate,
    pub week: BTreeMap<String, f64>,
    pub month: BTreeMap<String, f64>,
}

/// Sum amounts per direction over the 7-day and 30-day windows starting on the
/// earliest transaction day, both ends inclusive.
///
/// Records whose time does not parse are left out. `None` when no time parses.
pub fn summarize_by_billing_cycle<'a, I>(records: I) -> Option<BillingCycleSummary>
where
    I: IntoIterator<Item = &'a Record>,
{
    let dated: Vec<(NaiveDate, &Record)> = records
        .into_iter()
        .filter_map(|r| parse_record_time(&r.time).map(|t| (t.date(), r)))
        .collect();
    let start = dated.iter().map(|(d, _)| *d).min()?;

    let window = |days: u64| {
        let end = start.checked_add_days(Days::new(days - 1)).unwrap_or(NaiveDate::MAX);
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for (d, r) in &dated {
            if *d <= end {
                *sums.entry(direction_of(r)).or_insert(0.0) += r.amount;
            }
        }
        sums
    };

    Some(BillingCycleSummary {
        start,
        week: window(7),
        month: window(30),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Vec<Record> {
        vec![
            Record::default()
                .with_id("A")
                .with_time("2025-03-02 10:00:00")
                .with_kind("shopping")
                .with_direction(EXPENSE)
                .with_amount(10.0),
            Record::default()
                .with_id("B")
                .with_time("2025-04-02 10:00:00")
                .with_kind("shopping")
                .with_direction("\"支出\"")
                .with_amount(5.5),
            Record::default()
                .with_id("C")
                .with_time("2025-03-31 23:59:59")
                .with_kind("housing")
                .with_direction(EXPENSE)
                .with_amount(84.5),
            Record::default()
                .with_id("D")
                .with_time("2025-03-05 09:00:00")
                .with_kind("transfer accounts")
                .with_direction(INCOME)
                .with_amount(800.0),
            Record::default().with_time("broken").with_amount(1.0),
        ]
    }

    fn tx(time: &str, direction: &str, amount: f64) -> Record {
        Record::default()
            .with_time(time)
            .with_direction(direction)
            .with_amount(amount)
    }

    #[test]
    fn test_by_month() {
        let l = ledger();
        let march = by_month(&l, 2025, 3);
        assert_eq!(march.len(), 3);
        assert!(march.iter().all(|r| r.time.starts_with("2025-03")));
    }

    #[test]
    fn test_find_by_id_normalizes() {
        let l = ledger();
        assert_eq!(find_by_id(&l, "\"B\" ").unwrap().amount, 5.5);
        assert!(find_by_id(&l, "Z").is_none());
        assert!(find_by_id(&l, "").is_none());
    }

    #[test]
    fn test_spending_counts_only_expenses() {
        let l = ledger();
        let totals = spending_by_category(&l);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["shopping"].amount, 15.5);
        assert_eq!(totals["housing"].amount, 84.5);
        assert!((totals["shopping"].share - 15.5).abs() < 1e-9);
        assert!((totals["housing"].share - 84.5).abs() < 1e-9);
        assert!(!totals.contains_key("transfer accounts"));
    }

    #[test]
    fn test_spending_with_no_expenses_is_empty() {
        let l = vec![tx("2025-03-05 09:00:00", INCOME, 10.0)];
        assert!(spending_by_category(&l).is_empty());
    }

    #[test]
    fn test_billing_cycle_windows() {
        let l = vec![
            tx("2025-05-10 10:00:00", EXPENSE, 100.0),
            tx("2025-05-10 12:00:00", INCOME, 300.0),
            tx("2025-05-10 09:00:00", EXPENSE, 50.0),
            tx("2025-05-16 23:59:59", EXPENSE, 1.0),
            tx("2025-05-23 08:00:00", EXPENSE, 150.0),
            tx("2025-05-23 15:00:00", INCOME, 300.0),
            tx("2025-06-09 00:00:00", EXPENSE, 7.0),
            tx("never", EXPENSE, 999.0),
        ];

        let s = summarize_by_billing_cycle(&l).unwrap();
        assert_eq!(s.start, NaiveDate::from_ymd_opt(2025, 5, 10).unwrap());
        assert_eq!(s.week[EXPENSE], 151.0);
        assert_eq!(s.week[INCOME], 300.0);
        assert_eq!(s.month[EXPENSE], 301.0);
        assert_eq!(s.month[INCOME], 600.0);
    }

    #[test]
    fn test_billing_cycle_needs_a_parseable_time() {
        let l = vec![tx("broken", EXPENSE, 1.0)];
        assert!(summarize_by_billing_cycle(&l).is_none());
        let empty: Vec<Record> = Vec::new();
        assert!(summarize_by_billing_cycle(&empty).is_none());
    }
}
