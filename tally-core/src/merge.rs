//! Merge/reconcile record sets into one ledger working set.
//!
//! Records are keyed by their normalized id. Records without an id get a
//! synthetic key and are always kept, even when otherwise identical.
//!
//! Collision rule (incumbent = already held, incoming = being absorbed):
//! - both times parse: the later wins, a tie goes to the incoming record
//! - only incoming parses: incoming replaces
//! - only incumbent parses: incumbent stays
//! - neither parses: incumbent stays
//!
//! Output order is not part of the contract; use [`sort_newest_first`] when it matters.

use std::collections::HashMap;

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    Id(String),
    Synthetic(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    KeepIncumbent,
    TakeIncoming,
}

/// Counts of what happened while merging, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// New keys added
    pub inserted: usize,
    /// Collisions where the incoming record replaced the incumbent
    pub replaced: usize,
    /// Collisions where the incumbent was kept
    pub retained: usize,
}

/// Incremental reconciler: absorb any number of record sets, then finish.
#[derive(Debug, Default)]
pub struct Reconciler {
    slots: Vec<Record>,
    index: HashMap<MergeKey, usize>,
    next_synthetic: usize,
    report: MergeReport,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn report(&self) -> MergeReport {
        self.report
    }

    pub fn absorb<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.absorb_one(record);
        }
    }

    fn absorb_one(&mut self, incoming: Record) {
        let key = match incoming.merge_key() {
            Some(id) => MergeKey::Id(id),
            None => {
                self.next_synthetic += 1;
                MergeKey::Synthetic(self.next_synthetic)
            }
        };

        match self.index.get(&key) {
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(incoming);
                self.report.inserted += 1;
            }
            Some(&slot) => match resolve(&self.slots[slot], &incoming) {
                Resolution::TakeIncoming => {
                    self.slots[slot] = incoming;
                    self.report.replaced += 1;
                }
                Resolution::KeepIncumbent => {
                    self.report.retained += 1;
                }
            },
        }
    }

    pub fn finish(self) -> Vec<Record> {
        self.slots
    }
}

fn resolve(incumbent: &Record, incoming: &Record) -> Resolution {
    match (incumbent.parsed_time(), incoming.parsed_time()) {
        (Some(old), Some(new)) if new >= old => Resolution::TakeIncoming,
        (Some(_), Some(_)) => Resolution::KeepIncumbent,
        (None, Some(_)) => Resolution::TakeIncoming,
        (Some(_), None) => Resolution::KeepIncumbent,
        (None, None) => Resolution::KeepIncumbent,
    }
}

/// Merge record sets in order; later sets are "incoming" relative to earlier ones.
pub fn merge<I, S>(sets: I) -> Vec<Record>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = Record>,
{
    let mut reconciler = Reconciler::new();
    for set in sets {
        reconciler.absorb(set);
    }
    reconciler.finish()
}

/// Sort newest first; records whose time does not parse go last, in their original order.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| match (a.parsed_time(), b.parsed_time()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, time: &str) -> Record {
        Record::default().with_id(id).with_time(time)
    }

    fn sorted_keys(records: &[Record]) -> Vec<(Option<String>, String)> {
        let mut keys: Vec<_> = records
            .iter()
            .map(|r| (r.merge_key(), r.time.clone()))
            .collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_merge_is_idempotent_for_unique_ids() {
        let x = vec![
            rec("A", "2025-03-01 10:00:00"),
            rec("B", "2025-03-02 11:00:00"),
            rec("C", "not a time"),
        ];
        let merged = merge([x.clone(), x.clone()]);
        assert_eq!(sorted_keys(&merged), sorted_keys(&x));
    }

    #[test]
    fn test_later_time_wins_regardless_of_order() {
        let r1 = rec("X1", "2025-03-01 09:00:00").with_amount(1.0);
        let r2 = rec("X1", "2025-03-01 12:00:00").with_amount(2.0);

        let forward = merge([vec![r1.clone()], vec![r2.clone()]]);
        assert_eq!(forward, vec![r2.clone()]);

        let backward = merge([vec![r2.clone()], vec![r1]]);
        assert_eq!(backward, vec![r2]);
    }

    #[test]
    fn test_tie_takes_incoming() {
        let a = rec("X1", "2025-03-01 09:00:00").with_kind("old");
        let b = rec("X1", "2025-03-01 09:00:00").with_kind("new");
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, "new");
    }

    #[test]
    fn test_unparseable_incumbent_is_replaced() {
        let a = rec("X1", "??").with_kind("old");
        let b = rec("X1", "2025-03-01 09:00:00").with_kind("new");
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged[0].kind, "new");
    }

    #[test]
    fn test_unparseable_incoming_does_not_regress() {
        let a = rec("X1", "2025-03-01 09:00:00").with_kind("old");
        let b = rec("X1", "??").with_kind("new");
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged[0].kind, "old");
    }

    #[test]
    fn test_neither_parses_keeps_incumbent() {
        let a = rec("X1", "").with_kind("old");
        let b = rec("X1", "??").with_kind("new");
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged[0].kind, "old");
    }

    #[test]
    fn test_missing_ids_are_never_merged() {
        let a = Record::default().with_time("2025-03-01 09:00:00");
        let b = a.clone();
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_ids_compare_after_normalization() {
        let a = rec("\"X1\"", "2025-03-01 09:00:00");
        let b = rec(" X1\t", "2025-03-01 10:00:00");
        let merged = merge([vec![a], vec![b]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].time, "2025-03-01 10:00:00");
    }

    #[test]
    fn test_reimport_scenario_keeps_latest() {
        let first_import = vec![
            rec("X1", "2025-03-01 10:00:00"),
            rec("X1", "2025-03-01 09:00:00"),
            rec("X1", "2025-03-01 09:30:00"),
        ];
        let ledger = merge([first_import]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].time, "2025-03-01 10:00:00");

        let second_import = vec![rec("X1", "2025-03-01 12:00:00")];
        let ledger = merge([ledger, second_import]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].time, "2025-03-01 12:00:00");
    }

    #[test]
    fn test_report_counts() {
        let mut r = Reconciler::new();
        r.absorb(vec![rec("A", "2025-03-01 09:00:00"), rec("B", "2025-03-01 09:00:00")]);
        r.absorb(vec![
            rec("A", "2025-03-02 09:00:00"),
            rec("B", "2025-02-01 09:00:00"),
            Record::default(),
        ]);
        assert_eq!(
            r.report(),
            MergeReport {
                inserted: 3,
                replaced: 1,
                retained: 1
            }
        );
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_sort_newest_first_puts_unparseable_last() {
        let mut v = vec![
            rec("A", "junk"),
            rec("B", "2025-03-01 09:00:00"),
            rec("C", "2025-03-05 09:00:00"),
        ];
        sort_newest_first(&mut v);
        let ids: Vec<_> = v.iter().map(|r| r.merge_key().unwrap()).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
    }
}
