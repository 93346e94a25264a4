//! tally-core: canonical transaction records, categories, and ledger reconciliation

pub mod category;
pub mod merge;
pub mod query;
pub mod record;
pub mod time;

pub use category::Category;
pub use merge::{merge, sort_newest_first, MergeReport, Reconciler};
pub use query::{
    by_month, find_by_id, is_expense, spending_by_category, summarize_by_billing_cycle, BillingCycleSummary,
    CategorySpend, EXPENSE, INCOME,
};
pub use record::{clean_id, Record};
pub use time::{parse_record_time, RECORD_TIME_FORMAT};
