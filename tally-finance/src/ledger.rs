//! Ledger store: the only code that touches the ledger and staging files.
//!
//! Both files are pretty-printed JSON arrays of records. Writes go to a sibling
//! temp file that is renamed over the target, so a reader never sees a
//! half-written ledger.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tally_core::{clean_id, MergeReport, Reconciler, Record};

/// Outcome of folding a staging file into the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub staged: usize,
    pub ledger_size: usize,
    pub merge: MergeReport,
}

/// Load a ledger-shaped file. A missing file is an empty ledger.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let p = path.as_ref();
    if !p.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

/// Replace the file at `path` with `records`, creating parent directories.
pub fn save(records: &[Record], path: impl AsRef<Path>) -> Result<()> {
    let p = path.as_ref();
    let json = serde_json::to_string_pretty(records).context("serialize records")?;
    write_atomic(p, json.as_bytes())?;

    tracing::debug!(path = %p.display(), records = records.len(), "saved records");
    Ok(())
}

/// Durably replace `path` with `bytes`.
///
/// The data is synced in a sibling temp file before the rename, and the rename
/// is synced through the parent directory, so after a crash `path` holds either
/// the old or the new content in full.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|d| !d.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(bytes).with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    sync_dir(parent.unwrap_or(Path::new(".")))?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("sync directory {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    // no directory handle to sync on this platform
    Ok(())
}

/// Merge the staging file into the ledger, then delete the staging file.
///
/// The ledger is durably replaced before staging is removed, so after a crash
/// either file still holds every record seen so far.
pub fn commit_merge(staging: impl AsRef<Path>, ledger: impl AsRef<Path>) -> Result<CommitReport> {
    let staging = staging.as_ref();
    let ledger = ledger.as_ref();

    if !staging.exists() {
        let ledger_size = load(ledger)?.len();
        return Ok(CommitReport {
            ledger_size,
            ..CommitReport::default()
        });
    }

    let existing = load(ledger)?;
    let staged = load(staging)?;
    let staged_count = staged.len();

    let mut reconciler = Reconciler::new();
    reconciler.absorb(existing);
    reconciler.absorb(staged);
    let merge = reconciler.report();
    let merged = reconciler.finish();

    save(&merged, ledger)?;
    fs::remove_file(staging).with_context(|| format!("remove {}", staging.display()))?;

    tracing::info!(
        staged = staged_count,
        inserted = merge.inserted,
        replaced = merge.replaced,
        retained = merge.retained,
        ledger_size = merged.len(),
        "committed staging into ledger"
    );

    Ok(CommitReport {
        staged: staged_count,
        ledger_size: merged.len(),
        merge,
    })
}

/// Overwrite the type of the record with the given id. Returns false when no record matched.
pub fn set_type(path: impl AsRef<Path>, id: &str, label: &str) -> Result<bool> {
    let p = path.as_ref();
    let wanted = clean_id(id);
    let mut records = load(p)?;

    let mut matched = false;
    for r in records.iter_mut() {
        if r.merge_key().as_deref() == Some(wanted.as_str()) {
            r.kind = label.to_lowercase();
            matched = true;
        }
    }

    if matched {
        save(&records, p)?;
    }
    Ok(matched)
}

/// Column headings for CSV export, in record field order.
const EXPORT_HEADER: [&str; 11] = [
    "交易时间", "交易类型", "交易对象", "商品", "收/支", "金额", "支付方式", "状态", "交易号", "商户号", "备注",
];

/// Write records as a UTF-8 CSV with a byte order mark, so spreadsheet apps pick the encoding.
pub fn export_csv(records: &[Record], path: impl AsRef<Path>) -> Result<()> {
    let p = path.as_ref();
    let mut buf: Vec<u8> = b"\xEF\xBB\xBF".to_vec();
    {
        let mut wtr = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::NonNumeric)
            .from_writer(&mut buf);
        wtr.write_record(EXPORT_HEADER)?;
        for r in records {
            let amount = r.amount.to_string();
            wtr.write_record([
                strip_control(&r.time).as_str(),
                strip_control(&r.kind).as_str(),
                strip_control(&r.counterparty).as_str(),
                strip_control(&r.item).as_str(),
                strip_control(&r.direction).as_str(),
                amount.as_str(),
                strip_control(&r.payment_method).as_str(),
                strip_control(&r.status).as_str(),
                strip_control(r.id.as_deref().unwrap_or("")).as_str(),
                strip_control(&r.merchant_id).as_str(),
                strip_control(&r.note).as_str(),
            ])?;
        }
        wtr.flush()?;
    }

    write_atomic(p, &buf)
}

fn strip_control(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

fn tmp_path(p: &Path) -> PathBuf {
    let mut name = p
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    p.with_file_name(name)
}
