//! Exclusive ledger lock: one ingestion at a time per ledger path.
//!
//! `<ledger>.lock` carries an OS advisory lock for as long as a [`LedgerLock`]
//! lives. The kernel drops the lock when its holder exits, so a crashed run
//! never leaves the ledger locked. The file itself persists between runs and
//! only records the last holder's pid for error messages.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Held while a pipeline owns the ledger.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
    file: File,
}

impl LedgerLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        tracing::debug!(path = %self.path.display(), "released ledger lock");
    }
}

pub fn lock_path_for(ledger: &Path) -> PathBuf {
    let mut name = ledger
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    ledger.with_file_name(name)
}

/// Wait up to `timeout` for the lock on `ledger`.
pub async fn acquire(ledger: &Path, timeout: Duration) -> Result<LedgerLock> {
    let lock_path = lock_path_for(ledger);
    if let Some(dir) = lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let started = Instant::now();

    loop {
        match try_acquire(&lock_path) {
            Ok(lock) => {
                tracing::debug!(path = %lock_path.display(), "acquired ledger lock");
                return Ok(lock);
            }
            Err(Contended::Held(holder)) => {
                if started.elapsed() >= timeout {
                    match holder {
                        Some(pid) => bail!(
                            "ledger {} is locked by pid {pid}; try again after it finishes",
                            ledger.display()
                        ),
                        None => bail!("ledger {} is locked by another process", ledger.display()),
                    }
                }
            }
            Err(Contended::Io(e)) => {
                return Err(e).with_context(|| format!("could not lock ledger at {}", lock_path.display()));
            }
        }
        tokio::time::sleep(LOCK_RETRY_DELAY).await;
    }
}

#[derive(Debug)]
enum Contended {
    /// Someone else holds the lock; their pid when it could be read
    Held(Option<u32>),
    Io(std::io::Error),
}

fn try_acquire(lock_path: &Path) -> Result<LedgerLock, Contended> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(Contended::Io)?;

    match file.try_lock() {
        Ok(()) => {
            if let Err(e) = record_holder(&mut file) {
                tracing::debug!(error = %e, "could not record pid in ledger lock");
            }
            Ok(LedgerLock {
                path: lock_path.to_path_buf(),
                file,
            })
        }
        Err(TryLockError::WouldBlock) => Err(Contended::Held(read_holder(&mut file))),
        Err(TryLockError::Error(e)) => Err(Contended::Io(e)),
    }
}

fn record_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    buf.trim().parse().ok()
}
