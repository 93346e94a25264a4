use anyhow::Result;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tally_core::{Category, Record};
use tally_finance::{ledger, lock, CategoryService, Classifier, ClassifierConfig, Pipeline, PipelineConfig, Stage};

const HEADER: &str = "交易时间,交易类型,交易对方,商品,收/支,金额(元),支付方式,当前状态,交易单号,商户单号,备注";

#[derive(Default)]
struct KeywordService {
    calls: AtomicUsize,
}

impl CategoryService for KeywordService {
    fn complete(&self, _instructions: &str, payload: &str) -> impl Future<Output = Result<String>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = if payload.contains("地铁") {
            "transportation"
        } else if payload.contains("房租") {
            "Housing"
        } else {
            "food and dining"
        };
        async move { Ok(answer.to_string()) }
    }
}

fn pipeline(dir: &Path) -> Pipeline<KeywordService> {
    let mut cfg = PipelineConfig::in_dir(dir);
    cfg.lock_timeout = Duration::from_millis(300);
    let classifier = Classifier::new(
        KeywordService::default(),
        ClassifierConfig {
            workers: 3,
            max_attempts: 2,
            backoff: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        },
    );
    Pipeline::new(cfg, classifier)
}

fn write_statement(dir: &Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let mut text = String::from("微信支付账单明细\n----\n");
    text.push_str(HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

#[tokio::test]
async fn test_reimport_keeps_latest_record_per_id() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());

    let first = write_statement(
        dir.path(),
        "wechat_1.csv",
        &[
            "2025-04-10 10:00:00,商户消费,面馆,牛肉面,支出,¥25.00,零钱,支付成功,X1,M1,/",
            "2025-04-10 09:00:00,商户消费,面馆,牛肉面,支出,¥20.00,零钱,支付成功,X1,M1,/",
            "2025-04-11 08:00:00,商户消费,地铁,车票,支出,¥3.00,零钱,支付成功,X2,M2,/",
        ],
    );
    let report = p.ingest(&first).await.unwrap();
    assert_eq!(report.parsed, 3);
    assert_eq!(report.profile, "wechat");
    assert_eq!(report.stage, Stage::CleanedUp);
    assert_eq!(report.commit.ledger_size, 2);

    let second = write_statement(
        dir.path(),
        "wechat_2.csv",
        &["2025-04-10 12:00:00,商户消费,面馆,牛肉面,支出,¥30.00,零钱,已退款,X1,M1,/"],
    );
    let report = p.ingest(&second).await.unwrap();
    assert_eq!(report.commit.merge.replaced, 1);

    let stored = ledger::load(&p.config().ledger_path).unwrap();
    assert_eq!(stored.len(), 2);
    let x1: Vec<&Record> = stored.iter().filter(|r| r.id.as_deref() == Some("X1")).collect();
    assert_eq!(x1.len(), 1);
    assert_eq!(x1[0].time, "2025-04-10 12:00:00");
    assert_eq!(x1[0].amount, 30.0);
    assert_eq!(x1[0].kind, Category::FoodAndDining.label());

    let x2 = stored.iter().find(|r| r.id.as_deref() == Some("X2")).unwrap();
    assert_eq!(x2.kind, "transportation");

    assert!(!p.config().staging_path.exists());
    let relock = lock::acquire(&p.config().ledger_path, Duration::ZERO).await;
    assert!(relock.is_ok(), "import must release the ledger lock");
}

#[tokio::test]
async fn test_progress_reaches_one() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let src = write_statement(
        dir.path(),
        "wechat.csv",
        &[
            "2025-04-01 09:00:00,转账,房东,房租,支出,3000,零钱,已转账,R1,,/",
            "2025-04-02 09:00:00,商户消费,地铁,车票,支出,4,零钱,支付成功,R2,,/",
        ],
    );

    let mut seen = Vec::new();
    let report = p
        .ingest_with(&src, |f| seen.push(f), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.classification.units, 2);
    assert_eq!(seen.last().copied(), Some(1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_missing_source_fails_without_touching_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let existing = vec![Record::default().with_id("K").with_time("2025-01-01 00:00:00")];
    ledger::save(&existing, &p.config().ledger_path).unwrap();

    let err = p.ingest(dir.path().join("nope.csv")).await.unwrap_err();
    assert!(format!("{err:#}").contains("nope.csv"));
    assert_eq!(ledger::load(&p.config().ledger_path).unwrap(), existing);
    assert!(!p.config().staging_path.exists());
}

#[tokio::test]
async fn test_cancelled_import_leaves_staging_for_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let src = write_statement(
        dir.path(),
        "wechat.csv",
        &["2025-04-02 09:00:00,商户消费,地铁,车票,支出,4,零钱,支付成功,C1,,/"],
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(p.ingest_with(&src, |_| {}, &cancel).await.is_err());
    assert!(p.config().staging_path.exists());
    assert!(ledger::load(&p.config().ledger_path).unwrap().is_empty());

    let recovered = p.recover().await.unwrap().unwrap();
    assert_eq!(recovered.staged, 1);
    assert!(!p.config().staging_path.exists());
    let stored = ledger::load(&p.config().ledger_path).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, "transportation");
    assert!(p.recover().await.unwrap().is_none());
}

#[tokio::test]
async fn test_recover_classifies_only_unlabelled_staged_records() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let staged = vec![
        Record::default().with_id("RAW").with_kind("商户消费").with_counterparty("地铁"),
        // already labelled; a keyword match must not reclassify it
        Record::default().with_id("DONE").with_kind("housing").with_counterparty("地铁"),
        Record::default().with_id("GAVE-UP").with_kind("unknown").with_counterparty("地铁"),
    ];
    ledger::save(&staged, &p.config().staging_path).unwrap();

    let recovered = p.recover().await.unwrap().unwrap();
    assert_eq!(recovered.staged, 3);

    let stored = ledger::load(&p.config().ledger_path).unwrap();
    assert!(stored.iter().all(|r| r.kind.parse::<Category>().is_ok()), "{stored:?}");
    let kind_of = |id: &str| stored.iter().find(|r| r.id.as_deref() == Some(id)).unwrap().kind.clone();
    assert_eq!(kind_of("RAW"), "transportation");
    assert_eq!(kind_of("DONE"), "housing");
    assert_eq!(kind_of("GAVE-UP"), "unknown");
}

#[tokio::test]
async fn test_leftover_staging_is_committed_before_next_import() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let leftover = vec![Record::default().with_id("OLD").with_kind("housing")];
    ledger::save(&leftover, &p.config().staging_path).unwrap();

    let src = write_statement(
        dir.path(),
        "wechat.csv",
        &["2025-04-02 09:00:00,商户消费,地铁,车票,支出,4,零钱,支付成功,NEW,,/"],
    );
    let report = p.ingest(&src).await.unwrap();

    assert_eq!(report.recovered.map(|r| r.staged), Some(1));
    let stored = ledger::load(&p.config().ledger_path).unwrap();
    let ids: Vec<_> = stored.iter().filter_map(|r| r.id.as_deref()).collect();
    assert_eq!(ids, vec!["OLD", "NEW"]);
}

#[tokio::test]
async fn test_add_manual_classifies_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());

    let record = Record::default()
        .with_id("MANUAL-1")
        .with_time("2025-05-01 18:00:00")
        .with_counterparty("地铁")
        .with_amount(5.0);
    let report = p.add_manual(record).await.unwrap();
    assert_eq!(report.profile, "manual");
    assert_eq!(report.commit.ledger_size, 1);

    let stored = ledger::load(&p.config().ledger_path).unwrap();
    assert_eq!(stored[0].kind, "transportation");
}

#[tokio::test]
async fn test_import_waits_for_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());
    let src = write_statement(dir.path(), "wechat.csv", &[]);

    let _held = lock::acquire(&p.config().ledger_path, Duration::from_secs(1)).await.unwrap();
    let err = p.ingest(&src).await.unwrap_err();
    assert!(err.to_string().contains("locked"));
}
