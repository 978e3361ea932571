use anyhow::Result;
use ironshard::{DEFAULT_BATCH_SIZE, IngestConfig, ScanStrategy, SinkConfig};
use std::path::PathBuf;

#[test]
fn defaults() {
    let cfg = IngestConfig::new("in.xml", "item");
    assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(cfg.output_directory, PathBuf::from("json_output"));
    assert_eq!(cfg.strategy, ScanStrategy::Shared);
    assert!(cfg.num_workers >= 1);
    assert_eq!(cfg.queue_capacity(), cfg.num_workers * 4);
    assert!(cfg.sink.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn validation_names_the_bad_option() {
    let base = IngestConfig::new("in.xml", "item");
    let cases = [
        (IngestConfig::new("", "item"), "input"),
        (IngestConfig::new("in.xml", "  "), "record_tag"),
        (base.clone().with_batch_size(0), "batch_size"),
        (base.clone().with_workers(0), "num_workers"),
        (base.clone().with_queue_capacity(0), "queue_capacity"),
        (
            base.clone().with_sink(SinkConfig::default().with_collection("")),
            "collection",
        ),
    ];
    for (cfg, needle) in cases {
        let err = cfg.validate().expect_err(needle);
        assert!(err.to_string().contains(needle), "{err} should mention {needle}");
    }
}

#[test]
fn from_file_fills_missing_fields_with_defaults() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("ingest.json");
    std::fs::write(
        &path,
        r#"{
            "input": "data/catalog.xml.gz",
            "record_tag": "product",
            "num_workers": 3,
            "strategy": "modulo",
            "sink": {"uri": "file:///var/lib/store", "retry": {"max_attempts": 5}}
        }"#,
    )?;

    let cfg = IngestConfig::from_file(&path)?;
    assert_eq!(cfg.record_tag, "product");
    assert_eq!(cfg.num_workers, 3);
    assert_eq!(cfg.strategy, ScanStrategy::Modulo);
    assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(cfg.queue_capacity(), 12);

    let sink = cfg.sink.as_ref().expect("sink");
    assert_eq!(sink.collection, "records");
    assert_eq!(sink.timeout_ms, 30_000);
    assert_eq!(sink.retry.max_attempts, 5);
    assert_eq!(sink.retry.initial_delay_ms, 100);
    cfg.validate()?;
    Ok(())
}

#[test]
fn from_file_reports_the_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = IngestConfig::from_file(&path).expect_err("invalid json");
    assert!(format!("{err:#}").contains("broken.json"));

    let err = IngestConfig::from_file(tmp.path().join("absent.json")).expect_err("missing");
    assert!(err.chain().any(|c| c.is::<std::io::Error>()));
}

#[test]
fn config_round_trips_through_json() -> Result<()> {
    let cfg = IngestConfig::new("in.xml", "item")
        .with_workers(2)
        .with_queue_capacity(16)
        .with_sink(SinkConfig::new("memory://").with_collection("things"));
    let back: IngestConfig = serde_json::from_str(&serde_json::to_string(&cfg)?)?;
    assert_eq!(back, cfg);
    Ok(())
}
