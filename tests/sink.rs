use anyhow::Result;
use ironshard::{
    BulkSink, JsonlSink, MemorySink, RetryConfig, SinkConfig, SinkError, SinkErrorKind,
    load_directory, load_shards, open_sink, write_shard,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn quick() -> SinkConfig {
    SinkConfig::default().with_retry(RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 2.0,
    })
}

fn shard_dir(shards: &[(u64, Vec<Value>)]) -> Result<tempfile::TempDir> {
    let tmp = tempfile::tempdir()?;
    for (id, records) in shards {
        write_shard(tmp.path(), *id, records)?;
    }
    Ok(tmp)
}

#[test]
fn jsonl_sink_appends_one_line_per_document() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let sink = JsonlSink::open(tmp.path().join("store"), "items")?;
    assert_eq!(sink.insert_many(&[json!({"id": "1"}), json!({"id": "2", "v": ["a"]})])?, 2);
    assert_eq!(sink.insert_many(&[json!({"id": "3"})])?, 1);

    let text = std::fs::read_to_string(sink.path())?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![r#"{"id":"1"}"#, r#"{"id":"2","v":["a"]}"#, r#"{"id":"3"}"#]
    );
    Ok(())
}

#[test]
fn memory_sink_clones_share_storage() -> Result<()> {
    let a = MemorySink::new("c");
    let b = a.clone();
    b.insert_many(&[json!(1), json!(2)])?;
    assert_eq!(a.documents(), vec![json!(1), json!(2)]);
    assert_eq!(a.calls(), 1);
    Ok(())
}

#[test]
fn memory_sink_scripted_failures_run_in_order() {
    let sink = MemorySink::new("c").with_failures([SinkErrorKind::RateLimited, SinkErrorKind::Rejected]);
    let first = sink.insert_many(&[json!(1)]).unwrap_err();
    let second = sink.insert_many(&[json!(1)]).unwrap_err();
    assert_eq!(first.kind, SinkErrorKind::RateLimited);
    assert!(first.is_retryable());
    assert_eq!(second.kind, SinkErrorKind::Rejected);
    assert!(!second.is_retryable());
    assert_eq!(sink.insert_many(&[json!(1)]).unwrap(), 1);
    assert!(!sink.is_empty());
}

#[test]
fn open_sink_by_uri() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let file = open_sink(&SinkConfig::new(format!("file://{}", tmp.path().display())))?;
    assert_eq!(file.name(), "jsonl");
    let mem = open_sink(&SinkConfig::new("memory://"))?;
    assert_eq!(mem.name(), "memory");

    assert!(open_sink(&SinkConfig::new("mongodb://localhost")).is_err());
    assert!(open_sink(&SinkConfig::new("no-scheme")).is_err());
    Ok(())
}

#[test]
fn load_shards_collects_failures_without_stopping() -> Result<()> {
    let tmp = shard_dir(&[
        (0, vec![json!({"id": "a"})]),
        (1, vec![json!({"id": "b"}), json!({"id": "poison"})]),
        (2, vec![json!({"id": "c"})]),
    ])?;
    let mem = MemorySink::new("records")
        .rejecting(|docs| docs.iter().any(|d| d["id"] == "poison"));
    let sink: Arc<dyn BulkSink> = Arc::new(mem.clone());

    let shards = ironshard::list_shards(tmp.path())?;
    let stats = load_shards(&sink, &shards, &quick());
    assert_eq!(stats.loaded_shards, 2);
    assert_eq!(stats.loaded_records, 2);
    assert_eq!(stats.failed_ids(), vec![1]);
    assert!(stats.failed[0].error.contains("Rejected"));
    assert_eq!(mem.len(), 2);
    Ok(())
}

#[test]
fn unreadable_shard_is_a_failed_load() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    std::fs::write(tmp.path().join("output_0.json"), "[{\"id\": ")?;
    let sink: Arc<dyn BulkSink> = Arc::new(MemorySink::new("records"));

    let stats = load_directory(&sink, tmp.path(), None, &quick())?;
    assert_eq!(stats.failed_ids(), vec![0]);
    assert!(!stats.is_complete());
    Ok(())
}

#[test]
fn load_directory_can_pick_shards() -> Result<()> {
    let tmp = shard_dir(&[
        (0, vec![json!({"id": "a"})]),
        (3, vec![json!({"id": "b"})]),
        (7, vec![json!({"id": "c"})]),
    ])?;
    let mem = MemorySink::new("records");
    let sink: Arc<dyn BulkSink> = Arc::new(mem.clone());

    let stats = load_directory(&sink, tmp.path(), Some(&[3u64, 7][..]), &quick())?;
    assert_eq!(stats.loaded_shards, 2);
    let mut ids: Vec<String> = mem
        .documents()
        .iter()
        .filter_map(|d| d["id"].as_str().map(str::to_string))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["b", "c"]);

    let err = load_directory(&sink, tmp.path(), Some(&[4u64][..]), &quick()).expect_err("no shard 4");
    assert!(err.to_string().contains("no shard 4"));
    Ok(())
}

#[test]
fn io_errors_map_to_sink_kinds() {
    use std::io::{Error, ErrorKind};
    let kind = |k| SinkError::from(Error::new(k, "x")).kind;
    assert_eq!(kind(ErrorKind::TimedOut), SinkErrorKind::Timeout);
    assert_eq!(kind(ErrorKind::ConnectionReset), SinkErrorKind::Network);
    assert_eq!(kind(ErrorKind::PermissionDenied), SinkErrorKind::Other);
}
