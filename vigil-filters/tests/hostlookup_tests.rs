//! Host lookup generator and task tests

use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vigil_common::alert::MemoryAlertSink;
use vigil_common::config::ConfigDocument;
use vigil_common::protocol::{FilterRequest, FilterResponse};
use vigil_common::session::SessionManager;
use vigil_common::FilterContext;
use vigil_filters::hostlookup::Generator;
use vigil_filters::{Evaluator, FilterError};

fn context(threshold: u32) -> (FilterContext, Arc<MemoryAlertSink>) {
    let sink = Arc::new(MemoryAlertSink::new());
    (FilterContext::new("hostlookup", sink.clone(), threshold), sink)
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn loaded_generator(threshold: u32, cache_size: usize) -> (Generator, Arc<MemoryAlertSink>, TempDir) {
    let dir = TempDir::new().unwrap();
    let database = write_file(
        &dir,
        "feed.json",
        r#"{"feed_name":"f1","data":[{"entry":"a.com","score":50},{"entry":"b.com"}]}"#,
    );
    let (ctx, sink) = context(threshold);
    let mut generator = Generator::new(ctx, cache_size);
    let config = ConfigDocument::from_value(json!({
        "database": database.to_string_lossy(),
        "db_type": "json"
    }))
    .unwrap();
    generator.load_config(&config).unwrap();
    generator.configure_alerting("").unwrap();
    (generator, sink, dir)
}

#[test]
fn test_missing_database_field() {
    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config = ConfigDocument::from_value(json!({"db_type": "text"})).unwrap();

    let err = generator.load_config(&config).unwrap_err();
    assert_eq!(err.to_string(), "Missing parameter: 'database'");
    assert!(generator.database().is_none());
}

#[test]
fn test_database_field_wrong_type() {
    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config = ConfigDocument::from_value(json!({"database": 12})).unwrap();

    let err = generator.load_config(&config).unwrap_err();
    assert_eq!(err.to_string(), "'database' needs to be a string");
}

#[test]
fn test_unknown_db_type() {
    let dir = TempDir::new().unwrap();
    let database = write_file(&dir, "hosts.txt", "a.com\n");
    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config = ConfigDocument::from_value(json!({
        "database": database.to_string_lossy(),
        "db_type": "csv"
    }))
    .unwrap();

    assert!(matches!(
        generator.load_config(&config),
        Err(FilterError::KnowledgeBase(_))
    ));
}

#[test]
fn test_missing_database_file() {
    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config =
        ConfigDocument::from_value(json!({"database": "/nonexistent/vigil/hosts.txt"})).unwrap();

    assert!(generator.load_config(&config).is_err());
    assert!(generator.database().is_none());
}

#[test]
fn test_text_database_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "evil.com").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "  bad.org  ").unwrap();

    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config =
        ConfigDocument::from_value(json!({"database": file.path().to_string_lossy()})).unwrap();
    generator.load_config(&config).unwrap();

    let database = generator.database().unwrap();
    assert_eq!(database.len(), 2);
    assert_eq!(database.get("  bad.org  ").unwrap().score, 100);
    assert!(database.get("bad.org").is_none());
}

#[test]
fn test_second_load_refused() {
    let (mut generator, _, dir) = loaded_generator(80, 0);
    let other = write_file(&dir, "other.txt", "c.com\n");
    let config = ConfigDocument::from_value(json!({"database": other.to_string_lossy()})).unwrap();

    let err = generator.load_config(&config).unwrap_err();
    assert!(matches!(err, FilterError::Invocation(_)));
    let database = generator.database().unwrap();
    assert_eq!(generator.feed_name(), "f1");
    assert!(database.get("a.com").is_some());
    assert!(database.get("c.com").is_none());
}

#[test]
fn test_rsyslog_feed_name_from_file() {
    let dir = TempDir::new().unwrap();
    let database = write_file(
        &dir,
        "blocklist.json",
        r#"{"table":[{"index":"x.net","value":"botnet"},{"index":"y.net","value":70}]}"#,
    );
    let (ctx, _) = context(80);
    let mut generator = Generator::new(ctx, 0);
    let config = ConfigDocument::from_value(json!({
        "database": database.to_string_lossy(),
        "db_type": "rsyslog"
    }))
    .unwrap();
    generator.load_config(&config).unwrap();
    generator.configure_alerting("").unwrap();

    assert_eq!(generator.feed_name(), "blocklist");
    let database = generator.database().unwrap();
    assert_eq!(database.get("x.net").unwrap().aux, "botnet");
    assert_eq!(database.get("y.net").unwrap().score, 70);
}

#[test]
fn test_caller_tags_replace_defaults() {
    let (ctx, _) = context(80);
    let generator = Generator::new(ctx.clone(), 0);
    generator.configure_alerting("tag.a, tag.b").unwrap();

    assert_eq!(ctx.alerts().filter_name(), "hostlookup");
    assert_eq!(ctx.alerts().rule_name(), "Hostlookup_");
    assert_eq!(ctx.alerts().tags(), vec!["tag.a", "tag.b"]);
}

#[tokio::test]
async fn test_task_scores_and_alerts() {
    let (generator, sink, _dir) = loaded_generator(50, 16);
    let task = generator.create_task(tokio::io::empty(), Arc::new(SessionManager::new()));
    assert!(matches!(task.worker().evaluator(), Evaluator::HostLookup(_)));

    let request = FilterRequest {
        evt_id: Some("evt-1".to_string()),
        data: vec![json!("a.com"), json!(["b.com"]), json!("c.com"), json!(42)],
    };
    let response = task.worker().handle(request).await;
    assert_eq!(
        response,
        FilterResponse::Certitudes {
            evt_id: Some("evt-1".to_string()),
            certitudes: vec![50, 100, 0, 101],
        }
    );

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].entry, "a.com");
    assert_eq!(alerts[0].rule_name, "Hostlookup_f1");
    assert_eq!(alerts[0].alert_subtype, "hostlookup");
    assert_eq!(alerts[0].details["feed_name"], "f1");
    assert_eq!(alerts[1].level, "high");
    assert_eq!(
        alerts[1].tags,
        vec!["attack.command_and_control", "attack.t1071"]
    );
}

#[tokio::test]
async fn test_cache_shared_across_tasks() {
    let (generator, _, _dir) = loaded_generator(80, 16);
    let manager = Arc::new(SessionManager::new());
    let first = generator.create_task(tokio::io::empty(), Arc::clone(&manager));
    let second = generator.create_task(tokio::io::empty(), Arc::clone(&manager));

    let request = FilterRequest {
        evt_id: None,
        data: vec![json!("a.com")],
    };
    first.worker().handle(request.clone()).await;
    second.worker().handle(request).await;

    let stats = generator.cache().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_unloaded_generator_answers_error_certitude() {
    let (ctx, _) = context(80);
    let generator = Generator::new(ctx, 0);
    let task = generator.create_task(tokio::io::empty(), Arc::new(SessionManager::new()));
    assert!(matches!(task.worker().evaluator(), Evaluator::Unloaded));

    let response = task
        .worker()
        .handle(FilterRequest {
            evt_id: None,
            data: vec![json!("a.com"), json!("b.com")],
        })
        .await;
    assert_eq!(
        response,
        FilterResponse::Certitudes {
            evt_id: None,
            certitudes: vec![101, 101],
        }
    );
}

#[tokio::test]
async fn test_task_serves_connection_lines() {
    let (generator, _, _dir) = loaded_generator(80, 0);
    let (client, server) = tokio::io::duplex(4096);
    let manager = Arc::new(SessionManager::new());
    manager.spawn(generator.create_task(server, Arc::clone(&manager)).run());

    let (reader, mut writer) = tokio::io::split(client);
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"evt_id\":\"e\",\"data\":[\"a.com\",\"zzz\"]}\n")
        .await
        .unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response, json!({"evt_id": "e", "certitudes": [50, 0]}));

    writer.write_all(b"not json\n").await.unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert!(response["error"].as_str().unwrap().starts_with("invalid request"));

    writer.shutdown().await.unwrap();
    assert!(lines.next_line().await.unwrap().is_none());
    manager.drain().await;
    assert_eq!(manager.active_sessions(), 0);
}

#[tokio::test]
async fn test_drain_stops_idle_session() {
    let (generator, _, _dir) = loaded_generator(80, 0);
    let (_client, server) = tokio::io::duplex(1024);
    let manager = Arc::new(SessionManager::new());
    manager.spawn(generator.create_task(server, Arc::clone(&manager)).run());

    tokio::time::timeout(std::time::Duration::from_secs(5), manager.drain())
        .await
        .expect("drain should not hang on an idle session");
    assert!(manager.is_shutting_down());
}
