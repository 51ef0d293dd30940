//! End-to-end integration tests for the complete weighing flow.
//!
//! Tests the full pipeline: define cats → ingest readings → query events,
//! plus the notification-batch entry points.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

// 2021-11-15T12:19:20.263Z
const START: i64 = 1_636_978_760_263;

fn catscale_binary() -> String {
    env!("CARGO_BIN_EXE_catscale").to_string()
}

/// Runs catscale against a database inside `temp`, feeding `stdin` if given.
fn run(temp: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(catscale_binary())
        .env("HOME", temp)
        .env_remove("XDG_CONFIG_HOME")
        .env("CS_DATABASE_PATH", temp.join("data/catscale.db"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run catscale");
    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }
    child.wait_with_output().unwrap()
}

/// Like [`run`], but the command must succeed.
fn catscale(temp: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let output = run(temp, args, stdin);
    assert!(
        output.status.success(),
        "catscale {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn define_cats(temp: &Path) {
    for (name, weight) in [("Mocha", "8.2"), ("Pixel", "12.0")] {
        catscale(
            temp,
            &[
                "cats",
                "set-weight",
                "--name",
                name,
                "--weight",
                weight,
                "--at",
                "2021-11-01T00:00:00Z",
            ],
            None,
        );
    }
}

fn readings(samples: &[(i64, &str)]) -> String {
    samples
        .iter()
        .map(|(ts, weight)| format!("{{\"timestamp\":{ts},\"weight\":{weight}}}\n"))
        .collect()
}

fn events_on(temp: &Path, date: &str) -> Vec<serde_json::Value> {
    let output = catscale(temp, &["events", "--date", date, "--json"], None);
    stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Test the full flow: cats defined, readings ingested, events labeled.
#[test]
fn test_ingest_labels_events() {
    let temp = TempDir::new().unwrap();
    define_cats(temp.path());

    let input = readings(&[
        (START, "8.1"),
        (START + 20_000, "8.3"),
        (START + 41_250, "8.2"),
        (START + 45_000, "0"),
        (START + 600_000, "12.4"),
        (START + 630_000, "12.1"),
        (START + 631_000, "0"),
        (START + 900_000, "20.5"),
        (START + 901_000, "0"),
    ]);
    let output = catscale(temp.path(), &["ingest"], Some(&input));
    assert_eq!(
        stdout(&output).trim(),
        "Stored 9 of 9 readings; created 3 events, labeled 3."
    );

    let events = events_on(temp.path(), "2021.11.15");
    assert_eq!(events.len(), 3);

    assert_eq!(events[0]["time_utc"], "12:20:01:513");
    assert_eq!(events[0]["time_local"], "07:20:01:513");
    assert_eq!(events[0]["weight"], "8.3");
    assert_eq!(events[0]["elapsed_sec"], "41.2");
    assert_eq!(events[0]["cat"], "Mocha");

    assert_eq!(events[1]["weight"], "12.4");
    assert_eq!(events[1]["elapsed_sec"], "30.0");
    assert_eq!(events[1]["cat"], "Pixel");

    assert_eq!(events[2]["cat"], "OUTLIER_HIGH");

    // Re-ingesting the same readings changes nothing.
    let output = catscale(temp.path(), &["ingest"], Some(&input));
    assert_eq!(
        stdout(&output).trim(),
        "Stored 0 of 9 readings; created 0 events, labeled 0."
    );
    assert_eq!(events_on(temp.path(), "2021.11.15"), events);
}

/// Test the trigger entry points fed with change notification batches.
#[test]
fn test_process_batches_tolerate_redelivery() {
    let temp = TempDir::new().unwrap();
    define_cats(temp.path());

    let input = readings(&[(START, "8.1"), (START + 30_000, "8.4"), (START + 31_000, "0")]);
    catscale(temp.path(), &["ingest"], Some(&input));
    let before = events_on(temp.path(), "2021.11.15");
    assert_eq!(before.len(), 1);
    assert_eq!(before[0]["cat"], "Mocha");

    // The zero reading is delivered again: the event is rebuilt but keeps its label.
    let zero_ts = START + 31_000;
    let batch = format!(
        r#"{{"records": [
            {{"eventName": "INSERT", "keys": {{"date": "2021.11.15", "time": "12:19:51:263"}},
              "newImage": {{"timestamp": {zero_ts}, "weight": 0}}}},
            {{"eventName": "INSERT"}}
        ]}}"#
    );
    let output = catscale(temp.path(), &["process", "readings"], Some(&batch));
    assert_eq!(stdout(&output), "Successfully processed 2 records.\n");
    assert_eq!(events_on(temp.path(), "2021.11.15"), before);

    // The labeled event's own notification is skipped.
    let event_ts = START + 30_000;
    let event_batch = format!(
        r#"{{"records": [
            {{"eventName": "MODIFY", "keys": {{"date": "2021.11.15", "time": "12:19:50:263"}},
              "newImage": {{"timestamp": {event_ts}, "weight": "8.4", "cat": "Mocha"}}}},
            {{"eventName": "REMOVE", "keys": {{"date": "2021.11.15", "time": "12:19:50:263"}}}}
        ]}}"#
    );
    let output = catscale(temp.path(), &["process", "events"], Some(&event_batch));
    assert_eq!(stdout(&output), "Successfully processed 2 records.\n");
    assert_eq!(events_on(temp.path(), "2021.11.15"), before);
}

/// Test that events left unlabeled for lack of cats can be classified later.
#[test]
fn test_classify_after_cats_are_defined() {
    let temp = TempDir::new().unwrap();

    let input = readings(&[(START, "12.3"), (START + 10_000, "0")]);
    let output = run(temp.path(), &["ingest"], Some(&input));
    assert!(!output.status.success(), "classification needs defined cats");
    let events = events_on(temp.path(), "2021.11.15");
    assert_eq!(events.len(), 1);
    assert!(events[0].get("cat").is_none());

    define_cats(temp.path());
    let ts = START.to_string();

    let output = catscale(
        temp.path(),
        &["classify", "--timestamp", &ts, "--dry-run"],
        None,
    );
    let text = stdout(&output);
    let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["cat"], "Pixel");
    assert!(text.contains("Dry run"), "{text}");
    assert!(events_on(temp.path(), "2021.11.15")[0].get("cat").is_none());

    catscale(temp.path(), &["classify", "--timestamp", &ts], None);
    assert_eq!(events_on(temp.path(), "2021.11.15")[0]["cat"], "Pixel");

    let output = catscale(temp.path(), &["classify", "--timestamp", &ts], None);
    assert_eq!(stdout(&output), format!("No unlabeled event at {ts}.\n"));
}

/// Test status output against a fresh database.
#[test]
fn test_status_on_fresh_database() {
    let temp = TempDir::new().unwrap();
    let output = catscale(temp.path(), &["status"], None);
    let text = stdout(&output);
    assert!(text.starts_with("Cat scale status\n"), "{text}");
    assert!(text.contains("Readings: 0\n"), "{text}");
    assert!(text.contains("No cats defined"), "{text}");
}
