//! Integration Tests: batch import over real files.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use demoscope_import::{import_file, import_files, ImportConfig, ImportError, ImportOutcome};

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write fixture");
    path
}

fn one_round_log() -> String {
    json!([
        { "event_name": "begin_new_match", "tick": 0 },
        { "event_name": "round_start", "tick": 10 },
        { "event_name": "player_spawn", "tick": 10,
          "user_steamid": "101", "user_name": "a", "team_num": 2 },
        { "event_name": "player_spawn", "tick": 10,
          "user_steamid": "201", "user_name": "b", "team_num": 3 },
        { "event_name": "round_freeze_end", "tick": 20 },
        { "event_name": "player_death", "tick": 300, "attacker_steamid": "101",
          "user_steamid": "201", "weapon": "ak47", "headshot": false },
        { "event_name": "round_end", "tick": 320, "reason": 9 },
    ])
    .to_string()
}

/// A long match: `rounds` rounds of ten spawns, a kill sequence and an end.
fn long_log(rounds: i64) -> String {
    let mut events = vec![json!({ "event_name": "begin_new_match", "tick": 0 })];
    for n in 0..rounds {
        let start = n * 10_000;
        events.push(json!({ "event_name": "round_start", "tick": start }));
        for (k, team) in [(100, 2), (200, 3)] {
            for i in 1..=5 {
                events.push(json!({
                    "event_name": "player_spawn", "tick": start,
                    "user_steamid": (k + i).to_string(), "team_num": team,
                }));
            }
        }
        events.push(json!({ "event_name": "round_freeze_end", "tick": start + 100 }));
        for i in 1..=5 {
            events.push(json!({
                "event_name": "player_death", "tick": start + 1000 + i * 100,
                "attacker_steamid": "101", "user_steamid": (200 + i).to_string(),
                "weapon": "ak47", "headshot": i % 2 == 0,
            }));
        }
        events.push(json!({ "event_name": "round_end", "tick": start + 2000, "reason": 9 }));
    }
    serde_json::Value::Array(events).to_string()
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_bad_file_does_not_affect_the_others() {
    let dir = TempDir::new().expect("tempdir");
    let good_a = write(&dir, "a.json", &one_round_log());
    let broken = write(&dir, "broken.json", "{ not json");
    let wrong_shape = write(&dir, "shape.json", "42");
    let good_b = write(&dir, "b.json", &one_round_log());
    let missing = dir.path().join("missing.json");

    let report = import_files(
        vec![good_a, broken, wrong_shape, good_b, missing],
        Arc::new(ImportConfig::default()),
    )
    .await;

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 3);

    let names: Vec<&str> = report.outcomes.iter().map(ImportOutcome::filename).collect();
    assert_eq!(names, ["a.json", "broken.json", "shape.json", "b.json", "missing.json"]);

    match &report.outcomes[0] {
        ImportOutcome::Parsed(parsed) => assert_eq!(parsed.record.rounds.len(), 1),
        ImportOutcome::Failed(f) => panic!("a.json failed: {}", f.error_message),
    }
    match &report.outcomes[1] {
        ImportOutcome::Failed(f) => assert!(f.error_message.contains("JSON")),
        ImportOutcome::Parsed(_) => panic!("broken.json should fail"),
    }
}

#[tokio::test]
async fn each_match_gets_its_own_id() {
    let dir = TempDir::new().expect("tempdir");
    let a = write(&dir, "a.json", &one_round_log());
    let b = write(&dir, "b.json", &one_round_log());

    let report = import_files(vec![a, b], Arc::new(ImportConfig::default())).await;
    let ids: Vec<String> = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            ImportOutcome::Parsed(p) => Some(p.record.id.clone()),
            ImportOutcome::Failed(_) => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

// ---------------------------------------------------------------------------
// Single file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_tag_comes_from_config() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "a.json", &one_round_log());
    let config = ImportConfig {
        source: "scrims".to_string(),
        ..ImportConfig::default()
    };

    let (record, diagnostics) = import_file(&path, &config).await.expect("imports");
    assert_eq!(record.source, "scrims");
    assert_eq!(diagnostics.rounds_finalized, 1);
}

#[tokio::test]
async fn structural_errors_surface_as_engine_errors() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "rounds.json", r#"{ "rounds": [] }"#);
    let result = import_file(&path, &ImportConfig::default()).await;
    assert!(matches!(result, Err(ImportError::Engine(_))));
}

#[tokio::test]
async fn unreadable_file_is_a_read_error() {
    let dir = TempDir::new().expect("tempdir");
    let result = import_file(&dir.path().join("nope.json"), &ImportConfig::default()).await;
    assert!(matches!(result, Err(ImportError::Read { .. })));
}

#[tokio::test]
async fn config_file_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "demoscope.toml", "max_concurrency = 2\nsource = \"lan\"\n");
    let config = ImportConfig::from_file(&path).expect("loads");
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.source, "lan");
    assert_eq!(config.timeout_ms, 30_000);
}

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn overrunning_parse_times_out() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "long.json", &long_log(2_000));
    let config = ImportConfig {
        timeout_ms: 0,
        ..ImportConfig::default()
    };

    let result = import_file(&path, &config).await;
    assert!(matches!(result, Err(ImportError::Timeout(0))));
}

#[tokio::test(start_paused = true)]
async fn timed_out_file_is_reported_in_the_batch() {
    let dir = TempDir::new().expect("tempdir");
    let long = write(&dir, "long.json", &long_log(2_000));
    let config = ImportConfig {
        timeout_ms: 0,
        ..ImportConfig::default()
    };

    let report = import_files(vec![long], Arc::new(config)).await;
    assert_eq!(report.failed(), 1);
    match &report.outcomes[0] {
        ImportOutcome::Failed(f) => assert!(f.error_message.contains("timed out")),
        ImportOutcome::Parsed(_) => panic!("long.json should time out"),
    }
}
