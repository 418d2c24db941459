//! Scenario file loading tests against real files on disk.

use duet_core::{DaySelection, ScenarioError, load_scenarios};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const VALID: &str = r#"{
    "scenarios": [
        {
            "day": 1,
            "chatting_in_day": 3,
            "chatting_in_session": 5,
            "messages": ["Привет! Как дела?", "Отлично, спасибо!", "Хорошо, тогда договорились!"]
        },
        {
            "day": 2,
            "chatting_in_day": 2,
            "chatting_in_session": 3,
            "messages": ["Доброе утро!", "Доброе утро! Как спалось?", "Спасибо, хорошо!"]
        }
    ]
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_load_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "scenarios.json", VALID);

    let set = load_scenarios(&path).await.unwrap();
    assert_eq!(set.scenarios.len(), 2);

    let day1 = &set.scenarios[0];
    assert_eq!(day1.day, 1);
    assert_eq!(day1.chatting_in_day, 3);
    assert_eq!(day1.chatting_in_session, 5);
    assert_eq!(day1.messages[0], "Привет! Как дела?");

    let day2 = &set.scenarios[1];
    assert_eq!(day2.day, 2);
    assert_eq!(day2.chatting_in_session, 3);
}

#[tokio::test]
async fn test_load_with_string_path() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "scenarios.json", VALID);

    let set = load_scenarios(path.to_string_lossy().as_ref()).await.unwrap();
    let script = set.script(DaySelection::First).unwrap();
    assert_eq!(script.len(), 3);
}

#[tokio::test]
async fn test_missing_file() {
    let err = load_scenarios(Path::new("/non/existent/path/prompts.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, ScenarioError::NotFound(_)));
    assert!(err.to_string().starts_with("File not found: /non/existent/path/prompts.json"));
}

#[tokio::test]
async fn test_relative_missing_path_reported_absolute() {
    let err = load_scenarios("no-such-dir/prompts.json").await.unwrap_err();
    match err {
        ScenarioError::NotFound(path) => assert!(path.is_absolute()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_wrong_types_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "invalid.json",
        r#"{"scenarios": [{"day": "invalid", "chatting_in_day": 3, "chatting_in_session": 5, "messages": []}]}"#,
    );
    assert!(matches!(
        load_scenarios(&path).await,
        Err(ScenarioError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "malformed.json", "{ invalid json }");
    assert!(matches!(
        load_scenarios(&path).await,
        Err(ScenarioError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_empty_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "empty.json", "");
    assert!(matches!(
        load_scenarios(&path).await,
        Err(ScenarioError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_bundled_example_file() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../resources/scenarios.json");
    let set = load_scenarios(&path).await.unwrap();

    assert!(!set.scenarios.is_empty());
    let first = &set.scenarios[0];
    assert_eq!(first.day, 1);
    assert!(!first.messages.is_empty());
    assert!(set.validate().is_empty());
}
