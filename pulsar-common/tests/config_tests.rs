//! Integration tests for the settings service
//!
//! Tests cover:
//! - Bootstrap from the bundled template when the settings file is absent
//! - Parse failures are surfaced, never retried
//! - Merge-then-rewrite saves
//! - Per-user default location
//!
//! Note: Uses serial_test for tests that manipulate HOME.

use pulsar_common::config::{default_settings_path, Settings, SettingsService, SETTINGS_FILE_NAME};
use pulsar_common::Error;
use serde_json::json;
use serial_test::serial;
use std::env;
use tempfile::TempDir;

const TEMPLATE: &str = r#"{
  "projects": { "demo": "/prod/demo" },
  "softwares": { "maya": "/usr/autodesk/maya/bin/maya" }
}"#;

fn write_template(dir: &TempDir) -> std::path::PathBuf {
    let template = dir.path().join("template.json");
    std::fs::write(&template, TEMPLATE).unwrap();
    template
}

#[tokio::test]
async fn test_missing_file_bootstraps_from_template() {
    let dir = TempDir::new().unwrap();
    let template = write_template(&dir);
    let file = dir.path().join("home").join(SETTINGS_FILE_NAME);

    let service = SettingsService::new(&file, &template);
    let settings = service.load().await.unwrap();

    // resolves with the template's parsed content
    let expected: serde_json::Value = serde_json::from_str(TEMPLATE).unwrap();
    assert_eq!(serde_json::Value::Object(settings), expected);

    // the template was copied in place
    assert!(file.exists());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), TEMPLATE);
}

#[tokio::test]
async fn test_missing_file_and_missing_template_fails() {
    let dir = TempDir::new().unwrap();
    let service = SettingsService::new(
        dir.path().join(SETTINGS_FILE_NAME),
        dir.path().join("no-template.json"),
    );

    assert!(matches!(service.load().await, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_parse_failure_is_surfaced_not_bootstrapped() {
    let dir = TempDir::new().unwrap();
    let template = write_template(&dir);
    let file = dir.path().join(SETTINGS_FILE_NAME);
    std::fs::write(&file, "{ not json").unwrap();

    let service = SettingsService::new(&file, &template);
    assert!(matches!(service.load().await, Err(Error::Json(_))));

    // broken file left untouched
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_save_merges_and_rewrites_whole_file() {
    let dir = TempDir::new().unwrap();
    let template = write_template(&dir);
    let file = dir.path().join(SETTINGS_FILE_NAME);

    let service = SettingsService::new(&file, &template);
    service.load().await.unwrap();

    let mut patch = Settings::new();
    patch.insert("softwares".to_string(), json!({ "nuke": "/opt/nuke/Nuke13" }));
    patch.insert("event_capacity".to_string(), json!(64));
    service.save(patch).await.unwrap();

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(on_disk["projects"]["demo"], "/prod/demo");
    assert_eq!(on_disk["softwares"], json!({ "nuke": "/opt/nuke/Nuke13" }));
    assert_eq!(on_disk["event_capacity"], 64);

    // a fresh service sees the saved state
    let reloaded = SettingsService::new(&file, &template);
    let settings = reloaded.load().await.unwrap();
    assert_eq!(settings["event_capacity"], 64);
}

#[tokio::test]
async fn test_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let template = write_template(&dir);
    let file = dir.path().join(SETTINGS_FILE_NAME);

    let first = SettingsService::new(&file, &template);
    let second = SettingsService::new(&file, &template);
    first.load().await.unwrap();
    second.load().await.unwrap();

    let mut patch = Settings::new();
    patch.insert("nodes".to_string(), json!("first"));
    first.save(patch).await.unwrap();

    let mut patch = Settings::new();
    patch.insert("theme".to_string(), json!("dark"));
    second.save(patch).await.unwrap();

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(on_disk["theme"], "dark");
    assert!(on_disk.get("nodes").is_none());
}

#[test]
#[serial]
fn test_default_settings_path_is_in_home() {
    let original = env::var_os("HOME");
    env::set_var("HOME", "/tmp/pulsar-home");

    let path = default_settings_path().unwrap();

    match original {
        Some(home) => env::set_var("HOME", home),
        None => env::remove_var("HOME"),
    }

    #[cfg(unix)]
    assert_eq!(path, std::path::PathBuf::from("/tmp/pulsar-home").join(SETTINGS_FILE_NAME));
    assert!(path.ends_with(SETTINGS_FILE_NAME));
}
