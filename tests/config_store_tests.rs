//! Integration tests for the configuration store.
//!
//! These cover merge semantics across sequential patches, persistence on
//! every apply, tolerant loading, and snapshot isolation under concurrency.

use ribbon_display::config::{ApplyOutcome, Config, ConfigPatch, ConfigStore, Units};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn patch(value: Value) -> ConfigPatch {
    ConfigPatch::from_value(value).expect("patch must be a mapping")
}

fn fresh_store(dir: &TempDir) -> ConfigStore {
    ConfigStore::open(dir.path().join("config.json"), &Config::default())
}

fn persisted(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// =============================================================================
// Merge semantics
// =============================================================================

#[test]
fn sequential_patches_layer_over_defaults() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);

    store
        .apply(patch(json!({"weather": {"latitude": 51.5, "units": "metric"}})))
        .unwrap();
    store
        .apply(patch(json!({"weather": {"units": "imperial", "refresh_s": 60}})))
        .unwrap();

    let config = store.snapshot();
    // Second patch wins where both specify.
    assert_eq!(config.weather.units, Units::Imperial);
    // First patch survives where only it specifies.
    assert_eq!(config.weather.latitude, 51.5);
    assert_eq!(config.weather.refresh_s, 60.0);
    // Defaults where neither specifies.
    assert_eq!(config.weather.longitude, Config::default().weather.longitude);
    assert!(config.weather.enabled);
}

#[test]
fn empty_patch_rewrites_unchanged_tree() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    let store = ConfigStore::open(&path, &Config::default());
    store
        .apply(patch(json!({"system": {"refresh_s": 10}})))
        .unwrap();

    let before = store.snapshot();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(store.apply(ConfigPatch::empty()).unwrap(), ApplyOutcome::Persisted);
    assert_eq!(store.snapshot(), before);
    assert!(path.exists());
    assert_eq!(persisted(&path), before.to_value());
}

#[test]
fn applying_same_patch_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);
    let p = json!({"oled": {"font_sizes": {"time": 20}}, "speech": {"wake_word": "ribbon"}});

    store.apply(patch(p.clone())).unwrap();
    let once = store.snapshot();
    store.apply(patch(p)).unwrap();
    assert_eq!(store.snapshot(), once);
}

#[test]
fn lists_are_replaced_wholesale() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);
    assert!(store.snapshot().terminal.colors.len() > 2);

    store
        .apply(patch(json!({"terminal": {"colors": ["\u{1b}[92m", "\u{1b}[93m"]}})))
        .unwrap();

    assert_eq!(
        store.snapshot().terminal.colors,
        vec!["\u{1b}[92m".to_string(), "\u{1b}[93m".to_string()]
    );
}

#[test]
fn sections_merge_independently() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);

    store
        .apply(patch(json!({"background": {"enabled": true, "path": "/tmp/x.png"}})))
        .unwrap();
    store
        .apply(patch(json!({"audio": {"enabled": false}})))
        .unwrap();

    let config = store.snapshot();
    assert!(config.background.enabled);
    assert_eq!(config.background.path, Path::new("/tmp/x.png"));
    assert!(!config.audio.enabled);
}

#[test]
fn unknown_sections_are_preserved() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    let store = ConfigStore::open(&path, &Config::default());

    store
        .apply(patch(json!({"plugins": {"clock": {"style": "big"}}})))
        .unwrap();

    assert_eq!(store.snapshot().extra["plugins"]["clock"]["style"], "big");
    assert_eq!(persisted(&path)["plugins"]["clock"]["style"], "big");
}

#[test]
fn unknown_keys_inside_sections_are_preserved() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"weather": {"units": "metric", "provider": "open-meteo"}, "oled": {"font_sizes": {"tiny": 6}}}"#,
    )
    .unwrap();

    let store = ConfigStore::open(&path, &Config::default());
    store
        .apply(patch(json!({"web": {"theme": "dark"}})))
        .unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.weather.units, Units::Metric);
    assert_eq!(snapshot.weather.extra["provider"], "open-meteo");
    assert_eq!(snapshot.oled.font_sizes.extra["tiny"], 6);
    assert_eq!(snapshot.web.extra["theme"], "dark");

    let on_disk = persisted(&path);
    assert_eq!(on_disk["weather"]["provider"], "open-meteo");
    assert_eq!(on_disk["oled"]["font_sizes"]["tiny"], 6);
    assert_eq!(on_disk["web"]["theme"], "dark");
}

#[test]
fn patch_breaking_schema_is_rejected() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);
    let before = store.snapshot();

    assert!(store.apply(patch(json!({"weather": null}))).is_err());
    assert!(store.apply(patch(json!({"web": {"config_port": "five"}}))).is_err());
    assert_eq!(store.snapshot(), before);
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn first_start_then_switch_units() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    assert!(!path.exists());

    let loaded = ConfigStore::load(&path, &Config::default());
    assert!(loaded.weather.enabled);
    assert_eq!(loaded.weather.units, Units::Imperial);

    let store = ConfigStore::open(&path, &Config::default());
    store
        .apply(patch(json!({"weather": {"units": "metric"}})))
        .unwrap();

    let snapshot = store.snapshot().to_value();
    assert_eq!(snapshot["weather"]["units"], "metric");
    assert_eq!(
        snapshot["weather"]["latitude"],
        Config::default().to_value()["weather"]["latitude"]
    );
    assert_eq!(persisted(&path)["weather"]["units"], "metric");
}

#[test]
fn open_persists_resolved_tree_immediately() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, r#"{"weather": {"units": "metric"}}"#).unwrap();

    let store = ConfigStore::open(&path, &Config::default());
    let on_disk = persisted(&path);
    assert_eq!(on_disk["weather"]["units"], "metric");
    // Defaults merged in and written back.
    assert_eq!(on_disk["web"]["config_port"], 5000);
    assert_eq!(on_disk, store.snapshot().to_value());
}

#[test]
fn corrupt_file_loads_exact_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let config = ConfigStore::load(&path, &Config::default());
    assert_eq!(config, Config::default());
    assert!(config.weather.enabled);
    assert_eq!(config.weather.units, Units::Imperial);
    assert_eq!(config.weather.latitude, 37.7749);
    assert_eq!(config.web.config_port, 5000);
    assert_eq!(config.oled.address, 0x3C);
}

#[test]
fn invalid_key_falls_back_alone() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"audio": {"enabled": "maybe"}, "weather": {"units": "metric", "latitude": "north"}}"#,
    )
    .unwrap();

    let config = ConfigStore::load(&path, &Config::default());
    assert_eq!(config.audio, Config::default().audio);
    // The valid sibling of a bad key survives.
    assert_eq!(config.weather.units, Units::Metric);
    assert_eq!(config.weather.latitude, Config::default().weather.latitude);

    // Opening rewrites the file with the bad key replaced by its default.
    let store = ConfigStore::open(&path, &Config::default());
    assert_eq!(store.snapshot().weather.units, Units::Metric);
    let on_disk = persisted(&path);
    assert_eq!(on_disk["weather"]["units"], "metric");
    assert_eq!(on_disk["weather"]["latitude"], 37.7749);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn snapshots_never_observe_a_partial_patch() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(fresh_store(&temp));

    let before = store.snapshot();
    let mut after = before.clone();
    after.weather.latitude = 1.0;
    after.weather.longitude = 2.0;
    after.weather.units = Units::Metric;
    after.audio.enabled = false;
    after.terminal.refresh_s = 9.0;

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || (0..200).map(|_| store.snapshot()).collect::<Vec<_>>())
        })
        .collect();

    store
        .apply(patch(json!({
            "weather": {"latitude": 1.0, "longitude": 2.0, "units": "metric"},
            "audio": {"enabled": false},
            "terminal": {"refresh_s": 9.0}
        })))
        .unwrap();

    for reader in readers {
        for snapshot in reader.join().unwrap() {
            assert!(snapshot == before || snapshot == after);
        }
    }
    assert_eq!(store.snapshot(), after);
}

#[test]
fn snapshot_is_independent_copy() {
    let temp = TempDir::new().unwrap();
    let store = fresh_store(&temp);

    let mut copy = store.snapshot();
    copy.weather.latitude = -90.0;
    copy.terminal.colors.clear();

    let fresh = store.snapshot();
    assert_eq!(fresh.weather.latitude, Config::default().weather.latitude);
    assert!(!fresh.terminal.colors.is_empty());
}
