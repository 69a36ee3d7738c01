//! Recorded gateway frames checked against the built-in profiles.
//!
//! Each file under `tests/frames/` holds a `given` frame, the profile it must
//! resolve to, and the expected entity values per platform.

use pretty_assertions::assert_eq;
use rfplayer_profiles::{AnyPlatformConfig, CoverState, Platform, ProfileRegistry};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct FrameExpectation {
    profile: String,
    given: Value,
    then: BTreeMap<String, BTreeMap<String, EntityExpectation>>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
struct EntityExpectation {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    preset: Option<String>,
}

fn observe(config: AnyPlatformConfig<'_>, event: &Value) -> EntityExpectation {
    match config {
        AnyPlatformConfig::Sensor(c) | AnyPlatformConfig::BinarySensor(c) => EntityExpectation {
            value: c.state.get_value(event),
            unit: c.event_unit(Some(event)),
            preset: None,
        },
        AnyPlatformConfig::Switch(c) => EntityExpectation {
            value: c.status.get_value(event),
            ..Default::default()
        },
        AnyPlatformConfig::Light(c) => EntityExpectation {
            value: c.status.get_value(event),
            ..Default::default()
        },
        AnyPlatformConfig::Cover(c) => EntityExpectation {
            value: c.cover_state(event).map(|state| {
                match state {
                    CoverState::Open => "open",
                    CoverState::Closed => "closed",
                }
                .to_string()
            }),
            ..Default::default()
        },
        AnyPlatformConfig::Climate(c) => EntityExpectation {
            value: c.state.get_value(event),
            unit: None,
            preset: c
                .preset_mode
                .get_value(event)
                .and_then(|code| c.code_to_mode(&code).map(str::to_string)),
        },
    }
}

fn frame_files() -> Vec<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/frames");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

#[test]
fn recorded_frames_match_builtin_profiles() {
    let registry = ProfileRegistry::builtin().unwrap();
    let files = frame_files();
    assert!(!files.is_empty(), "no frame fixtures found");

    for file in files {
        let label = file.display().to_string();
        let content = std::fs::read_to_string(&file).unwrap();
        let expectation: FrameExpectation = serde_json::from_str(&content).unwrap();
        let event = &expectation.given;

        let profile = registry.profile_name_for_event(event);
        assert_eq!(profile, Some(expectation.profile.as_str()), "{label}");

        for platform in Platform::ALL {
            let configs = registry.platform_configs(profile, platform);
            let Some(expected) = expectation.then.get(platform.as_str()) else {
                assert!(configs.is_empty(), "{label}: unexpected {platform} entities");
                continue;
            };

            let names: Vec<&str> = configs.iter().map(|c| c.name()).collect();
            let expected_names: Vec<&str> = expected.keys().map(String::as_str).collect();
            let mut sorted_names = names.clone();
            sorted_names.sort_unstable();
            assert_eq!(sorted_names, expected_names, "{label}: {platform} entities");

            for config in configs {
                let actual = observe(config, event);
                assert_eq!(&actual, &expected[config.name()], "{label}: {}", config.name());
            }
        }
    }
}

#[test]
fn custom_profiles_file_is_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles.yaml");
    std::fs::write(
        &path,
        r#"
- name: Garage Door
  match:
    protocol: CHACON
    info_type: "1"
  platforms:
    cover:
      - name: Door
        cmd_open: ON ID {address} CHACON
        cmd_close: OFF ID {address} CHACON
"#,
    )
    .unwrap();

    let mut registry = ProfileRegistry::from_file(&path).unwrap();
    assert_eq!(registry.profile_names(), vec!["Garage Door"]);

    assert_eq!(
        registry.register_profiles("- name: Other\n  match:\n    info_type: \"99\"\n").unwrap(),
        1
    );

    let event: Value = serde_json::json!({
        "frame": {
            "header": {"protocolMeaning": "CHACON", "infoType": "1"},
            "infos": {"id": "3"}
        }
    });
    assert_eq!(registry.profile_name_for_event(&event), Some("Garage Door"));
}
