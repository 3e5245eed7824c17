//! Tests for the target-feature policy engine.

use serde_json::{json, Value};

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::test_utils::load_objects;
use crate::writer::Writer;

fn run_features(config: &Config, descriptors: &[Value]) -> (Vec<String>, Vec<String>) {
    let (mut objects, mut table) = load_objects(descriptors);
    let mut diagnostics = Diagnostics::new();
    let mut writer = Writer::new(config, &mut objects, &mut table, &mut diagnostics);
    writer.populate_target_features();
    let features = writer.out_features.iter().cloned().collect();
    let errors = diagnostics
        .iter()
        .map(|d| d.message.clone())
        .collect();
    (features, errors)
}

fn object_with_features(name: &str, features: &[(&str, &str)]) -> Value {
    json!({
        "name": name,
        "features": features
            .iter()
            .map(|(policy, feature)| json!({"policy": policy, "name": feature}))
            .collect::<Vec<_>>(),
    })
}

#[test]
fn inferred_features_are_the_used_set() {
    let (features, errors) = run_features(
        &Config::default(),
        &[
            object_with_features("a.o", &[("used", "bulk-memory")]),
            object_with_features("b.o", &[("used", "sign-ext"), ("used", "bulk-memory")]),
        ],
    );
    assert_eq!(features, ["bulk-memory", "sign-ext"]);
    assert!(errors.is_empty());
}

#[test]
fn atomics_without_shared_memory_names_the_file() {
    let (_, errors) = run_features(
        &Config::default(),
        &[
            object_with_features("clean.o", &[]),
            object_with_features("atomic.o", &[("used", "atomics")]),
        ],
    );
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("'atomics' feature is used by atomic.o"));
    assert!(errors[0].contains("--shared-memory must be used"));
}

#[test]
fn atomics_with_shared_memory_is_fine() {
    let config = Config {
        shared_memory: true,
        max_memory: 65536,
        ..Config::default()
    };
    let (_, errors) = run_features(
        &config,
        &[object_with_features("atomic.o", &[("used", "atomics")])],
    );
    assert!(errors.is_empty());
}

#[test]
fn disallowed_atomics_rejects_shared_memory() {
    let config = Config {
        shared_memory: true,
        ..Config::default()
    };
    let (_, errors) = run_features(
        &config,
        &[object_with_features("no_atomic.o", &[("disallowed", "atomics")])],
    );
    assert!(errors
        .iter()
        .any(|e| e.contains("disallowed by no_atomic.o")));
}

#[test]
fn passive_segments_require_bulk_memory() {
    let config = Config {
        passive_segments: true,
        ..Config::default()
    };
    let (_, errors) = run_features(&config, &[object_with_features("a.o", &[])]);
    assert!(errors
        .iter()
        .any(|e| e.contains("'bulk-memory' feature must be used")));
}

#[test]
fn tls_requires_bulk_memory() {
    let (_, errors) = run_features(
        &Config::default(),
        &[json!({
            "name": "tls.o",
            "segments": [{"name": ".tdata.x", "data": "00"}]
        })],
    );
    assert!(errors
        .iter()
        .any(|e| e.contains("thread-local storage")));
}

#[test]
fn prespecified_features_must_cover_used() {
    let config = Config {
        features: Some(vec!["sign-ext".to_string()]),
        ..Config::default()
    };
    let (features, errors) = run_features(
        &config,
        &[object_with_features("a.o", &[("used", "bulk-memory")])],
    );
    assert_eq!(features, ["sign-ext"]);
    assert!(errors
        .iter()
        .any(|e| e.contains("'bulk-memory' used by a.o is not allowed")
            || e.contains("Target feature 'bulk-memory' used by a.o is not allowed.")));
}

#[test]
fn prespecified_without_checking_skips_validation() {
    let config = Config {
        features: Some(vec!["sign-ext".to_string()]),
        check_features: false,
        ..Config::default()
    };
    let (features, errors) = run_features(
        &config,
        &[object_with_features("a.o", &[("used", "atomics")])],
    );
    assert_eq!(features, ["sign-ext"]);
    assert!(errors.is_empty());
}

#[test]
fn required_feature_must_appear_in_every_file() {
    let (_, errors) = run_features(
        &Config::default(),
        &[
            object_with_features("simd.o", &[("required", "simd128")]),
            object_with_features("plain.o", &[]),
        ],
    );
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Missing target feature 'simd128' in plain.o"));
    assert!(errors[0].contains("required by simd.o"));
}

#[test]
fn disallowed_conflicts_with_other_files_use() {
    let (_, errors) = run_features(
        &Config::default(),
        &[
            object_with_features("user.o", &[("used", "simd128")]),
            object_with_features("hater.o", &[("disallowed", "simd128")]),
        ],
    );
    assert!(errors
        .iter()
        .any(|e| e.contains("'simd128' used in user.o is disallowed by hater.o")));
}
