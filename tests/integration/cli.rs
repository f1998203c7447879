//! Tests of the `soldeploy` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

use solution_deployer::settings::{ItemSettings, SettingsRegistry};
use solution_deployer::test_utils::TemplateFixture;

fn soldeploy(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("soldeploy").unwrap();
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("SOLDEPLOY_CONFIG");
    cmd
}

#[test]
fn test_order_lists_dependencies_first() {
    let temp = TempDir::new().unwrap();
    let bundle = TemplateFixture::ordering().write_to(temp.path()).unwrap();

    let output = soldeploy(&temp).arg("order").arg(&bundle).assert().success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let position = |id: &str| stdout.find(id).unwrap_or_else(|| panic!("{id} missing: {stdout}"));
    assert!(position("ghi") < position("def"));
    assert!(position("def") < position("abc"));
    assert!(stdout.contains("Map abc"));
}

#[test]
fn test_order_tree() {
    let temp = TempDir::new().unwrap();
    let bundle = TemplateFixture::service_and_map().write_to(temp.path()).unwrap();

    soldeploy(&temp)
        .arg("order")
        .arg("--tree")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("map").and(predicate::str::contains("svc")));
}

#[test]
fn test_order_rejects_cycles() {
    let temp = TempDir::new().unwrap();
    let bundle = TemplateFixture::cyclic().write_to(temp.path()).unwrap();

    soldeploy(&temp)
        .arg("order")
        .arg(&bundle)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Cyclical dependency graph detected"));
}

#[test]
fn test_order_missing_file() {
    let temp = TempDir::new().unwrap();

    soldeploy(&temp)
        .arg("order")
        .arg("nowhere.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.json"));
}

#[test]
fn test_templatize_bundle_to_file() {
    let temp = TempDir::new().unwrap();
    let bundle = TemplateFixture::service_and_map().write_to(temp.path()).unwrap();
    let out = temp.path().join("templatized.json");

    soldeploy(&temp)
        .arg("templatize")
        .arg(&bundle)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let templates = written["templates"].as_array().unwrap();
    let map = templates.iter().find(|t| t["itemId"] == "map").unwrap();
    let layers = &map["data"]["operationalLayers"];
    assert_eq!(layers[0]["itemId"], "{{svc.id}}");
    assert_eq!(layers[1]["url"], "{{svc.layer1.url}}");
}

#[test]
fn test_detemplatize_with_settings() {
    let temp = TempDir::new().unwrap();
    let mut registry = SettingsRegistry::new();
    registry
        .register("svc", ItemSettings::new("n3w").with_url("https://dest/Parcels/FeatureServer"))
        .unwrap();
    let settings = temp.path().join("settings.json");
    fs::write(&settings, serde_json::to_string(&registry).unwrap()).unwrap();
    let input = temp.path().join("doc.json");
    let doc = json!({"itemId": "{{svc.id}}", "url": "{{svc.layer2.url}}", "other": "{{gone.id}}"});
    fs::write(&input, doc.to_string()).unwrap();

    let output = soldeploy(&temp)
        .arg("detemplatize")
        .arg(&input)
        .arg("--settings")
        .arg(&settings)
        .assert()
        .success();

    let resolved: Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(
        resolved,
        json!({"itemId": "n3w", "url": "https://dest/Parcels/FeatureServer/2", "other": "{{gone.id}}"})
    );
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let temp = TempDir::new().unwrap();

    soldeploy(&temp)
        .args(["--verbose", "--quiet", "order", "bundle.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
