use assert_cmd::Command;
use predicates::prelude::*;
use pynix_util::hash::shard_key;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[allow(deprecated)]
fn pynix_cmd() -> Command {
    Command::cargo_bin("pynix").unwrap()
}

/// Write `packages` into the sharded layout under `dir`.
fn write_bucket(dir: &Path, packages: &Value) {
    fs::create_dir_all(dir).unwrap();
    let mut shards: std::collections::BTreeMap<String, Map<String, Value>> = Default::default();
    for (name, data) in packages.as_object().unwrap() {
        shards
            .entry(shard_key(name))
            .or_default()
            .insert(name.clone(), data.clone());
    }
    for (key, shard) in shards {
        fs::write(
            dir.join(format!("{key}.json")),
            serde_json::to_string(&Value::Object(shard)).unwrap(),
        )
        .unwrap();
    }
}

fn project(providers: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_bucket(
        &tmp.path().join("db/sdist"),
        &json!({
            "requests": {"2.24.0": {"39": {"install_requires": ["idna<3", "chardet"]}}},
            "idna": {"2.10": {"39": {}}, "3.1": {"39": {}}},
            "chardet": {"3.0.4": {"39": {"install_requires": ["requests"]}}},
            "a": {"1.0": {"39": {"install_requires": ["x==1.0"]}}},
            "b": {"1.0": {"39": {"install_requires": ["x==2.0"]}}},
            "x": {"1.0": {"39": {}}, "2.0": {"39": {}}}
        }),
    );
    write_bucket(&tmp.path().join("db/wheel"), &json!({}));
    fs::write(
        tmp.path().join("pynix.toml"),
        format!(
            "python = \"3.9.5\"\nsystem = \"linux\"\narch = \"x86_64\"\n\
             providers = \"{providers}\"\n\n[data]\npypi-deps-db = \"db\"\n"
        ),
    )
    .unwrap();
    tmp
}

#[test]
fn test_resolve_prints_json() {
    let tmp = project("wheel,sdist");

    let output = pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "requests"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let packages: Value = serde_json::from_slice(&output.stdout).unwrap();
    let packages = packages.as_array().unwrap();
    assert_eq!(packages.len(), 3);
    let idna = packages.iter().find(|p| p["name"] == "idna").unwrap();
    assert_eq!(idna["version"], "2.10");
    assert_eq!(idna["provider_info"]["provider"], "sdist");
    let requests = packages.iter().find(|p| p["name"] == "requests").unwrap();
    assert_eq!(requests["is_root"], true);
}

#[test]
fn test_resolve_reports_removed_cycle() {
    let tmp = project("sdist");

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "requests"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed_circular_deps"))
        .stderr(predicate::str::contains("removed 1 circular dependencies"));
}

#[test]
fn test_resolve_tree() {
    let tmp = project("sdist");

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "--tree", "requests"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("requests - 2.24.0 - sdist"))
        .stdout(predicate::str::contains("└── idna - 2.10 - sdist"));
}

#[test]
fn test_resolve_from_file_to_output() {
    let tmp = project("sdist");
    fs::write(tmp.path().join("requirements.txt"), "# deps\nidna>=3\n").unwrap();

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "-r", "requirements.txt", "-o", "out.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(tmp.path().join("out.json")).unwrap();
    let packages: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(packages[0]["name"], "idna");
    assert_eq!(packages[0]["version"], "3.1");
}

#[test]
fn test_resolve_nixpkgs_prefers_sdist_metadata() {
    let tmp = TempDir::new().unwrap();
    write_bucket(
        &tmp.path().join("db/sdist"),
        &json!({
            "six": {"1.0": {"39": {"install_requires": ["from-sdist"]}}},
            "from-sdist": {"1.0": {"39": {}}},
            "from-wheel": {"1.0": {"39": {}}}
        }),
    );
    write_bucket(
        &tmp.path().join("db/wheel"),
        &json!({
            "six": {"py3": {"1.0": {"six-1.0-py3-none-any.whl": {
                "requires_dist": ["from-wheel"]
            }}}}
        }),
    );
    fs::write(
        tmp.path().join("nixpkgs.json"),
        r#"{"six": {"pname": "six", "version": "1.0"}}"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("pynix.toml"),
        "python = \"3.9.5\"\nsystem = \"linux\"\narch = \"x86_64\"\n\
         providers = { _default = \"sdist\", six = \"nixpkgs\" }\n\n\
         [data]\npypi-deps-db = \"db\"\nnixpkgs-json = \"nixpkgs.json\"\n",
    )
    .unwrap();

    let output = pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "six"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let packages: Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = packages
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"from-sdist"));
    assert!(!names.contains(&"from-wheel"));
    let six = packages.as_array().unwrap().iter().find(|p| p["name"] == "six").unwrap();
    assert_eq!(six["provider_info"]["provider"], "nixpkgs");
}

#[test]
fn test_resolve_with_explicit_config() {
    let tmp = project("sdist");
    let workdir = TempDir::new().unwrap();

    pynix_cmd()
        .current_dir(workdir.path())
        .args(["resolve", "-c"])
        .arg(tmp.path().join("pynix.toml"))
        .arg("x<2")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": \"1.0\""));
}

#[test]
fn test_resolve_conflict_fails() {
    let tmp = project("sdist");

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "a", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Resolution impossible"))
        .stderr(predicate::str::contains("required by a 1.0"))
        .stderr(predicate::str::contains("required by b 1.0"));
}

#[test]
fn test_resolve_unknown_package_fails() {
    let tmp = project("sdist");

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No candidates for `does-not-exist`"));
}

#[test]
fn test_resolve_without_data_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("pynix.toml"), "providers = \"wheel\"\n").unwrap();

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve", "requests"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configured but has no data"));
}

#[test]
fn test_resolve_without_requirements_fails() {
    let tmp = project("sdist");

    pynix_cmd()
        .current_dir(tmp.path())
        .args(["resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no requirements given"));
}
