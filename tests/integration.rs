use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn fqc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fqc");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/fieldqc.sqlite"

[provider]
base_url = "http://127.0.0.1:9"
api_key_env = "FIELDQC_TEST_KEY_THAT_IS_NEVER_SET"

[pipeline]
import_batch_size = 2

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("fieldqc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fqc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fqc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("FIELDQC_TEST_KEY_THAT_IS_NEVER_SET")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fqc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_orders_file(dir: &Path, numbers: &[&str]) -> PathBuf {
    let orders: Vec<serde_json::Value> = numbers
        .iter()
        .map(|no| {
            serde_json::json!({
                "id": format!("order-{}", no),
                "order_no": no,
                "status": "completed",
                "service_date": "2024-03-04T14:00:00Z",
                "service_notes": "checked",
                "tech_notes": null,
                "notes": "checked",
                "location": {"name": "Depot", "address": null, "city": null, "state": null, "zip": null},
                "driver": {"id": "D1", "name": "Sam Lee"},
                "has_images": true,
                "signature_url": null,
                "tracking_url": null,
                "completion_status": "success",
                "raw_search": {"orderNo": no},
                "raw_completion": {"orderNo": no, "data": {"status": "success"}}
            })
        })
        .collect();
    let path = dir.join("orders.json");
    fs::write(&path, serde_json::to_string_pretty(&orders).unwrap()).unwrap();
    path
}

/// Value printed after `label` in `fqc stats` output.
fn stat_value(stdout: &str, label: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(label))
        .map(|rest| rest.trim().to_string())
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fqc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_fqc(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_fqc(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    run_fqc(&config_path, &["init"]);
    let (stdout, stderr, success) = run_fqc(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(stat_value(&stdout, "Orders:").as_deref(), Some("0"), "stdout={}", stdout);
    assert_eq!(stat_value(&stdout, "Last import:").as_deref(), Some("never"));
}

#[test]
fn test_import_file_and_reimport() {
    let (tmp, config_path) = setup_test_env();
    let file = write_orders_file(tmp.path(), &["X1", "X2", "X3"]);

    run_fqc(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_fqc(&config_path, &["import", file.to_str().unwrap(), "--progress", "off"]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("imported: 3"), "stdout={}", stdout);

    let (stdout, _, success) =
        run_fqc(&config_path, &["import", file.to_str().unwrap(), "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("duplicates: 3"), "stdout={}", stdout);

    let (stdout, _, _) = run_fqc(&config_path, &["stats"]);
    assert_eq!(stat_value(&stdout, "Orders:").as_deref(), Some("3"), "stdout={}", stdout);
}

#[test]
fn test_fetch_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_fqc(
        &config_path,
        &["fetch", "--from", "2024-03-01", "--to", "2024-03-07", "--utc"],
    );
    assert!(!success, "fetch should fail without a provider key");
    assert!(
        stderr.contains("FIELDQC_TEST_KEY_THAT_IS_NEVER_SET"),
        "stderr={}",
        stderr
    );
}

#[test]
fn test_fetch_rejects_scheduled_status() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_fqc(
        &config_path,
        &[
            "fetch", "--from", "2024-03-01", "--to", "2024-03-07", "--status", "scheduled",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("scheduled"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_fqc(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.toml");
    fs::write(
        &path,
        r#"[db]
path = "./data/x.sqlite"

[provider]
base_url = "http://127.0.0.1:9"

[pipeline]
completion_batch_size = 501
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_fqc(&path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("completion_batch_size"), "stderr={}", stderr);
}
