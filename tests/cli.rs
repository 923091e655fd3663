use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn wrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("wrag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    ).unwrap();
    fs::write(
        files_dir.join("beta.csv"),
        "language,use\nPython,machine learning\nGo,network services\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    ).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/wrag.sqlite"

[chunking]
max_size = 60
overlap = 10

[retrieval]
default_k = 3
max_k = 5

[embedding]
provider = "hashed"
dims = 64
"#,
        root.display()
    );

    let config_path = config_dir.join("wrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_wrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = wrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run wrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

/// Ingest the fixture directory into `workspace` and return the file ids in
/// output order.
fn ingest_fixture(config_path: &Path, workspace: &str) -> Vec<String> {
    let dir = files_dir(config_path);
    let (stdout, stderr, success) = run_wrag(
        config_path,
        &["ingest", dir.to_str().unwrap(), "--workspace", workspace],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    stdout
        .lines()
        .filter_map(|l| l.trim().strip_prefix("ingested "))
        .filter_map(|l| l.split(" -> ").nth(1))
        .filter_map(|l| l.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_wrag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_wrag(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_wrag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory() {
    let (_tmp, config_path) = setup_test_env();

    run_wrag(&config_path, &["init"]);
    let dir = files_dir(&config_path);
    let (stdout, stderr, success) = run_wrag(
        &config_path,
        &["ingest", dir.to_str().unwrap(), "--workspace", "acme"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_unsupported_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let image = tmp.path().join("photo.png");
    fs::write(&image, [0x89u8, b'P', b'N', b'G']).unwrap();

    let (stdout, stderr, success) = run_wrag(
        &config_path,
        &["ingest", image.to_str().unwrap(), "--workspace", "acme"],
    );
    assert!(!success, "ingest should fail: stdout={}", stdout);
    assert!(stdout.contains("failed: 1"));
    assert!(stderr.contains("unsupported format"));
}

#[test]
fn test_search_finds_matching_file() {
    let (_tmp, config_path) = setup_test_env();
    ingest_fixture(&config_path, "acme");

    let (stdout, stderr, success) = run_wrag(
        &config_path,
        &[
            "search",
            "Kubernetes and Docker are mentioned here.",
            "--workspace",
            "acme",
        ],
    );
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. "), "unexpected output: {}", stdout);
    assert!(first.contains("gamma.txt"), "unexpected first hit: {}", first);
}

#[test]
fn test_search_is_workspace_scoped() {
    let (_tmp, config_path) = setup_test_env();
    ingest_fixture(&config_path, "acme");

    let (stdout, _, success) = run_wrag(
        &config_path,
        &["search", "Rust programming", "--workspace", "other"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_json_respects_max_k() {
    let (_tmp, config_path) = setup_test_env();
    ingest_fixture(&config_path, "acme");

    let (stdout, stderr, success) = run_wrag(
        &config_path,
        &["search", "document", "--workspace", "acme", "--k", "50", "--json"],
    );
    assert!(success, "search failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 5);
    let distances: Vec<f64> = hits
        .iter()
        .map(|h| h["distance"].as_f64().unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_show_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    let ids = ingest_fixture(&config_path, "acme");
    assert_eq!(ids.len(), 3);
    let id = &ids[0];

    let (stdout, _, success) = run_wrag(&config_path, &["show", id]);
    assert!(success);
    assert!(stdout.contains("--- File ---"));
    assert!(stdout.contains("[chunk 0]"));

    let (stdout, _, success) = run_wrag(&config_path, &["delete", id]);
    assert!(success);
    assert!(stdout.contains("deleted"));

    let (_, stderr, success) = run_wrag(&config_path, &["show", id]);
    assert!(!success);
    assert!(stderr.contains("not found"));

    let (stdout, _, success) = run_wrag(&config_path, &["files", "--workspace", "acme"]);
    assert!(success);
    assert!(!stdout.contains(id.as_str()));
}

#[test]
fn test_reprocess_replaces_chunks() {
    let (_tmp, config_path) = setup_test_env();
    let ids = ingest_fixture(&config_path, "acme");

    let (before, _, _) = run_wrag(&config_path, &["stats", "--workspace", "acme", "--json"]);
    for id in &ids {
        let (stdout, stderr, success) = run_wrag(&config_path, &["reprocess", id]);
        assert!(success, "reprocess failed: {}", stderr);
        assert!(stdout.contains("ok"));
    }
    let (after, _, _) = run_wrag(&config_path, &["stats", "--workspace", "acme", "--json"]);

    let before: serde_json::Value = serde_json::from_str(&before).unwrap();
    let after: serde_json::Value = serde_json::from_str(&after).unwrap();
    assert_eq!(before[0]["chunks"], after[0]["chunks"]);
    assert_eq!(after[0]["files"], 3);
}

#[test]
fn test_stats_lists_workspaces() {
    let (_tmp, config_path) = setup_test_env();
    ingest_fixture(&config_path, "acme");
    ingest_fixture(&config_path, "globex");

    let (stdout, _, success) = run_wrag(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Workspaces:  2"));
    assert!(stdout.contains("Files:       6"));
    assert!(stdout.contains("hashed-64"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n\n[chunking]\nmax_size = 10\noverlap = 10\n",
    )
    .unwrap();

    let (_, stderr, success) = run_wrag(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunking"));
}
