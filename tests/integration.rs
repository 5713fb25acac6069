use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mdna_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mdna");
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
        files_dir.join("quarterly.csv"),
        "Quarter,Revenue,Operating Expenses\n\
         2023-Q1,100,60\n\
         2023-Q2,110,62\n\
         2023-Q3,120,65\n\
         2023-Q4,90,70\n\
         2024-Q1,130,71\n\
         2024-Q2,140,75\n\
         2024-Q3,150,80\n\
         2024-Q4,160,82\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("monthly.tsv"),
        "Month\tSales\n2024-01\t1000\n2024-02\t1200\n",
    )
    .unwrap();
    fs::write(files_dir.join("notes.pdf"), "%PDF-1.4").unwrap();

    let config_content = r#"[chunking]
chunk_size = 120
chunk_overlap = 20

[retrieval]
top_k = 3

[embedding]
provider = "disabled"

[llm]
provider = "disabled"
"#;

    let config_path = config_dir.join("mdna.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mdna(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mdna_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mdna binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn file(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .display()
        .to_string()
}

#[test]
fn test_analyze_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_mdna(&config_path, &["analyze", &file(&config_path, "quarterly.csv")]);
    assert!(success, "analyze failed: {}", stderr);

    let payload: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["total_revenue"], 1000.0);
    assert_eq!(payload["average_revenue"], 125.0);
    // Trailing four quarters against the four before them.
    let yoy = payload["yoy_change"].as_f64().unwrap();
    assert!((yoy - 38.095238095238095).abs() < 1e-9, "yoy = {}", yoy);
    assert_eq!(payload["kpis"]["total_expenses"], 565.0);
    assert_eq!(payload["chart_data"]["data"].as_array().unwrap().len(), 8);
}

#[test]
fn test_analyze_deterministic_offline() {
    let (_tmp, config_path) = setup_test_env();
    let path = file(&config_path, "quarterly.csv");

    let (first, _, ok1) = run_mdna(&config_path, &["analyze", &path]);
    let (second, _, ok2) = run_mdna(&config_path, &["analyze", &path]);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
}

#[test]
fn test_analyze_markdown_to_file() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("report.md");

    let (stdout, stderr, success) = run_mdna(
        &config_path,
        &[
            "analyze",
            &file(&config_path, "quarterly.csv"),
            "--format",
            "markdown",
            "--output",
            out.to_str().unwrap(),
        ],
    );
    assert!(success, "analyze failed: {}", stderr);
    assert!(stdout.contains("Report written to"));

    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains("## Executive Summary"));
    assert!(report.contains("$1,000.00"));
}

#[test]
fn test_metrics_reports_schema_hints() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_mdna(&config_path, &["metrics", &file(&config_path, "quarterly.csv")]);
    assert!(success, "metrics failed: {}", stderr);

    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(out["hints"]["period_column"], "Quarter");
    assert_eq!(out["hints"]["revenue_column"], "Revenue");
    assert_eq!(out["hints"]["expense_column"], "Operating Expenses");
    assert_eq!(out["metrics"]["chart"]["type"], "line");
}

#[test]
fn test_metrics_tsv_sales_column() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_mdna(&config_path, &["metrics", &file(&config_path, "monthly.tsv")]);
    assert!(success, "metrics failed: {}", stderr);

    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(out["hints"]["revenue_column"], "Sales");
    assert!((out["metrics"]["qoq_change"].as_f64().unwrap() - 20.0).abs() < 1e-9);
}

#[test]
fn test_chunks_lists_summary_last() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_mdna(&config_path, &["chunks", &file(&config_path, "quarterly.csv")]);
    assert!(success, "chunks failed: {}", stderr);

    assert!(stdout.contains("financial_data_chunk_0"));
    let last_row = stdout
        .lines()
        .filter(|l| l.starts_with("financial_data_chunk_") || l.starts_with("analysis_summary"))
        .last()
        .unwrap();
    assert!(last_row.starts_with("analysis_summary"));
}

#[test]
fn test_unsupported_format_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_mdna(&config_path, &["analyze", &file(&config_path, "notes.pdf")]);
    assert!(!success);
    assert!(stderr.contains("Unsupported file format"), "stderr: {}", stderr);
}

#[test]
fn test_missing_file_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_mdna(&config_path, &["metrics", &file(&config_path, "absent.csv")]);
    assert!(!success);
    assert!(stderr.contains("Failed to read"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_errors() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 100\nchunk_overlap = 80\n").unwrap();

    let (_, stderr, success) = run_mdna(&bad, &["metrics", "whatever.csv"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}
