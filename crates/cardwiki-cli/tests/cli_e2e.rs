use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn cardwiki_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cardwiki"))
}

fn company_store() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/company.json")
        .canonicalize()
        .expect("canonicalize demo store")
}

fn run(args: &[&str]) -> Output {
    Command::new(cardwiki_bin())
        .arg("--store")
        .arg(company_store())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run cardwiki")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn search_json(query: &str) -> serde_json::Value {
    let output = run(&["search", query, "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    serde_json::from_slice(&output.stdout).expect("search --json output")
}

#[test]
fn search_lists_collection_members() {
    let out = search_json("movies");
    assert_eq!(out["columns"], serde_json::json!(["movies"]));
    assert_eq!(out["rows"].as_array().map(Vec::len), Some(2));
}

#[test]
fn search_reads_an_entity_fact() {
    let out = search_json("pixar's founded");
    assert_eq!(out["columns"], serde_json::json!(["pixar", "founded"]));
    assert_eq!(out["rows"][0][0], "pixar");
    assert_eq!(out["rows"][0][1].as_f64(), Some(1986.0));
}

#[test]
fn search_filters_by_comparison() {
    let out = search_json("salaries > 95000");
    let rows = out["rows"].as_array().expect("rows");
    let salaries: Vec<f64> = rows.iter().filter_map(|r| r[0].as_f64()).collect();
    assert_eq!(salaries, vec![120000.0, 100000.0]);
}

#[test]
fn search_limits_per_group() {
    let out = search_json("top 1 salaries per department");
    let rows = out["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "engineering");
    assert_eq!(rows[0][1], "chris");
    assert_eq!(rows[1][0], "sales");
    assert_eq!(rows[1][1], "rob");
}

#[test]
fn unparseable_search_fails_with_a_friendly_message() {
    let output = run(&["search", "salaries >"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("could not understand that search"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn tokens_shows_each_kind() {
    let output = run(&["tokens", "movies", "without", "up"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    for label in ["collection", "modifier", "entity"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
}

#[test]
fn plan_describes_the_steps() {
    let output = run(&["plan", "movies", "without", "up"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("gather movies"), "{text}");
    assert!(text.contains("remove up"), "{text}");
}

#[test]
fn search_without_a_member_drops_it() {
    let out = search_json("movies without up");
    assert_eq!(out["rows"], serde_json::json!([["toy story"]]));
}

#[test]
fn dictionary_lists_collections() {
    let output = run(&["dictionary", "collections"]);
    assert!(output.status.success());
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    for deck in ["departments", "employee", "employees", "movies", "studios"] {
        assert!(lines.contains(&deck), "missing {deck} in {lines:?}");
    }
}

#[test]
fn config_file_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("search.json");
    fs::write(&good, r#"{"hidden_collections": ["employee"]}"#).expect("write config");
    let output = run(&["--config", good.to_str().unwrap(), "search", "salaries per department"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let header = stdout(&output).lines().next().unwrap_or_default().to_string();
    assert!(header.contains("employees"), "{header}");

    let bad = dir.path().join("broken.json");
    fs::write(&bad, "{ not json").expect("write config");
    let output = run(&["--config", bad.to_str().unwrap(), "search", "movies"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid config"), "stderr: {}", stderr(&output));
}

#[test]
fn missing_store_is_reported() {
    let output = Command::new(cardwiki_bin())
        .args(["--store", "/nonexistent/store.json", "dictionary", "entities"])
        .output()
        .expect("run cardwiki");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read store snapshot"));
}
