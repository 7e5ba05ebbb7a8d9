//! Integration tests for the complete search pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Store snapshot (JSON file) → KnowledgeStore
//! - Search text → tokens → tree → plan → Query
//! - Query → executed result rows
//!
//! Run with: cargo test --test integration_tests

use cardwiki_search::{compile, CompileError, SearchConfig, StepKind};
use cardwiki_store::{KnowledgeStore, QueryResult, Value};
use proptest::prelude::*;
use tempfile::tempdir;

const COMPANY: &str = r#"{
  "pages": [
    { "name": "engineering", "collections": ["departments"],
      "links": [{ "to": "chris", "type": "employee" }, { "to": "jamie", "type": "employee" }] },
    { "name": "sales", "collections": ["departments"],
      "links": [{ "to": "rob", "type": "employee" }] },
    { "name": "chris", "collections": ["employees"], "attributes": { "salary": 120000, "age": 30 } },
    { "name": "jamie", "collections": ["employees"], "attributes": { "salary": 100000, "age": 41 } },
    { "name": "rob", "collections": ["employees"], "attributes": { "salary": 90000, "age": 35 } },
    { "name": "pixar", "collections": ["studios"], "attributes": { "founded": "1986" },
      "links": [{ "to": "up", "type": "movie" }, { "to": "toy story", "type": "movie" }] },
    { "name": "up", "collections": ["movies"], "attributes": { "year": 2009 } },
    { "name": "toy story", "collections": ["movies"], "attributes": { "year": 1995 } }
  ]
}"#;

fn company() -> KnowledgeStore {
    KnowledgeStore::from_json(COMPANY).expect("company snapshot")
}

fn run(store: &KnowledgeStore, text: &str) -> QueryResult {
    let search = compile(store, text, &SearchConfig::default()).expect("compile");
    search.query().exec(store).expect("exec")
}

fn column<'r>(result: &'r QueryResult, name: &str) -> Vec<&'r Value> {
    let ix = result
        .columns
        .iter()
        .position(|c| c == name)
        .unwrap_or_else(|| panic!("no column {name} in {:?}", result.columns));
    result.rows.iter().map(|row| &row[ix]).collect()
}

// ============================================================================
// Snapshot → store
// ============================================================================

#[test]
fn test_snapshot_file_loads_into_searchable_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("company.json");
    std::fs::write(&path, COMPANY).unwrap();

    let store = KnowledgeStore::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(store.page_count(), 8);
    let result = run(&store, "movies");
    assert_eq!(result.columns, vec!["movies"]);
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn test_malformed_snapshot_is_rejected() {
    assert!(KnowledgeStore::from_json("{ \"pages\": [ { } ] }").is_err());
}

// ============================================================================
// Search → results
// ============================================================================

#[test]
fn test_entity_fact_lookup() {
    let store = company();
    let result = run(&store, "pixar's founded");
    assert_eq!(result.columns, vec!["pixar", "founded"]);
    // snapshot text "1986" is coerced to a number
    assert_eq!(result.rows, vec![vec![Value::text("pixar"), Value::Number(1986.0)]]);
}

#[test]
fn test_comparison_filter() {
    let store = company();
    let result = run(&store, "salaries > 95000");
    assert_eq!(
        column(&result, "salary"),
        vec![&Value::Number(120000.0), &Value::Number(100000.0)]
    );
}

#[test]
fn test_sum_per_group() {
    let store = company();
    let result = run(&store, "sum salaries per department");
    let depts = column(&result, "departments");
    let sums = column(&result, "sum");
    let pairs: Vec<(String, f64)> = depts
        .iter()
        .zip(sums)
        .map(|(d, s)| (d.to_string(), s.as_number().unwrap()))
        .collect();
    assert!(!pairs.is_empty());
    for (dept, sum) in pairs {
        match dept.as_str() {
            "engineering" => assert_eq!(sum, 220000.0),
            "sales" => assert_eq!(sum, 90000.0),
            other => panic!("unexpected department {other}"),
        }
    }
}

#[test]
fn test_bound_attribute_comparison_between_roots() {
    let store = company();
    let search = compile(&store, "employees older than chris", &SearchConfig::default()).unwrap();
    assert_eq!(search.forest.roots.len(), 2);
    let result = search.query().exec(&store).unwrap();
    // both sides project an `age`
    assert!(result.columns.contains(&"age".to_string()));
    assert!(result.columns.contains(&"age 1".to_string()));
    let names: Vec<String> = column(&result, "employees").iter().map(|v| v.to_string()).collect();
    assert_eq!(names, vec!["jamie", "rob"]);
}

#[test]
fn test_without_removes_members_and_linked_pages() {
    let store = company();
    let names = |text: &str| -> Vec<String> {
        column(&run(&store, text), text.split(' ').next().unwrap_or_default())
            .iter()
            .map(|v| v.to_string())
            .collect()
    };
    // `up` is one of the movies
    assert_eq!(names("movies without up"), vec!["toy story"]);
    // engineering employs chris and jamie
    assert_eq!(names("employees without engineering"), vec!["rob"]);
    // both movies link to pixar, a studio
    assert!(names("movies without studios").is_empty());
}

#[test]
fn test_count_covers_every_row() {
    let store = company();
    let result = run(&store, "count movies");
    assert_eq!(column(&result, "count"), vec![&Value::Number(2.0), &Value::Number(2.0)]);
}

#[test]
fn test_top_per_group() {
    let store = company();
    let result = run(&store, "top 1 salaries per department");
    let salaries: Vec<f64> = column(&result, "salary")
        .iter()
        .filter_map(|v| v.as_number())
        .collect();
    assert_eq!(salaries, vec![120000.0, 90000.0]);
}

#[test]
fn test_hidden_collections_are_configurable() {
    let store = company();
    let config = SearchConfig {
        hidden_collections: vec!["employee".into()],
    };
    let search = compile(&store, "salaries per department", &config).unwrap();
    assert!(search.plan.iter().any(|s| s.kind
        == StepKind::Gather {
            collection: Some("employees".into())
        }));
    let default = compile(&store, "salaries per department", &SearchConfig::default()).unwrap();
    assert!(default.plan.iter().any(|s| s.kind
        == StepKind::Gather {
            collection: Some("employee".into())
        }));
}

#[test]
fn test_compile_errors_are_structured() {
    let store = company();
    let err = compile(&store, "salaries >", &SearchConfig::default()).unwrap_err();
    assert_eq!(
        err,
        CompileError::MissingOperand {
            operator: ">".into(),
            expected: 2,
            found: 1,
        }
    );
    assert_eq!(err.user_message(), "could not understand that search");
}

// ============================================================================
// Property Tests
// ============================================================================

const WORDS: &[&str] = &[
    "movies", "up", "toy story", "pixar", "pixar's", "founded", "year", "studios", "employees",
    "departments", "department", "chris", "rob", "salaries", "age", "older", "than", "per",
    "without", "top", "highest", "sum", "average", "count", ">", "+", "5", "95000", "decks",
];

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn compiled_queries_execute(words in prop::collection::vec(prop::sample::select(WORDS), 1..6)) {
        let store = company();
        let text = words.join(" ");
        if let Ok(search) = compile(&store, &text, &SearchConfig::default()) {
            let result = search.query().exec(&store);
            prop_assert!(result.is_ok(), "{text:?}: {:?}", result.as_ref().err());
            let result = result.unwrap();
            prop_assert_eq!(result.columns.len(), search.query().projection().len());
            for row in &result.rows {
                prop_assert_eq!(row.len(), result.columns.len());
            }
        }
    }
}
