//! Declarative YAML scenarios loaded from disk and run against the fake

mod common;

use std::fs;

use common::{config, FakeLibrary};
use shelfwalk_e2e::{E2eError, Scenario, StepStatus, TestSuite};

const BORROW_YAML: &str = r#"
name: borrow_from_yaml
description: Borrow the seeded copy from its catalog row
tags: [library, borrow]
steps:
  - action: navigate
    url: /catalog
  - action: wait_for_settled
  - action: assert_table_row
    row_text: To Kill a Mockingbird
    fields: [Harper Lee, "9780061120084"]
  - action: fill
    locator:
      target: input[name='patron_id']
      within: { has_text: To Kill a Mockingbird }
    value: "654321"
  - action: click
    locator:
      target: button:has-text('Borrow')
      within: { root: tr, has_text: To Kill a Mockingbird }
  - action: wait_for_settled
    until: load
    timeout_ms: 5000
  - action: wait_for_settled
  - action: assert_text
    locator: .flash-success
    pattern: { regex: "success|borrowed" }
  - action: screenshot
    name: borrowed
  - action: log
    message: borrow confirmed
"#;

const NAV_YAML: &str = r#"
name: nav_from_yaml
tags: [ui]
steps:
  - action: navigate
    url: /
  - action: wait_for_settled
    until:
      visible: "text=📖 Catalog"
  - action: assert_visible
    locator: "text=➕ Add Book"
"#;

#[tokio::test(start_paused = true)]
async fn yaml_directory_runs_end_to_end() {
    let specs = tempfile::tempdir().unwrap();
    fs::create_dir(specs.path().join("catalog")).unwrap();
    fs::write(specs.path().join("catalog/borrow.yaml"), BORROW_YAML).unwrap();
    fs::write(specs.path().join("nav.yml"), NAV_YAML).unwrap();
    fs::write(specs.path().join("README.md"), "not a scenario").unwrap();

    let scenarios = Scenario::load_all(specs.path()).unwrap();
    let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["borrow_from_yaml", "nav_from_yaml"]);

    let fake = FakeLibrary::new();
    let output = tempfile::tempdir().unwrap();
    let mut suite = TestSuite::new(config(output.path()), fake.factory());
    suite.register_all(scenarios).unwrap();

    let report = suite.run().await;
    assert!(report.all_passed(), "{:?}", report.failures().collect::<Vec<_>>());

    let borrow = &report.scenarios[0];
    assert_eq!(borrow.steps.len(), 10);
    assert!(borrow.steps.iter().all(|s| s.status == StepStatus::Passed));
    assert!(borrow.log.iter().any(|e| e.message == "borrow confirmed"));
    assert!(output
        .path()
        .join("screenshots/borrow_from_yaml-borrowed.png")
        .exists());
    assert_eq!(fake.state.lock().borrows, vec![("654321".to_string(), 1)]);

    let written = report.write_json(output.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(json["passed"], 2);
    assert_eq!(json["scenarios"][1]["verdict"]["status"], "pass");
}

#[test]
fn unsettled_yaml_is_rejected_with_its_path() {
    let specs = tempfile::tempdir().unwrap();
    let path = specs.path().join("bad.yaml");
    fs::write(
        &path,
        r#"
name: bad
steps:
  - action: navigate
    url: /catalog
  - action: assert_visible
    locator: table
"#,
    )
    .unwrap();

    fs::write(specs.path().join("a_ok.yaml"), NAV_YAML).unwrap();

    match Scenario::load_all(specs.path()) {
        Err(E2eError::SpecParse(msg)) => {
            assert!(msg.contains("bad.yaml"), "{}", msg);
            assert!(msg.contains("settle"), "{}", msg);
        }
        other => panic!("expected a spec error, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn malformed_yaml_names_the_file() {
    let specs = tempfile::tempdir().unwrap();
    let path = specs.path().join("broken.yaml");
    fs::write(&path, "name: broken\nsteps:\n  - action: teleport\n").unwrap();

    match Scenario::from_file(&path) {
        Err(E2eError::SpecParse(msg)) => assert!(msg.contains("broken.yaml"), "{}", msg),
        other => panic!("expected a spec error, got {:?}", other.map(|s| s.name)),
    }
}
