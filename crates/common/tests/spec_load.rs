//! Loading spec files from disk and walking them end to end

use floot_common::{
    compare, request_id, strategy::permutations, Error, RecordedResponse, Registry, Spec, Storages,
};
use std::fs;
use tempfile::TempDir;
use test_case::test_case;

const SPEC: &str = r#"
host: http://localhost:8080
storage:
  main: baseline
  runs: runs
request:
  header:
    Accept: application/json
parameters:
  limit:
    values: [10, 100]
  expand:
    values: [owner, tags]
    occurrence:
      min: 0
      max: 2
endpoints:
  /items:
    uses: [limit, expand]
  /health:
testsets:
  smoke:
    endpoints:
      /health:
  full:
"#;

fn write_spec(tmp: &TempDir, content: &str) -> std::path::PathBuf {
    let path = tmp.path().join("floot.yaml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_from_file_resolves_storage_next_to_spec() {
    let tmp = TempDir::new().unwrap();
    let spec = Spec::from_file(write_spec(&tmp, SPEC), &Registry::builtin()).unwrap();
    assert_eq!(spec.storage.main, tmp.path().join("baseline"));
    assert_eq!(spec.storage.runs, tmp.path().join("runs"));
    assert_eq!(spec.request.header.get("Accept").map(String::as_str), Some("application/json"));
    spec.validate().unwrap();
}

#[test]
fn test_missing_file_is_a_spec_error() {
    let tmp = TempDir::new().unwrap();
    let err = Spec::from_file(tmp.path().join("nope.yaml"), &Registry::builtin()).unwrap_err();
    assert!(matches!(err, Error::Spec(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test_case("smoke", &["/items", "/health"], 14 ; "testset override keeps global order")]
#[test_case("full", &["/items", "/health"], 14 ; "global endpoints only")]
fn test_request_space_per_testset(testset: &str, endpoints: &[&str], items: usize) {
    let tmp = TempDir::new().unwrap();
    let spec = Spec::from_file(write_spec(&tmp, SPEC), &Registry::builtin()).unwrap();
    let ts = spec.testsets.get(testset).unwrap();
    let resolved = spec.endpoints_for(ts);
    assert_eq!(resolved.keys().collect::<Vec<_>>(), endpoints);

    // limit: 2, expand: 1 + 2 + 4
    let used = spec
        .used_parameters(ts, resolved.get("/items").unwrap())
        .unwrap();
    assert_eq!(permutations(&used).len(), items);
}

#[test]
fn test_undeclared_parameter_names_the_endpoint() {
    let tmp = TempDir::new().unwrap();
    let spec = SPEC.replace("uses: [limit, expand]", "uses: [limit, page]");
    let spec = Spec::from_file(write_spec(&tmp, &spec), &Registry::builtin()).unwrap();
    let err = spec.validate().unwrap_err();
    assert!(matches!(err.root(), Error::Run(_)));
    assert!(err.to_string().contains("/items"), "{}", err);
    assert!(err.to_string().contains("page"), "{}", err);
}

#[test]
fn test_two_runs_one_request_apart() {
    let tmp = TempDir::new().unwrap();
    let spec = Spec::from_file(write_spec(&tmp, SPEC), &Registry::builtin()).unwrap();
    let storages = Storages::new(&spec.storage);
    let response = RecordedResponse::new("http://localhost:8080/health", 200)
        .with_header("Content-Type", "application/json")
        .with_body(b"{}".to_vec());

    let r1 = request_id("smoke", "/health", &Vec::new());
    let r2 = request_id("smoke", "/health", &vec![("v".to_string(), "1".to_string())]);

    let mut a = storages.create_run("a").unwrap();
    a.save_blob(&r1, &response).unwrap();
    a.metadata_mut().record("smoke", "/health", &r1, Vec::new());
    a.commit().unwrap();

    let mut b = storages.create_run("b").unwrap();
    for id in [&r1, &r2] {
        b.save_blob(id, &response).unwrap();
        b.metadata_mut().record("smoke", "/health", id, Vec::new());
    }
    b.commit().unwrap();

    let a = storages.open_run("a").unwrap();
    let b = storages.open_run("b").unwrap();
    let report = compare(&spec, &a, &b).unwrap();
    assert!(report.changed);
    let changed: Vec<&str> = report.changes().map(|f| f.request_id.as_str()).collect();
    assert_eq!(changed, vec![r2.as_str()]);
    assert_eq!(report.findings.len(), 2);
}
