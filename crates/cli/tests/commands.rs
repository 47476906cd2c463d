//! End-to-end command tests against scratch storages

use axum::http::header;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use floot_cli::{execute, exit_code, Cli};
use floot_common::{RecordedResponse, Registry, Spec, Storages};
use std::path::PathBuf;
use tempfile::TempDir;

struct Workspace {
    _tmp: TempDir,
    config: PathBuf,
    storages: Storages,
}

impl Workspace {
    fn new(host: &str, extra: &str) -> Self {
        colored::control::set_override(false);
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("floot.yaml");
        let yaml = format!(
            "host: {}\nstorage:\n  main: store/main\n  runs: store/runs\n{}",
            host, extra
        );
        std::fs::write(&config, yaml).unwrap();
        let spec = Spec::from_file(&config, &Registry::builtin()).unwrap();
        let storages = Storages::new(&spec.storage);
        Self {
            _tmp: tmp,
            config,
            storages,
        }
    }

    /// A run holding `/health` answered with `body`
    fn record(&self, run_id: &str, body: &str) {
        let mut run = self.storages.create_run(run_id).unwrap();
        let response = RecordedResponse::new("http://api.test/health", 200)
            .with_reason("OK")
            .with_header("Content-Type", "text/plain")
            .with_body(body.as_bytes().to_vec());
        run.save_blob("r1", &response).unwrap();
        run.metadata_mut().record(
            "smoke",
            "/health",
            "r1",
            vec![("verbose".to_string(), "true".to_string())],
        );
        run.commit().unwrap();
    }

    async fn floot(&self, args: &[&str], input: &str) -> (i32, String) {
        let mut argv = vec!["floot", "--config", self.config.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();

        let mut out = Vec::<u8>::new();
        let code = match execute(cli, &mut input.as_bytes(), &mut out).await {
            Ok(code) => code,
            Err(e) => exit_code(&e),
        };
        (code, String::from_utf8(out).unwrap())
    }
}

#[tokio::test]
async fn test_list_runs_oldest_first() {
    let ws = Workspace::new("http://api.test", "");
    let (code, out) = ws.floot(&["list"], "").await;
    assert_eq!(code, 0);
    assert!(out.contains("No items found."));

    ws.record("first", "a");
    std::thread::sleep(std::time::Duration::from_millis(5));
    ws.record("second", "a");

    let (code, out) = ws.floot(&["--format", "plain", "list"], "").await;
    assert_eq!(code, 0);
    let ids: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap()).collect();
    assert_eq!(ids, vec!["first", "second"]);
}

#[tokio::test]
async fn test_rm_asks_first() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("r", "a");

    let (code, out) = ws.floot(&["rm", "r"], "what\nn\n").await;
    assert_eq!(code, 1);
    assert_eq!(out.matches("Remove run r? [y/n]").count(), 2);
    assert!(ws.storages.open_run("r").is_ok());

    let (code, _) = ws.floot(&["rm", "r"], "y\n").await;
    assert_eq!(code, 0);
    assert!(ws.storages.open_run("r").is_err());

    let (code, _) = ws.floot(&["rm", "r", "--yes"], "").await;
    assert_eq!(code, 2);
}

#[tokio::test]
async fn test_cmp_exit_codes() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("a", "one\ntwo\n");
    ws.record("same", "one\ntwo\n");
    ws.record("other", "one\nthree\n");

    let (code, out) = ws.floot(&["cmp", "a", "same"], "").await;
    assert_eq!(code, 0, "{}", out);
    assert!(out.contains("No differences between a and same"));

    let (code, out) = ws.floot(&["cmp", "a", "other"], "").await;
    assert_eq!(code, 1);
    assert!(out.contains("smoke > /health > r1"));
    assert!(out.contains("-two"));
    assert!(out.contains("+three"));

    let (code, out) = ws.floot(&["cmp", "a", "other", "--brief"], "").await;
    assert_eq!(code, 1);
    assert!(out.contains("Differs: smoke > /health > r1"));
    assert!(!out.contains("+three"));

    let (code, _) = ws.floot(&["cmp", "a", "missing"], "").await;
    assert_eq!(code, 2);
}

#[tokio::test]
async fn test_accept_then_cmp_against_main() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("r", "body\n");

    // empty main: everything is exclusive to the run
    let (code, out) = ws.floot(&["cmp", "r"], "").await;
    assert_eq!(code, 1);
    assert!(out.contains("Only in r: smoke > /health > r1"));
    assert!(out.contains("  verbose=true"));
    assert!(out.contains("  http://api.test/health 200 OK"));
    assert!(out.contains("  Content-Type: text/plain"));
    assert!(out.contains("  body"));

    let (_, out) = ws.floot(&["cmp", "r", "--brief"], "").await;
    assert!(out.contains("Only in r: smoke > /health > r1"));
    assert!(!out.contains("200 OK"));

    let (code, _) = ws.floot(&["accept", "r"], "n\n").await;
    assert_eq!(code, 1);

    let (code, out) = ws.floot(&["accept", "r"], "y\n").await;
    assert_eq!(code, 0, "{}", out);

    let (code, out) = ws.floot(&["cmp", "r"], "").await;
    assert_eq!(code, 0, "{}", out);
}

#[tokio::test]
async fn test_accept_single_request() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("r", "body\n");

    let (code, _) = ws.floot(&["accept", "r", "nope", "--yes"], "").await;
    assert_eq!(code, 2);

    let (code, _) = ws.floot(&["accept", "r", "r1", "--yes"], "").await;
    assert_eq!(code, 0);
    assert!(ws.storages.main().unwrap().has_blob("r1"));

    // recorded in the tree but the response file is gone
    ws.record("lost", "body\n");
    let root = ws.storages.open_run("lost").unwrap().root().to_path_buf();
    std::fs::remove_file(root.join("r1")).unwrap();
    let (code, out) = ws.floot(&["accept", "lost", "r1"], "").await;
    assert_eq!(code, 2);
    assert!(!out.contains("[y/n]"));
}

#[tokio::test]
async fn test_show_verbosity_levels() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("r", "hello body\n");

    let (code, out) = ws.floot(&["show", "r", "--verbosity", "NAME"], "").await;
    assert_eq!(code, 0);
    assert!(out.contains("Run: r"));
    assert!(out.contains("smoke > /health > r1"));
    assert!(out.contains("verbose=true"));
    assert!(!out.contains("200 OK"));

    let (_, out) = ws.floot(&["show", "r", "-v", "header"], "").await;
    assert!(out.contains("http://api.test/health 200 OK"));
    assert!(out.contains("Content-Type: text/plain"));
    assert!(!out.contains("hello body"));

    let (_, out) = ws.floot(&["show", "r"], "").await;
    assert!(out.contains("  hello body"));

    let (code, out) = ws.floot(&["show", "main"], "").await;
    assert_eq!(code, 0);
    assert!(!out.contains("smoke"));
}

#[tokio::test]
async fn test_structured_formats() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("a", "one\n");
    ws.record("b", "two\n");

    let (code, out) = ws.floot(&["--format", "json", "cmp", "a", "b"], "").await;
    assert_eq!(code, 1);
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["changed"], true);
    assert_eq!(report["findings"][0]["kind"], "shared");
    assert_eq!(report["findings"][0]["request_id"], "r1");
    assert!(report["findings"][0]["report"]
        .as_array()
        .unwrap()
        .contains(&serde_json::Value::from("+two")));

    let (code, out) = ws.floot(&["--format", "plain", "cmp", "a", "b"], "").await;
    assert_eq!(code, 1);
    assert_eq!(out, "differs\tsmoke > /health > r1\n");

    let (code, out) = ws.floot(&["--format", "plain", "cmp", "a"], "").await;
    assert_eq!(code, 1);
    assert_eq!(out, "only in a\tsmoke > /health > r1\n");

    let (code, out) = ws.floot(&["--format", "yaml", "show", "a"], "").await;
    assert_eq!(code, 0);
    let shown: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
    assert_eq!(shown[0]["request_id"], "r1");
    assert_eq!(shown[0]["status"], 200);
    assert_eq!(shown[0]["body"], "one\n");

    let (_, out) = ws.floot(&["--format", "json", "show", "a", "-v", "name"], "").await;
    let shown: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(shown[0]["parameters"], "verbose=true");
    assert!(shown[0].get("status").is_none());
}

#[tokio::test]
async fn test_bad_spec_is_a_domain_error() {
    let ws = Workspace::new("http://api.test", "");
    std::fs::write(&ws.config, "host: x\nstorage: {main: a, runs: b}\nextra: 1\n").unwrap();
    let (code, _) = ws.floot(&["list"], "").await;
    assert_eq!(code, 2);

    let cli = Cli::try_parse_from(["floot", "--config", "/does/not/exist.yaml", "list"]).unwrap();
    let err = execute(cli, &mut "".as_bytes(), &mut Vec::<u8>::new()).await.unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[tokio::test]
async fn test_undeclared_parameter_stops_the_run() {
    let ws = Workspace::new(
        "http://127.0.0.1:9",
        "endpoints:\n  /items:\n    uses: [missing]\ntestsets:\n  smoke:\n",
    );
    let (code, out) = ws.floot(&["run"], "").await;
    assert_eq!(code, 2);
    assert!(out.is_empty());
    assert!(ws.storages.list_runs().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_prints_id_first() {
    let app = Router::new().route(
        "/health",
        get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{\"ok\": true}") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let ws = Workspace::new(&host, "endpoints:\n  /health:\ntestsets:\n  smoke:\n");
    let (code, out) = ws.floot(&["run"], "").await;
    assert_eq!(code, 0, "{}", out);
    let run_id = out.lines().next().unwrap().to_string();
    assert!(out.contains("smoke > GET /health"));

    let run = ws.storages.open_run(&run_id).unwrap();
    assert_eq!(run.metadata().request_count(), 1);

    let (code, out) = ws.floot(&["run", "--id-only"], "").await;
    assert_eq!(code, 0);
    assert_eq!(out.lines().count(), 1);

    let (code, _) = ws.floot(&["cmp", &run_id, out.trim()], "").await;
    assert_eq!(code, 0);
}

/// Accepts writes, refuses to flush
struct BrokenPipe(Vec<u8>);

impl std::io::Write for BrokenPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::Write::write(&mut self.0, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[tokio::test]
async fn test_failed_flush_is_reported() {
    let ws = Workspace::new("http://api.test", "");
    ws.record("r", "a");

    let cli = Cli::try_parse_from(["floot", "--config", ws.config.to_str().unwrap(), "list"]).unwrap();
    let mut out = BrokenPipe(Vec::new());
    let err = execute(cli, &mut "".as_bytes(), &mut out).await.unwrap_err();
    assert_eq!(exit_code(&err), 3);
    assert!(String::from_utf8(out.0).unwrap().contains("r"));
}
