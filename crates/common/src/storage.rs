//! Run storage
//!
//! Every run lives in its own directory below `storage.runs`, the baseline
//! ("main") has the same layout below `storage.main`:
//!
//! ```text
//! <run_id>/
//!   .meta          YAML metadata tree
//!   <request_id>   JSON response record, one per request
//! ```
//!
//! The metadata tree is only written by an explicit [`RunStorage::commit`].
//! Dropping a storage handle never touches the disk.
//!
//! Nothing is locked. Accepting into the baseline while another process
//! runs or accepts against it is undefined; callers keep them apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::spec::StorageConfig;
use crate::types::{Combination, RecordedResponse};

/// Name of the metadata file inside a storage directory
pub const META_FILE: &str = ".meta";

/// Name under which the baseline is addressed
pub const MAIN: &str = "main";

/// What is recorded about one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEntry {
    /// The interpolated combination the request was sent with
    pub parameters: Combination,
}

/// request id -> entry
pub type EndpointTree = BTreeMap<String, RequestEntry>;

/// endpoint -> requests
pub type TestsetTree = BTreeMap<String, EndpointTree>;

/// The `.meta` document of a storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub testsets: BTreeMap<String, TestsetTree>,
}

impl Metadata {
    pub fn record(
        &mut self,
        testset: &str,
        endpoint: &str,
        request_id: &str,
        parameters: Combination,
    ) {
        self.testsets
            .entry(testset.to_string())
            .or_default()
            .entry(endpoint.to_string())
            .or_default()
            .insert(request_id.to_string(), RequestEntry { parameters });
    }

    pub fn endpoint(&self, testset: &str, endpoint: &str) -> Option<&EndpointTree> {
        self.testsets.get(testset).and_then(|t| t.get(endpoint))
    }

    pub fn request(&self, testset: &str, endpoint: &str, request_id: &str) -> Option<&RequestEntry> {
        self.endpoint(testset, endpoint).and_then(|e| e.get(request_id))
    }

    /// Find a request id anywhere in the tree
    pub fn locate(&self, request_id: &str) -> Option<(&str, &str, &RequestEntry)> {
        self.testsets.iter().find_map(|(testset, endpoints)| {
            endpoints.iter().find_map(|(endpoint, requests)| {
                requests
                    .get(request_id)
                    .map(|entry| (testset.as_str(), endpoint.as_str(), entry))
            })
        })
    }

    pub fn request_count(&self) -> usize {
        self.testsets
            .values()
            .flat_map(|t| t.values())
            .map(|e| e.len())
            .sum()
    }
}

/// Handle on one run (or the baseline) directory
#[derive(Debug)]
pub struct RunStorage {
    name: String,
    root: PathBuf,
    metadata: Metadata,
}

impl RunStorage {
    fn open_dir(name: &str, root: PathBuf) -> Result<Self> {
        let meta_path = root.join(META_FILE);
        let metadata = if meta_path.exists() {
            let content = fs::read_to_string(&meta_path)?;
            serde_yaml::from_str::<Option<Metadata>>(&content)?.unwrap_or_default()
        } else {
            Metadata::default()
        };
        Ok(Self {
            name: name.to_string(),
            root,
            metadata,
        })
    }

    /// Run id, or `main` for the baseline
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> Option<&str> {
        self.metadata.rid.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn blob_path(&self, request_id: &str) -> Result<PathBuf> {
        check_name("request", request_id)?;
        Ok(self.root.join(request_id))
    }

    pub fn has_blob(&self, request_id: &str) -> bool {
        self.blob_path(request_id).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn load_blob(&self, request_id: &str) -> Result<RecordedResponse> {
        let path = self.blob_path(request_id)?;
        if !path.is_file() {
            return Err(Error::not_found("request", request_id));
        }
        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Store a response, replacing any previous one under the same id
    pub fn save_blob(&self, request_id: &str, response: &RecordedResponse) -> Result<()> {
        let path = self.blob_path(request_id)?;
        let content = serde_json::to_vec(response)?;
        write_atomic(&self.root, &path, &content)
    }

    /// Non-hidden entries of the storage directory, sorted
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Write the metadata tree to `.meta`
    pub fn commit(&self) -> Result<()> {
        let content = serde_yaml::to_string(&self.metadata)?;
        write_atomic(&self.root, &self.root.join(META_FILE), content.as_bytes())?;
        debug!(storage = %self.name, requests = self.metadata.request_count(), "committed metadata");
        Ok(())
    }

    /// Drop the in-memory metadata without writing it
    pub fn discard(self) {
        debug!(storage = %self.name, "discarded metadata");
    }
}

fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Internal(format!("not a file path: {}", path.display())))?;
    let tmp_path = dir.join(format!(".{}.tmp", file_name.trim_start_matches('.')));
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Ids become directory or file names, so they must be a single plain component
fn check_name(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
        && Path::new(id).components().count() == 1;
    if valid {
        Ok(())
    } else {
        Err(Error::Run(format!("invalid {} id `{}`", kind, id)))
    }
}

/// A run as listed by [`Storages::list_runs`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub id: String,
    pub created: Option<DateTime<Utc>>,
    pub requests: usize,
}

/// The baseline and the runs directory of one spec
#[derive(Debug, Clone)]
pub struct Storages {
    main: PathBuf,
    runs: PathBuf,
}

impl Storages {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            main: config.main.clone(),
            runs: config.runs.clone(),
        }
    }

    /// Open the baseline, creating its directory on first use
    pub fn main(&self) -> Result<RunStorage> {
        fs::create_dir_all(&self.main)?;
        RunStorage::open_dir(MAIN, self.main.clone())
    }

    /// Create the directory of a new run. Fails if the run exists.
    pub fn create_run(&self, run_id: &str) -> Result<RunStorage> {
        check_name("run", run_id)?;
        fs::create_dir_all(&self.runs)?;
        let root = self.runs.join(run_id);
        match fs::create_dir(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists {
                    kind: "run".into(),
                    id: run_id.into(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        let storage = RunStorage {
            name: run_id.to_string(),
            root,
            metadata: Metadata {
                rid: Some(run_id.to_string()),
                created: Some(Utc::now()),
                testsets: BTreeMap::new(),
            },
        };
        storage.commit()?;
        info!(run_id, "created run");
        Ok(storage)
    }

    pub fn open_run(&self, run_id: &str) -> Result<RunStorage> {
        check_name("run", run_id)?;
        let root = self.runs.join(run_id);
        if !root.is_dir() {
            return Err(Error::not_found("run", run_id));
        }
        RunStorage::open_dir(run_id, root)
    }

    /// `main` opens the baseline, anything else a run
    pub fn open(&self, name: &str) -> Result<RunStorage> {
        if name == MAIN {
            self.main()
        } else {
            self.open_run(name)
        }
    }

    /// All runs, oldest first
    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        if !self.runs.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.runs)? {
            let entry = entry?;
            let id = entry.file_name().to_string_lossy().into_owned();
            if id.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            let storage = match RunStorage::open_dir(&id, entry.path()) {
                Ok(storage) => storage,
                Err(e) => {
                    warn!(run_id = %id, error = %e, "skipping run with unreadable metadata");
                    continue;
                }
            };
            runs.push(RunInfo {
                created: storage.metadata.created,
                requests: storage.metadata.request_count(),
                id,
            });
        }
        runs.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(runs)
    }

    pub fn remove_run(&self, run_id: &str) -> Result<()> {
        let run = self.open_run(run_id)?;
        let blobs = run.list_ids()?.len();
        fs::remove_dir_all(run.root())?;
        info!(run_id, blobs, "removed run");
        Ok(())
    }

    /// Copy a whole run over the baseline, overwriting on conflict
    pub fn accept_run(&self, run_id: &str) -> Result<()> {
        let run = self.open_run(run_id)?;
        let main = self.main()?;
        copy_tree(run.root(), main.root())?;
        // the copied .meta is the baseline's tree now
        main.discard();
        info!(run_id, "accepted run into {}", MAIN);
        Ok(())
    }

    /// Copy one request of a run into the baseline
    pub fn accept_request(&self, run_id: &str, request_id: &str) -> Result<()> {
        let run = self.open_run(run_id)?;
        let (testset, endpoint, entry) = run
            .metadata()
            .locate(request_id)
            .ok_or_else(|| Error::not_found("request", request_id))?;
        let response = run.load_blob(request_id)?;

        let mut main = self.main()?;
        main.save_blob(request_id, &response)?;
        main.metadata_mut()
            .record(testset, endpoint, request_id, entry.parameters.clone());
        main.commit()?;
        info!(run_id, request_id, testset, endpoint, "accepted request into {}", MAIN);
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storages(tmp: &TempDir) -> Storages {
        Storages::new(&StorageConfig {
            main: tmp.path().join("main"),
            runs: tmp.path().join("runs"),
        })
    }

    fn combo(pairs: &[(&str, &str)]) -> Combination {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);

        let mut run = storages.create_run("r1").unwrap();
        assert_eq!(run.run_id(), Some("r1"));
        run.save_blob("abc", &RecordedResponse::new("http://x/", 200)).unwrap();
        run.metadata_mut().record("smoke", "/health", "abc", combo(&[("a", "1")]));
        run.commit().unwrap();

        let reopened = storages.open_run("r1").unwrap();
        assert_eq!(reopened.metadata(), run.metadata());
        assert_eq!(reopened.load_blob("abc").unwrap().status, 200);
        assert_eq!(reopened.list_ids().unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_create_existing_run_fails() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        storages.create_run("r1").unwrap();
        assert!(matches!(
            storages.create_run("r1"),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_open_missing_run_fails() {
        let tmp = TempDir::new().unwrap();
        let err = storages(&tmp).open_run("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        for id in ["../x", ".meta", "", "a/b"] {
            assert!(matches!(storages.open_run(id), Err(Error::Run(_))), "{}", id);
        }
    }

    #[test]
    fn test_discard_does_not_write() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        let mut run = storages.create_run("r1").unwrap();
        run.metadata_mut().record("smoke", "/a", "x", Vec::new());
        run.discard();

        let reopened = storages.open_run("r1").unwrap();
        assert_eq!(reopened.metadata().request_count(), 0);
    }

    #[test]
    fn test_drop_does_not_write() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        {
            let mut run = storages.create_run("r1").unwrap();
            run.metadata_mut().record("smoke", "/a", "x", Vec::new());
        }
        assert_eq!(storages.open_run("r1").unwrap().metadata().request_count(), 0);
    }

    #[test]
    fn test_load_missing_blob() {
        let tmp = TempDir::new().unwrap();
        let run = storages(&tmp).create_run("r1").unwrap();
        assert!(matches!(run.load_blob("abc"), Err(Error::NotFound { .. })));
        assert!(!run.has_blob("abc"));
    }

    #[test]
    fn test_list_runs_by_creation_time() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        assert!(storages.list_runs().unwrap().is_empty());

        for (id, secs) in [("zz", 100), ("aa", 300), ("mm", 200)] {
            let mut run = storages.create_run(id).unwrap();
            run.metadata_mut().created = DateTime::from_timestamp(secs, 0);
            run.commit().unwrap();
        }
        let ids: Vec<String> = storages.list_runs().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["zz", "mm", "aa"]);
    }

    #[test]
    fn test_list_runs_skips_unreadable_metadata() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        storages.create_run("good").unwrap().commit().unwrap();
        let broken = storages.create_run("broken").unwrap();
        fs::write(broken.root().join(META_FILE), "rid: [unclosed").unwrap();

        let ids: Vec<String> = storages.list_runs().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["good"]);
        assert!(matches!(storages.open_run("broken"), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_remove_run() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);
        storages.create_run("r1").unwrap();
        storages.remove_run("r1").unwrap();
        assert!(matches!(storages.open_run("r1"), Err(Error::NotFound { .. })));
        assert!(matches!(storages.remove_run("r1"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_accept_run_overwrites_baseline() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);

        let mut main = storages.main().unwrap();
        main.save_blob("abc", &RecordedResponse::new("http://x/", 500)).unwrap();
        main.metadata_mut().record("smoke", "/old", "old", Vec::new());
        main.commit().unwrap();

        let mut run = storages.create_run("r1").unwrap();
        run.save_blob("abc", &RecordedResponse::new("http://x/", 200)).unwrap();
        run.metadata_mut().record("smoke", "/health", "abc", Vec::new());
        run.commit().unwrap();

        storages.accept_run("r1").unwrap();
        let main = storages.main().unwrap();
        assert_eq!(main.load_blob("abc").unwrap().status, 200);
        assert_eq!(main.metadata().testsets, run.metadata().testsets);
        // the source run is untouched
        assert_eq!(storages.open_run("r1").unwrap().metadata(), run.metadata());
    }

    #[test]
    fn test_accept_request_merges_single_path() {
        let tmp = TempDir::new().unwrap();
        let storages = storages(&tmp);

        let mut main = storages.main().unwrap();
        main.metadata_mut().record("smoke", "/other", "keep", Vec::new());
        main.commit().unwrap();

        let mut run = storages.create_run("r1").unwrap();
        for id in ["one", "two"] {
            run.save_blob(id, &RecordedResponse::new("http://x/", 200)).unwrap();
            run.metadata_mut().record("smoke", "/health", id, combo(&[("p", id)]));
        }
        run.commit().unwrap();

        storages.accept_request("r1", "one").unwrap();
        let main = storages.main().unwrap();
        assert!(main.has_blob("one"));
        assert!(!main.has_blob("two"));
        assert!(main.metadata().request("smoke", "/other", "keep").is_some());
        assert_eq!(
            main.metadata().request("smoke", "/health", "one").unwrap().parameters,
            combo(&[("p", "one")])
        );
        assert!(main.metadata().rid.is_none());

        assert!(matches!(
            storages.accept_request("r1", "three"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_meta_is_yaml_with_ordered_parameters() {
        let tmp = TempDir::new().unwrap();
        let mut run = storages(&tmp).create_run("r1").unwrap();
        run.metadata_mut()
            .record("smoke", "/items", "abc", combo(&[("b", "2"), ("a", "1")]));
        run.commit().unwrap();

        let text = fs::read_to_string(run.root().join(META_FILE)).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(doc["rid"], "r1");
        let params = &doc["testsets"]["smoke"]["/items"]["abc"]["parameters"];
        assert_eq!(params[0][0], "b");
        assert_eq!(params[1][1], "1");
    }
}
