//! Common test utilities

#![allow(dead_code)]

use runfile::config::load_root;
use runfile::loader::{CacheFetcher, Loader};
use runfile::runner::{Event, GlobalContext, PackageGraph};
use runfile::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

/// Create a temporary directory with a run.yaml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("run.yaml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a package directory `name` under `root` holding one run.yaml
pub fn create_package(root: &Path, name: &str, content: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("run.yaml"), content).unwrap();
    dir
}

/// URI of a local package directory
pub fn file_uri(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

/// Name of the OS override file for this platform
pub fn os_file_name() -> String {
    format!("run_{}.yaml", std::env::consts::OS)
}

/// Load and compile the graph rooted at `config_path`
pub fn load_graph(config_path: &Path) -> PackageGraph {
    let root = load_root(config_path).unwrap();
    let fetcher = CacheFetcher::new(config_path.parent().unwrap());
    Loader::new(fetcher).load(root).unwrap()
}

/// Run `action` on a channel-backed context, collecting every event
pub fn run_collect(
    graph: &PackageGraph,
    action: &str,
    args: &[(&str, &str)],
) -> (Result<()>, Vec<Event>) {
    let args: BTreeMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let (ctx, events) = GlobalContext::channel();
    let collector = thread::spawn(move || events.into_iter().collect::<Vec<_>>());

    let result = graph.run(&ctx, action, &args);
    ctx.done();

    (result, collector.join().unwrap())
}

/// Concatenated output events
pub fn output_text(events: &[Event]) -> String {
    events
        .iter()
        .filter(|e| e.kind == runfile::runner::EventKind::Output)
        .map(|e| e.message.as_str())
        .collect()
}
