/*!
Test helpers shared by the cobbler crates
*/

use cobbler_common::ServiceEntry;
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Announcement from agent host `name` at `ip:port`, TXT `id=<name>`.
pub fn entry(name: &str, ip: &str, port: u16) -> ServiceEntry {
    let ip: IpAddr = ip.parse().unwrap_or_else(|e| panic!("bad test address {ip}: {e}"));
    ServiceEntry::new(
        cobbler_common::instance_name(name),
        format!("{name}.local."),
        [ip],
        port,
        Some(name.to_string()),
    )
}

/// Write `yaml` to a node-list file inside a fresh temporary directory.
///
/// Keep the returned [`TempDir`] alive for as long as the file is used.
pub fn node_list_file(yaml: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let path = dir.path().join(".cobbler.yaml");
    let mut file = std::fs::File::create(&path).unwrap_or_else(|e| panic!("create {path:?}: {e}"));
    file.write_all(yaml.as_bytes())
        .unwrap_or_else(|e| panic!("write {path:?}: {e}"));
    (dir, path)
}
