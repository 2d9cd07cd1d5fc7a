//! wrangler transport tests against a stand-in shell script
#![cfg(unix)]

use kvseed_ingest::transport::{
    BackoffPolicy, Existence, Transport, WranglerTransport, WriteOutcome,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Stand-in `wrangler` that logs `<verb> <key>` per call. `get` succeeds
/// only when a `present` marker file exists; `put` stores stdin in
/// `payload` and fails while a `fail_put` marker file exists.
const FAKE_WRANGLER: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$2 $3 $4 $5 $6" >> "$dir/calls.log"
case "$2" in
  get)
    [ -f "$dir/present" ] && exit 0
    echo "key not found" >&2
    exit 1
    ;;
  put)
    cat > "$dir/payload"
    if [ -f "$dir/fail_put" ]; then
      echo "quota exceeded" >&2
      exit 1
    fi
    exit 0
    ;;
esac
exit 2
"#;

fn install(dir: &Path) -> PathBuf {
    let script = dir.join("wrangler");
    std::fs::write(&script, FAKE_WRANGLER).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn transport(script: &Path, attempts: u32) -> WranglerTransport {
    let policy = BackoffPolicy::new(attempts).with_base_delay(Duration::from_millis(5));
    WranglerTransport::new(script, "ns-1", policy)
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .collect()
}

#[tokio::test]
async fn test_put_streams_payload_on_stdin() {
    let dir = TempDir::new().unwrap();
    let script = install(dir.path());

    let outcome = transport(&script, 3)
        .write("census_mesh_2020:01101", br#"{"key_code":"01101"}"#)
        .await;

    assert_eq!(outcome, WriteOutcome::Success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("payload")).unwrap(),
        r#"{"key_code":"01101"}"#
    );
    assert_eq!(
        calls(dir.path()),
        vec!["put census_mesh_2020:01101 - --namespace-id ns-1"]
    );
}

#[tokio::test]
async fn test_get_exit_status_maps_to_existence() {
    let dir = TempDir::new().unwrap();
    let script = install(dir.path());
    let transport = transport(&script, 3);

    assert_eq!(transport.exists("k").await, Existence::Absent);
    std::fs::write(dir.path().join("present"), "").unwrap();
    assert_eq!(transport.exists("k").await, Existence::Exists);
    assert_eq!(calls(dir.path())[0], "get k --namespace-id ns-1");
}

#[tokio::test]
async fn test_failed_put_is_retried_with_stderr_in_reason() {
    let dir = TempDir::new().unwrap();
    let script = install(dir.path());
    std::fs::write(dir.path().join("fail_put"), "").unwrap();

    match transport(&script, 2).write("k", b"{}").await {
        WriteOutcome::Failure(reason) => {
            assert!(reason.contains("quota exceeded"), "{reason}");
            assert!(reason.contains("2 attempts"), "{reason}");
        },
        WriteOutcome::Success => panic!("write must fail"),
    }
    assert!(!calls(dir.path()).is_empty());
}

#[test]
fn test_locate_accepts_explicit_path() {
    let dir = TempDir::new().unwrap();
    let script = install(dir.path());
    let located = WranglerTransport::locate(script.to_str().unwrap()).unwrap();
    assert!(located.ends_with("wrangler"));
}
