//! Integration tests for the persistent session executor.
//!
//! A scripted fake `adb` stands in for the real bridge tool: interactive
//! `shell` invocations exec a local `/bin/sh`, so the marker framing runs
//! against a real pipe without any device attached.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use droidctl_adb::{BridgeConfig, SessionPool, ToolResolver};
use droidctl_core::{BridgeError, ErrorKind};

// ============================================================================
// Fake adb
// ============================================================================

/// Shell script standing in for adb. `version` and `devices` are answered
/// from canned data; `shell` execs a local /bin/sh so piped sessions and
/// one-shot commands behave like the real tool.
const STANDARD_BEHAVIOR: &str = r#"case "$1" in
  version)
    echo probe >> "$dir/probes.log"
    echo "Android Debug Bridge version 1.0.41"
    ;;
  devices)
    cat "$dir/devices.txt"
    ;;
  shell)
    shift
    if [ $# -eq 0 ]; then
      PATH="$dir:$PATH" exec /bin/sh
    else
      PATH="$dir:$PATH" exec /bin/sh -c "$*"
    fi
    ;;
  *)
    echo "fake adb: unsupported: $*" >&2
    exit 1
    ;;
esac
"#;

/// Variant whose interactive shell dies instantly; one-shot still works.
const BROKEN_SESSION_BEHAVIOR: &str = r#"case "$1" in
  version)
    echo "Android Debug Bridge version 1.0.41"
    ;;
  shell)
    shift
    if [ $# -eq 0 ]; then
      exit 1
    else
      exec /bin/sh -c "$*"
    fi
    ;;
esac
"#;

/// Variant where every shell invocation fails.
const DEAD_DEVICE_BEHAVIOR: &str = r#"case "$1" in
  version)
    echo "Android Debug Bridge version 1.0.41"
    ;;
  *)
    echo "device gone" >&2
    exit 1
    ;;
esac
"#;

struct FakeAdb {
    dir: TempDir,
}

impl FakeAdb {
    fn install(behavior: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = format!(
            "#!/bin/sh\ndir=\"{}\"\nif [ \"$1\" = \"-s\" ]; then\n  shift 2\nfi\n{behavior}",
            dir.path().display()
        );
        let path = dir.path().join("adb");
        fs::write(&path, script).expect("write fake adb");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake adb");
        FakeAdb { dir }
    }

    fn path(&self) -> PathBuf {
        self.dir.path().join("adb")
    }

    fn config(&self) -> BridgeConfig {
        BridgeConfig::with_command(self.path())
    }
}

fn make_pool(config: BridgeConfig) -> SessionPool {
    let tool = Arc::new(ToolResolver::with_command(
        config.adb_command.clone(),
        config.probe_timeout,
    ));
    SessionPool::new(tool, config)
}

// ============================================================================
// Session Reuse
// ============================================================================

#[tokio::test]
async fn test_sequential_commands_reuse_one_session() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let pool = make_pool(adb.config());

    let first = pool
        .execute("emulator-5554", "echo $$")
        .await
        .expect("first command");
    let second = pool
        .execute("emulator-5554", "echo $$")
        .await
        .expect("second command");

    // same shell PID on both runs means no second process was spawned
    assert!(!first.stdout.is_empty());
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(pool.session_count().await, 1);

    pool.cleanup().await;
}

#[tokio::test]
async fn test_devices_get_independent_sessions() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let pool = make_pool(adb.config());

    let a = pool
        .execute("device-a", "echo $$")
        .await
        .expect("device-a command");
    let b = pool
        .execute("device-b", "echo $$")
        .await
        .expect("device-b command");

    assert_ne!(a.stdout, b.stdout);
    assert_eq!(pool.session_count().await, 2);

    pool.cleanup().await;
}

// ============================================================================
// Marker Framing
// ============================================================================

#[tokio::test]
async fn test_output_between_markers_is_captured_in_order() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let pool = make_pool(adb.config());

    let result = pool
        .execute("emulator-5554", "printf 'one\\ntwo\\nthree\\n'")
        .await
        .expect("command runs");

    assert_eq!(result.stdout, "one\ntwo\nthree");
    assert_eq!(result.stderr, "");

    pool.cleanup().await;
}

#[tokio::test]
async fn test_marker_like_noise_does_not_break_framing() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let pool = make_pool(adb.config());

    // Output full of strings shaped like the framing markers, with other
    // numeric suffixes than the active pair. None may terminate capture.
    let mut expected = Vec::new();
    let mut printf = String::from("printf '");
    for i in 0..20u64 {
        let noise = format!("CMD_START_{i}_{i}");
        printf.push_str(&noise);
        printf.push_str("\\n");
        expected.push(noise);
        let noise = format!("CMD_END_{}_{i}", 1234567890 + i);
        printf.push_str(&noise);
        printf.push_str("\\n");
        expected.push(noise);
    }
    printf.push('\'');

    let result = pool
        .execute("emulator-5554", &printf)
        .await
        .expect("noisy command runs");

    assert_eq!(result.stdout, expected.join("\n"));

    pool.cleanup().await;
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_command_timeout_leaves_session_alive() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let mut config = adb.config();
    config.command_timeout = Duration::from_millis(300);
    let pool = make_pool(config);

    let before = pool
        .execute("emulator-5554", "echo $$")
        .await
        .expect("pre-timeout command");

    // Both paths hit the deadline, so the combined error surfaces with
    // the persistent-path timeout preserved inside it.
    let err = pool
        .execute("emulator-5554", "sleep 1")
        .await
        .expect_err("command must time out");
    assert_eq!(err.kind(), ErrorKind::FallbackFailed);
    match err {
        BridgeError::Fallback { persistent, .. } => {
            assert_eq!(persistent.kind(), ErrorKind::CommandTimeout);
        }
        other => panic!("expected Fallback error, got {other:?}"),
    }

    // The session survives the timeout; once the abandoned command has
    // drained, the same shell keeps serving.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after = pool
        .execute("emulator-5554", "echo $$")
        .await
        .expect("post-timeout command");
    assert_eq!(before.stdout, after.stdout);

    pool.cleanup().await;
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_broken_session_falls_back_to_oneshot() {
    let adb = FakeAdb::install(BROKEN_SESSION_BEHAVIOR);
    let pool = make_pool(adb.config());

    let result = pool
        .execute("emulator-5554", "echo fallback-ok")
        .await
        .expect("fallback succeeds");

    assert_eq!(result.stdout.trim(), "fallback-ok");
    // nothing pooled: the persistent session never came up
    assert_eq!(pool.session_count().await, 0);

    pool.cleanup().await;
}

#[tokio::test]
async fn test_both_paths_failing_keeps_both_causes() {
    let adb = FakeAdb::install(DEAD_DEVICE_BEHAVIOR);
    let pool = make_pool(adb.config());

    let err = pool
        .execute("emulator-5554", "echo hi")
        .await
        .expect_err("both paths must fail");

    assert_eq!(err.kind(), ErrorKind::FallbackFailed);
    match err {
        BridgeError::Fallback {
            persistent,
            fallback,
            ..
        } => {
            assert_eq!(persistent.kind(), ErrorKind::SessionCreationFailed);
            assert_eq!(fallback.kind(), ErrorKind::ShellCommandFailed);
        }
        other => panic!("expected Fallback error, got {other:?}"),
    }
}

// ============================================================================
// Cleanup
// ============================================================================

#[tokio::test]
async fn test_cleanup_clears_sessions_and_is_idempotent() {
    let adb = FakeAdb::install(STANDARD_BEHAVIOR);
    let pool = make_pool(adb.config());

    pool.execute("emulator-5554", "echo hi")
        .await
        .expect("command runs");
    assert_eq!(pool.session_count().await, 1);

    pool.cleanup().await;
    assert_eq!(pool.session_count().await, 0);
    pool.cleanup().await;
    assert_eq!(pool.session_count().await, 0);

    // a new session comes up on demand after cleanup
    pool.execute("emulator-5554", "echo hi")
        .await
        .expect("command runs after cleanup");
    assert_eq!(pool.session_count().await, 1);

    pool.cleanup().await;
}
