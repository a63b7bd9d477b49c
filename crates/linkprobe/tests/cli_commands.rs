#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/linkprobe-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn linkprobe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_linkprobe"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("linkprobe should run")
}

fn spawn_sim(path: &Path, extra: &[&str]) -> Child {
    let child = Command::new(env!("CARGO_BIN_EXE_linkprobe"))
        .args(["--log-level", "error", "--format", "json", "sim"])
        .arg(path)
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("sim command should start");
    wait_for_socket(path, Duration::from_secs(3));
    child
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket {} did not appear", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn version_prints_package_version() {
    let output = linkprobe(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("linkprobe {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn loopback_passes_and_writes_report() {
    let dir = unique_temp_dir("loopback");
    let report_path = dir.join("reports").join("e2e.json");

    let output = linkprobe(&[
        "--format",
        "json",
        "loopback",
        "--duration",
        "600ms",
        "--out",
        report_path.to_str().expect("utf-8 path"),
    ]);

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let report = json_stdout(&output);
    assert_eq!(report["ok"], true);
    assert_eq!(report["stream_channels_last"], 4);
    assert_eq!(report["steps"].as_array().map(Vec::len), Some(10));

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&report_path).expect("report file should exist"),
    )
    .expect("report file should be json");
    assert_eq!(saved["ok"], true);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn loopback_failure_exits_with_scenario_code() {
    let output = linkprobe(&[
        "--format",
        "json",
        "loopback",
        "--duration",
        "200ms",
        "--min-stream-frames",
        "100000",
    ]);

    assert_eq!(output.status.code(), Some(2));
    let report = json_stdout(&output);
    assert_eq!(report["ok"], false);
    let failed: Vec<&str> = report["steps"]
        .as_array()
        .expect("steps array")
        .iter()
        .filter(|s| s["ok"] == false)
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(failed, ["STREAM_DATA"]);
}

#[test]
fn test_command_against_sim_process() {
    let dir = unique_temp_dir("sim-test");
    let sock_path = dir.join("device.sock");
    let mut sim = spawn_sim(&sock_path, &["--once", "--var-table-format", "binary"]);

    let output = linkprobe(&[
        "--format",
        "json",
        "test",
        sock_path.to_str().expect("utf-8 path"),
        "--duration",
        "600ms",
    ]);

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let report = json_stdout(&output);
    assert_eq!(report["ok"], true);
    assert_eq!(report["steps"][2]["format"], "binary");

    let status = wait_for_exit(&mut sim, Duration::from_secs(5));
    assert!(status.success());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ping_reports_legacy_acks() {
    let dir = unique_temp_dir("ping");
    let sock_path = dir.join("device.sock");
    let mut sim = spawn_sim(&sock_path, &["--once", "--legacy-acks"]);

    let output = linkprobe(&[
        "--format",
        "json",
        "ping",
        sock_path.to_str().expect("utf-8 path"),
        "-n",
        "2",
    ]);

    assert!(output.status.success(), "{output:?}");
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["ack"], "legacy");
    assert_eq!(lines[1]["seq"], 2);

    wait_for_exit(&mut sim, Duration::from_secs(5));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_without_device_is_transport_error() {
    let dir = unique_temp_dir("no-device");
    let sock_path = dir.join("missing.sock");

    let output = linkprobe(&["test", sock_path.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "{stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_duration_is_usage_error() {
    let output = linkprobe(&["loopback", "--duration", "soon"]);
    assert_eq!(output.status.code(), Some(64));
}
