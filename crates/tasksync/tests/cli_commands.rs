#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

const PIN_AUTH_PREFIX: &str = "62011a000101626f62";

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/tasksync-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn tasksync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tasksync"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("tasksync should run")
}

fn dma_request_line() -> String {
    format!("> 72 00 0800 00000020 00100000 {}", "00".repeat(56))
}

#[test]
fn magics_json_lists_the_registry() {
    let output = tasksync(&["--format", "json", "magics"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"magic\":\"DMA_BUF_READY_CMD\""));
    assert!(stdout.contains("\"value\":\"0x72\""));
}

#[test]
fn encode_then_decode_pin_request() {
    let output = tasksync(&[
        "--format",
        "pretty",
        "encode",
        "--magic",
        "CRYPTO_PIN_CMD",
        "--state",
        "ASK_FOR_DATA",
        "--pin-type",
        "user-pin",
        "--pin-req",
        "authenticate",
        "--pin-name",
        "bob",
    ]);
    assert!(output.status.success());
    let hex = String::from_utf8_lossy(&output.stdout).trim().to_string();
    assert!(hex.starts_with(PIN_AUTH_PREFIX), "unexpected frame: {hex}");
    assert_eq!(hex.len(), 68 * 2);

    let output = tasksync(&["--format", "json", "decode", &hex]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"magic\":\"CRYPTO_PIN_CMD\""));
    assert!(!stdout.contains("bob"), "PIN names must not be printed");
}

#[test]
fn decode_truncated_frame_exits_60() {
    let output = tasksync(&["decode", "62011a00ff"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"));
}

#[test]
fn decode_reads_binary_file() {
    let dir = unique_temp_dir("decode");
    let path = dir.join("frames.bin");
    std::fs::write(&path, [0xb0, 0x00, 0x86, 0x00]).expect("frame file should be writable");

    let output = tasksync(&[
        "--format",
        "json",
        "decode",
        "--all",
        "--file",
        path.to_str().expect("utf-8 path"),
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("REBOOT_REQUEST"));
    assert!(stdout.contains("STORAGE_EJECTED"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn replay_exit_code_reflects_rejections() {
    let dir = unique_temp_dir("replay");

    let good = dir.join("good.trace");
    std::fs::write(&good, format!("{}\n< 73 04\n", dma_request_line()))
        .expect("trace should be writable");
    let output = tasksync(&["--format", "json", "replay", good.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"rejected\":0"));

    let bad = dir.join("bad.trace");
    std::fs::write(
        &bad,
        format!("{line}\n{line}\n", line = dma_request_line()),
    )
    .expect("trace should be writable");
    let output = tasksync(&["--format", "json", "replay", bad.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"rejected\":1"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_magic_is_a_usage_error() {
    let output = tasksync(&["encode", "--magic", "NOT_A_MAGIC"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = tasksync(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("tasksync {}", env!("CARGO_PKG_VERSION")));
}
