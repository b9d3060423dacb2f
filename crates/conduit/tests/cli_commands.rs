#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Output, Stdio};

use serde_json::Value;

const EXAMPLE_FRAME: &str = "0105726f757465000470696e6700020102";

fn conduit(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_conduit"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("CONDUIT_KEY")
        .output()
        .expect("conduit should run")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

/// Kills the server when the test ends, pass or fail.
struct Server {
    child: Child,
    origin: String,
}

impl Server {
    fn start(origin: &str, key: &str) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_conduit"))
            .args(["--log-level", "error", "--format", "json", "serve", origin, "--key", key])
            .env_remove("CONDUIT_KEY")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");

        let stdout = child.stdout.take().expect("stdout is piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("serve should announce its origin");
        let announced: Value = serde_json::from_str(&line).expect("announcement is JSON");
        let origin = announced["listening"]
            .as_str()
            .expect("announcement has origin")
            .to_string();

        Self { child, origin }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn encode_matches_example_vector() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("payload.bin");
    std::fs::write(&payload, [0x01, 0x02]).unwrap();

    let output = conduit(&[
        "--format",
        "json",
        "encode",
        "-o",
        "route=ping",
        "--file",
        payload.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let out = stdout_json(&output);
    assert_eq!(out["frame"], EXAMPLE_FRAME);
    assert_eq!(out["size"], 17);
}

#[test]
fn encode_empty_frame() {
    let output = conduit(&["--format", "json", "encode"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["frame"], "000000");
}

#[test]
fn decode_example_vector() {
    let output = conduit(&["--format", "json", "decode", EXAMPLE_FRAME]);
    assert!(output.status.success());
    let out = stdout_json(&output);
    assert_eq!(out["options"], serde_json::json!([["route", "ping"]]));
    assert_eq!(out["payload_size"], 2);
}

#[test]
fn decode_truncated_frame_is_invalid_data() {
    let truncated = &EXAMPLE_FRAME[..EXAMPLE_FRAME.len() - 2];
    let output = conduit(&["decode", truncated]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decode failed"));
}

#[test]
fn encode_oversized_key_is_invalid_data() {
    let option = format!("{}=v", "k".repeat(256));
    let output = conduit(&["encode", "-o", &option]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn bad_option_syntax_is_usage_error() {
    let output = conduit(&["encode", "-o", "novalue"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = conduit(&["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn request_against_tcp_server() {
    let server = Server::start("tcp://127.0.0.1:0", "s3cret");

    let output = conduit(&[
        "--format", "json", "request", &server.origin, "ping", "--key", "s3cret",
    ]);
    assert!(output.status.success(), "{output:?}");
    let out = stdout_json(&output);
    assert_eq!(out["route"], "ping");
    assert_eq!(out["result"], serde_json::json!({"pong": true}));

    let output = conduit(&[
        "--format", "json", "request", &server.origin, "echo", "-o", "lang=en", "--data",
        "hello", "--key", "s3cret",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout_json(&output)["result"],
        serde_json::json!({"options": {"lang": "en"}, "payload": "hello"})
    );
}

#[test]
fn unknown_route_fails_with_remote_error() {
    let server = Server::start("tcp://127.0.0.1:0", "k");

    let output = conduit(&["request", &server.origin, "nope", "--key", "k"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown route 'nope'"));
}

#[test]
fn wrong_key_is_a_transport_error() {
    let server = Server::start("tcp://127.0.0.1:0", "right");

    let output = conduit(&["request", &server.origin, "ping", "--key", "wrong"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn nothing_listening_is_a_transport_error() {
    let origin = {
        let server = Server::start("tcp://127.0.0.1:0", "k");
        server.origin.clone()
    };

    let output = conduit(&["request", &origin, "ping", "--key", "k", "--timeout", "2s"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn reserved_option_is_usage_error() {
    let server = Server::start("tcp://127.0.0.1:0", "k");

    let output = conduit(&["request", &server.origin, "ping", "-o", "token=x", "--key", "k"]);
    assert_eq!(output.status.code(), Some(64));
}

#[cfg(unix)]
#[test]
fn request_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let origin = format!("unix://{}", dir.path().join("conduit.sock").display());
    let server = Server::start(&origin, "k");
    assert_eq!(server.origin, origin);

    let output = conduit(&["--format", "raw", "request", &server.origin, "time", "--key", "k"]);
    assert!(output.status.success(), "{output:?}");
    let out: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(out["unix"].as_u64().is_some());
}
