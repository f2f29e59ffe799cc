//! Unit and behavioural tests for the CLI runtime.


use std::ffi::OsString;
use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use rstest::rstest;
use serde_json::json;
use toto_config::Endpoint;
use toto_worker::{PullEndpoint, PushEndpoint, QueueConnection, Received, TaskQueue};

use super::*;

pub(super) struct Captured {
    pub(super) code: ExitCode,
    pub(super) stdout: String,
    pub(super) stderr: String,
}

pub(super) fn invoke(args: &[&str]) -> Captured {
    let argv = std::iter::once("toto")
        .chain(args.iter().copied())
        .map(OsString::from);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(argv, &mut stdout, &mut stderr);
    Captured {
        code,
        stdout: String::from_utf8(stdout).expect("utf8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf8 stderr"),
    }
}

#[rstest]
fn parameters_default_to_null() {
    let submit = SubmitArgs {
        method: "account.create".to_owned(),
        parameters: None,
        address: cli::DEFAULT_SUBMIT_ADDRESS.to_owned(),
    };
    let (endpoint, parameters) = prepare(&submit).expect("valid request");
    assert_eq!(endpoint, Endpoint::tcp("127.0.0.1", 55555));
    assert_eq!(parameters, serde_json::Value::Null);
}

#[rstest]
#[case::bad_json(&["submit", "account.create", "{name:"], "not valid JSON")]
#[case::bad_address(&["submit", "account.create", "--address", "pigeon://loft"], "invalid endpoint")]
#[case::blank_method(&["submit", " "], "must not be empty")]
#[case::missing_method(&["submit"], "METHOD")]
fn rejects_invalid_requests_before_connecting(#[case] args: &[&str], #[case] message: &str) {
    let captured = invoke(args);
    assert_eq!(captured.code, ExitCode::FAILURE);
    assert!(
        captured.stderr.contains(message),
        "stderr was {:?}",
        captured.stderr
    );
}

#[rstest]
fn submits_an_encoded_envelope() {
    let dir = tempfile::tempdir().expect("temp dir");
    let endpoint = Endpoint::unix(dir.path().join("in.sock").to_str().expect("utf8 path"));
    let queue = TaskQueue::new();
    let inbound = PullEndpoint::bind(&endpoint, queue.clone()).expect("bind inbound");
    let address = endpoint.to_string();

    let captured = invoke(&[
        "submit",
        "account.create",
        r#"{"name": "ada"}"#,
        "--address",
        &address,
    ]);
    assert_eq!(captured.code, ExitCode::SUCCESS, "stderr: {}", captured.stderr);
    assert!(captured.stdout.contains(&address));

    let frame = queue
        .pop_timeout(Duration::from_secs(2))
        .expect("frame accepted");
    let envelope = toto_envelope::decode(&frame).expect("decodable envelope");
    assert_eq!(envelope.method(), "account.create");
    assert_eq!(envelope.parameters(), &json!({"name": "ada"}));
    inbound.shutdown().expect("shutdown");
}

#[rstest]
fn submits_straight_to_a_queue_endpoint_without_a_broker() {
    let dir = tempfile::tempdir().expect("temp dir");
    let endpoint = Endpoint::unix(dir.path().join("queue.sock").to_str().expect("utf8 path"));
    let queue = PushEndpoint::bind(&endpoint, TaskQueue::new()).expect("bind queue");
    let address = endpoint.to_string();

    let captured = invoke(&["submit", "report.build", "[42]", "--address", &address]);
    assert_eq!(captured.code, ExitCode::SUCCESS, "stderr: {}", captured.stderr);

    let mut worker =
        QueueConnection::connect(&endpoint, Duration::from_millis(50)).expect("worker");
    let deadline = Instant::now() + Duration::from_secs(2);
    let frame = loop {
        if let Received::Task(frame) = worker.receive().expect("receive") {
            break frame;
        }
        assert!(Instant::now() < deadline, "task never reached the worker");
    };
    let envelope = toto_envelope::decode(&frame).expect("decodable envelope");
    assert_eq!(envelope.method(), "report.build");
    assert_eq!(envelope.parameters(), &json!([42]));
    queue.shutdown().expect("shutdown");
}

struct ClosedPipe;

impl io::Write for ClosedPipe {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[rstest]
fn unwritable_output_fails_the_command() {
    let argv = ["toto", "--help"].into_iter().map(OsString::from);
    let mut stderr = Vec::new();
    let code = run(argv, &mut ClosedPipe, &mut stderr);
    assert_eq!(code, ExitCode::FAILURE);
    let stderr = String::from_utf8(stderr).expect("utf8 stderr");
    assert!(stderr.contains("failed to write output"), "stderr was {stderr:?}");
}

#[rstest]
fn unwritable_error_output_still_fails() {
    let argv = ["toto", "submit", " "].into_iter().map(OsString::from);
    let code = run(argv, &mut Vec::new(), &mut ClosedPipe);
    assert_eq!(code, ExitCode::FAILURE);
}
