use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_enrolld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn enrolld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

#[test]
fn drafts_roundtrip_per_flow() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "enrollment.draft.save",
        json!({
            "flow": "new",
            "state": { "step": 3, "studentInfo": { "lastName": "Dela Cruz" } }
        }),
    );
    assert_eq!(saved["saved"], true);

    // Flows are independent.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "enrollment.draft.save",
        json!({ "flow": "existing", "state": { "step": 1 } }),
    );

    let new_draft = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "enrollment.draft.get",
        json!({ "flow": "new" }),
    );
    assert_eq!(new_draft["state"]["step"], 3);
    assert_eq!(new_draft["state"]["studentInfo"]["lastName"], "Dela Cruz");

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "enrollment.draft.clear",
        json!({ "flow": "new" }),
    );
    assert_eq!(cleared["cleared"], true);

    let after_clear = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "enrollment.draft.get",
        json!({ "flow": "new" }),
    );
    assert!(after_clear["state"].is_null());

    let existing = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "enrollment.draft.get",
        json!({ "flow": "existing" }),
    );
    assert_eq!(existing["state"]["step"], 1);

    // Clearing an already-clear flow is a no-op, not an error.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "enrollment.draft.clear",
        json!({ "flow": "new" }),
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn draft_flow_names_are_validated() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let bad_flow = request(
        &mut stdin,
        &mut reader,
        "1",
        "enrollment.draft.save",
        json!({ "flow": "renewal", "state": {} }),
    );
    assert_eq!(bad_flow["ok"], false);
    assert_eq!(bad_flow["error"]["code"], "bad_params");

    let bad_state = request(
        &mut stdin,
        &mut reader,
        "2",
        "enrollment.draft.save",
        json!({ "flow": "new", "state": "not-an-object" }),
    );
    assert_eq!(bad_state["error"]["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn session_set_and_clear_are_reflected_by_health() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["session"].is_null());

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.set",
        json!({ "userId": "user-9", "email": "parent@example.com" }),
    );
    assert_eq!(set["userId"], "user-9");

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["session"]["userId"], "user-9");
    assert_eq!(health["session"]["email"], "parent@example.com");

    let _ = request_ok(&mut stdin, &mut reader, "4", "session.clear", json!({}));
    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health["session"].is_null());

    let missing_email = request(
        &mut stdin,
        &mut reader,
        "6",
        "session.set",
        json!({ "userId": "user-9" }),
    );
    assert_eq!(missing_email["error"]["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn owner_reads_require_a_session() {
    let workspace = temp_dir("enroll-session-gate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "applications.list",
        json!({ "academicYear": "2026" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "no_session");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
