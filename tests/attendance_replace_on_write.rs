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
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .env("ATTENDD_TOKEN_SECRET", "replace-on-write-tests")
        .env_remove("ATTENDD_REQUIRE_AUTH")
        .env_remove("ATTENDD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn records(result: &serde_json::Value) -> Vec<serde_json::Value> {
    result
        .get("records")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

#[test]
fn second_save_for_same_day_replaces_the_first() {
    let workspace = temp_dir("attendd-replace-on-write");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let class = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "10A" }));
    let class_id = class["id"].as_i64().expect("class id");
    let alice = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "rollNo": "A1", "fullName": "Alice", "classId": class_id }),
    );
    let alice_id = alice["id"].as_i64().expect("student id");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": "2024-01-10",
            "records": [{ "studentId": alice_id, "present": true }]
        }),
    );
    let saved = records(&saved);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["studentName"], "Alice");
    assert_eq!(saved[0]["className"], "10A");
    assert_eq!(saved[0]["markedBy"], serde_json::Value::Null);

    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-01-10" }),
    ));
    assert_eq!(read.len(), 1);
    assert_eq!(read[0]["present"], true);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": "2024-01-10",
            "records": [{ "studentId": alice_id, "present": false }]
        }),
    );
    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-01-10" }),
    ));
    assert_eq!(read.len(), 1, "old mark must be gone, not kept alongside");
    assert_eq!(read[0]["present"], false);
    assert_eq!(read[0]["studentId"].as_i64(), Some(alice_id));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn batch_reads_back_exactly_and_empty_batch_clears_the_day() {
    let workspace = temp_dir("attendd-batch-readback");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "9B" }))["id"]
        .as_i64()
        .expect("class id");

    let mut submitted = Vec::new();
    for i in 0..4 {
        let sid = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{i}"),
            "students.create",
            json!({ "rollNo": format!("R{i}"), "fullName": format!("Student {i}"), "classId": class_id }),
        )["id"]
            .as_i64()
            .expect("student id");
        submitted.push(json!({ "studentId": sid, "present": i % 2 == 0 }));
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-03-01", "records": submitted }),
    );
    // A different day for the same class is untouched by later writes.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save-other-day",
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-03-02", "records": [submitted[0].clone()] }),
    );

    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-03-01" }),
    ));
    assert_eq!(read.len(), submitted.len());
    for (got, want) in read.iter().zip(submitted.iter()) {
        assert_eq!(got["studentId"], want["studentId"]);
        assert_eq!(got["present"], want["present"]);
        assert_eq!(got["date"], "2024-03-01");
    }
    let ids: Vec<i64> = read.iter().map(|r| r["id"].as_i64().expect("id")).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "records come back in id order");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "clear-by-empty",
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-03-01", "records": [] }),
    );
    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "get2",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-03-01" }),
    ));
    assert!(read.is_empty());

    let other = records(&request_ok(
        &mut stdin,
        &mut reader,
        "get3",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-03-02" }),
    ));
    assert_eq!(other.len(), 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn failed_batch_keeps_previous_marks() {
    let workspace = temp_dir("attendd-failed-batch");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "8C" }))["id"]
        .as_i64()
        .expect("class id");
    let sid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "rollNo": "C1", "fullName": "Cara", "classId": class_id }),
    )["id"]
        .as_i64()
        .expect("student id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-05-05", "records": [{ "studentId": sid, "present": true }] }),
    );

    let unknown_student = request(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": "2024-05-05",
            "records": [{ "studentId": sid, "present": false }, { "studentId": 9999, "present": true }]
        }),
    );
    assert_eq!(error_code(&unknown_student), "not_found");

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": "2024-05-05",
            "records": [{ "studentId": sid, "present": false }, { "studentId": sid, "present": true }]
        }),
    );
    assert_eq!(error_code(&duplicate), "bad_params");
    assert_eq!(duplicate["error"]["details"]["duplicateStudentIds"], json!([sid]));

    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-05-05" }),
    ));
    assert_eq!(read.len(), 1);
    assert_eq!(read[0]["present"], true);

    let unknown_class = request(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.save",
        json!({ "classId": 4242, "date": "2024-05-05", "records": [] }),
    );
    assert_eq!(error_code(&unknown_class), "not_found");

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.get",
        json!({ "classId": class_id, "date": "05/05/2024" }),
    );
    assert_eq!(error_code(&bad_date), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn clear_is_a_noop_when_nothing_is_marked() {
    let workspace = temp_dir("attendd-clear-noop");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "7D" }))["id"]
        .as_i64()
        .expect("class id");
    let sid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "rollNo": "D1", "fullName": "Dev", "classId": class_id }),
    )["id"]
        .as_i64()
        .expect("student id");

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.clear",
        json!({ "classId": class_id, "date": "2024-06-01" }),
    );
    assert_eq!(cleared["deleted"], 0);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.save",
        json!({ "classId": class_id, "date": "2024-06-01", "records": [{ "studentId": sid, "present": true }] }),
    );
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.clear",
        json!({ "classId": class_id, "date": "2024-06-01" }),
    );
    assert_eq!(cleared["deleted"], 1);
    let read = records(&request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.get",
        json!({ "classId": class_id, "date": "2024-06-01" }),
    ));
    assert!(read.is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
