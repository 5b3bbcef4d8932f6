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

fn spawn_sidecar(require_auth: bool) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut cmd = Command::new(exe);
    cmd.env("ATTENDD_TOKEN_SECRET", "auth-token-tests")
        .env_remove("ATTENDD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if require_auth {
        cmd.env("ATTENDD_REQUIRE_AUTH", "true");
    } else {
        cmd.env_remove("ATTENDD_REQUIRE_AUTH");
    }
    let mut child = cmd.spawn().expect("spawn attendd");
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
    token: Option<&str>,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(token) = token {
        payload["token"] = json!(token);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
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
    token: Option<&str>,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, token);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn register_login_and_marks_carry_the_caller() {
    let workspace = temp_dir("attendd-auth-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(false);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let registered = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({ "fullName": "Ms Rivera", "email": " Rivera@School.Test ", "password": "hunter22" }),
        None,
    );
    assert_eq!(registered["user"]["email"], "rivera@school.test");
    assert!(registered["user"].get("passwordHash").is_none());
    let user_id = registered["user"]["id"].as_i64().expect("user id");

    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        json!({ "fullName": "Other", "email": "rivera@school.test", "password": "x" }),
        None,
    );
    assert_eq!(dup["error"]["code"], "conflict");
    assert_eq!(dup["error"]["message"], "Email already registered");

    let wrong = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "email": "rivera@school.test", "password": "hunter23" }),
        None,
    );
    assert_eq!(wrong["error"]["code"], "unauthorized");
    let nobody = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "email": "nobody@school.test", "password": "hunter22" }),
        None,
    );
    assert_eq!(nobody["error"]["message"], wrong["error"]["message"]);

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        json!({ "email": "RIVERA@school.test", "password": "hunter22" }),
        None,
    );
    let token = login["token"].as_str().expect("token").to_string();
    assert!(token.starts_with("v1."));

    let me = request_ok(&mut stdin, &mut reader, "7", "auth.me", json!({}), Some(&token));
    assert_eq!(me["user"]["id"].as_i64(), Some(user_id));
    let anonymous_me = request(&mut stdin, &mut reader, "8", "auth.me", json!({}), None);
    assert_eq!(anonymous_me["error"]["code"], "unauthorized");

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "classes.create",
        json!({ "name": "10A" }),
        Some(&token),
    );
    assert_eq!(class["createdBy"].as_i64(), Some(user_id));
    let class_id = class["id"].as_i64().expect("class id");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.create",
        json!({ "rollNo": "A1", "fullName": "Alice", "classId": class_id }),
        Some(&token),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": "2024-01-10",
            "records": [{ "studentId": student["id"], "present": true }]
        }),
        Some(&token),
    );
    assert_eq!(saved["records"][0]["markedBy"].as_i64(), Some(user_id));

    let forged = request(
        &mut stdin,
        &mut reader,
        "12",
        "classes.list",
        json!({}),
        Some("v1.eyJ1aWQiOjF9.AAAA"),
    );
    assert_eq!(forged["error"]["code"], "unauthorized");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn required_auth_gates_everything_but_the_public_methods() {
    let workspace = temp_dir("attendd-auth-required");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(true);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}), None);
    assert_eq!(health["requireAuth"], true);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let blocked = request(&mut stdin, &mut reader, "3", "classes.list", json!({}), None);
    assert_eq!(blocked["error"]["code"], "unauthorized");

    let registered = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.register",
        json!({ "fullName": "Mr Head", "email": "head@school.test", "password": "pw" }),
        None,
    );
    let token = registered["token"].as_str().expect("token").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}), Some(&token));
    assert_eq!(listed["classes"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
