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
    let exe = env!("CARGO_BIN_EXE_sklportald");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sklportald");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

#[test]
fn duplicate_subject_names_are_rejected() {
    let workspace = temp_dir("sklportal-subjects-dup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Matematika" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Matematika" }),
    );
    assert_eq!(error_code(&resp), "subject_exists");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn listing_orders_by_group_then_display_order_then_name() {
    let workspace = temp_dir("sklportal-subjects-order");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, params) in [
        json!({ "name": "Kimia", "groupLabel": "B", "displayOrder": 1 }),
        json!({ "name": "Fisika", "groupLabel": "A", "displayOrder": 2 }),
        json!({ "name": "Biologi", "groupLabel": "A", "displayOrder": 1 }),
        json!({ "name": "Seni Budaya" }),
        json!({ "name": "Prakarya", "groupLabel": "A" }),
    ]
    .into_iter()
    .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "subjects.create",
            params,
        );
    }

    let listed = request_ok(&mut stdin, &mut reader, "list", "subjects.list", json!({}));
    let names: Vec<String> = listed
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects array")
        .iter()
        .map(|s| s.get("name").and_then(|n| n.as_str()).unwrap_or("").to_string())
        .collect();
    // Grouped subjects first (A then B), ordered entries before unordered,
    // ungrouped subjects at the tail.
    assert_eq!(
        names,
        vec!["Biologi", "Fisika", "Prakarya", "Kimia", "Seni Budaya"]
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn category_must_be_a_known_value() {
    let workspace = temp_dir("sklportal-subjects-category");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
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
        "subjects.create",
        json!({ "name": "Fiqih", "category": "religious" }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Fiqih", "category": "local_content" }),
    );
    assert_eq!(
        created.get("category").and_then(|v| v.as_str()),
        Some("local_content")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subject_referenced_by_grades_cannot_be_deleted() {
    let workspace = temp_dir("sklportal-subjects-inuse");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Sejarah" }),
    );
    let subject_id = subject.get("id").and_then(|v| v.as_i64()).expect("subject id");
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "nisn": "0099990001", "fullName": "Rina", "className": "XII A" }),
    );
    let student_id = created
        .get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id");
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.batchUpsert",
        json!({
            "studentId": student_id,
            "grades": [{ "subjectId": subject_id, "value": 80.0 }],
        }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.delete",
        json!({ "subjectId": subject_id }),
    );
    assert_eq!(error_code(&resp), "subject_in_use");

    let _ = std::fs::remove_dir_all(workspace);
}
