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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

/// Every handler family answers to its methods; only a truly unknown method
/// falls through to not_implemented.
#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("sklportal-router-smoke");
    let bundle_out = workspace.join("smoke-backup.sklbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "settings.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "settings.update",
        json!({ "schoolName": "SMK Smoke" }),
    );
    let created_subject = request(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.create",
        json!({ "name": "Smoke Subject" }),
    );
    let subject_id = created_subject
        .get("result")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("subject id");
    let _ = request(&mut stdin, &mut reader, "6", "subjects.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.update",
        json!({ "subjectId": subject_id, "groupLabel": "Kelompok A" }),
    );

    let created_student = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.create",
        json!({ "nisn": "0012340001", "fullName": "Smoke Student", "className": "XII A" }),
    );
    let student_id = created_student
        .get("result")
        .and_then(|v| v.get("student"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id");
    let _ = request(&mut stdin, &mut reader, "9", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({ "studentId": student_id, "major": "Multimedia" }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "grades.batchUpsert",
        json!({
            "studentId": student_id,
            "grades": [{ "subjectId": subject_id, "value": 77.0 }],
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "grades.listForStudent",
        json!({ "studentId": student_id }),
    );

    // Gate is closed on a fresh workspace, so this denies rather than
    // rendering, which is all the smoke test needs.
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "certificate.downloadByToken",
        json!({ "token": "smoke" }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "backup.export",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "backup.import",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "subjects.delete",
        json!({ "subjectId": subject_id }),
    );

    // Only a genuinely unknown method falls through.
    let payload = json!({ "id": "19", "method": "certificates.downloadAll", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let resp: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
