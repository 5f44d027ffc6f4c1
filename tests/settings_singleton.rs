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

#[test]
fn first_read_creates_the_default_row() {
    let workspace = temp_dir("sklportal-settings-default");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let settings = request_ok(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    assert_eq!(
        settings.get("schoolName").and_then(|v| v.as_str()),
        Some("Nama Sekolah Default")
    );
    assert_eq!(
        settings.get("accessActive").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert!(settings.get("releaseAt").map(|v| v.is_null()).unwrap_or(false));

    // A second read returns the same singleton, not another row.
    let again = request_ok(&mut stdin, &mut reader, "3", "settings.get", json!({}));
    assert_eq!(
        again.get("createdAt").and_then(|v| v.as_str()),
        settings.get("createdAt").and_then(|v| v.as_str())
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn partial_update_patches_and_null_clears() {
    let workspace = temp_dir("sklportal-settings-patch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.update",
        json!({
            "schoolName": "SMK Negeri 1 Contoh",
            "headmasterName": "Drs. Ahmad",
            "releaseAt": "2026-06-01T03:00:00+00:00",
            "accessActive": true,
        }),
    );
    let settings = result.get("settings").expect("settings payload");
    assert_eq!(
        settings.get("schoolName").and_then(|v| v.as_str()),
        Some("SMK Negeri 1 Contoh")
    );
    assert_eq!(
        settings.get("accessActive").and_then(|v| v.as_bool()),
        Some(true)
    );

    // Untouched keys keep their values; explicit null clears.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({ "releaseAt": null }),
    );
    let settings = result.get("settings").expect("settings payload");
    assert!(settings.get("releaseAt").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        settings.get("headmasterName").and_then(|v| v.as_str()),
        Some("Drs. Ahmad")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_release_timestamp_is_rejected() {
    let workspace = temp_dir("sklportal-settings-badrelease");
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
        "settings.update",
        json!({ "releaseAt": "01-06-2026" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str()),
        Some("bad_params")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn form_encoded_boolean_spelling_is_accepted() {
    let workspace = temp_dir("sklportal-settings-formbool");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.update",
        json!({ "accessActive": "true" }),
    );
    assert_eq!(
        result
            .get("settings")
            .and_then(|s| s.get("accessActive"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
