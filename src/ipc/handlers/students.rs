use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde_json::json;
use tracing::info;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{GraduationStatus, Student};
use crate::store;
use crate::token::{self, TokenAction};

const LIST_DEFAULT_LIMIT: i64 = 10;
const LIST_MAX_LIMIT: i64 = 200;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn bad(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

/// Copy one optional text field from the payload onto the record. Absent key
/// keeps the stored value, explicit null clears it.
fn patch_text(
    params: &serde_json::Value,
    key: &str,
    slot: &mut Option<String>,
) -> Result<(), HandlerErr> {
    match params.get(key) {
        None => Ok(()),
        Some(serde_json::Value::Null) => {
            *slot = None;
            Ok(())
        }
        Some(serde_json::Value::String(s)) => {
            *slot = Some(s.clone());
            Ok(())
        }
        Some(_) => Err(HandlerErr::bad(format!("{} must be a string or null", key))),
    }
}

fn patch_required_text(
    params: &serde_json::Value,
    key: &str,
    slot: &mut String,
) -> Result<(), HandlerErr> {
    match params.get(key) {
        None => Ok(()),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
            *slot = s.trim().to_string();
            Ok(())
        }
        Some(_) => Err(HandlerErr::bad(format!(
            "{} must be a non-empty string",
            key
        ))),
    }
}

fn validate_birth_date(raw: &str) -> Result<(), HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| HandlerErr::bad("birthDate must be formatted YYYY-MM-DD"))
}

fn parse_status_param(value: &serde_json::Value) -> Result<GraduationStatus, HandlerErr> {
    value
        .as_str()
        .and_then(GraduationStatus::parse)
        .ok_or_else(|| {
            HandlerErr::bad("status must be one of: pending, in_progress, passed, failed")
        })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let page = req
        .params
        .get("page")
        .and_then(|v| v.as_i64())
        .unwrap_or(1)
        .max(1);
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(LIST_DEFAULT_LIMIT)
        .clamp(1, LIST_MAX_LIMIT);

    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(search) = req.params.get("search").and_then(|v| v.as_str()) {
        if !search.trim().is_empty() {
            clauses.push(
                "(nisn LIKE ? OR full_name LIKE ? OR exam_participant_number LIKE ?)".to_string(),
            );
            let pat = format!("%{}%", search.trim());
            binds.push(Value::Text(pat.clone()));
            binds.push(Value::Text(pat.clone()));
            binds.push(Value::Text(pat));
        }
    }
    if let Some(raw) = req.params.get("status").and_then(|v| v.as_str()) {
        let Some(status) = GraduationStatus::parse(raw) else {
            return err(
                &req.id,
                "bad_params",
                "status must be one of: pending, in_progress, passed, failed",
                Some(json!({ "status": raw })),
            );
        };
        clauses.push("status = ?".to_string());
        binds.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(class_name) = req.params.get("className").and_then(|v| v.as_str()) {
        clauses.push("class_name LIKE ?".to_string());
        binds.push(Value::Text(format!("%{}%", class_name)));
    }
    if let Some(major) = req.params.get("major").and_then(|v| v.as_str()) {
        clauses.push("major LIKE ?".to_string());
        binds.push(Value::Text(format!("%{}%", major)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = match conn.query_row(
        &format!("SELECT COUNT(*) FROM students{}", where_sql),
        params_from_iter(binds.clone()),
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM students{} ORDER BY full_name LIMIT ? OFFSET ?",
        store::STUDENT_COLUMNS,
        where_sql
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    binds.push(Value::Integer(limit));
    binds.push(Value::Integer((page - 1) * limit));

    let rows = stmt
        .query_map(params_from_iter(binds), store::student_from_row)
        .and_then(|it| it.collect::<Result<Vec<Student>, _>>());
    match rows {
        Ok(students) => ok(
            &req.id,
            json!({
                "data": serde_json::to_value(&students).unwrap_or_else(|_| json!([])),
                "total": total,
                "page": page,
                "lastPage": (total + limit - 1) / limit,
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    match store::student_find_by_id(conn, id) {
        Ok(Some(student)) => ok(
            &req.id,
            serde_json::to_value(&student).unwrap_or_else(|_| json!({})),
        ),
        Ok(None) => err(
            &req.id,
            "not_found",
            "Siswa tidak ditemukan",
            Some(json!({ "studentId": id, "httpStatus": 404 })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let p = &req.params;

    let mut nisn = String::new();
    let mut full_name = String::new();
    let mut class_name = String::new();
    for (key, slot) in [
        ("nisn", &mut nisn),
        ("fullName", &mut full_name),
        ("className", &mut class_name),
    ] {
        match p.get(key).and_then(|v| v.as_str()).map(str::trim) {
            Some(s) if !s.is_empty() => *slot = s.to_string(),
            _ => return err(&req.id, "bad_params", format!("missing {}", key), None),
        }
    }

    let status = match p.get("status") {
        None => GraduationStatus::Pending,
        Some(v) => match parse_status_param(v) {
            Ok(s) => s,
            Err(e) => return e.response(&req.id),
        },
    };

    let mut birth_place = None;
    let mut birth_date = None;
    let mut guardian_name = None;
    let mut major = None;
    let mut admin_note = None;
    let mut certificate_note = None;
    let mut photo_path = None;
    let mut diploma_number = None;
    let mut exam_result_number = None;
    let mut exam_participant_number = None;
    for (key, slot) in [
        ("birthPlace", &mut birth_place),
        ("birthDate", &mut birth_date),
        ("guardianName", &mut guardian_name),
        ("major", &mut major),
        ("adminNote", &mut admin_note),
        ("certificateNote", &mut certificate_note),
        ("photoPath", &mut photo_path),
        ("diplomaNumber", &mut diploma_number),
        ("examResultNumber", &mut exam_result_number),
        ("examParticipantNumber", &mut exam_participant_number),
    ] {
        if let Err(e) = patch_text(p, key, slot) {
            return e.response(&req.id);
        }
    }
    if let Some(raw) = birth_date.as_deref() {
        if let Err(e) = validate_birth_date(raw) {
            return e.response(&req.id);
        }
    }

    // A record born directly in `passed` still goes through the state
    // machine, so the token invariant holds from the first write.
    let access_token = match token::transition(GraduationStatus::Pending, status, false) {
        TokenAction::Generate => Some(token::new_token()),
        TokenAction::Clear | TokenAction::Keep => None,
    };

    let now = store::now_rfc3339();
    let inserted = conn.execute(
        "INSERT INTO students(
            nisn, full_name, birth_place, birth_date, guardian_name, class_name, major,
            status, admin_note, certificate_note, photo_path, diploma_number,
            exam_result_number, exam_participant_number, access_token, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            nisn,
            full_name,
            birth_place,
            birth_date,
            guardian_name,
            class_name,
            major,
            status.as_str(),
            admin_note,
            certificate_note,
            photo_path,
            diploma_number,
            exam_result_number,
            exam_participant_number,
            access_token,
            now,
            now
        ],
    );
    if let Err(e) = inserted {
        if store::is_unique_violation(&e, "students.nisn") {
            return err(
                &req.id,
                "nisn_taken",
                "NISN sudah terdaftar.",
                Some(json!({ "nisn": nisn, "httpStatus": 400 })),
            );
        }
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let id = conn.last_insert_rowid();
    if access_token.is_some() {
        info!(student_id = id, "access token issued on create");
    }
    match store::student_find_by_id(conn, id) {
        Ok(Some(student)) => ok(
            &req.id,
            json!({
                "message": "Siswa berhasil dibuat",
                "student": serde_json::to_value(&student).unwrap_or_else(|_| json!({})),
            }),
        ),
        Ok(None) => err(&req.id, "db_query_failed", "inserted student vanished", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let p = &req.params;

    let id = match p.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let mut student = match store::student_find_by_id(conn, id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "Siswa tidak ditemukan",
                Some(json!({ "studentId": id, "httpStatus": 404 })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Token side effects run only when the payload names a status; partial
    // updates without one stay token-neutral.
    let mut token_action = TokenAction::Keep;
    if let Some(v) = p.get("status") {
        let new_status = match parse_status_param(v) {
            Ok(s) => s,
            Err(e) => return e.response(&req.id),
        };
        token_action =
            token::transition(student.status, new_status, student.access_token.is_some());
        student.status = new_status;
    }
    match token_action {
        TokenAction::Generate => {
            student.access_token = Some(token::new_token());
            info!(student_id = id, "access token issued");
        }
        TokenAction::Clear => {
            student.access_token = None;
            info!(student_id = id, "access token revoked");
        }
        TokenAction::Keep => {}
    }

    for (key, slot) in [("nisn", &mut student.nisn), ("fullName", &mut student.full_name)] {
        if let Err(e) = patch_required_text(p, key, slot) {
            return e.response(&req.id);
        }
    }
    if let Err(e) = patch_required_text(p, "className", &mut student.class_name) {
        return e.response(&req.id);
    }
    for (key, slot) in [
        ("birthPlace", &mut student.birth_place),
        ("birthDate", &mut student.birth_date),
        ("guardianName", &mut student.guardian_name),
        ("major", &mut student.major),
        ("adminNote", &mut student.admin_note),
        ("certificateNote", &mut student.certificate_note),
        ("photoPath", &mut student.photo_path),
        ("diplomaNumber", &mut student.diploma_number),
        ("examResultNumber", &mut student.exam_result_number),
        ("examParticipantNumber", &mut student.exam_participant_number),
    ] {
        if let Err(e) = patch_text(p, key, slot) {
            return e.response(&req.id);
        }
    }
    if p.get("birthDate").map(|v| v.is_string()).unwrap_or(false) {
        if let Some(raw) = student.birth_date.as_deref() {
            if let Err(e) = validate_birth_date(raw) {
                return e.response(&req.id);
            }
        }
    }

    let updated = conn.execute(
        "UPDATE students SET
            nisn = ?, full_name = ?, birth_place = ?, birth_date = ?, guardian_name = ?,
            class_name = ?, major = ?, status = ?, admin_note = ?, certificate_note = ?,
            photo_path = ?, diploma_number = ?, exam_result_number = ?,
            exam_participant_number = ?, access_token = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            student.nisn,
            student.full_name,
            student.birth_place,
            student.birth_date,
            student.guardian_name,
            student.class_name,
            student.major,
            student.status.as_str(),
            student.admin_note,
            student.certificate_note,
            student.photo_path,
            student.diploma_number,
            student.exam_result_number,
            student.exam_participant_number,
            student.access_token,
            store::now_rfc3339(),
            id
        ],
    );
    if let Err(e) = updated {
        if store::is_unique_violation(&e, "students.nisn") {
            return err(
                &req.id,
                "nisn_taken",
                "NISN sudah terdaftar untuk siswa lain.",
                Some(json!({ "nisn": student.nisn, "httpStatus": 400 })),
            );
        }
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match store::student_find_by_id(conn, id) {
        Ok(Some(student)) => ok(
            &req.id,
            json!({
                "message": "Siswa berhasil diperbarui",
                "student": serde_json::to_value(&student).unwrap_or_else(|_| json!({})),
            }),
        ),
        Ok(None) => err(&req.id, "db_query_failed", "updated student vanished", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    // Grades go with the student via the cascade on the FK.
    match conn.execute("DELETE FROM students WHERE id = ?", [id]) {
        Ok(0) => err(
            &req.id,
            "not_found",
            "Siswa tidak ditemukan",
            Some(json!({ "studentId": id, "httpStatus": 404 })),
        ),
        Ok(_) => ok(&req.id, json!({ "message": "Siswa berhasil dihapus" })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
