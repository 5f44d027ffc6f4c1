use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;

const BATCH_MAX_ITEMS: usize = 500;

fn handle_grades_list_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    if let Err(resp) = require_student(conn, req, student_id) {
        return resp;
    }

    let mut rows = match store::grades_for_student(conn, student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Admin grade screens list by subject order, then name; rows that lost
    // their subject sink to the end instead of disappearing.
    rows.sort_by(|a, b| {
        let key = |r: &crate::model::GradeRow| {
            (
                r.subject.is_none(),
                r.subject
                    .as_ref()
                    .map(|s| s.display_order.is_none())
                    .unwrap_or(true),
                r.subject.as_ref().and_then(|s| s.display_order).unwrap_or(0),
                r.subject.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
            )
        };
        key(a).cmp(&key(b))
    });

    ok(
        &req.id,
        json!({ "grades": serde_json::to_value(&rows).unwrap_or_else(|_| json!([])) }),
    )
}

/// Batch upsert with the explicit request shape
/// `{studentId, grades: [{subjectId, value|null}]}`. Items fail one by one;
/// the batch never aborts halfway, and writing an unchanged value reports as
/// a processed no-op.
fn handle_grades_batch_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let Some(items) = req.params.get("grades").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing grades[]", None);
    };
    if items.len() > BATCH_MAX_ITEMS {
        return err(
            &req.id,
            "bad_params",
            format!(
                "batch exceeds max items: {} > {}",
                items.len(),
                BATCH_MAX_ITEMS
            ),
            None,
        );
    }
    if let Err(resp) = require_student(conn, req, student_id) {
        return resp;
    }

    let mut results: Vec<serde_json::Value> = Vec::new();
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("item at index {} must be an object", i),
            }));
            continue;
        };

        let subject_id = match obj.get("subjectId").and_then(|v| v.as_i64()) {
            Some(v) => v,
            None => {
                errors.push(json!({
                    "index": i,
                    "code": "bad_params",
                    "message": format!("item at index {} missing subjectId", i),
                }));
                continue;
            }
        };

        let value = match obj.get("value") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_f64() {
                Some(n) => Some(n),
                None => {
                    errors.push(json!({
                        "index": i,
                        "subjectId": subject_id,
                        "code": "bad_params",
                        "message": format!("value {} is not a number", v),
                    }));
                    continue;
                }
            },
        };
        if let Some(n) = value {
            if !(0.0..=100.0).contains(&n) {
                errors.push(json!({
                    "index": i,
                    "subjectId": subject_id,
                    "code": "bad_params",
                    "message": format!("Nilai {} harus antara 0 dan 100.", n),
                }));
                continue;
            }
        }

        let subject = match store::subject_find_by_id(conn, subject_id) {
            Ok(v) => v,
            Err(e) => {
                errors.push(json!({
                    "index": i,
                    "subjectId": subject_id,
                    "code": "db_query_failed",
                    "message": e.to_string(),
                }));
                continue;
            }
        };
        if subject.is_none() {
            errors.push(json!({
                "index": i,
                "subjectId": subject_id,
                "code": "not_found",
                "message": format!("Mata pelajaran dengan ID {} tidak ditemukan.", subject_id),
            }));
            continue;
        }

        let existing = match store::grade_find_by_student_and_subject(conn, student_id, subject_id)
        {
            Ok(v) => v,
            Err(e) => {
                errors.push(json!({
                    "index": i,
                    "subjectId": subject_id,
                    "code": "db_query_failed",
                    "message": e.to_string(),
                }));
                continue;
            }
        };

        // Same value: processed, idempotent, no write.
        if let Some((grade_id, current)) = existing {
            if current == value {
                results.push(json!({
                    "subjectId": subject_id,
                    "gradeId": grade_id,
                    "value": value,
                    "outcome": "unchanged",
                }));
                continue;
            }
        }

        match store::grade_upsert(conn, student_id, subject_id, value) {
            Ok(grade_id) => results.push(json!({
                "subjectId": subject_id,
                "gradeId": grade_id,
                "value": value,
                "outcome": if existing.is_some() { "updated" } else { "created" },
            })),
            Err(e) => errors.push(json!({
                "index": i,
                "subjectId": subject_id,
                "code": "db_insert_failed",
                "message": e.to_string(),
            })),
        }
    }

    ok(
        &req.id,
        json!({
            "message": "Nilai siswa berhasil disimpan/diperbarui",
            "results": results,
            "errors": errors,
        }),
    )
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grade_id = match req.params.get("gradeId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing gradeId", None),
    };
    match conn.execute("DELETE FROM grades WHERE id = ?", [grade_id]) {
        Ok(0) => err(
            &req.id,
            "not_found",
            "Data nilai siswa tidak ditemukan",
            Some(json!({ "gradeId": grade_id, "httpStatus": 404 })),
        ),
        Ok(_) => ok(
            &req.id,
            json!({ "message": "Data nilai siswa berhasil dihapus" }),
        ),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn require_student(
    conn: &rusqlite::Connection,
    req: &Request,
    student_id: i64,
) -> Result<(), serde_json::Value> {
    match store::student_find_by_id(conn, student_id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            "Siswa tidak ditemukan",
            Some(json!({ "studentId": student_id, "httpStatus": 404 })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.listForStudent" => Some(handle_grades_list_for_student(state, req)),
        "grades.batchUpsert" => Some(handle_grades_batch_upsert(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        _ => None,
    }
}
