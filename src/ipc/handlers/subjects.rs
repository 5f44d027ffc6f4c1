use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::SubjectCategory;
use crate::store;

fn parse_category(
    req: &Request,
    value: &serde_json::Value,
) -> Result<Option<SubjectCategory>, serde_json::Value> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => SubjectCategory::parse(s).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "category must be one of: general, elective, local_content",
                Some(json!({ "category": s })),
            )
        }),
        other => Err(err(
            &req.id,
            "bad_params",
            "category must be a string or null",
            Some(json!({ "value": other })),
        )),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM subjects
         ORDER BY group_label IS NULL, group_label,
                  display_order IS NULL, display_order, name",
        store::SUBJECT_COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], store::subject_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(
            &req.id,
            json!({ "subjects": serde_json::to_value(&subjects).unwrap_or_else(|_| json!([])) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let category = match req.params.get("category") {
        None => None,
        Some(v) => match parse_category(req, v) {
            Ok(c) => c,
            Err(resp) => return resp,
        },
    };
    let group_label = req
        .params
        .get("groupLabel")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let display_order = req.params.get("displayOrder").and_then(|v| v.as_i64());

    let now = store::now_rfc3339();
    let inserted = conn.execute(
        "INSERT INTO subjects(name, category, group_label, display_order, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            name,
            category.map(|c| c.as_str()),
            group_label,
            display_order,
            now,
            now
        ],
    );
    if let Err(e) = inserted {
        if store::is_unique_violation(&e, "subjects.name") {
            return err(
                &req.id,
                "subject_exists",
                "Nama mata pelajaran sudah terdaftar.",
                Some(json!({ "name": name, "httpStatus": 400 })),
            );
        }
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let id = conn.last_insert_rowid();
    match store::subject_find_by_id(conn, id) {
        Ok(Some(subject)) => ok(
            &req.id,
            serde_json::to_value(&subject).unwrap_or_else(|_| json!({})),
        ),
        Ok(None) => err(&req.id, "db_query_failed", "inserted subject vanished", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("subjectId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing subjectId", None),
    };
    let mut subject = match store::subject_find_by_id(conn, id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "Mata pelajaran tidak ditemukan.",
                Some(json!({ "subjectId": id, "httpStatus": 404 })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(v) = req.params.get("name") {
        match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => subject.name = s.to_string(),
            _ => return err(&req.id, "bad_params", "name must be a non-empty string", None),
        }
    }
    if let Some(v) = req.params.get("category") {
        subject.category = match parse_category(req, v) {
            Ok(c) => c,
            Err(resp) => return resp,
        };
    }
    match req.params.get("groupLabel") {
        None => {}
        Some(serde_json::Value::Null) => subject.group_label = None,
        Some(serde_json::Value::String(s)) => subject.group_label = Some(s.clone()),
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "groupLabel must be a string or null",
                Some(json!({ "value": other })),
            )
        }
    }
    match req.params.get("displayOrder") {
        None => {}
        Some(serde_json::Value::Null) => subject.display_order = None,
        Some(v) => match v.as_i64() {
            Some(n) => subject.display_order = Some(n),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "displayOrder must be an integer or null",
                    Some(json!({ "value": v })),
                )
            }
        },
    }

    let updated = conn.execute(
        "UPDATE subjects SET name = ?, category = ?, group_label = ?, display_order = ?,
         updated_at = ? WHERE id = ?",
        rusqlite::params![
            subject.name,
            subject.category.map(|c| c.as_str()),
            subject.group_label,
            subject.display_order,
            store::now_rfc3339(),
            id
        ],
    );
    if let Err(e) = updated {
        if store::is_unique_violation(&e, "subjects.name") {
            return err(
                &req.id,
                "subject_exists",
                "Nama mata pelajaran sudah terdaftar.",
                Some(json!({ "name": subject.name, "httpStatus": 400 })),
            );
        }
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match store::subject_find_by_id(conn, id) {
        Ok(Some(subject)) => ok(
            &req.id,
            serde_json::to_value(&subject).unwrap_or_else(|_| json!({})),
        ),
        Ok(None) => err(&req.id, "db_query_failed", "updated subject vanished", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("subjectId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing subjectId", None),
    };

    match conn.execute("DELETE FROM subjects WHERE id = ?", [id]) {
        Ok(0) => err(
            &req.id,
            "not_found",
            "Mata pelajaran tidak ditemukan.",
            Some(json!({ "subjectId": id, "httpStatus": 404 })),
        ),
        Ok(_) => ok(&req.id, json!({ "message": "Mata pelajaran berhasil dihapus" })),
        Err(e) => {
            // Grades keep their subject alive; the FK makes that explicit.
            if e.to_string().contains("FOREIGN KEY constraint failed") {
                return err(
                    &req.id,
                    "subject_in_use",
                    "Mata pelajaran masih dipakai oleh data nilai.",
                    Some(json!({ "subjectId": id, "httpStatus": 400 })),
                );
            }
            err(&req.id, "db_delete_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
