use chrono::Utc;
use genpdf::fonts::{FontData, FontFamily};
use serde_json::json;
use tracing::{error, info, warn};

use crate::compose;
use crate::gate::{self, DenyReason};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{GradeRow, Settings, Student};
use crate::render::{self, RenderError};
use crate::store;

const FONT_MISSING_MESSAGE: &str =
    "Gagal generate PDF: File font tidak ditemukan di server. Harap hubungi administrator.";

fn deny(req: &Request, reason: DenyReason) -> serde_json::Value {
    let mut details = json!({ "httpStatus": reason.http_status() });
    if let DenyReason::BeforeRelease(ts) = &reason {
        details["releaseAt"] = json!(ts.to_rfc3339());
    }
    err(&req.id, reason.code(), reason.message(), Some(details))
}

/// Load-or-reuse the cached font family. Fonts are the renderer's only
/// startup I/O; a miss here is a deployment problem, not a data problem.
fn ensure_fonts(
    state: &mut AppState,
    req: &Request,
) -> Result<FontFamily<FontData>, serde_json::Value> {
    if state.fonts.is_none() {
        match render::load_fonts(state.workspace.as_deref()) {
            Ok(f) => state.fonts = Some(f),
            Err(e) => {
                error!(error = %e, "certificate fonts unavailable");
                return Err(err(
                    &req.id,
                    "render_resource_missing",
                    FONT_MISSING_MESSAGE,
                    Some(json!({ "httpStatus": 500, "detail": e.to_string() })),
                ));
            }
        }
    }
    Ok(state.fonts.clone().expect("fonts cached above"))
}

fn render_to_file(
    state: &mut AppState,
    req: &Request,
    student: &Student,
    grades: &[GradeRow],
    settings: Option<&Settings>,
    filename: &str,
) -> Result<serde_json::Value, serde_json::Value> {
    let Some(workspace) = state.workspace.clone() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    let document = compose::compose(student, grades, settings, Utc::now());
    let fonts = ensure_fonts(state, req)?;
    let bytes = match render::render(&document, &fonts) {
        Ok(b) => b,
        Err(RenderError::ResourceMissing(detail)) => {
            error!(detail, "certificate render aborted: resource missing");
            return Err(err(
                &req.id,
                "render_resource_missing",
                FONT_MISSING_MESSAGE,
                Some(json!({ "httpStatus": 500, "detail": detail })),
            ));
        }
        Err(RenderError::Backend(detail)) => {
            error!(detail, "certificate render failed");
            return Err(err(
                &req.id,
                "render_failed",
                "Gagal membuat dokumen SKL.",
                Some(json!({ "httpStatus": 500, "detail": detail })),
            ));
        }
    };

    let export_dir = workspace.join("exports");
    if let Err(e) = std::fs::create_dir_all(&export_dir) {
        return Err(err(
            &req.id,
            "export_write_failed",
            e.to_string(),
            Some(json!({ "httpStatus": 500 })),
        ));
    }
    let out_path = export_dir.join(filename);
    if let Err(e) = std::fs::write(&out_path, &bytes) {
        return Err(err(
            &req.id,
            "export_write_failed",
            e.to_string(),
            Some(json!({ "httpStatus": 500 })),
        ));
    }

    info!(student_id = student.id, filename, bytes = bytes.len(), "certificate rendered");
    Ok(json!({
        "filename": filename,
        "path": out_path.to_string_lossy(),
        "contentType": "application/pdf",
        "disposition": "attachment",
        "byteLength": bytes.len(),
    }))
}

/// The student-facing download: token in, PDF out, with the full access gate
/// in front.
fn handle_download_by_token(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = req
        .params
        .get("token")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let (settings, student, grades) = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };

        let settings = match store::settings_get(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        // Release checks run before the token is ever looked up, so a denial
        // here says nothing about whether the token exists.
        if let Err(reason) = gate::check_release(&token, settings.as_ref(), Utc::now()) {
            return deny(req, reason);
        }

        let student = match store::student_find_by_token(conn, &token) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if let Err(reason) = gate::check_student(student.as_ref()) {
            return deny(req, reason);
        }
        let student = student.expect("student checked above");

        let grades = match store::grades_for_student(conn, student.id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        (settings, student, grades)
    };

    let filename = format!("SKL_{}_{}.pdf", student.nisn, token);
    match render_to_file(state, req, &student, &grades, settings.as_ref(), &filename) {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

/// Admin-side render for one student, gate bypassed: previews and reprints.
fn handle_generate_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(
            &req.id,
            "bad_params",
            "ID Siswa tidak valid.",
            Some(json!({ "httpStatus": 400 })),
        );
    };

    let (settings, student, grades) = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };

        let student = match store::student_find_by_id(conn, student_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                return err(
                    &req.id,
                    "not_found",
                    "Data siswa tidak ditemukan.",
                    Some(json!({ "studentId": student_id, "httpStatus": 404 })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let settings = match store::settings_get(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if settings.is_none() {
            warn!("settings not configured; certificate falls back to placeholders");
        }
        let grades = match store::grades_for_student(conn, student.id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        (settings, student, grades)
    };

    let filename = format!(
        "SKL_{}_{}.pdf",
        student.nisn,
        student.full_name.split_whitespace().collect::<Vec<_>>().join("_")
    );
    match render_to_file(state, req, &student, &grades, settings.as_ref(), &filename) {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "certificate.downloadByToken" => Some(handle_download_by_token(state, req)),
        "certificate.generate" => Some(handle_generate_for_student(state, req)),
        _ => None,
    }
}
