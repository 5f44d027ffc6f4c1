use chrono::DateTime;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match store::settings_get_or_create_default(conn) {
        Ok(settings) => ok(
            &req.id,
            serde_json::to_value(&settings).unwrap_or_else(|_| json!({})),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut settings = match store::settings_get_or_create_default(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let p = &req.params;

    // Absent key: keep. Explicit null: clear. Anything else must be a string.
    let text_fields: [(&str, &mut Option<String>); 13] = [
        ("schoolName", &mut settings.school_name),
        ("agencyName", &mut settings.agency_name),
        ("schoolAddress", &mut settings.school_address),
        ("schoolContact", &mut settings.school_contact),
        ("schoolWebsite", &mut settings.school_website),
        ("npsn", &mut settings.npsn),
        ("schoolLogoPath", &mut settings.school_logo_path),
        ("agencyLogoPath", &mut settings.agency_logo_path),
        ("issuanceCity", &mut settings.issuance_city),
        ("academicYear", &mut settings.academic_year),
        ("examType", &mut settings.exam_type),
        ("headmasterName", &mut settings.headmaster_name),
        ("headmasterId", &mut settings.headmaster_id),
    ];
    for (key, slot) in text_fields {
        match p.get(key) {
            None => {}
            Some(serde_json::Value::Null) => *slot = None,
            Some(serde_json::Value::String(s)) => *slot = Some(s.clone()),
            Some(other) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a string or null", key),
                    Some(json!({ "value": other })),
                )
            }
        }
    }

    match p.get("releaseAt") {
        None => {}
        Some(serde_json::Value::Null) => settings.release_at = None,
        Some(serde_json::Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(_) => settings.release_at = Some(s.clone()),
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("releaseAt must be RFC 3339: {}", e),
                    Some(json!({ "releaseAt": s })),
                )
            }
        },
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "releaseAt must be an RFC 3339 string or null",
                Some(json!({ "value": other })),
            )
        }
    }

    if let Some(v) = p.get("accessActive") {
        // The original portal accepted both the boolean and its form-encoded
        // string; keep both spellings working.
        let parsed = match v {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) if s == "true" => Some(true),
            serde_json::Value::String(s) if s == "false" => Some(false),
            _ => None,
        };
        match parsed {
            Some(b) => settings.access_active = b,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "accessActive must be a boolean",
                    Some(json!({ "value": v })),
                )
            }
        }
    }

    settings.updated_at = store::now_rfc3339();
    if let Err(e) = store::settings_save(conn, &settings) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "message": "Pengaturan sekolah berhasil diperbarui",
            "settings": serde_json::to_value(&settings).unwrap_or_else(|_| json!({})),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
