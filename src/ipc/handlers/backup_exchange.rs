use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }

    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(p) => PathBuf::from(p),
        None => workspace.join("backups").join(format!(
            "sklportal-backup-{}.zip",
            Utc::now().format("%Y%m%d-%H%M%S")
        )),
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => {
            info!(out = %out_path.display(), "workspace bundle exported");
            ok(
                &req.id,
                json!({
                    "outPath": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(p) => PathBuf::from(p),
        None => return err(&req.id, "bad_params", "missing inPath", None),
    };

    // Drop the live connection before the database file is swapped out.
    state.db = None;

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            // Leave the workspace reopenable even when the bundle was bad.
            match db::open_db(&workspace) {
                Ok(conn) => state.db = Some(conn),
                Err(reopen) => {
                    return err(
                        &req.id,
                        "backup_import_failed",
                        format!("{e:#}; reopen also failed: {reopen:#}"),
                        None,
                    )
                }
            }
            return err(&req.id, "backup_import_failed", format!("{e:#}"), None);
        }
    };

    match db::open_db(&workspace) {
        Ok(conn) => {
            state.db = Some(conn);
            info!(from = %in_path.display(), "workspace bundle imported");
            ok(
                &req.id,
                json!({ "bundleFormatDetected": summary.bundle_format_detected }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
