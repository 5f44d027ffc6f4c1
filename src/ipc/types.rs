use std::path::PathBuf;

use genpdf::fonts::{FontData, FontFamily};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Certificate fonts, loaded on first render and reused afterwards.
    pub fonts: Option<FontFamily<FontData>>,
}
