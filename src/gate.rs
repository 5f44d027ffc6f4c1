use chrono::{DateTime, Utc};
use tracing::warn;

use crate::locale;
use crate::model::{GraduationStatus, Settings, Student};

/// Why a certificate request was refused. Ordering of the checks matters:
/// configuration and timing failures are reported before anything that would
/// reveal whether a token exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    EmptyToken,
    NotConfigured,
    AccessClosedByAdmin,
    ReleaseDateUnset,
    BeforeRelease(DateTime<Utc>),
    TokenNotFound,
    NotPassed,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::EmptyToken => "empty_token",
            DenyReason::NotConfigured => "not_configured",
            DenyReason::AccessClosedByAdmin => "access_closed",
            DenyReason::ReleaseDateUnset => "release_unset",
            DenyReason::BeforeRelease(_) => "before_release",
            DenyReason::TokenNotFound => "token_not_found",
            DenyReason::NotPassed => "not_passed",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            DenyReason::EmptyToken => 400,
            DenyReason::NotConfigured => 500,
            DenyReason::AccessClosedByAdmin
            | DenyReason::ReleaseDateUnset
            | DenyReason::BeforeRelease(_)
            | DenyReason::NotPassed => 403,
            DenyReason::TokenNotFound => 404,
        }
    }

    /// Student-facing wording shown by the announcement page.
    pub fn message(&self) -> String {
        match self {
            DenyReason::EmptyToken => "Token tidak boleh kosong.".to_string(),
            DenyReason::NotConfigured => {
                "Pengaturan sekolah belum dikonfigurasi. Tidak dapat memproses permintaan SKL."
                    .to_string()
            }
            DenyReason::AccessClosedByAdmin => {
                "Pengumuman belum dibuka atau sudah ditutup oleh administrator.".to_string()
            }
            DenyReason::ReleaseDateUnset => {
                "Tanggal rilis pengumuman belum diatur oleh administrator.".to_string()
            }
            DenyReason::BeforeRelease(ts) => format!(
                "Pengumuman kelulusan akan dibuka pada {}.",
                locale::format_datetime_id(*ts)
            ),
            DenyReason::TokenNotFound => "Token tidak valid.".to_string(),
            DenyReason::NotPassed => {
                "Siswa dengan token ini tidak dinyatakan lulus.".to_string()
            }
        }
    }
}

/// Checks 1-5: request shape, configuration and release timing. Runs before
/// any token lookup so a denial here leaks nothing about token validity.
pub fn check_release(
    token: &str,
    settings: Option<&Settings>,
    now: DateTime<Utc>,
) -> Result<(), DenyReason> {
    if token.trim().is_empty() {
        return Err(DenyReason::EmptyToken);
    }
    let Some(settings) = settings else {
        return Err(DenyReason::NotConfigured);
    };
    if !settings.access_active {
        return Err(DenyReason::AccessClosedByAdmin);
    }
    let Some(raw) = settings.release_at.as_deref() else {
        return Err(DenyReason::ReleaseDateUnset);
    };
    let release_at = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            // A corrupted timestamp closes the gate rather than opening it.
            warn!(raw, error = %e, "stored release timestamp is not RFC 3339");
            return Err(DenyReason::ReleaseDateUnset);
        }
    };
    if now < release_at {
        return Err(DenyReason::BeforeRelease(release_at));
    }
    Ok(())
}

/// Checks 6-7: the resolved student. Only reached once the release checks
/// have passed.
pub fn check_student(student: Option<&Student>) -> Result<(), DenyReason> {
    let Some(student) = student else {
        return Err(DenyReason::TokenNotFound);
    };
    if student.status != GraduationStatus::Passed {
        return Err(DenyReason::NotPassed);
    }
    Ok(())
}
