use serde::{Deserialize, Serialize};

/// Graduation status of a student record. The stored/wire value is the
/// snake_case string; `label()` is the uppercase form printed on the
/// certificate, verbatim from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraduationStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

impl GraduationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GraduationStatus::Pending => "pending",
            GraduationStatus::InProgress => "in_progress",
            GraduationStatus::Passed => "passed",
            GraduationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GraduationStatus::Pending),
            "in_progress" => Some(GraduationStatus::InProgress),
            "passed" => Some(GraduationStatus::Passed),
            "failed" => Some(GraduationStatus::Failed),
            _ => None,
        }
    }

    /// Announcement wording as printed on the certificate.
    pub fn label(self) -> &'static str {
        match self {
            GraduationStatus::Pending => "BELUM DITENTUKAN",
            GraduationStatus::InProgress => "PROSES",
            GraduationStatus::Passed => "LULUS",
            GraduationStatus::Failed => "TIDAK LULUS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectCategory {
    General,
    Elective,
    LocalContent,
}

impl SubjectCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectCategory::General => "general",
            SubjectCategory::Elective => "elective",
            SubjectCategory::LocalContent => "local_content",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(SubjectCategory::General),
            "elective" => Some(SubjectCategory::Elective),
            "local_content" => Some(SubjectCategory::LocalContent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub nisn: String,
    pub full_name: String,
    pub birth_place: Option<String>,
    /// YYYY-MM-DD.
    pub birth_date: Option<String>,
    pub guardian_name: Option<String>,
    pub class_name: String,
    pub major: Option<String>,
    pub status: GraduationStatus,
    pub admin_note: Option<String>,
    pub certificate_note: Option<String>,
    pub photo_path: Option<String>,
    pub diploma_number: Option<String>,
    pub exam_result_number: Option<String>,
    pub exam_participant_number: Option<String>,
    pub access_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub category: Option<SubjectCategory>,
    pub group_label: Option<String>,
    pub display_order: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// One grade row joined with its subject. The subject side is optional so a
/// dangling reference surfaces as a data-integrity warning instead of a crash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub value: Option<f64>,
    pub subject: Option<GradeSubject>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSubject {
    pub name: String,
    pub group_label: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub school_name: Option<String>,
    pub agency_name: Option<String>,
    pub school_address: Option<String>,
    pub school_contact: Option<String>,
    pub school_website: Option<String>,
    pub npsn: Option<String>,
    pub school_logo_path: Option<String>,
    pub agency_logo_path: Option<String>,
    /// RFC 3339, UTC. Downloads are globally blocked before this instant.
    pub release_at: Option<String>,
    pub access_active: bool,
    pub issuance_city: Option<String>,
    pub academic_year: Option<String>,
    pub exam_type: Option<String>,
    pub headmaster_name: Option<String>,
    pub headmaster_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
