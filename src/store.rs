use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{
    GradeRow, GradeSubject, GraduationStatus, Settings, Student, Subject, SubjectCategory,
};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Column list shared by every student query so row mapping stays in one place.
pub const STUDENT_COLUMNS: &str = "id, nisn, full_name, birth_place, birth_date, guardian_name, \
     class_name, major, status, admin_note, certificate_note, photo_path, diploma_number, \
     exam_result_number, exam_participant_number, access_token, created_at, updated_at";

pub fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    let status_raw: String = row.get(8)?;
    Ok(Student {
        id: row.get(0)?,
        nisn: row.get(1)?,
        full_name: row.get(2)?,
        birth_place: row.get(3)?,
        birth_date: row.get(4)?,
        guardian_name: row.get(5)?,
        class_name: row.get(6)?,
        major: row.get(7)?,
        // An unknown stored value denies certificate access, never grants it.
        status: GraduationStatus::parse(&status_raw).unwrap_or(GraduationStatus::Pending),
        admin_note: row.get(9)?,
        certificate_note: row.get(10)?,
        photo_path: row.get(11)?,
        diploma_number: row.get(12)?,
        exam_result_number: row.get(13)?,
        exam_participant_number: row.get(14)?,
        access_token: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub fn student_find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [id],
        student_from_row,
    )
    .optional()
}

pub fn student_find_by_token(conn: &Connection, token: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM students WHERE access_token = ?",
            STUDENT_COLUMNS
        ),
        [token],
        student_from_row,
    )
    .optional()
}

pub const SUBJECT_COLUMNS: &str =
    "id, name, category, group_label, display_order, created_at, updated_at";

pub fn subject_from_row(row: &Row) -> rusqlite::Result<Subject> {
    let category_raw: Option<String> = row.get(2)?;
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        category: category_raw.as_deref().and_then(SubjectCategory::parse),
        group_label: row.get(3)?,
        display_order: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn subject_find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Subject>> {
    conn.query_row(
        &format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS),
        [id],
        subject_from_row,
    )
    .optional()
}

/// All grade rows for one student with the subject side left-joined, so a
/// dangling subject reference shows up as `subject: None` instead of being
/// silently dropped by an inner join.
pub fn grades_for_student(conn: &Connection, student_id: i64) -> rusqlite::Result<Vec<GradeRow>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.student_id, g.subject_id, g.value,
                s.name, s.group_label, s.display_order
         FROM grades g
         LEFT JOIN subjects s ON s.id = g.subject_id
         WHERE g.student_id = ?
         ORDER BY g.id",
    )?;
    let rows = stmt.query_map([student_id], |r| {
        let name: Option<String> = r.get(4)?;
        let subject = match name {
            Some(name) => Some(GradeSubject {
                name,
                group_label: r.get(5)?,
                display_order: r.get(6)?,
            }),
            None => None,
        };
        Ok(GradeRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            subject_id: r.get(2)?,
            value: r.get(3)?,
            subject,
        })
    })?;
    rows.collect()
}

pub fn grade_find_by_student_and_subject(
    conn: &Connection,
    student_id: i64,
    subject_id: i64,
) -> rusqlite::Result<Option<(i64, Option<f64>)>> {
    conn.query_row(
        "SELECT id, value FROM grades WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
}

/// Insert-or-update one (student, subject) grade. The unique pair constraint
/// makes a concurrent double write converge instead of duplicating the row.
pub fn grade_upsert(
    conn: &Connection,
    student_id: i64,
    subject_id: i64,
    value: Option<f64>,
) -> rusqlite::Result<i64> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO grades(student_id, subject_id, value, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id) DO UPDATE SET
           value = excluded.value,
           updated_at = excluded.updated_at",
        (student_id, subject_id, value, &now, &now),
    )?;
    conn.query_row(
        "SELECT id FROM grades WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
        |r| r.get(0),
    )
}

fn settings_from_row(row: &Row) -> rusqlite::Result<Settings> {
    Ok(Settings {
        school_name: row.get(1)?,
        agency_name: row.get(2)?,
        school_address: row.get(3)?,
        school_contact: row.get(4)?,
        school_website: row.get(5)?,
        npsn: row.get(6)?,
        school_logo_path: row.get(7)?,
        agency_logo_path: row.get(8)?,
        release_at: row.get(9)?,
        access_active: row.get::<_, i64>(10)? != 0,
        issuance_city: row.get(11)?,
        academic_year: row.get(12)?,
        exam_type: row.get(13)?,
        headmaster_name: row.get(14)?,
        headmaster_id: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

const SETTINGS_SELECT: &str = "SELECT id, school_name, agency_name, school_address, \
     school_contact, school_website, npsn, school_logo_path, agency_logo_path, release_at, \
     access_active, issuance_city, academic_year, exam_type, headmaster_name, headmaster_id, \
     created_at, updated_at FROM settings ORDER BY id LIMIT 1";

/// The settings record is a process-wide singleton: the oldest row wins, and
/// no caller gets to hardcode a primary-key literal.
pub fn settings_get(conn: &Connection) -> rusqlite::Result<Option<Settings>> {
    conn.query_row(SETTINGS_SELECT, [], settings_from_row)
        .optional()
}

pub fn settings_get_or_create_default(conn: &Connection) -> rusqlite::Result<Settings> {
    if let Some(existing) = settings_get(conn)? {
        return Ok(existing);
    }
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO settings(school_name, access_active, created_at, updated_at)
         VALUES(?, 0, ?, ?)",
        ("Nama Sekolah Default", &now, &now),
    )?;
    settings_get(conn).map(|s| s.expect("settings row just inserted"))
}

pub fn settings_save(conn: &Connection, settings: &Settings) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE settings SET
           school_name = ?, agency_name = ?, school_address = ?, school_contact = ?,
           school_website = ?, npsn = ?, school_logo_path = ?, agency_logo_path = ?,
           release_at = ?, access_active = ?, issuance_city = ?, academic_year = ?,
           exam_type = ?, headmaster_name = ?, headmaster_id = ?, updated_at = ?
         WHERE id = (SELECT MIN(id) FROM settings)",
        rusqlite::params![
            settings.school_name,
            settings.agency_name,
            settings.school_address,
            settings.school_contact,
            settings.school_website,
            settings.npsn,
            settings.school_logo_path,
            settings.agency_logo_path,
            settings.release_at,
            settings.access_active as i64,
            settings.issuance_city,
            settings.academic_year,
            settings.exam_type,
            settings.headmaster_name,
            settings.headmaster_id,
            settings.updated_at,
        ],
    )?;
    Ok(())
}

/// True when `err` is a UNIQUE-constraint failure mentioning `needle`
/// (e.g. "students.nisn"). Used to turn index violations into caller errors.
pub fn is_unique_violation(err: &rusqlite::Error, needle: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("UNIQUE constraint failed")
                && msg.contains(needle)
        }
        _ => false,
    }
}
