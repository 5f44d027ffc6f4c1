use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("sklportal.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nisn TEXT NOT NULL,
            full_name TEXT NOT NULL,
            birth_place TEXT,
            birth_date TEXT,
            guardian_name TEXT,
            class_name TEXT NOT NULL,
            major TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            admin_note TEXT,
            photo_path TEXT,
            diploma_number TEXT,
            exam_result_number TEXT,
            exam_participant_number TEXT,
            access_token TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_nisn ON students(nisn)",
        [],
    )?;
    // Uniqueness among issued tokens only; cleared tokens are NULL.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_access_token
         ON students(access_token) WHERE access_token IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_diploma_number
         ON students(diploma_number) WHERE diploma_number IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_exam_result_number
         ON students(exam_result_number) WHERE exam_result_number IS NOT NULL",
        [],
    )?;

    // Older workspaces predate the per-certificate note field.
    ensure_students_certificate_note(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT,
            group_label TEXT,
            display_order INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_subjects_name ON subjects(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            value REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_name TEXT,
            agency_name TEXT,
            school_address TEXT,
            school_contact TEXT,
            school_website TEXT,
            npsn TEXT,
            school_logo_path TEXT,
            agency_logo_path TEXT,
            release_at TEXT,
            access_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    // The certificate-specific columns arrived after the first release.
    ensure_settings_certificate_columns(&conn)?;

    Ok(conn)
}

fn ensure_students_certificate_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "certificate_note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN certificate_note TEXT", [])?;
    Ok(())
}

fn ensure_settings_certificate_columns(conn: &Connection) -> anyhow::Result<()> {
    for col in [
        "issuance_city",
        "academic_year",
        "exam_type",
        "headmaster_name",
        "headmaster_id",
    ] {
        if !table_has_column(conn, "settings", col)? {
            conn.execute(&format!("ALTER TABLE settings ADD COLUMN {} TEXT", col), [])?;
        }
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
