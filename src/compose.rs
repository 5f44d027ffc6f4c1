use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::grades::{self, GradeTableView};
use crate::locale;
use crate::model::{GradeRow, Settings, Student};

/// Fixed fallback strings. Missing optional data never blanks a slot; it
/// renders one of these so the layout stays stable.
const AGENCY_PLACEHOLDER: &str = "PEMERINTAH DAERAH PROVINSI [NAMA DINAS]";
const SCHOOL_PLACEHOLDER: &str = "NAMA SEKOLAH";
const ADDRESS_PLACEHOLDER: &str = "Alamat Lengkap Sekolah, Kota, Kodepos";
const NPSN_PLACEHOLDER: &str = "XXXXXXXX";
const CONTACT_PLACEHOLDER: &str = "email@sekolah.sch.id";
const SCHOOL_BODY_PLACEHOLDER: &str = "Nama Sekolah Contoh";
const CITY_PLACEHOLDER: &str = "[Kota Penerbitan SKL]";
const HEADMASTER_PLACEHOLDER: &str = "[Nama Kepala Sekolah]";
const GRADE_TABLE_TITLE_PLACEHOLDER: &str = "DAFTAR NILAI HASIL UJIAN";
const NO_GRADES_TEXT: &str = "Data nilai tidak tersedia.";
const ALL_GRADES_FILTERED_TEXT: &str =
    "Data nilai tidak memenuhi syarat untuk ditampilkan atau tidak tersedia.";
const CLOSING_TEXT: &str =
    "Surat keterangan ini dibuat untuk dipergunakan sebagaimana mestinya.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Span {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Span {
            text: text.into(),
            bold: true,
            italic: false,
        }
    }

    pub fn italic(text: impl Into<String>) -> Self {
        Span {
            text: text.into(),
            bold: false,
            italic: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiodataRow {
    pub label: String,
    pub value: String,
    pub bold_value: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureBlock {
    pub city_and_date: String,
    pub role_label: String,
    pub name: String,
    pub id_line: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Section {
    Letterhead {
        agency: String,
        school: String,
        address: String,
        npsn_line: String,
        contact_line: String,
    },
    Title {
        text: String,
        number: String,
    },
    Paragraph {
        spans: Vec<Span>,
        align: TextAlign,
    },
    Biodata {
        rows: Vec<BiodataRow>,
        photo_caption: Vec<String>,
    },
    StatusLine {
        text: String,
    },
    GradeTable {
        title: String,
        view: GradeTableView,
        average_label: String,
    },
    Signature(SignatureBlock),
}

/// The fully composed certificate: everything the renderer needs, nothing it
/// has to look up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDocument {
    pub doc_title: String,
    pub sections: Vec<Section>,
}

/// Build the certificate content for one student. Deterministic in its
/// inputs: the clock is a parameter, not an ambient read.
pub fn compose(
    student: &Student,
    grade_rows: &[GradeRow],
    settings: Option<&Settings>,
    now: DateTime<Utc>,
) -> CertificateDocument {
    let school_body = settings
        .and_then(|s| s.school_name.clone())
        .unwrap_or_else(|| SCHOOL_BODY_PLACEHOLDER.to_string());

    let mut sections = Vec::new();

    sections.push(Section::Letterhead {
        agency: settings
            .and_then(|s| s.agency_name.clone())
            .unwrap_or_else(|| AGENCY_PLACEHOLDER.to_string())
            .to_uppercase(),
        school: settings
            .and_then(|s| s.school_name.clone())
            .unwrap_or_else(|| SCHOOL_PLACEHOLDER.to_string())
            .to_uppercase(),
        address: settings
            .and_then(|s| s.school_address.clone())
            .unwrap_or_else(|| ADDRESS_PLACEHOLDER.to_string()),
        npsn_line: format!(
            "NPSN: {}",
            settings
                .and_then(|s| s.npsn.clone())
                .unwrap_or_else(|| NPSN_PLACEHOLDER.to_string())
        ),
        contact_line: contact_line(settings),
    });

    sections.push(Section::Title {
        text: "SURAT KETERANGAN LULUS".to_string(),
        number: document_number(student.id, now),
    });

    sections.push(Section::Paragraph {
        spans: vec![
            Span::plain("Yang bertanda tangan di bawah ini, Kepala "),
            Span::bold(school_body.clone()),
            Span::plain(", menerangkan bahwa:"),
        ],
        align: TextAlign::Left,
    });

    sections.push(Section::Biodata {
        rows: biodata_rows(student),
        photo_caption: vec!["Pas Foto".to_string(), "3x4 cm".to_string()],
    });

    sections.push(Section::Paragraph {
        spans: vec![Span::plain(
            "Berdasarkan kriteria kelulusan dan hasil ujian sekolah, siswa tersebut dinyatakan:",
        )],
        align: TextAlign::Left,
    });

    sections.push(Section::StatusLine {
        text: student.status.label().to_uppercase(),
    });

    let academic_year = settings
        .and_then(|s| s.academic_year.clone())
        .unwrap_or_else(|| {
            let y = locale::date_in_wib(now).year();
            format!("{}/{}", y - 1, y)
        });
    sections.push(Section::Paragraph {
        spans: vec![
            Span::plain("dari Satuan Pendidikan "),
            Span::bold(school_body),
            Span::plain(format!(" Tahun Pelajaran {}.", academic_year)),
        ],
        align: TextAlign::Left,
    });

    if let Some(note) = non_empty(student.admin_note.as_deref()) {
        sections.push(Section::Paragraph {
            spans: vec![Span::bold("Catatan: "), Span::italic(note)],
            align: TextAlign::Left,
        });
    }
    if let Some(note) = non_empty(student.certificate_note.as_deref()) {
        sections.push(Section::Paragraph {
            spans: vec![Span::bold("Keterangan Tambahan: "), Span::italic(note)],
            align: TextAlign::Left,
        });
    }

    push_grade_sections(&mut sections, grade_rows, settings);

    sections.push(Section::Paragraph {
        spans: vec![Span::plain(CLOSING_TEXT)],
        align: TextAlign::Left,
    });

    sections.push(Section::Signature(signature_block(settings, now)));

    CertificateDocument {
        doc_title: format!(
            "SKL_{}_{}",
            student.nisn,
            student.full_name.split_whitespace().collect::<Vec<_>>().join("_")
        ),
        sections,
    }
}

fn contact_line(settings: Option<&Settings>) -> String {
    let contact = settings.and_then(|s| non_empty(s.school_contact.as_deref()));
    let website = settings.and_then(|s| non_empty(s.school_website.as_deref()));
    let mut line = String::new();
    if let Some(contact) = contact {
        line.push_str(&contact);
        line.push_str(" | ");
    }
    match website {
        Some(website) => line.push_str(&format!("Website: {}", website)),
        None => line.push_str(CONTACT_PLACEHOLDER),
    }
    line
}

/// `Nomor: 421.3 / 007 / SKL-SMK/2026` — derived from the student row id and
/// the current year only, not a global sequence.
fn document_number(student_id: i64, now: DateTime<Utc>) -> String {
    format!(
        "Nomor: 421.3 / {:03} / SKL-SMK/{}",
        student_id,
        locale::date_in_wib(now).year()
    )
}

fn biodata_rows(student: &Student) -> Vec<BiodataRow> {
    let birth_date = student.birth_date.as_deref().map(|raw| {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => locale::format_date_id(d),
            Err(e) => {
                warn!(student_id = student.id, raw, error = %e, "unparseable birth date");
                "-".to_string()
            }
        }
    });
    vec![
        BiodataRow {
            label: "Nama Lengkap".to_string(),
            value: student.full_name.to_uppercase(),
            bold_value: true,
        },
        BiodataRow {
            label: "Tempat, Tanggal Lahir".to_string(),
            value: format!(
                "{}, {}",
                student.birth_place.as_deref().unwrap_or("-"),
                birth_date.as_deref().unwrap_or("-")
            ),
            bold_value: false,
        },
        BiodataRow {
            label: "NISN".to_string(),
            value: student.nisn.clone(),
            bold_value: false,
        },
        BiodataRow {
            label: "Nomor Peserta Ujian".to_string(),
            value: student
                .exam_participant_number
                .as_deref()
                .unwrap_or("-")
                .to_string(),
            bold_value: false,
        },
        BiodataRow {
            label: "Kelas / Kompetensi Keahlian".to_string(),
            value: format!(
                "{} / {}",
                student.class_name,
                student.major.as_deref().unwrap_or("-")
            ),
            bold_value: false,
        },
    ]
}

fn push_grade_sections(
    sections: &mut Vec<Section>,
    grade_rows: &[GradeRow],
    settings: Option<&Settings>,
) {
    if grade_rows.is_empty() {
        sections.push(Section::Paragraph {
            spans: vec![Span::italic(NO_GRADES_TEXT)],
            align: TextAlign::Center,
        });
        return;
    }

    let view = grades::build_grade_view(grade_rows);
    if view.is_empty() {
        // Rows existed but every one of them was integrity-filtered.
        sections.push(Section::Paragraph {
            spans: vec![Span::italic(ALL_GRADES_FILTERED_TEXT)],
            align: TextAlign::Center,
        });
        return;
    }

    sections.push(Section::GradeTable {
        title: settings
            .and_then(|s| non_empty(s.exam_type.as_deref()))
            .unwrap_or_else(|| GRADE_TABLE_TITLE_PLACEHOLDER.to_string())
            .to_uppercase(),
        view,
        average_label: "Rata-rata Nilai Akhir".to_string(),
    });
}

fn signature_block(settings: Option<&Settings>, now: DateTime<Utc>) -> SignatureBlock {
    let date = settings
        .and_then(|s| s.release_at.as_deref())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| locale::date_in_wib(ts.with_timezone(&Utc)))
        .unwrap_or_else(|| locale::date_in_wib(now));
    SignatureBlock {
        city_and_date: format!(
            "{}, {}",
            settings
                .and_then(|s| non_empty(s.issuance_city.as_deref()))
                .unwrap_or_else(|| CITY_PLACEHOLDER.to_string()),
            locale::format_date_id(date)
        ),
        role_label: "Kepala Sekolah,".to_string(),
        name: settings
            .and_then(|s| non_empty(s.headmaster_name.as_deref()))
            .unwrap_or_else(|| HEADMASTER_PLACEHOLDER.to_string())
            .to_uppercase(),
        id_line: format!(
            "NIP. {}",
            settings
                .and_then(|s| non_empty(s.headmaster_id.as_deref()))
                .unwrap_or_else(|| "-".to_string())
        ),
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
