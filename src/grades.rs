use serde::Serialize;
use tracing::warn;

use crate::model::{GradeRow, GradeSubject};

/// Bucket for subjects that carry no group label. Always sorts last, whatever
/// its lexical position.
pub const FALLBACK_GROUP_LABEL: &str = "Mata Pelajaran Lainnya";

/// Dash shown for an ungraded subject.
pub const EMPTY_VALUE_DISPLAY: &str = "—";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeLine {
    /// Running sequence number across all groups.
    pub seq: usize,
    pub subject_name: String,
    pub value: Option<f64>,
    pub value_display: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeGroup {
    pub label: String,
    pub lines: Vec<GradeLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeTableView {
    pub groups: Vec<GradeGroup>,
    /// Entries dropped because their subject row is gone.
    pub skipped_count: usize,
    pub average: Option<f64>,
    pub average_display: Option<String>,
}

impl GradeTableView {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Assemble the grouped, ordered grade table for one student.
///
/// Rows without a subject are a data-integrity problem, not a user error:
/// they are logged and skipped, and everything else still renders.
pub fn build_grade_view(rows: &[GradeRow]) -> GradeTableView {
    let mut skipped_count = 0usize;
    let mut valid: Vec<(&GradeRow, &GradeSubject)> = Vec::with_capacity(rows.len());
    for row in rows {
        match row.subject.as_ref() {
            Some(subject) => valid.push((row, subject)),
            None => {
                warn!(
                    grade_id = row.id,
                    student_id = row.student_id,
                    subject_id = row.subject_id,
                    "grade row references a missing subject; excluded from certificate"
                );
                skipped_count += 1;
            }
        }
    }

    valid.sort_by(|(_, a), (_, b)| sort_key(a).cmp(&sort_key(b)));

    let mut groups: Vec<GradeGroup> = Vec::new();
    let mut seq = 0usize;
    for (row, subject) in &valid {
        seq += 1;
        let label = subject
            .group_label
            .clone()
            .unwrap_or_else(|| FALLBACK_GROUP_LABEL.to_string());
        let subject_name = if subject.name.trim().is_empty() {
            "-".to_string()
        } else {
            subject.name.clone()
        };
        let line = GradeLine {
            seq,
            subject_name,
            value: row.value,
            value_display: row
                .value
                .map(format_value)
                .unwrap_or_else(|| EMPTY_VALUE_DISPLAY.to_string()),
        };
        match groups.last_mut() {
            Some(group) if group.label == label => group.lines.push(line),
            _ => groups.push(GradeGroup {
                label,
                lines: vec![line],
            }),
        }
    }

    let graded: Vec<f64> = valid.iter().filter_map(|(row, _)| row.value).collect();
    let average = if graded.is_empty() {
        None
    } else {
        Some(graded.iter().sum::<f64>() / graded.len() as f64)
    };

    GradeTableView {
        groups,
        skipped_count,
        average,
        average_display: average.map(|a| format!("{:.2}", a)),
    }
}

/// (ungrouped-last, group label, unordered-last, display order, name).
fn sort_key<'a>(s: &'a GradeSubject) -> (bool, &'a str, bool, i64, &'a str) {
    (
        s.group_label.is_none(),
        s.group_label.as_deref().unwrap_or(""),
        s.display_order.is_none(),
        s.display_order.unwrap_or(0),
        s.name.as_str(),
    )
}

/// Grade values print as plain numbers: whole values without a decimal tail,
/// fractional ones trimmed to at most two places.
pub fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        id: i64,
        value: Option<f64>,
        subject: Option<(&str, Option<&str>, Option<i64>)>,
    ) -> GradeRow {
        GradeRow {
            id,
            student_id: 1,
            subject_id: id + 100,
            value,
            subject: subject.map(|(name, group, order)| GradeSubject {
                name: name.to_string(),
                group_label: group.map(|g| g.to_string()),
                display_order: order,
            }),
        }
    }

    #[test]
    fn groups_sort_by_label_order_then_name() {
        let rows = vec![
            row(1, Some(80.0), Some(("A Subject", Some("X"), Some(2)))),
            row(2, Some(75.0), Some(("B Subject", Some("X"), Some(1)))),
            row(3, Some(90.0), Some(("C Subject", None, Some(1)))),
        ];
        let view = build_grade_view(&rows);

        assert_eq!(view.groups.len(), 2);
        assert_eq!(view.groups[0].label, "X");
        let names: Vec<&str> = view.groups[0]
            .lines
            .iter()
            .map(|l| l.subject_name.as_str())
            .collect();
        assert_eq!(names, vec!["B Subject", "A Subject"]);
        assert_eq!(view.groups[1].label, FALLBACK_GROUP_LABEL);
        assert_eq!(view.groups[1].lines[0].subject_name, "C Subject");

        let seqs: Vec<usize> = view
            .groups
            .iter()
            .flat_map(|g| g.lines.iter().map(|l| l.seq))
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn fallback_group_sorts_last_even_after_z() {
        let rows = vec![
            row(1, None, Some(("Tanpa Kelompok", None, None))),
            row(2, None, Some(("Zoologi", Some("Zzz"), None))),
        ];
        let view = build_grade_view(&rows);
        assert_eq!(view.groups[0].label, "Zzz");
        assert_eq!(view.groups[1].label, FALLBACK_GROUP_LABEL);
    }

    #[test]
    fn null_display_order_sorts_after_numbered() {
        let rows = vec![
            row(1, None, Some(("Unordered", Some("X"), None))),
            row(2, None, Some(("Ordered", Some("X"), Some(9)))),
        ];
        let view = build_grade_view(&rows);
        let names: Vec<&str> = view.groups[0]
            .lines
            .iter()
            .map(|l| l.subject_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ordered", "Unordered"]);
    }

    #[test]
    fn average_skips_null_values() {
        let rows = vec![
            row(1, Some(80.0), Some(("A", Some("X"), Some(1)))),
            row(2, None, Some(("B", Some("X"), Some(2)))),
            row(3, Some(90.0), Some(("C", Some("X"), Some(3)))),
        ];
        let view = build_grade_view(&rows);
        assert_eq!(view.average_display.as_deref(), Some("85.00"));
        assert_eq!(view.groups[0].lines[1].value_display, EMPTY_VALUE_DISPLAY);
    }

    #[test]
    fn all_null_values_mean_no_average_at_all() {
        let rows = vec![
            row(1, None, Some(("A", Some("X"), Some(1)))),
            row(2, None, Some(("B", Some("X"), Some(2)))),
        ];
        let view = build_grade_view(&rows);
        assert_eq!(view.average, None);
        assert_eq!(view.average_display, None);
    }

    #[test]
    fn rows_without_subject_are_skipped_not_fatal() {
        let rows = vec![
            row(1, Some(70.0), None),
            row(2, Some(80.0), Some(("A", Some("X"), Some(1)))),
        ];
        let view = build_grade_view(&rows);
        assert_eq!(view.skipped_count, 1);
        assert_eq!(view.groups.len(), 1);
        // The dangling row is excluded from the average too.
        assert_eq!(view.average_display.as_deref(), Some("80.00"));
    }

    #[test]
    fn value_formatting_trims_trailing_zeroes() {
        assert_eq!(format_value(85.0), "85");
        assert_eq!(format_value(85.5), "85.5");
        assert_eq!(format_value(85.25), "85.25");
    }
}
