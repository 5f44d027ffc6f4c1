use chrono::{DateTime, FixedOffset, Locale, NaiveDate, Utc};

/// Western Indonesian Time, the display timezone of the portal.
fn wib() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).expect("WIB offset is valid")
}

/// "07 Agustus 2026" — the long date form used on the certificate.
pub fn format_date_id(date: NaiveDate) -> String {
    date.format_localized("%d %B %Y", Locale::id_ID).to_string()
}

/// "07 Agustus 2026 pukul 10.30" — long date plus wall-clock time in WIB,
/// used when telling a student when the announcement opens.
pub fn format_datetime_id(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&wib())
        .format_localized("%d %B %Y pukul %H.%M", Locale::id_ID)
        .to_string()
}

/// Date part of a UTC instant, shifted to WIB first.
pub fn date_in_wib(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&wib()).date_naive()
}
