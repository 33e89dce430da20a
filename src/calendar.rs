// Calendar helpers - year-end expiration arithmetic
//
// Every ledger expires at the start of December 31 (00:00:00 UTC) of some
// year. The sweep and ledger creation both derive that instant from an
// explicit "now" so nothing here reads the wall clock.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

/// December 31 of `year`, 00:00:00 UTC.
///
/// Returns `None` only for years outside chrono's representable range.
pub fn year_end(year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 12, 31)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Year end of the calendar year containing `moment`.
pub fn year_end_of(moment: DateTime<Utc>) -> DateTime<Utc> {
    // Any year a DateTime<Utc> can hold has a representable Dec 31.
    year_end(moment.year()).unwrap_or(moment)
}

/// True when `moment` is exactly a year-end instant.
pub fn is_year_end(moment: DateTime<Utc>) -> bool {
    moment.month() == 12
        && moment.day() == 31
        && moment.hour() == 0
        && moment.minute() == 0
        && moment.second() == 0
        && moment.nanosecond() == 0
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_moment(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("Unrecognized date '{}': expected RFC 3339 or YYYY-MM-DD", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_year_end() {
        let end = year_end(2023).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap());
        assert!(is_year_end(end));
    }

    #[test]
    fn test_year_end_of_mid_year() {
        let june = Utc.with_ymd_and_hms(2023, 6, 1, 15, 30, 0).unwrap();
        assert_eq!(
            year_end_of(june),
            Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_year_end_of_new_years_eve_afternoon() {
        // Later on Dec 31 still maps to the same year end
        let eve = Utc.with_ymd_and_hms(2024, 12, 31, 18, 0, 0).unwrap();
        assert_eq!(year_end_of(eve), year_end(2024).unwrap());
    }

    #[test]
    fn test_is_year_end_rejects_other_instants() {
        assert!(!is_year_end(Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap()));
        assert!(!is_year_end(Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 1).unwrap()));
        assert!(!is_year_end(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_moment_formats() {
        assert_eq!(
            parse_moment("2024-01-02").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_moment("2024-01-02T10:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap()
        );
        assert!(parse_moment("02/01/2024").is_err());
    }
}
