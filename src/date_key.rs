use crate::session::SessionError;
use chrono::{Local, NaiveDate};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Local wall-clock date as the attendance partition key.
pub fn today() -> String {
    Local::now().date_naive().format(DATE_KEY_FORMAT).to_string()
}

/// Accepts only zero-padded `YYYY-MM-DD` naming a real calendar day.
pub fn parse_date_key(raw: &str) -> Result<String, SessionError> {
    let t = raw.trim();
    let well_formed = t.len() == 10
        && t.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if !well_formed {
        return Err(SessionError::BadDate(t.to_string()));
    }
    let date = NaiveDate::parse_from_str(t, DATE_KEY_FORMAT)
        .map_err(|_| SessionError::BadDate(t.to_string()))?;
    Ok(date.format(DATE_KEY_FORMAT).to_string())
}

/// `None` or a blank string means today.
pub fn date_key_or_today(raw: Option<&str>) -> Result<String, SessionError> {
    match raw.map(str::trim) {
        Some(t) if !t.is_empty() => parse_date_key(t),
        _ => Ok(today()),
    }
}
