use chrono::{Datelike, NaiveDate};

use crate::error::{EscalaError, EscalaResult};

/// Weekday names indexed from Sunday.
pub const WEEKDAYS: [&str; 7] = [
    "Domingo",
    "Segunda-feira",
    "Terça-feira",
    "Quarta-feira",
    "Quinta-feira",
    "Sexta-feira",
    "Sábado",
];

pub fn weekday_name(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_sunday() as usize]
}

pub fn days_in_month(month: u32, year: i32) -> EscalaResult<u32> {
    let first = first_of_month(month, year)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(EscalaError::InvalidMonth(month))?;
    Ok((next - first).num_days() as u32)
}

pub fn first_of_month(month: u32, year: i32) -> EscalaResult<NaiveDate> {
    if !(1..=12).contains(&month) {
        return Err(EscalaError::InvalidMonth(month));
    }
    if !(1..=9999).contains(&year) {
        return Err(EscalaError::InvalidYear(year));
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(EscalaError::InvalidMonth(month))
}

/// Every date of the month, in order.
pub fn month_dates(month: u32, year: i32) -> EscalaResult<Vec<NaiveDate>> {
    let first = first_of_month(month, year)?;
    let days = days_in_month(month, year)?;
    Ok(first.iter_days().take(days as usize).collect())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Parses `DD/MM/YYYY`, `YYYY-MM-DD` or a bare day number. Bare days resolve
/// against `month`/`year`.
pub fn parse_date(raw: &str, month: u32, year: i32) -> EscalaResult<NaiveDate> {
    let value = raw.trim();
    let invalid = || EscalaError::InvalidDate(raw.to_string());

    let parts: Vec<&str> = if value.contains('/') {
        value.split('/').collect()
    } else if value.contains('-') {
        value.split('-').collect()
    } else {
        vec![value]
    };

    let number = |part: &str, max_len: usize| -> EscalaResult<u32> {
        if part.is_empty() || part.len() > max_len || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        part.parse().map_err(|_| invalid())
    };

    let (y, m, d) = match parts.as_slice() {
        [day, mon, yr] if value.contains('/') && yr.len() == 4 => {
            (number(*yr, 4)? as i32, number(*mon, 2)?, number(*day, 2)?)
        }
        [yr, mon, day] if value.contains('-') && yr.len() == 4 => {
            (number(*yr, 4)? as i32, number(*mon, 2)?, number(*day, 2)?)
        }
        [day] => (year, month, number(*day, 2)?),
        _ => return Err(invalid()),
    };

    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(invalid)
}

#[cfg_attr(not(test), allow(dead_code))]
pub fn normalize_date(raw: &str, month: u32, year: i32) -> EscalaResult<String> {
    parse_date(raw, month, year).map(format_date)
}

/// Maps a weekday spelling (full, accentless, without `-feira`, or the
/// three-letter abbreviation) to its entry in [`WEEKDAYS`].
pub fn normalize_day_name(raw: &str) -> Option<&'static str> {
    let key = fold_accents(raw.trim()).to_lowercase();
    let key = key.trim_end_matches('.');
    let stem = key
        .strip_suffix("-feira")
        .or_else(|| key.strip_suffix(" feira"))
        .unwrap_or(key);
    let index = match stem {
        "domingo" | "dom" => 0,
        "segunda" | "seg" => 1,
        "terca" | "ter" => 2,
        "quarta" | "qua" => 3,
        "quinta" | "qui" => 4,
        "sexta" | "sex" => 5,
        "sabado" | "sab" => 6,
        _ => return None,
    };
    Some(WEEKDAYS[index])
}

pub fn fold_accents(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'ê' | 'è' => 'e',
            'É' | 'Ê' | 'È' => 'E',
            'í' | 'î' => 'i',
            'Í' | 'Î' => 'I',
            'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ü' => 'u',
            'Ú' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}
