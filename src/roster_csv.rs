//! Roster CSV import and export.
//!
//! Files carry one row per (day, shift): `data,posto,colaborador`, with an
//! optional `dia` column holding the weekday name. Header names are matched
//! loosely so Portuguese and English spreadsheets both load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use thiserror::Error;

use crate::dates;
use crate::error::EscalaError;
use crate::models::{MonthSchedule, ScheduleEntry, Shift};

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("the file has no header row")]
    Empty,

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write CSV: {0}")]
    Write(String),

    #[error(transparent)]
    Calendar(#[from] EscalaError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: u64,
    pub date: String,
    pub posto: String,
    pub colaborador: String,
    pub day_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub line: Option<u64>,
    pub message: String,
}

impl ValidationIssue {
    fn at(line: u64, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }

    fn general(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub entries: Vec<ScheduleEntry>,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Columns {
    date: usize,
    posto: usize,
    colaborador: usize,
    day_name: Option<usize>,
}

fn header_key(cell: &str) -> String {
    dates::fold_accents(cell.trim().trim_start_matches('\u{feff}'))
        .to_lowercase()
        .replace([' ', '-'], "_")
}

fn locate_columns(header: &csv::StringRecord) -> Result<Columns, CsvError> {
    let find = |aliases: &[&str]| {
        header
            .iter()
            .position(|cell| aliases.contains(&header_key(cell).as_str()))
    };

    Ok(Columns {
        date: find(&["data", "date", "dia_mes"]).ok_or(CsvError::MissingColumn("data"))?,
        posto: find(&["posto", "turno", "shift"]).ok_or(CsvError::MissingColumn("posto"))?,
        colaborador: find(&["colaborador", "operador", "funcionario", "employee", "nome"])
            .ok_or(CsvError::MissingColumn("colaborador"))?,
        day_name: find(&["dia", "dia_semana", "dia_da_semana", "weekday"]),
    })
}

/// Splits CSV text into raw rows, honoring quoted commas.
pub fn parse(text: &str) -> Result<Vec<CsvRow>, CsvError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(CsvError::Empty),
    };
    let columns = locate_columns(&header)?;

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let cell = |index: usize| record.get(index).unwrap_or("").to_string();
        rows.push(CsvRow {
            line: record.position().map(|p| p.line()).unwrap_or(0),
            date: cell(columns.date),
            posto: cell(columns.posto),
            colaborador: cell(columns.colaborador),
            day_name: columns
                .day_name
                .map(cell)
                .filter(|value| !value.is_empty()),
        });
    }

    Ok(rows)
}

pub fn name_key(name: &str) -> String {
    dates::fold_accents(name)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses and checks a roster file for one month against the registered
/// operator names. Structural problems (no header, missing columns) fail
/// outright; row problems are collected into the report.
pub fn validate_and_parse(
    text: &str,
    month: u32,
    year: i32,
    roster: &[String],
) -> Result<ValidationReport, CsvError> {
    let rows = parse(text)?;
    let month_dates = dates::month_dates(month, year)?;

    let mut known: HashMap<String, Vec<&String>> = HashMap::new();
    for name in roster {
        known.entry(name_key(name)).or_default().push(name);
    }
    let mut days: BTreeMap<NaiveDate, ScheduleEntry> = month_dates
        .iter()
        .map(|date| (*date, ScheduleEntry::empty(*date)))
        .collect();
    let mut filled: HashSet<(NaiveDate, Shift)> = HashSet::new();
    let mut report = ValidationReport::default();

    for row in rows {
        let date = match dates::parse_date(&row.date, month, year) {
            Ok(date) => date,
            Err(_) => {
                report
                    .errors
                    .push(ValidationIssue::at(row.line, format!("invalid date '{}'", row.date)));
                continue;
            }
        };

        let Some(entry) = days.get_mut(&date) else {
            report.errors.push(ValidationIssue::at(
                row.line,
                format!("date {} is outside {:02}/{}", dates::format_date(date), month, year),
            ));
            continue;
        };

        if row.posto.is_empty() {
            report
                .errors
                .push(ValidationIssue::at(row.line, "missing posto"));
            continue;
        }

        let shift = match row.posto.parse::<Shift>() {
            Ok(shift) => shift,
            Err(_) => {
                report
                    .errors
                    .push(ValidationIssue::at(row.line, format!("unknown posto '{}'", row.posto)));
                continue;
            }
        };

        let name = if row.colaborador.is_empty() {
            String::new()
        } else {
            match known.get(&name_key(&row.colaborador)).map(Vec::as_slice) {
                Some([canonical]) => (*canonical).clone(),
                Some(candidates) if candidates.len() > 1 => {
                    let names: Vec<&str> = candidates.iter().map(|name| name.as_str()).collect();
                    report.errors.push(ValidationIssue::at(
                        row.line,
                        format!(
                            "operator '{}' matches several registered names ({})",
                            row.colaborador,
                            names.join(", ")
                        ),
                    ));
                    continue;
                }
                _ => {
                    report.errors.push(ValidationIssue::at(
                        row.line,
                        format!("operator '{}' is not registered", row.colaborador),
                    ));
                    continue;
                }
            }
        };

        if let Some(raw_day) = &row.day_name {
            let expected = dates::weekday_name(date);
            match dates::normalize_day_name(raw_day) {
                Some(day) if day == expected => {}
                Some(day) => report.warnings.push(ValidationIssue::at(
                    row.line,
                    format!("{} is a {expected}, not {day}", dates::format_date(date)),
                )),
                None => report.warnings.push(ValidationIssue::at(
                    row.line,
                    format!("unrecognized day name '{raw_day}'"),
                )),
            }
        }

        if !filled.insert((date, shift)) {
            report.warnings.push(ValidationIssue::at(
                row.line,
                format!(
                    "duplicate {} row for {}; keeping this one",
                    shift.posto_label(),
                    dates::format_date(date)
                ),
            ));
        }

        *entry.slot_mut(shift) = name;
    }

    let missing: Vec<String> = month_dates
        .iter()
        .filter(|date| !Shift::ALL.iter().any(|shift| filled.contains(&(**date, *shift))))
        .map(|date| dates::format_date(*date))
        .collect();
    if !missing.is_empty() {
        report.warnings.push(ValidationIssue::general(format!(
            "incomplete month: {} day(s) without rows ({})",
            missing.len(),
            missing.join(", ")
        )));
    }

    report.entries = days.into_values().collect();
    Ok(report)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, CsvError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Write(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Write(e.to_string()))
}

/// Blank roster for a month: two rows per day, operator column empty.
pub fn generate_template(month: u32, year: i32) -> Result<String, CsvError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["data", "posto", "colaborador"])?;
    for date in dates::month_dates(month, year)? {
        let day = dates::format_date(date);
        for shift in Shift::ALL {
            writer.write_record([day.as_str(), shift.posto_label(), ""])?;
        }
    }
    finish(writer)
}

/// Writes a schedule in the import format, weekday column included.
pub fn export(schedule: &MonthSchedule) -> Result<String, CsvError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["data", "dia", "posto", "colaborador"])?;
    for entry in &schedule.entries {
        let day = dates::format_date(entry.date);
        for shift in Shift::ALL {
            writer.write_record([
                day.as_str(),
                entry.day_of_week.as_str(),
                shift.posto_label(),
                entry.slot(shift),
            ])?;
        }
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<String> {
        vec![
            "Ana Souza".to_string(),
            "Bruno Lima".to_string(),
            "Carla Dias, Jr.".to_string(),
        ]
    }

    #[test]
    fn template_validates_to_a_full_month() {
        for (month, year) in [(2, 2024), (2, 2025), (4, 2025), (12, 2025)] {
            let template = generate_template(month, year).unwrap();
            let report = validate_and_parse(&template, month, year, &[]).unwrap();
            assert!(report.is_valid(), "{:?}", report.errors);
            assert!(report.warnings.is_empty(), "{:?}", report.warnings);
            assert_eq!(
                report.entries.len() as u32,
                dates::days_in_month(month, year).unwrap()
            );
        }
    }

    #[test]
    fn groups_rows_into_day_pairs() {
        let text = "data,posto,colaborador\n\
                    01/03/2025,Meio Período,ana souza\n\
                    2025-03-01,FECHAMENTO,Bruno  Lima\n\
                    2,fechamento,\"Carla Dias, Jr.\"\n";
        let report = validate_and_parse(text, 3, 2025, &roster()).unwrap();
        assert!(report.is_valid(), "{:?}", report.errors);

        let first = &report.entries[0];
        assert_eq!(first.day_of_week, "Sábado");
        assert_eq!(first.meio_periodo, "Ana Souza");
        assert_eq!(first.fechamento, "Bruno Lima");
        assert_eq!(report.entries[1].fechamento, "Carla Dias, Jr.");
        assert_eq!(report.entries[1].meio_periodo, "");
        assert_eq!(report.entries.len(), 31);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.message.starts_with("incomplete month: 29 day(s)")));
    }

    #[test]
    fn unregistered_operator_is_always_an_error() {
        let text = "data,posto,colaborador\n01/03/2025,fechamento,Zeca Pagodinho\n";
        let report = validate_and_parse(text, 3, 2025, &roster()).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].line, Some(2));
        assert!(report.errors[0].message.contains("Zeca Pagodinho"));
        assert_eq!(report.entries[0].fechamento, "");
    }

    #[test]
    fn reports_bad_dates_and_postos() {
        let text = "Data;x\n";
        assert!(matches!(parse(text), Err(CsvError::MissingColumn("data"))));

        let text = "data,posto,colaborador\n\
                    99/03/2025,fechamento,Ana Souza\n\
                    01/04/2025,fechamento,Ana Souza\n\
                    03/03/2025,,Ana Souza\n\
                    04/03/2025,noturno,Ana Souza\n";
        let report = validate_and_parse(text, 3, 2025, &roster()).unwrap();
        let messages: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "line 2: invalid date '99/03/2025'",
                "line 3: date 01/04/2025 is outside 03/2025",
                "line 4: missing posto",
                "line 5: unknown posto 'noturno'",
            ]
        );
    }

    #[test]
    fn warns_on_duplicates_and_wrong_weekday() {
        let text = "Data,Dia da Semana,Turno,Operador\n\
                    01/03/2025,sab,fechamento,Ana Souza\n\
                    01/03/2025,domingo,fechamento,Bruno Lima\n";
        let report = validate_and_parse(text, 3, 2025, &roster()).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries[0].fechamento, "Bruno Lima");
        assert!(report
            .warnings
            .iter()
            .any(|w| w.line == Some(3) && w.message.contains("not Domingo")));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.line == Some(3) && w.message.starts_with("duplicate FECHAMENTO")));
    }

    #[test]
    fn export_reimports_cleanly() {
        let text = "data,posto,colaborador\n\
                    01/02/2025,mp,Ana Souza\n\
                    01/02/2025,fechamento,\"Carla Dias, Jr.\"\n";
        let report = validate_and_parse(text, 2, 2025, &roster()).unwrap();
        let schedule = MonthSchedule::new(2, 2025, report.entries.clone(), "Ana Souza");

        let exported = export(&schedule).unwrap();
        let again = validate_and_parse(&exported, 2, 2025, &roster()).unwrap();
        assert!(again.is_valid());
        assert!(again.warnings.is_empty(), "{:?}", again.warnings);
        assert_eq!(again.entries, report.entries);
    }

    #[test]
    fn names_that_differ_only_in_case_are_ambiguous() {
        let roster = vec!["ANA SOUZA".to_string(), "Ana Souza".to_string()];
        let text = "data,posto,colaborador\n01/03/2025,fechamento,ana souza\n";
        let report = validate_and_parse(text, 3, 2025, &roster).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].line, Some(2));
        assert!(report.errors[0]
            .message
            .contains("matches several registered names (ANA SOUZA, Ana Souza)"));
        assert_eq!(report.entries[0].fechamento, "");
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(parse(""), Err(CsvError::Empty)));
        assert!(matches!(parse("\n\n"), Err(CsvError::Empty)));
    }

    #[test]
    fn low_level_errors_are_not_labelled_as_reads() {
        let err = ReaderBuilder::new()
            .from_reader(&b"data\n\xff\n"[..])
            .records()
            .find_map(Result::err)
            .unwrap();
        let message = CsvError::from(err).to_string();
        assert!(message.starts_with("CSV error:"), "{message}");
    }

    #[test]
    fn template_rejects_five_digit_years() {
        assert!(matches!(
            generate_template(1, 10000),
            Err(CsvError::Calendar(EscalaError::InvalidYear(10000)))
        ));
        let template = generate_template(12, 9999).unwrap();
        let report = validate_and_parse(&template, 12, 9999, &[]).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries.len(), 31);
    }

    #[test]
    fn skips_blank_lines() {
        let text = "data,posto,colaborador\n\n01/03/2025,mp,Ana Souza\n,,\n";
        let rows = parse(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].colaborador, "Ana Souza");
    }
}
