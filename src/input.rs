use crate::error::InputError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::path::Path;
use tracing::debug;

/// Inclusive day range expanded to start-of-day / end-of-day UTC timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn from_days(start: NaiveDate, end: NaiveDate) -> Result<Self, InputError> {
        let invalid = || InputError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        };
        if start > end {
            return Err(invalid());
        }

        let start_of_day = NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(invalid)?;
        Ok(Self {
            start: start.and_time(start_of_day).and_utc(),
            end: end.and_time(end_of_day).and_utc(),
        })
    }
}

/// Read usernames from the first column of each non-empty row; no header is assumed
pub fn read_usernames(path: &Path) -> Result<Vec<String>, InputError> {
    if path.as_os_str().is_empty() {
        return Err(InputError::MissingCsv);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| InputError::UnreadableCsv {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let usernames: Vec<String> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(first_column)
        .collect();

    if usernames.is_empty() {
        return Err(InputError::NoUsernames {
            path: path.display().to_string(),
        });
    }

    debug!("Read {} usernames from {}", usernames.len(), path.display());
    Ok(usernames)
}

fn first_column(line: &str) -> String {
    let line = line.trim_start_matches('\u{feff}');
    let cell = line.split(',').next().unwrap_or_default().trim();
    cell.strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(cell)
        .trim()
        .to_string()
}
