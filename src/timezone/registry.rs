//! Таблица часовых поясов брокеров (broker-tz.csv)
//!
//! Поля через точку с запятой, первая строка - заголовок, кавычки игнорируются:
//!
//! ```text
//! Name;StartMonth;StartNth;StartDay;StartHour;EndMonth;EndNth;EndDay;EndHour;GMTStd;GMTDST;WeekStartDay;WeekStartHour;WeekendDay;WeekendHour
//! "US Eastern";3;2;0;2:00;11;1;0;2:00;-5;-4;0;17:00;5;17:00
//! ```
//!
//! Месяцы считаются с 1 (0 в колонках месяца - пояс без летнего времени),
//! `Nth` 0 - последний такой день недели, дни недели с 0 = воскресенье.
//! Минуты в часах игнорируются.

use std::fs;
use std::path::Path;

use log::debug;

use super::rules::{DstRule, TimezoneInfo, Transition};
use crate::error::TimezoneError;

/// Имя пояса самой машины в таблице
pub const LOCAL_TIMEZONE: &str = "Local";
pub const UTC_TIMEZONE: &str = "UTC";

const MIN_FIELDS: usize = 11;

/// Все пояса из таблицы, поиск по имени.
///
/// ```
/// use asirikuy_time::timezone::TimezoneRegistry;
///
/// let table = "Name;StartMonth;StartNth;StartDay;StartHour;EndMonth;EndNth;EndDay;EndHour;GMTStd;GMTDST\n\
///              \"US Eastern\";3;2;0;2:00;11;1;0;2:00;-5;-4\n";
/// let registry = TimezoneRegistry::parse(table).unwrap();
/// let eastern = registry.get("US Eastern").unwrap();
/// assert_eq!(eastern.gmt_offset_std, -5);
/// assert!(registry.get("Mars").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimezoneRegistry {
    zones: Vec<TimezoneInfo>,
}

impl TimezoneRegistry {
    pub fn new(zones: Vec<TimezoneInfo>) -> Self {
        Self { zones }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TimezoneError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, TimezoneError> {
        let mut zones = Vec::new();

        // Первая строка - заголовок
        for (index, raw) in content.lines().enumerate().skip(1) {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            zones.push(parse_line(index + 1, line)?);
        }

        debug!("loaded {} timezone records", zones.len());
        Ok(Self { zones })
    }

    pub fn get(&self, name: &str) -> Result<&TimezoneInfo, TimezoneError> {
        self.zones
            .iter()
            .find(|zone| zone.name == name)
            .ok_or_else(|| TimezoneError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|zone| zone.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

fn parse_line(line: usize, text: &str) -> Result<TimezoneInfo, TimezoneError> {
    let cleaned = text.replace('"', "");
    let fields: Vec<&str> = cleaned.split(';').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(TimezoneError::Parse {
            line,
            reason: format!("expected at least {} fields, found {}", MIN_FIELDS, fields.len()),
        });
    }

    let name = fields[0];
    if name.is_empty() {
        return Err(TimezoneError::Parse {
            line,
            reason: "empty timezone name".to_string(),
        });
    }

    let field = |index: usize| fields.get(index).copied().unwrap_or("0");
    let int = |index: usize| parse_int(line, field(index));
    let hour = |index: usize| parse_int(line, field(index).split(':').next().unwrap_or("0"));

    let start_month = check(line, "start month", int(1)?, 0, 12, "0 to 12")?;
    let start_nth = check(line, "start nth", int(2)?, 0, 4, "0 to 4")?;
    let start_day = check(line, "start day", int(3)?, 0, 6, "0 to 6")?;
    let start_hour = check(line, "start hour", hour(4)?, 0, 23, "0 to 23")?;
    let end_month = check(line, "end month", int(5)?, 0, 12, "0 to 12")?;
    let end_nth = check(line, "end nth", int(6)?, 0, 4, "0 to 4")?;
    let end_day = check(line, "end day", int(7)?, 0, 6, "0 to 6")?;
    let end_hour = check(line, "end hour", hour(8)?, 0, 23, "0 to 23")?;
    let gmt_offset_std = check(line, "GMT offset (standard)", int(9)?, -15, 15, "-15 to 15")?;
    let gmt_offset_dst = check(line, "GMT offset (DST)", int(10)?, -15, 15, "-15 to 15")?;
    let week_start_day = check(line, "week start day", int(11)?, 0, 6, "0 to 6")?;
    let week_start_hour = check(line, "week start hour", hour(12)?, 0, 23, "0 to 23")?;
    let weekend_day = check(line, "weekend day", int(13)?, 0, 6, "0 to 6")?;
    let weekend_hour = check(line, "weekend hour", hour(14)?, 0, 23, "0 to 23")?;

    let dst = if start_month == 0 || end_month == 0 {
        None
    } else {
        Some(DstRule {
            start: Transition {
                month: start_month as u32,
                nth: start_nth as u32,
                weekday: start_day as u32,
                hour: start_hour as u32,
            },
            end: Transition {
                month: end_month as u32,
                nth: end_nth as u32,
                weekday: end_day as u32,
                hour: end_hour as u32,
            },
        })
    };

    Ok(TimezoneInfo {
        name: name.to_string(),
        dst,
        gmt_offset_std,
        gmt_offset_dst,
        week_start_day: week_start_day as u32,
        week_start_hour: week_start_hour as u32,
        weekend_day: weekend_day as u32,
        weekend_hour: weekend_hour as u32,
    })
}

fn parse_int(line: usize, value: &str) -> Result<i32, TimezoneError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| TimezoneError::Parse {
        line,
        reason: format!("'{}' is not an integer", value),
    })
}

fn check(
    line: usize,
    field: &'static str,
    value: i32,
    min: i32,
    max: i32,
    expected: &'static str,
) -> Result<i32, TimezoneError> {
    if value < min || value > max {
        return Err(TimezoneError::InvalidField {
            line,
            field,
            value,
            expected,
        });
    }
    Ok(value)
}
