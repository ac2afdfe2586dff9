//! Правила летнего времени и перевод из UTC

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::error::TimezoneError;

pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const DAYS_PER_LEAP_YEAR: usize = 366;

/// Один переход: `nth`-й `weekday` месяца `month` в `hour` часов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// 1 = январь
    pub month: u32,
    /// 1..=4, или 0 - последний такой день месяца
    pub nth: u32,
    /// 0 = воскресенье
    pub weekday: u32,
    pub hour: u32,
}

impl Transition {
    /// Календарная дата перехода в году `year`
    pub fn date_in(&self, year: i32) -> Option<NaiveDate> {
        let weekday = weekday_from_sunday(self.weekday)?;
        if self.nth > 0 {
            return NaiveDate::from_weekday_of_month_opt(year, self.month, weekday, self.nth as u8);
        }

        // Идём назад от последнего дня месяца
        let next_month = if self.month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, self.month + 1, 1)?
        };
        let mut day = next_month.pred_opt()?;
        while day.weekday() != weekday {
            day = day.pred_opt()?;
        }
        Some(day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstRule {
    pub start: Transition,
    pub end: Transition,
}

/// Именованный пояс из таблицы поясов брокеров
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneInfo {
    pub name: String,
    /// `None`, если пояс не переходит на летнее время
    pub dst: Option<DstRule>,
    /// Смещение от GMT зимой
    pub gmt_offset_std: i32,
    /// Смещение от GMT летом
    pub gmt_offset_dst: i32,
    pub week_start_day: u32,
    pub week_start_hour: u32,
    pub weekend_day: u32,
    pub weekend_hour: u32,
}

impl TimezoneInfo {
    /// Пояс с фиксированным смещением, без летнего времени
    pub fn fixed(name: &str, gmt_offset: i32) -> Self {
        Self {
            name: name.to_string(),
            dst: None,
            gmt_offset_std: gmt_offset,
            gmt_offset_dst: gmt_offset,
            week_start_day: 0,
            week_start_hour: 0,
            weekend_day: 5,
            weekend_hour: 0,
        }
    }

    /// Смещение от GMT (часы), действующее в момент `time`
    pub fn gmt_offset_at(&self, time: i64) -> Result<i32, TimezoneError> {
        let Some(rule) = &self.dst else {
            return Ok(self.gmt_offset_std);
        };
        let (start, end) = dst_start_end_days(time, rule)?;
        if is_dst(start, end, day_of_year(time)?) {
            Ok(self.gmt_offset_dst)
        } else {
            Ok(self.gmt_offset_std)
        }
    }
}

fn weekday_from_sunday(day: u32) -> Option<Weekday> {
    match day {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub(crate) fn to_datetime(time: i64) -> Result<DateTime<Utc>, TimezoneError> {
    DateTime::from_timestamp(time, 0).ok_or(TimezoneError::InvalidDate(time))
}

/// День года с нуля (UTC)
pub fn day_of_year(time: i64) -> Result<usize, TimezoneError> {
    Ok(to_datetime(time)?.ordinal0() as usize)
}

/// Дни года (с нуля) начала и конца летнего времени для года,
/// в который попадает `time`.
pub fn dst_start_end_days(time: i64, rule: &DstRule) -> Result<(usize, usize), TimezoneError> {
    let year = to_datetime(time)?.year();
    let start = rule
        .start
        .date_in(year)
        .ok_or(TimezoneError::InvalidDate(time))?;
    let end = rule
        .end
        .date_in(year)
        .ok_or(TimezoneError::InvalidDate(time))?;

    Ok((start.ordinal0() as usize, end.ordinal0() as usize))
}

/// Попадает ли `day_of_year` в период летнего времени. Час перехода
/// не учитывается: переходы бывают в выходные, когда торгов нет.
pub fn is_dst(dst_start_day: usize, dst_end_day: usize, day_of_year: usize) -> bool {
    if dst_start_day < dst_end_day {
        day_of_year >= dst_start_day && day_of_year < dst_end_day
    } else {
        // Южное полушарие: период переходит через Новый год
        day_of_year >= dst_start_day || day_of_year < dst_end_day
    }
}

/// Перевести метку UTC в местное время пояса `tz`
pub fn utc_to_timezone(time: i64, tz: &TimezoneInfo) -> Result<i64, TimezoneError> {
    let offset = tz.gmt_offset_at(time)?;
    Ok(time + offset as i64 * SECONDS_PER_HOUR)
}

/// Смещение от GMT на каждый день года, в который попадает `time`;
/// индекс - день года с нуля.
pub fn calculate_offsets(time: i64, tz: &TimezoneInfo) -> Result<Vec<i32>, TimezoneError> {
    let Some(rule) = &tz.dst else {
        return Ok(vec![tz.gmt_offset_std; DAYS_PER_LEAP_YEAR]);
    };
    let (start, end) = dst_start_end_days(time, rule)?;

    Ok((0..DAYS_PER_LEAP_YEAR)
        .map(|day| {
            if is_dst(start, end, day) {
                tz.gmt_offset_dst
            } else {
                tz.gmt_offset_std
            }
        })
        .collect())
}

/// Метка UTC для даты и часа (тесты, CLI)
pub fn timestamp_of(year: i32, month: u32, day: u32, hour: u32) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = date.and_hms_opt(0, 0, 0)? + Duration::hours(hour as i64);
    Some(time.and_utc().timestamp())
}
