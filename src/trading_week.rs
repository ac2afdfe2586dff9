//! Границы торговой недели и сессии (всё время в UTC)

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use log::debug;
use serde::Serialize;

use crate::config::TradingWeekConfig;

#[derive(Debug, Clone)]
pub struct TradingWeekBoundaries {
    crop_monday_hours: u32,
    crop_friday_hours: u32,
    session_start_hour: u32,
    weekend_symbols: Vec<String>,
}

/// Все проверки для одного момента времени, для отчёта
#[derive(Debug, Clone, Serialize)]
pub struct TradingTimeReport {
    pub time: i64,
    pub utc: String,
    pub symbol: String,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub outside_week_boundaries: bool,
    pub outside_session: bool,
    pub valid: bool,
}

impl Default for TradingWeekBoundaries {
    fn default() -> Self {
        Self::new(&TradingWeekConfig::default())
    }
}

impl TradingWeekBoundaries {
    pub fn new(config: &TradingWeekConfig) -> Self {
        Self {
            crop_monday_hours: config.crop_monday_hours,
            crop_friday_hours: config.crop_friday_hours,
            session_start_hour: config.session_start_hour,
            weekend_symbols: config.weekend_symbols.clone(),
        }
    }

    pub fn set_crop_hours(&mut self, monday: u32, friday: u32) {
        self.crop_monday_hours = monday;
        self.crop_friday_hours = friday;
    }

    pub fn is_weekend(&self, time: i64) -> bool {
        utc(time).is_some_and(|t| matches!(t.weekday(), Weekday::Sat | Weekday::Sun))
    }

    /// Первые часы понедельника или последние часы пятницы, срезанные с недели
    pub fn is_outside_trading_week_boundaries(&self, time: i64) -> bool {
        let Some(t) = utc(time) else {
            return true;
        };
        let outside = match t.weekday() {
            Weekday::Mon => t.hour() < self.crop_monday_hours,
            Weekday::Fri => t.hour() > 23u32.saturating_sub(self.crop_friday_hours),
            _ => false,
        };
        debug!(
            "week boundaries check at {}: {:?} {}h outside={}",
            t, t.weekday(), t.hour(), outside
        );
        outside
    }

    /// Рождество и Новый год
    pub fn is_forex_broker_holiday(&self, time: i64) -> bool {
        utc(time).is_some_and(|t| {
            matches!((t.month(), t.day()), (12, 25) | (1, 1))
        })
    }

    pub fn is_outside_trading_boundaries(&self, time: i64) -> bool {
        let Some(t) = utc(time) else {
            return true;
        };
        let outside = t.hour() < self.session_start_hour;
        if outside {
            debug!("{} is before session start hour {}", t, self.session_start_hour);
        }
        outside
    }

    /// Торговать можно, если не выходной, не праздник и сессия уже началась.
    /// Символы, торгуемые в выходные (крипта), в выходные разрешены.
    pub fn is_valid_trading_time(&self, symbol: &str, time: i64) -> bool {
        let weekend = self.is_weekend(time);
        let blocked = weekend
            || self.is_forex_broker_holiday(time)
            || self.is_outside_trading_boundaries(time);
        !blocked || (weekend && self.trades_on_weekend(symbol))
    }

    pub fn trades_on_weekend(&self, symbol: &str) -> bool {
        self.weekend_symbols
            .iter()
            .any(|pattern| symbol.contains(pattern.as_str()))
    }

    pub fn report(&self, symbol: &str, time: i64) -> TradingTimeReport {
        TradingTimeReport {
            time,
            utc: utc(time)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "out of range".to_string()),
            symbol: symbol.to_string(),
            is_weekend: self.is_weekend(time),
            is_holiday: self.is_forex_broker_holiday(time),
            outside_week_boundaries: self.is_outside_trading_week_boundaries(time),
            outside_session: self.is_outside_trading_boundaries(time),
            valid: self.is_valid_trading_time(symbol, time),
        }
    }
}

fn utc(time: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::timestamp_of;

    fn boundaries() -> TradingWeekBoundaries {
        TradingWeekBoundaries::default()
    }

    #[test]
    fn test_weekend() {
        let b = boundaries();
        // 2024-06-08 - суббота
        assert!(b.is_weekend(timestamp_of(2024, 6, 8, 12).unwrap()));
        assert!(b.is_weekend(timestamp_of(2024, 6, 9, 23).unwrap()));
        assert!(!b.is_weekend(timestamp_of(2024, 6, 10, 0).unwrap()));
    }

    #[test]
    fn test_week_boundaries_crop() {
        let b = boundaries();
        assert!(b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 10, 3).unwrap()));
        assert!(!b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 10, 4).unwrap()));
        assert!(!b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 14, 19).unwrap()));
        assert!(b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 14, 20).unwrap()));
        assert!(!b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 12, 1).unwrap()));
    }

    #[test]
    fn test_set_crop_hours() {
        let mut b = boundaries();
        b.set_crop_hours(0, 0);
        assert!(!b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 10, 0).unwrap()));
        assert!(!b.is_outside_trading_week_boundaries(timestamp_of(2024, 6, 14, 23).unwrap()));
    }

    #[test]
    fn test_holidays() {
        let b = boundaries();
        assert!(b.is_forex_broker_holiday(timestamp_of(2024, 12, 25, 10).unwrap()));
        assert!(b.is_forex_broker_holiday(timestamp_of(2025, 1, 1, 0).unwrap()));
        assert!(!b.is_forex_broker_holiday(timestamp_of(2024, 12, 24, 23).unwrap()));
    }

    #[test]
    fn test_valid_trading_time() {
        let b = boundaries();
        let saturday = timestamp_of(2024, 6, 8, 12).unwrap();
        let tuesday = timestamp_of(2024, 6, 11, 12).unwrap();
        let christmas = timestamp_of(2024, 12, 25, 12).unwrap();

        assert!(b.is_valid_trading_time("EURUSD", tuesday));
        assert!(!b.is_valid_trading_time("EURUSD", saturday));
        assert!(b.is_valid_trading_time("BTCUSD", saturday));
        assert!(b.is_valid_trading_time("ETHUSDm", saturday));
        assert!(!b.is_valid_trading_time("BTCUSD", christmas));
    }

    #[test]
    fn test_session_start_hour() {
        let config = TradingWeekConfig {
            session_start_hour: 1,
            ..TradingWeekConfig::default()
        };
        let b = TradingWeekBoundaries::new(&config);
        let early = timestamp_of(2024, 6, 11, 0).unwrap();

        assert!(b.is_outside_trading_boundaries(early));
        assert!(!b.is_valid_trading_time("EURUSD", early));
        assert!(b.is_valid_trading_time("EURUSD", early + 3_600));
    }
}
