//! Таблицы смещений local / broker / reference и их проверка

use log::{debug, error};

use super::registry::{LOCAL_TIMEZONE, TimezoneRegistry};
use super::rules::{SECONDS_PER_HOUR, calculate_offsets, day_of_year, utc_to_timezone};
use crate::clock::LocalClock;
use crate::error::TimezoneError;
use crate::ntp::{TimeSource, TimeSyncClient};

/// Часы совпадают, если расходятся меньше чем на полчаса
pub const MATCHING_TIME_TOLERANCE_SECS: i64 = SECONDS_PER_HOUR / 2;

/// Смещения от GMT (в часах) по дням года для трёх поясов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TzOffsets {
    pub local: Vec<i32>,
    pub broker: Vec<i32>,
    pub reference: Vec<i32>,
}

impl TzOffsets {
    pub fn compute(
        time: i64,
        local: &super::TimezoneInfo,
        broker: &super::TimezoneInfo,
        reference: &super::TimezoneInfo,
    ) -> Result<Self, TimezoneError> {
        debug!(
            "calculating offsets for local '{}', broker '{}', reference '{}'",
            local.name, broker.name, reference.name
        );
        Ok(Self {
            local: calculate_offsets(time, local)?,
            broker: calculate_offsets(time, broker)?,
            reference: calculate_offsets(time, reference)?,
        })
    }

    /// Время сервера брокера в референсном поясе
    pub fn adjusted_broker_time(&self, broker_time: i64) -> Result<i64, TimezoneError> {
        let day = day_of_year(broker_time)?;
        let hours = self.reference[day] - self.broker[day];
        let adjusted = broker_time + hours as i64 * SECONDS_PER_HOUR;
        debug!(
            "day {}: reference offset {}, broker offset {}, broker time {} -> {}",
            day, self.reference[day], self.broker[day], broker_time, adjusted
        );
        Ok(adjusted)
    }

    /// Локальное UTC-время в референсном поясе
    pub fn adjusted_local_time(&self, local_utc: i64) -> Result<i64, TimezoneError> {
        let day = day_of_year(local_utc)?;
        let adjusted = local_utc + self.reference[day] as i64 * SECONDS_PER_HOUR;
        debug!(
            "day {}: reference offset {}, local offset {}, local time {} -> {}",
            day, self.reference[day], self.local[day], local_utc, adjusted
        );
        Ok(adjusted)
    }
}

pub fn is_matching_time(a: i64, b: i64) -> bool {
    (a - b).abs() < MATCHING_TIME_TOLERANCE_SECS
}

/// Проверка, что и локальная машина, и брокер совпадают с референсными
/// часами после перевода в референсный пояс.
///
/// Сначала проверяется локальное время, затем брокерское.
pub fn check_tz_validity(
    broker_time: i64,
    reference_time: i64,
    local_utc: i64,
    offsets: &TzOffsets,
) -> Result<(), TimezoneError> {
    let adjusted_local = offsets.adjusted_local_time(local_utc)?;
    let adjusted_broker = offsets.adjusted_broker_time(broker_time)?;

    if !is_matching_time(adjusted_local, reference_time) {
        error!(
            "local timezone mismatch: local(UTC) {}, broker {}, reference {}, adjusted local {}, adjusted broker {}",
            local_utc, broker_time, reference_time, adjusted_local, adjusted_broker
        );
        return Err(TimezoneError::LocalMismatch {
            adjusted_local,
            reference: reference_time,
        });
    }
    if !is_matching_time(adjusted_broker, reference_time) {
        error!(
            "broker timezone mismatch: local(UTC) {}, broker {}, reference {}, adjusted local {}, adjusted broker {}",
            local_utc, broker_time, reference_time, adjusted_local, adjusted_broker
        );
        return Err(TimezoneError::BrokerMismatch {
            adjusted_broker,
            reference: reference_time,
        });
    }

    debug!(
        "timezones consistent: local(UTC) {}, broker {}, reference {}",
        local_utc, broker_time, reference_time
    );
    Ok(())
}

/// Построить таблицы смещений для `broker` и `reference`; в живой торговле
/// дополнительно сверить их с оценкой времени по NTP.
///
/// В бэктесте (`is_backtesting`) сеть не трогается.
pub fn time_offsets<S: TimeSource, C: LocalClock>(
    broker_time: i64,
    registry: &TimezoneRegistry,
    broker: &str,
    reference: &str,
    is_backtesting: bool,
    time_client: &TimeSyncClient<S, C>,
) -> Result<TzOffsets, TimezoneError> {
    let local_tz = registry.get(LOCAL_TIMEZONE)?;
    let broker_tz = registry.get(broker)?;
    let reference_tz = registry.get(reference)?;

    let offsets = TzOffsets::compute(broker_time, local_tz, broker_tz, reference_tz)?;

    if !is_backtesting {
        let reference_time = utc_to_timezone(time_client.estimated_time(), reference_tz)?;
        check_tz_validity(broker_time, reference_time, time_client.local_time(), &offsets)?;
    }

    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::{TimezoneInfo, timestamp_of};

    fn offsets() -> TzOffsets {
        let time = timestamp_of(2024, 1, 10, 0).unwrap();
        TzOffsets::compute(
            time,
            &TimezoneInfo::fixed("Local", 0),
            &TimezoneInfo::fixed("Broker", 2),
            &TimezoneInfo::fixed("Reference", -5),
        )
        .unwrap()
    }

    #[test]
    fn test_adjusted_times() {
        let offsets = offsets();
        let utc = timestamp_of(2024, 1, 10, 12).unwrap();
        let broker_time = utc + 2 * 3_600;

        assert_eq!(offsets.adjusted_broker_time(broker_time).unwrap(), utc - 5 * 3_600);
        assert_eq!(offsets.adjusted_local_time(utc).unwrap(), utc - 5 * 3_600);
    }

    #[test]
    fn test_validity_ok() {
        let offsets = offsets();
        let utc = timestamp_of(2024, 1, 10, 12).unwrap();
        let reference = utc - 5 * 3_600;

        assert!(check_tz_validity(utc + 2 * 3_600, reference + 60, utc, &offsets).is_ok());
    }

    #[test]
    fn test_local_mismatch_reported_first() {
        let offsets = offsets();
        let utc = timestamp_of(2024, 1, 10, 12).unwrap();
        let reference = utc - 5 * 3_600;

        let result = check_tz_validity(utc, reference, utc + 3_600, &offsets);
        assert!(matches!(result, Err(TimezoneError::LocalMismatch { .. })));
    }

    #[test]
    fn test_broker_mismatch() {
        let offsets = offsets();
        let utc = timestamp_of(2024, 1, 10, 12).unwrap();
        let reference = utc - 5 * 3_600;

        // Часы брокера показывают GMT+3, а по таблице GMT+2
        let result = check_tz_validity(utc + 3 * 3_600, reference, utc, &offsets);
        assert!(matches!(result, Err(TimezoneError::BrokerMismatch { .. })));
    }

    #[test]
    fn test_matching_time_tolerance() {
        assert!(is_matching_time(0, 1_799));
        assert!(!is_matching_time(0, 1_800));
        assert!(is_matching_time(1_799, 0));
    }
}
