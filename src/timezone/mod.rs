//! Часовые пояса брокеров: правила перехода на летнее время, таблица поясов
//! и проверка смещений local / broker / reference.

pub mod offsets;
pub mod registry;
pub mod rules;

pub use offsets::{TzOffsets, check_tz_validity, is_matching_time, time_offsets};
pub use registry::{LOCAL_TIMEZONE, TimezoneRegistry, UTC_TIMEZONE};
pub use rules::{
    DstRule, TimezoneInfo, Transition, calculate_offsets, day_of_year, dst_start_end_days, is_dst,
    timestamp_of, utc_to_timezone,
};
