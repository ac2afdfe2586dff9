//! Работа со временем для торгового фреймворка: NTP-клиент с проверкой
//! консенсуса и компенсацией скачков часов, смещения поясов брокеров
//! и границы торговой недели.

pub mod clock;
pub mod config;
pub mod error;
pub mod ntp;
pub mod timezone;
pub mod trading_week;
pub mod utils;

pub use clock::{LocalClock, ManualClock, SystemClock};
pub use config::{AppConfig, LogConfig, ServerPoolConfig, TimeSyncConfig, TradingWeekConfig};
pub use error::{ConfigError, QueryError, TimezoneError};
pub use ntp::{TimeSource, TimeSyncClient, UdpTimeSource};
pub use trading_week::TradingWeekBoundaries;
