use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Жёсткий максимум референсных времён на одно обновление
pub const MAX_REFERENCE_TIMES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPoolConfig {
    /// Имена генерируются как `{0..prefix_count}.{country}.{domain}`
    #[serde(default = "default_prefix_count")]
    pub prefix_count: u32,
    #[serde(default = "default_country_codes")]
    pub country_codes: Vec<String>,
    #[serde(default = "default_pool_domain")]
    pub domain: String,
}

fn default_prefix_count() -> u32 {
    4
}

fn default_country_codes() -> Vec<String> {
    vec!["ca".to_string(), "us".to_string()]
}

fn default_pool_domain() -> String {
    "pool.ntp.org".to_string()
}

impl Default for ServerPoolConfig {
    fn default() -> Self {
        Self {
            prefix_count: default_prefix_count(),
            country_codes: default_country_codes(),
            domain: default_pool_domain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncConfig {
    /// Секунд между обращениями к сети
    #[serde(default = "default_update_interval", alias = "update_interval")]
    pub update_interval_secs: u64,
    /// Миллисекунд на ответ одного сервера (DNS + обмен)
    #[serde(default = "default_ntp_timeout", alias = "ntp_timeout")]
    pub ntp_timeout_ms: u64,
    /// Размер кворума, не больше [`MAX_REFERENCE_TIMES`]
    #[serde(default = "default_reference_times")]
    pub total_reference_times: usize,
    /// Сдаться на слоте кворума после стольких неудачных серверов.
    /// `None` - пробовать бесконечно.
    #[serde(default)]
    pub max_attempts_per_slot: Option<u32>,
    #[serde(default = "default_ntp_port")]
    pub port: u16,
    #[serde(default)]
    pub server_pool: ServerPoolConfig,
}

fn default_update_interval() -> u64 {
    300
}

fn default_ntp_timeout() -> u64 {
    2000
}

fn default_reference_times() -> usize {
    4
}

fn default_ntp_port() -> u16 {
    crate::ntp::packet::NTP_PORT
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            ntp_timeout_ms: default_ntp_timeout(),
            total_reference_times: default_reference_times(),
            max_attempts_per_slot: None,
            port: default_ntp_port(),
            server_pool: ServerPoolConfig::default(),
        }
    }
}

impl TimeSyncConfig {
    /// Размер кворума в пределах `1..=MAX_REFERENCE_TIMES`
    pub fn quorum_size(&self) -> usize {
        clamp_reference_times(self.total_reference_times)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ntp_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "ntp.ntp_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.total_reference_times == 0 || self.total_reference_times > MAX_REFERENCE_TIMES {
            return Err(ConfigError::Invalid {
                field: "ntp.total_reference_times",
                reason: format!("must be between 1 and {}", MAX_REFERENCE_TIMES),
            });
        }
        if self.max_attempts_per_slot == Some(0) {
            return Err(ConfigError::Invalid {
                field: "ntp.max_attempts_per_slot",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        if self.server_pool.domain.trim_matches('.').is_empty() {
            return Err(ConfigError::Invalid {
                field: "ntp.server_pool.domain",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn clamp_reference_times(total: usize) -> usize {
    total.clamp(1, MAX_REFERENCE_TIMES)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingWeekConfig {
    /// Сколько часов срезать с начала понедельника
    #[serde(default = "default_crop_hours")]
    pub crop_monday_hours: u32,
    /// Сколько часов срезать с конца пятницы
    #[serde(default = "default_crop_hours")]
    pub crop_friday_hours: u32,
    /// Бары до этого часа каждого дня вне сессии
    #[serde(default)]
    pub session_start_hour: u32,
    /// Символы, которые торгуются и в выходные
    #[serde(default = "default_weekend_symbols")]
    pub weekend_symbols: Vec<String>,
}

fn default_crop_hours() -> u32 {
    4
}

fn default_weekend_symbols() -> Vec<String> {
    vec!["BTCUSD".to_string(), "ETHUSD".to_string()]
}

impl Default for TradingWeekConfig {
    fn default() -> Self {
        Self {
            crop_monday_hours: default_crop_hours(),
            crop_friday_hours: default_crop_hours(),
            session_start_hour: 0,
            weekend_symbols: default_weekend_symbols(),
        }
    }
}

impl TradingWeekConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("trading_week.crop_monday_hours", self.crop_monday_hours),
            ("trading_week.crop_friday_hours", self.crop_friday_hours),
            ("trading_week.session_start_hour", self.session_start_hour),
        ] {
            if value > 23 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is not an hour of the day", value),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Фильтр по умолчанию, если RUST_LOG не задан
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Дописывать логи в этот файл вместо stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ntp: TimeSyncConfig,
    #[serde(default)]
    pub trading_week: TradingWeekConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Таблица поясов через точку с запятой (broker-tz.csv)
    #[serde(default)]
    pub timezone_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Прочитать YAML и применить переопределения из `ASIRIKUY_*`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_yaml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Значения по умолчанию плюс переменные окружения, без файла.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ASIRIKUY_NTP_UPDATE_INTERVAL") {
            self.ntp.update_interval_secs = parse_env("ASIRIKUY_NTP_UPDATE_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("ASIRIKUY_NTP_TIMEOUT_MS") {
            self.ntp.ntp_timeout_ms = parse_env("ASIRIKUY_NTP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("ASIRIKUY_NTP_REFERENCE_TIMES") {
            self.ntp.total_reference_times = parse_env("ASIRIKUY_NTP_REFERENCE_TIMES", &value)?;
        }
        if let Some(value) = lookup("ASIRIKUY_NTP_MAX_ATTEMPTS") {
            self.ntp.max_attempts_per_slot = Some(parse_env("ASIRIKUY_NTP_MAX_ATTEMPTS", &value)?);
        }
        if let Some(value) = lookup("ASIRIKUY_LOG_FILE") {
            self.log.file = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ntp.validate()?;
        self.trading_week.validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("'{}': {}", value, e),
    })
}
