//! Система логирования с настройкой уровней через переменные окружения
//!
//! Уровень берётся из `RUST_LOG`, если переменная задана, иначе из
//! `LogConfig::level`.
//!
//! # Использование
//!
//! ```bash
//! # Только ошибки
//! RUST_LOG=error timesync now
//!
//! # Подробный лог NTP-клиента, остальное на info
//! RUST_LOG=info,asirikuy_time::ntp=debug timesync now
//!
//! # Проверка поясов брокеров
//! RUST_LOG=asirikuy_time::timezone=debug timesync tz -f broker-tz.csv -n GMT+2
//! ```

use std::env;
use std::fs::OpenOptions;
use std::io;

use env_logger::{Builder, Env, Target};

use crate::config::LogConfig;

/// Установить глобальный логгер.
///
/// Повторный вызов безопасен: остаётся первый установленный логгер.
/// Если задан `LogConfig::file`, строки дописываются в файл вместо stderr.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let env = Env::default().default_filter_or(config.level.as_str());
    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp_secs()
        .format_module_path(true)
        .format_target(false);

    if let Some(path) = &config.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    if builder.try_init().is_ok() {
        log::info!("logging initialised, level: {}", get_log_level(config));
    }
    Ok(())
}

/// Итоговая строка фильтра
pub fn get_log_level(config: &LogConfig) -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_file_sink_created() {
        let path = env::temp_dir().join(format!("asirikuy-log-{}.log", std::process::id()));
        let config = LogConfig {
            level: "debug".to_string(),
            file: Some(path.clone()),
        };
        assert!(init_logging(&config).is_ok());
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
