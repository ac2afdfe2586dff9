//! Сборка и разбор NTP-пакетов
//!
//! Только то, что нужно клиенту времени: запрос v4 в режиме client и
//! целые секунды transmit timestamp из ответа сервера.

use crate::error::QueryError;

/// Размер NTP-заголовка без расширений и MAC
pub const NTP_PACKET_SIZE: usize = 48;

/// Смещение transmit timestamp (секунды) в заголовке
pub const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

/// Секунд между 1900-01-01 (эра NTP 0) и 1970-01-01 (эпоха Unix)
pub const NTP_TO_UNIX_OFFSET: u32 = 2_208_988_800;

/// Стандартный порт NTP
pub const NTP_PORT: u16 = 123;

pub const LEAP_INDICATOR: u8 = 0;
pub const VERSION_NUMBER: u8 = 4;

/// Режимы ассоциации NTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    SymmetricActive = 1,
    SymmetricPassive = 2,
    Client = 3,
    Server = 4,
    Broadcast = 5,
}

impl Mode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SymmetricActive),
            2 => Some(Self::SymmetricPassive),
            3 => Some(Self::Client),
            4 => Some(Self::Server),
            5 => Some(Self::Broadcast),
            _ => None,
        }
    }
}

/// Первый байт заголовка: LI (2 бита) | VN (3 бита) | Mode (3 бита)
pub const fn first_byte(leap: u8, version: u8, mode: Mode) -> u8 {
    (leap << 6) | (version << 3) | mode as u8
}

/// Клиентский запрос: заполнен только первый байт, остальное нули
pub fn build_request() -> [u8; NTP_PACKET_SIZE] {
    let mut packet = [0u8; NTP_PACKET_SIZE];
    packet[0] = first_byte(LEAP_INDICATOR, VERSION_NUMBER, Mode::Client);
    packet
}

/// Сырые секунды transmit timestamp (эра NTP, сетевой порядок байт)
pub fn transmit_seconds(data: &[u8]) -> Result<u32, QueryError> {
    if data.len() < NTP_PACKET_SIZE {
        return Err(QueryError::MalformedResponse(format!(
            "expected {} bytes, got {}",
            NTP_PACKET_SIZE,
            data.len()
        )));
    }

    let field = &data[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4];
    Ok(u32::from_be_bytes([field[0], field[1], field[2], field[3]]))
}

/// Разобрать ответ сервера в секунды Unix.
///
/// Нулевой transmit timestamp значит, что сервер его не заполнил
/// (kiss-o'-death или несинхронизированный сервер) - такой ответ отбрасывается.
pub fn parse_response(data: &[u8]) -> Result<i64, QueryError> {
    let seconds = transmit_seconds(data)?;
    if seconds == 0 {
        return Err(QueryError::MalformedResponse(
            "zero transmit timestamp".to_string(),
        ));
    }

    Ok(ntp_to_unix(seconds))
}

/// Секунды эры NTP 0 в секунды Unix
pub const fn ntp_to_unix(seconds: u32) -> i64 {
    seconds as i64 - NTP_TO_UNIX_OFFSET as i64
}

/// Секунды Unix в секунды эры NTP 0 (с переполнением на границе эры)
pub const fn unix_to_ntp(seconds: i64) -> u32 {
    (seconds + NTP_TO_UNIX_OFFSET as i64) as u32
}

/// Минимальный ответ в режиме server с `unix_time` в transmit timestamp.
/// Нужен локальным фейковым серверам и тестам.
pub fn build_server_reply(unix_time: i64) -> [u8; NTP_PACKET_SIZE] {
    let mut packet = [0u8; NTP_PACKET_SIZE];
    packet[0] = first_byte(LEAP_INDICATOR, VERSION_NUMBER, Mode::Server);
    // Stratum 2
    packet[1] = 2;
    packet[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4]
        .copy_from_slice(&unix_to_ntp(unix_time).to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let packet = build_request();

        assert_eq!(packet.len(), 48);
        assert_eq!(packet[0], 0x23);
        assert!(packet[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_first_byte_fields() {
        let byte = first_byte(0, 4, Mode::Client);
        assert_eq!(byte >> 6, 0);
        assert_eq!((byte >> 3) & 0x07, 4);
        assert_eq!(Mode::from_u8(byte & 0x07), Some(Mode::Client));
    }

    #[test]
    fn test_parse_known_timestamp() {
        let mut data = [0u8; 48];
        // 2024-01-01T00:00:00Z = 1704067200 Unix = 3913056000 NTP
        data[40..44].copy_from_slice(&3_913_056_000u32.to_be_bytes());

        assert_eq!(parse_response(&data).unwrap(), 1_704_067_200);
    }

    #[test]
    fn test_parse_ignores_fraction() {
        let mut data = build_server_reply(1_700_000_000);
        data[44..48].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());

        assert_eq!(parse_response(&data).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_short_response_rejected() {
        let data = [0u8; 40];
        assert!(matches!(
            parse_response(&data),
            Err(QueryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_zero_timestamp_rejected() {
        let data = [0u8; 48];
        assert!(parse_response(&data).is_err());
    }

    #[test]
    fn test_mode_from_u8() {
        assert_eq!(Mode::from_u8(4), Some(Mode::Server));
        assert_eq!(Mode::from_u8(0), None);
        assert_eq!(Mode::from_u8(7), None);
    }
}
