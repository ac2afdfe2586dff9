//! Сетевой уровень: один обмен NTP-пакетами за вызов

use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::debug;
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Runtime};

use super::packet::{self, NTP_PACKET_SIZE, NTP_PORT};
use crate::error::QueryError;

/// Источник ответа на вопрос "который час по мнению `server`".
///
/// Клиент владеет одним источником и никогда не вызывает его из двух потоков
/// одновременно, поэтому реализация может хранить изменяемое состояние
/// (сокет, рантайм).
pub trait TimeSource: Send {
    /// Запросить `server`, вернуть его transmit time в секундах Unix.
    fn query(&mut self, server: &str, timeout: Duration) -> Result<i64, QueryError>;
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn query(&mut self, server: &str, timeout: Duration) -> Result<i64, QueryError> {
        (**self).query(server, timeout)
    }
}

/// UDP-транспорт на однопоточном рантайме tokio.
///
/// Рантайм живёт столько же, сколько транспорт, и за один вызов `query`
/// выполняет ровно один обмен. Сокет открывается лениво и переиспользуется,
/// пока ошибка ввода-вывода его не закроет.
///
/// Весь обмен (DNS, отправка, ожидание ответа) ограничен одним таймаутом.
///
/// `query` блокирует вызывающий поток, поэтому из async-задачи его нужно
/// звать через `spawn_blocking`:
///
/// ```no_run
/// use std::time::Duration;
/// use asirikuy_time::{TimeSource, UdpTimeSource};
///
/// let mut source = UdpTimeSource::new();
/// let time = source.query("0.us.pool.ntp.org", Duration::from_millis(2000));
/// ```
pub struct UdpTimeSource {
    port: u16,
    // Удаляется раньше рантайма, в котором зарегистрирован
    socket: Option<UdpSocket>,
    runtime: Option<Runtime>,
}

impl UdpTimeSource {
    pub fn new() -> Self {
        Self::with_port(NTP_PORT)
    }

    /// Транспорт на нестандартный порт (локальные фейки, тесты)
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            runtime: None,
            socket: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn ensure_runtime(&mut self) -> Result<(), QueryError> {
        if self.runtime.is_none() {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| QueryError::Runtime(e.to_string()))?;
            self.runtime = Some(runtime);
        }
        Ok(())
    }
}

impl Default for UdpTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for UdpTimeSource {
    fn query(&mut self, server: &str, timeout: Duration) -> Result<i64, QueryError> {
        self.ensure_runtime()?;
        let port = self.port;
        let Self {
            runtime, socket, ..
        } = self;
        let Some(runtime) = runtime.as_ref() else {
            return Err(QueryError::Runtime("runtime unavailable".to_string()));
        };

        let result = runtime.block_on(within(timeout, exchange(&mut *socket, server, port)));
        match &result {
            // Переоткрыть сокет при следующем запросе
            Err(QueryError::Io(_)) => *socket = None,
            Err(QueryError::Timeout(_)) => {
                debug!("ntp query to {} timed out after {:?}", server, timeout);
            }
            _ => {}
        }
        result
    }
}

/// Выполнить `future` целиком не дольше `timeout`.
async fn within<T, F>(timeout: Duration, future: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout(timeout)),
    }
}

async fn resolve(server: &str, port: u16) -> Result<SocketAddr, QueryError> {
    let mut addrs = tokio::net::lookup_host((server, port))
        .await
        .map_err(|source| QueryError::Resolve {
            server: server.to_string(),
            source,
        })?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| QueryError::NoAddress(server.to_string()))
}

async fn exchange(
    socket: &mut Option<UdpSocket>,
    server: &str,
    port: u16,
) -> Result<i64, QueryError> {
    let target = resolve(server, port).await?;

    if socket.is_none() {
        *socket = Some(UdpSocket::bind(("0.0.0.0", 0)).await?);
    }
    let Some(sock) = socket.as_ref() else {
        return Err(QueryError::Runtime("socket unavailable".to_string()));
    };

    let request = packet::build_request();
    let sent_at = Instant::now();
    sock.send_to(&request, target).await?;

    let result = receive_reply(sock, target).await;

    debug!(
        "ntp exchange with {} ({}) finished in {:?}: {:?}",
        server,
        target,
        sent_at.elapsed(),
        result
    );
    result
}

async fn receive_reply(sock: &UdpSocket, target: SocketAddr) -> Result<i64, QueryError> {
    let mut buffer = [0u8; 512];
    loop {
        let (len, from) = sock.recv_from(&mut buffer).await?;
        // Сюда может долететь запоздавший ответ на прошлый, просроченный запрос
        if from != target {
            debug!("ignoring {} byte datagram from {} (waiting for {})", len, from, target);
            continue;
        }
        if len < NTP_PACKET_SIZE {
            return Err(QueryError::MalformedResponse(format!(
                "{} byte reply from {}",
                len, from
            )));
        }
        return packet::parse_response(&buffer[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn test_slow_stages_share_one_deadline() {
        let timeout = Duration::from_millis(200);
        let started = Instant::now();

        // Медленный "резолв" и медленное "ожидание ответа": каждое в пределах
        // таймаута, вместе дольше.
        let result: Result<i64, QueryError> = runtime().block_on(within(timeout, async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(1)
        }));

        assert!(matches!(result, Err(QueryError::Timeout(t)) if t == timeout));
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(290), "took {:?}", elapsed);
    }

    #[test]
    fn test_fast_exchange_passes_through() {
        let result = runtime().block_on(within(Duration::from_millis(500), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(7)
        }));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_unresolvable_name() {
        let mut source = UdpTimeSource::new();
        let result = source.query("no-such-host.invalid", Duration::from_millis(2_000));
        assert!(matches!(
            result,
            Err(QueryError::Resolve { .. } | QueryError::NoAddress(_) | QueryError::Timeout(_))
        ));
    }
}
