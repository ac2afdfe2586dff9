//! Кешированная оценка точного UTC-времени с проверкой консенсуса

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use super::servers::ServerPool;
use super::transport::{TimeSource, UdpTimeSource};
use crate::clock::{LocalClock, SystemClock};
use crate::config::{TimeSyncConfig, clamp_reference_times};
use crate::error::QueryError;

/// Изменение локальных часов больше этого порога считается скачком
/// (переход на летнее время, ручная правка), а не прошедшим временем.
pub const CLOCK_JUMP_THRESHOLD_SECS: i64 = 30 * 60;

const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

/// Изменяемая часть клиента под refresh-блокировкой
#[derive(Debug, Clone)]
pub struct ClockState {
    /// Локальное время последнего принятого обновления
    pub last_refresh_local_time: Option<i64>,
    /// Локальное время предыдущего вызова
    pub last_local_time: Option<i64>,
    /// `оценка точного времени - локальное время`
    pub cached_offset: i64,
    pub refresh_interval_secs: u64,
    pub query_timeout_ms: u64,
    pub quorum_size: usize,
    committed_refreshes: u64,
    rejected_refreshes: u64,
}

impl ClockState {
    fn new(config: &TimeSyncConfig) -> Self {
        Self {
            last_refresh_local_time: None,
            last_local_time: None,
            cached_offset: 0,
            refresh_interval_secs: config.update_interval_secs,
            query_timeout_ms: config.ntp_timeout_ms,
            quorum_size: config.quorum_size(),
            committed_refreshes: 0,
            rejected_refreshes: 0,
        }
    }

    /// Компенсировать скачок локальных часов, чтобы оценка времени
    /// оставалась непрерывной. Возвращает величину скачка, если он был.
    pub fn compensate_clock_jump(&mut self, local: i64) -> Option<i64> {
        let previous = self.last_local_time.replace(local)?;
        let delta = local - previous;
        if delta.abs() <= CLOCK_JUMP_THRESHOLD_SECS {
            return None;
        }

        self.cached_offset -= delta;
        // Расписание обновлений сдвигается вместе с часами
        if let Some(refreshed) = self.last_refresh_local_time.as_mut() {
            *refreshed += delta;
        }
        Some(delta)
    }

    pub fn refresh_due(&self, local: i64) -> bool {
        match self.last_refresh_local_time {
            None => true,
            Some(refreshed) => {
                local.saturating_sub(refreshed) >= self.refresh_interval_secs as i64
            }
        }
    }

    pub fn estimate(&self, local: i64) -> i64 {
        local + self.cached_offset
    }

    fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Почему обновление не изменило смещение
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRejection {
    /// Референсные времена расходятся по часу
    NoConsensus(Vec<i64>),
    /// `max_attempts_per_slot` серверов подряд не ответили для одного слота
    SlotExhausted { slot: usize, attempts: u32 },
}

/// Снимок состояния клиента для диагностики
#[derive(Debug, Clone, Serialize)]
pub struct TimeSyncStatus {
    pub local_time: i64,
    pub estimated_time: i64,
    pub offset_secs: i64,
    pub last_refresh_local_time: Option<i64>,
    pub refresh_interval_secs: u64,
    pub query_timeout_ms: u64,
    pub quorum_size: usize,
    pub committed_refreshes: u64,
    pub rejected_refreshes: u64,
    pub queries: u64,
    pub failed_queries: u64,
}

/// Все референсные времена положительны и попадают в один и тот же
/// час суток (минуты и секунды не учитываются).
pub fn is_matching_hours(times: &[i64]) -> bool {
    let Some(first) = times.first() else {
        return false;
    };
    let hour = hour_of_day(*first);
    times.iter().all(|t| *t > 0 && hour_of_day(*t) == hour)
}

fn hour_of_day(time: i64) -> i64 {
    time.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR
}

/// NTP-клиент времени.
///
/// `estimated_time` возвращает `local + offset` и идёт в сеть только
/// по истечении интервала обновления. Обновление опрашивает `quorum_size`
/// случайных серверов пула и принимает новое смещение, только если все
/// совпадают по часу. Блокировок две: refresh вокруг [`ClockState`]
/// (держится только на O(1) работу) и query вокруг транспорта
/// (один обмен в полёте на клиента).
///
/// ```no_run
/// use asirikuy_time::{TimeSyncClient, TimeSyncConfig};
///
/// let client = TimeSyncClient::new(&TimeSyncConfig::default());
/// let now = client.estimated_time();
/// ```
pub struct TimeSyncClient<S = UdpTimeSource, C = SystemClock> {
    state: Mutex<ClockState>,
    transport: Mutex<S>,
    clock: C,
    pool: ServerPool,
    max_attempts_per_slot: Option<u32>,
    refreshing: AtomicBool,
    queries: AtomicU64,
    failed_queries: AtomicU64,
}

impl TimeSyncClient {
    /// Клиент публичного NTP-пула по UDP
    pub fn new(config: &TimeSyncConfig) -> Self {
        Self::with_parts(config, UdpTimeSource::with_port(config.port), SystemClock)
    }
}

impl<S: TimeSource, C: LocalClock> TimeSyncClient<S, C> {
    pub fn with_parts(config: &TimeSyncConfig, transport: S, clock: C) -> Self {
        info!(
            "time client created: update interval {}s, timeout {}ms, {} reference times",
            config.update_interval_secs,
            config.ntp_timeout_ms,
            config.quorum_size()
        );
        Self {
            state: Mutex::new(ClockState::new(config)),
            transport: Mutex::new(transport),
            clock,
            pool: ServerPool::new(&config.server_pool),
            max_attempts_per_slot: config.max_attempts_per_slot,
            refreshing: AtomicBool::new(false),
            queries: AtomicU64::new(0),
            failed_queries: AtomicU64::new(0),
        }
    }

    /// Лучшая оценка текущего UTC-времени в секундах Unix. Никогда не падает.
    pub fn estimated_time(&self) -> i64 {
        let local = self.clock.now();
        {
            let mut state = self.lock_state();
            if let Some(delta) = state.compensate_clock_jump(local) {
                info!(
                    "local clock jumped by {}s, offset adjusted to {}s",
                    delta, state.cached_offset
                );
            }
            if !state.refresh_due(local) {
                return state.estimate(local);
            }
        }

        // Обновление уже идёт в другом потоке: отдаём то, что есть
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.lock_state().estimate(local);
        }
        let _refreshing = RefreshFlag(&self.refreshing);

        let (quorum, timeout) = {
            let state = self.lock_state();
            (state.quorum_size, state.query_timeout())
        };
        let outcome = self.collect_reference_times(quorum, timeout).and_then(|times| {
            if is_matching_hours(&times) {
                Ok(times)
            } else {
                Err(RefreshRejection::NoConsensus(times))
            }
        });

        let mut state = self.lock_state();
        match outcome {
            Ok(times) => {
                state.cached_offset = times[0] - local;
                state.last_refresh_local_time = Some(local);
                state.committed_refreshes += 1;
                info!(
                    "ntp refresh committed: offset {}s from {} reference times",
                    state.cached_offset,
                    times.len()
                );
            }
            Err(rejection) => {
                state.rejected_refreshes += 1;
                warn!(
                    "ntp refresh rejected ({:?}), keeping offset {}s",
                    rejection, state.cached_offset
                );
            }
        }
        debug!("estimated time = {}", state.estimate(local));
        state.estimate(local)
    }

    /// Опросить один сервер. Возвращает секунды Unix или 0, если сервер
    /// не ответил пригодным временем.
    pub fn query_server(&self, server: &str) -> i64 {
        match self.try_query_server(server) {
            Ok(time) => time,
            Err(e) => {
                debug!("ntp query to {} failed: {}", server, e);
                0
            }
        }
    }

    pub fn try_query_server(&self, server: &str) -> Result<i64, QueryError> {
        let timeout = self.lock_state().query_timeout();
        self.query_with_timeout(server, timeout)
    }

    fn query_with_timeout(&self, server: &str, timeout: Duration) -> Result<i64, QueryError> {
        let mut transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.queries.fetch_add(1, Ordering::Relaxed);

        let result = transport.query(server, timeout).and_then(|time| {
            if time > 0 {
                Ok(time)
            } else {
                Err(QueryError::MalformedResponse(format!(
                    "non-positive time {}",
                    time
                )))
            }
        });
        match &result {
            Ok(time) => debug!("ntp time from {} = {}", server, time),
            Err(_) => {
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn collect_reference_times(
        &self,
        quorum: usize,
        timeout: Duration,
    ) -> Result<Vec<i64>, RefreshRejection> {
        let mut rng = rand::thread_rng();
        let mut times = Vec::with_capacity(quorum);

        for slot in 0..quorum {
            let mut attempts = 0u32;
            let mut failed: Option<String> = None;
            loop {
                if let Some(max) = self.max_attempts_per_slot {
                    if attempts >= max {
                        return Err(RefreshRejection::SlotExhausted { slot, attempts });
                    }
                }
                let server = self.pool.pick_excluding(&mut rng, failed.as_deref());
                attempts += 1;

                match self.query_with_timeout(&server, timeout) {
                    Ok(time) => {
                        times.push(time);
                        break;
                    }
                    Err(e) => {
                        debug!("slot {} attempt {}: {} failed: {}", slot, attempts, server, e);
                        failed = Some(server);
                    }
                }
            }
        }

        Ok(times)
    }

    pub fn set_update_interval(&self, seconds: u64) {
        self.lock_state().refresh_interval_secs = seconds;
    }

    pub fn set_ntp_timeout(&self, milliseconds: u64) {
        self.lock_state().query_timeout_ms = milliseconds;
    }

    /// Размер кворума, ограничивается `1..=MAX_REFERENCE_TIMES`
    pub fn set_total_reference_times(&self, total: usize) {
        let clamped = clamp_reference_times(total);
        if clamped != total {
            warn!("total reference times {} clamped to {}", total, clamped);
        }
        self.lock_state().quorum_size = clamped;
    }

    /// Показания локальных часов без смещения
    pub fn local_time(&self) -> i64 {
        self.clock.now()
    }

    /// Текущее смещение без сети и без детектора скачков
    pub fn cached_offset(&self) -> i64 {
        self.lock_state().cached_offset
    }

    pub fn status(&self) -> TimeSyncStatus {
        let local = self.clock.now();
        let state = self.lock_state();
        TimeSyncStatus {
            local_time: local,
            estimated_time: state.estimate(local),
            offset_secs: state.cached_offset,
            last_refresh_local_time: state.last_refresh_local_time,
            refresh_interval_secs: state.refresh_interval_secs,
            query_timeout_ms: state.query_timeout_ms,
            quorum_size: state.quorum_size,
            committed_refreshes: state.committed_refreshes,
            rejected_refreshes: state.rejected_refreshes,
            queries: self.queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Сбрасывает флаг обновления при выходе, в том числе при панике
struct RefreshFlag<'a>(&'a AtomicBool);

impl Drop for RefreshFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

static GLOBAL: OnceLock<TimeSyncClient> = OnceLock::new();

/// Установить глобальный клиент процесса. Повторные вызовы возвращают
/// первый экземпляр и игнорируют конфиг.
pub fn init_global(config: &TimeSyncConfig) -> &'static TimeSyncClient {
    GLOBAL.get_or_init(|| TimeSyncClient::new(config))
}

/// Глобальный клиент, если [`init_global`] уже вызывался
pub fn global() -> Option<&'static TimeSyncClient> {
    GLOBAL.get()
}
