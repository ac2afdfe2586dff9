//! Абстракция локальных системных часов

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Источник локального времени в секундах Unix
pub trait LocalClock: Send + Sync {
    fn now(&self) -> i64;
}

impl<T: LocalClock + ?Sized> LocalClock for Arc<T> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}

/// Часы операционной системы
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Часы, которые идут только по команде (бэктесты, тесты)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, time: i64) {
        self.now.store(time, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl LocalClock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
