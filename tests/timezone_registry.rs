//! Broker timezone table loaded from disk and checked against a time client

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use asirikuy_time::timezone::{TimezoneRegistry, time_offsets, timestamp_of};
use asirikuy_time::{
    ManualClock, QueryError, TimeSource, TimeSyncClient, TimeSyncConfig, TimezoneError,
};

const TABLE: &str = "\
Name;StartMonth;StartNth;StartDay;StartHour;EndMonth;EndNth;EndDay;EndHour;GMTStd;GMTDST;WeekStartDay;WeekStartHour;WeekendDay;WeekendHour
\"Local\";0;0;0;0:00;0;0;0;0:00;0;0;0;0:00;5;0:00
\"Europe Broker\";3;0;0;1:00;10;0;0;1:00;2;3;0;0:00;5;23:00
\"US Eastern\";3;2;0;2:00;11;1;0;2:00;-5;-4;0;17:00;5;17:00
# commented out
\"Tokyo\";0;0;0;0:00;0;0;0;0:00;9;9;1;0:00;5;0:00
";

/// Always reports a fixed UTC time.
struct FixedSource(i64);

impl TimeSource for FixedSource {
    fn query(&mut self, _server: &str, _timeout: Duration) -> Result<i64, QueryError> {
        Ok(self.0)
    }
}

fn table_file(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "broker-tz-{}-{}.csv",
        tag,
        std::process::id()
    ));
    fs::write(&path, TABLE).unwrap();
    path
}

fn client(true_utc: i64, local: i64) -> TimeSyncClient<FixedSource, Arc<ManualClock>> {
    TimeSyncClient::with_parts(
        &TimeSyncConfig::default(),
        FixedSource(true_utc),
        Arc::new(ManualClock::new(local)),
    )
}

#[test]
fn test_load_from_file() {
    let path = table_file("load");
    let registry = TimezoneRegistry::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(registry.len(), 4);
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["Local", "Europe Broker", "US Eastern", "Tokyo"]
    );
    assert_eq!(registry.get("Tokyo").unwrap().gmt_offset_std, 9);
}

#[test]
fn test_missing_file() {
    let result = TimezoneRegistry::load("/nonexistent/broker-tz.csv");
    assert!(matches!(result, Err(TimezoneError::Io(_))));
}

#[test]
fn test_live_offsets_consistent() {
    let registry = TimezoneRegistry::parse(TABLE).unwrap();
    let utc = timestamp_of(2024, 7, 10, 12).unwrap();
    let broker_time = utc + 3 * 3_600;
    let client = client(utc, utc);

    let offsets =
        time_offsets(broker_time, &registry, "Europe Broker", "US Eastern", false, &client)
            .unwrap();

    let yday = 191;
    assert_eq!(offsets.broker[yday], 3);
    assert_eq!(offsets.reference[yday], -4);
    assert_eq!(offsets.local[yday], 0);
    assert_eq!(offsets.adjusted_broker_time(broker_time).unwrap(), utc - 4 * 3_600);
}

#[test]
fn test_live_local_clock_mismatch() {
    let registry = TimezoneRegistry::parse(TABLE).unwrap();
    let utc = timestamp_of(2024, 7, 10, 12).unwrap();
    // Local clock two hours fast.
    let client = client(utc, utc + 7_200);

    let result = time_offsets(utc + 3 * 3_600, &registry, "Europe Broker", "US Eastern", false, &client);
    assert!(matches!(result, Err(TimezoneError::LocalMismatch { .. })));
}

#[test]
fn test_live_broker_mismatch() {
    let registry = TimezoneRegistry::parse(TABLE).unwrap();
    let utc = timestamp_of(2024, 1, 10, 12).unwrap();
    let client = client(utc, utc);

    // Winter: broker runs GMT+2, a GMT+3 server clock is wrong.
    let result = time_offsets(utc + 3 * 3_600, &registry, "Europe Broker", "US Eastern", false, &client);
    assert!(matches!(result, Err(TimezoneError::BrokerMismatch { .. })));
}

#[test]
fn test_backtesting_skips_validation() {
    let registry = TimezoneRegistry::parse(TABLE).unwrap();
    let utc = timestamp_of(2024, 1, 10, 12).unwrap();
    let client = client(utc, utc + 7_200);

    let offsets = time_offsets(utc, &registry, "Europe Broker", "US Eastern", true, &client).unwrap();
    assert_eq!(offsets.broker[9], 2);
    assert_eq!(offsets.reference[9], -5);
    assert_eq!(client.status().queries, 0);
    assert_eq!(client.local_time(), utc + 7_200);
}

#[test]
fn test_unknown_broker() {
    let registry = TimezoneRegistry::parse(TABLE).unwrap();
    let utc = timestamp_of(2024, 1, 10, 12).unwrap();
    let client = client(utc, utc);

    let result = time_offsets(utc, &registry, "Mars", "US Eastern", true, &client);
    assert!(matches!(result, Err(TimezoneError::Unknown(name)) if name == "Mars"));
}

