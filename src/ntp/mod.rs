//! Синхронизация времени по NTP
//!
//! ```text
//!   estimated_time() ──► ClockState (refresh lock) ──► local + offset
//!          │ interval elapsed
//!          ▼
//!   ServerPool ──► TimeSource::query (query lock) ──► packet codec
//!          │ quorum collected
//!          ▼
//!   is_matching_hours ──► commit / reject
//! ```

pub mod client;
pub mod packet;
pub mod servers;
pub mod transport;

pub use client::{
    ClockState, RefreshRejection, TimeSyncClient, TimeSyncStatus, global, init_global,
    is_matching_hours,
};
pub use servers::ServerPool;
pub use transport::{TimeSource, UdpTimeSource};
