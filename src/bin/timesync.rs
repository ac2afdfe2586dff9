//! Консольная утилита: NTP-время, пояса брокеров, торговая неделя

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use asirikuy_time::config::AppConfig;
use asirikuy_time::ntp::packet::NTP_PORT;
use asirikuy_time::timezone::{TimezoneRegistry, dst_start_end_days, utc_to_timezone};
use asirikuy_time::utils::logging::init_logging;
use asirikuy_time::{TimeSource, TimeSyncClient, TradingWeekBoundaries, UdpTimeSource};
use chrono::DateTime;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "timesync", about = "NTP time, broker timezones and trading-week checks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single NTP server for the time
    Query {
        server: String,
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        #[arg(long, default_value_t = NTP_PORT)]
        port: u16,
    },
    /// Consensus-checked estimate of the current time
    Now {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the client status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate the trading-week predicates
    TradingTime {
        /// Unix seconds, defaults to now
        #[arg(long)]
        at: Option<i64>,
        #[arg(short, long, default_value = "EURUSD")]
        symbol: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show a zone from the broker timezone table
    Tz {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        at: Option<i64>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::from_env().context("invalid ASIRIKUY_* environment")?,
    };
    Ok(config)
}

fn format_utc(time: i64) -> String {
    DateTime::from_timestamp(time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "out of range".to_string())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match args.command {
        Command::Query {
            server,
            timeout_ms,
            port,
        } => {
            init_logging(&AppConfig::default().log)?;
            let mut source = UdpTimeSource::with_port(port);
            match source.query(&server, Duration::from_millis(timeout_ms)) {
                Ok(time) => println!("{} {} ({})", server, time, format_utc(time)),
                Err(e) => {
                    println!("{} failed: {}", server, e);
                    std::process::exit(1);
                }
            }
        }
        Command::Now { config, json } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config.log)?;

            let client = TimeSyncClient::new(&config.ntp);
            let estimate = client.estimated_time();
            if json {
                println!("{}", serde_json::to_string_pretty(&client.status())?);
            } else {
                let status = client.status();
                println!("estimated: {} ({})", estimate, format_utc(estimate));
                println!("local:     {} ({})", status.local_time, format_utc(status.local_time));
                println!("offset:    {}s", status.offset_secs);
                println!(
                    "queries:   {} ({} failed)",
                    status.queries, status.failed_queries
                );
            }
        }
        Command::TradingTime { at, symbol, config } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config.log)?;

            let time = match at {
                Some(time) => time,
                None => TimeSyncClient::new(&config.ntp).estimated_time(),
            };
            let boundaries = TradingWeekBoundaries::new(&config.trading_week);
            println!("{}", serde_json::to_string_pretty(&boundaries.report(&symbol, time))?);
        }
        Command::Tz { file, name, at } => {
            init_logging(&AppConfig::default().log)?;
            let registry = TimezoneRegistry::load(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let zone = registry.get(&name)?;
            let time = at.unwrap_or_else(|| chrono::Utc::now().timestamp());

            println!("zone:      {}", zone.name);
            println!(
                "offsets:   GMT{:+} standard, GMT{:+} DST",
                zone.gmt_offset_std, zone.gmt_offset_dst
            );
            match &zone.dst {
                Some(rule) => {
                    let (start, end) = dst_start_end_days(time, rule)?;
                    println!("dst days:  {} .. {} (day of year, 0-based)", start, end);
                }
                None => println!("dst days:  none"),
            }
            let local = utc_to_timezone(time, zone)?;
            println!("utc:       {}", format_utc(time));
            println!("zone time: {}", format_utc(local).trim_end_matches(" UTC"));
        }
    }

    Ok(())
}
