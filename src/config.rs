use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::sweep::{
    late_cycle::LATE_CYCLE_THRESHOLD_DAYS, long_period::LONG_PERIOD_THRESHOLD_DAYS, SweepCadence,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub production: bool,
    pub sweep_cadence: SweepCadence,
    pub long_period_days: i64,
    pub late_cycle_days: i64,
    pub push_gateway_url: Option<String>,
    pub push_gateway_key: Option<String>,
    pub push_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3050,
            database_url: String::new(),
            max_connections: 5,
            production: false,
            sweep_cadence: SweepCadence::for_environment(false),
            long_period_days: LONG_PERIOD_THRESHOLD_DAYS,
            late_cycle_days: LATE_CYCLE_THRESHOLD_DAYS,
            push_gateway_url: None,
            push_gateway_key: None,
            push_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let production = lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));

        let sweep_cadence = match lookup("SWEEP_SCHEDULE") {
            Some(raw) => raw
                .parse::<SweepCadence>()
                .map_err(|e| anyhow!("Invalid SWEEP_SCHEDULE value: {e}"))?,
            None => SweepCadence::for_environment(production),
        };

        let push_timeout_secs: u64 =
            try_load(&lookup, "PUSH_TIMEOUT_SECS", defaults.push_timeout.as_secs())?;
        if push_timeout_secs == 0 {
            return Err(anyhow!("PUSH_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            production,
            sweep_cadence,
            long_period_days: try_load(&lookup, "LONG_PERIOD_DAYS", defaults.long_period_days)?,
            late_cycle_days: try_load(&lookup, "LATE_CYCLE_DAYS", defaults.late_cycle_days)?,
            push_gateway_url: lookup("PUSH_GATEWAY_URL").filter(|v| !v.is_empty()),
            push_gateway_key: lookup("PUSH_GATEWAY_KEY").filter(|v| !v.is_empty()),
            push_timeout: Duration::from_secs(push_timeout_secs),
        })
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value: {e}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
