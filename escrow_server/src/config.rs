//! Server configuration.
//!
//! Everything is read from `ESCROW_*` environment variables by [`ServerConfig::from_env_or_default`]. A missing
//! variable silently takes its default; an invalid one is logged and then takes its default, so a typo never stops the
//! server from starting.
use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use escrow_common::{helpers::parse_boolean_flag, Cents, FeeRate, Secret};
use escrow_engine::{helpers::FeeSchedule, FundHoldPolicy, SettlementConfig};
use log::*;

const DEFAULT_ESCROW_HOST: &str = "127.0.0.1";
const DEFAULT_ESCROW_PORT: u16 = 8470;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/escrow.db";
const DEFAULT_AUCTION_POLL_SECS: u64 = 30;
const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Fees, currency, proximity radius and the time windows used by the settlement engine.
    pub settlement: SettlementConfig,
    /// The longest the auction worker will sleep before checking for ended auctions. It wakes earlier if an auction is
    /// due sooner.
    pub auction_poll_interval: StdDuration,
    /// If false, auctions are only closed when somebody asks about them.
    pub auction_worker_enabled: bool,
    pub stripe: StripeConfig,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self { api_url: DEFAULT_STRIPE_API_URL.to_string(), api_key: Secret::default() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ESCROW_HOST.to_string(),
            port: DEFAULT_ESCROW_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            settlement: SettlementConfig::default(),
            auction_poll_interval: StdDuration::from_secs(DEFAULT_AUCTION_POLL_SECS),
            auction_worker_enabled: true,
            stripe: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let host = env::var("ESCROW_HOST").ok().unwrap_or(defaults.host);
        let port = parse_env::<u16>("ESCROW_PORT", |p| *p > 0).unwrap_or(defaults.port);
        let database_url = env::var("ESCROW_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ ESCROW_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            defaults.database_url
        });
        let settlement = settlement_config_from_env(defaults.settlement);
        let auction_poll_interval = parse_env::<u64>("ESCROW_AUCTION_POLL_SECS", |s| *s > 0)
            .map(StdDuration::from_secs)
            .unwrap_or(defaults.auction_poll_interval);
        let auction_worker_enabled =
            parse_boolean_flag(env::var("ESCROW_AUCTION_WORKER").ok(), defaults.auction_worker_enabled);
        let stripe = StripeConfig::from_env_or_default();
        Self { host, port, database_url, settlement, auction_poll_interval, auction_worker_enabled, stripe }
    }
}

impl StripeConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = env::var("ESCROW_STRIPE_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_STRIPE_API_URL.to_string());
        let api_key = env::var("ESCROW_STRIPE_API_KEY").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ ESCROW_STRIPE_API_KEY is not set. Every call to the payment processor will be rejected.");
            Secret::default()
        });
        Self { api_url, api_key }
    }
}

fn settlement_config_from_env(defaults: SettlementConfig) -> SettlementConfig {
    let flat_fee = parse_env::<Cents>("ESCROW_FLAT_FEE", |c| c.value() >= 0).unwrap_or(defaults.fees.flat_fee);
    let rate = parse_env::<FeeRate>("ESCROW_FEE_RATE", |r| r.bps() >= 0).unwrap_or(defaults.fees.rate);
    let minimum_charge =
        parse_env::<Cents>("ESCROW_MIN_CHARGE", |c| c.value() >= 0).unwrap_or(defaults.fees.minimum_charge);
    let currency = env::var("ESCROW_CURRENCY")
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or(defaults.currency);
    let proximity_radius_m = parse_env::<f64>("ESCROW_PROXIMITY_RADIUS_M", |r| r.is_finite() && *r > 0.0)
        .unwrap_or(defaults.proximity_radius_m);
    let location_max_age = parse_env::<i64>("ESCROW_LOCATION_MAX_AGE_SECS", |s| *s > 0)
        .map(Duration::seconds)
        .unwrap_or(defaults.location_max_age);
    let dispute_window = parse_env::<i64>("ESCROW_DISPUTE_WINDOW_DAYS", |d| *d >= 0)
        .map(Duration::days)
        .unwrap_or(defaults.dispute_window);
    let hold_policy = FundHoldPolicy {
        intro_count: parse_env::<i64>("ESCROW_HOLD_INTRO_COUNT", |n| *n >= 0)
            .unwrap_or(defaults.hold_policy.intro_count),
        intro_hold: parse_env::<i64>("ESCROW_HOLD_INTRO_HOURS", |h| *h >= 0)
            .map(Duration::hours)
            .unwrap_or(defaults.hold_policy.intro_hold),
        standard_hold: parse_env::<i64>("ESCROW_HOLD_STANDARD_MINUTES", |m| *m >= 0)
            .map(Duration::minutes)
            .unwrap_or(defaults.hold_policy.standard_hold),
    };
    SettlementConfig {
        fees: FeeSchedule::new(flat_fee, rate).with_minimum_charge(minimum_charge),
        currency,
        proximity_radius_m,
        location_max_age,
        dispute_window,
        hold_policy,
    }
}

/// Reads and parses `name`. Returns `None` if the variable is unset, or if it does not parse or fails `valid`, in
/// which case a warning is logged.
fn parse_env<T>(name: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let s = env::var(name).ok()?;
    match s.trim().parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        Ok(_) => {
            warn!("🪛️ {s} is out of range for {name}. Using the default instead.");
            None
        },
        Err(e) => {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default instead.");
            None
        },
    }
}
