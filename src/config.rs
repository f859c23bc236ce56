//! Startup configuration, read once from the environment (and `.env`).

use crate::error::ConfigError;
use crate::klines::{self, KlineRequest};
use dotenv::dotenv;
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on `CYCLE_INTERVAL_SECS` (one week), so the first tick's
/// deadline always fits in an `Instant`.
pub const MAX_CYCLE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct KlineConfig {
    pub symbol: String,   // e.g., "BTCUSDT"
    pub interval: String, // e.g., "1m", "15m", "4h"
    pub limit: u32,       // e.g., 60 candles
    pub url: String,
}

impl KlineConfig {
    pub fn request(&self) -> KlineRequest {
        KlineRequest {
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub period: Duration,
    /// Upper bound on one cycle so a hung request cannot stall the ticker.
    pub cycle_timeout: Duration,
    pub run_on_start: bool,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub chart_dir: PathBuf,
    pub analysis_dir: PathBuf,
    pub print_summary: bool,
}

#[derive(Debug)]
pub struct VisionConfig {
    pub api_key: Option<SecretString>,
    pub model_url: Option<String>,
    pub max_new_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_url: None,
            max_new_tokens: 512,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub klines: KlineConfig,
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
    pub vision: VisionConfig,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let klines = KlineConfig {
            symbol: env.string("SYMBOL", "BTCUSDT"),
            interval: env.string("KLINE_INTERVAL", "1m"),
            limit: env.parse("KLINE_LIMIT", 60)?,
            url: env.string("KLINES_URL", "https://api.binance.com/api/v3/klines"),
        };
        // Reject anything the exchange would refuse before the first tick.
        KlineRequest::new(&klines.symbol, &klines.interval, klines.limit).map_err(|e| {
            ConfigError::Invalid {
                key: "KLINE_INTERVAL/KLINE_LIMIT/SYMBOL",
                value: format!("{} {} {}", klines.symbol, klines.interval, klines.limit),
                reason: format!("{e} (intervals: {})", klines::INTERVALS.join(" ")),
            }
        })?;

        let period_secs: u64 = env.parse("CYCLE_INTERVAL_SECS", 600)?;
        if period_secs == 0 || period_secs > MAX_CYCLE_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                key: "CYCLE_INTERVAL_SECS",
                value: period_secs.to_string(),
                reason: format!("period must be between 1 and {MAX_CYCLE_INTERVAL_SECS} seconds"),
            });
        }
        let timeout_secs: u64 = env.parse("CYCLE_TIMEOUT_SECS", 300)?;
        let http_timeout_secs: u64 = env.parse("HTTP_TIMEOUT_SECS", 60)?;

        let schedule = ScheduleConfig {
            period: Duration::from_secs(period_secs),
            cycle_timeout: Duration::from_secs(timeout_secs.max(1)),
            run_on_start: env.parse("RUN_ON_START", false)?,
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
        };

        let output = OutputConfig {
            chart_dir: PathBuf::from(env.string("CHART_DIR", ".")),
            analysis_dir: PathBuf::from(env.string("ANALYSIS_DIR", "logs")),
            print_summary: env.parse("PRINT_SUMMARY", true)?,
        };

        let vision = VisionConfig {
            api_key: env.optional("HUGGINGFACE_API_KEY").map(SecretString::from),
            model_url: env.optional("MODEL_URL"),
            max_new_tokens: env.parse("MAX_NEW_TOKENS", 512)?,
            timeout_secs: http_timeout_secs.max(1),
        };

        Ok(Self {
            klines,
            schedule,
            output,
            vision,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Unset and blank are treated the same.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}
