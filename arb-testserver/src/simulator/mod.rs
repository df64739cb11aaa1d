//! Synthetic metrics generation for the arbitrage bot test double.
//!
//! A [`MetricsSnapshot`] is produced fresh for every request by
//! [`generate_snapshot`], which only depends on the [`SimulatorConfig`],
//! a [`Clock`] and a [`UniformSource`]. Injecting a seeded or scripted
//! source makes every snapshot reproducible.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

mod source;

pub use self::source::{Clock, SequenceSource, SystemClock, UniformSource};


/// Jitter added to the base latency of a healthy reading.
pub const OK_LATENCY_JITTER_MS: RangeInclusive<i64> = -10..=9;
/// Arbitrage triangles tracked by a healthy bot.
pub const OK_ACTIVE_OPPORTUNITIES: RangeInclusive<i64> = 1..=15;
/// Best spread of a healthy bot, 0.05% up to 0.84% in the ×100 encoding.
pub const OK_BEST_SPREAD_BPS: RangeInclusive<i64> = 5..=84;
/// Profit of a healthy bot, in cents.
pub const OK_PNL_CENTS: RangeInclusive<i64> = 0..=4999;
pub const OK_ERROR_COUNT: RangeInclusive<i64> = 0..=2;

pub const DOWN_ERROR_COUNT: RangeInclusive<i64> = 5..=24;

/// Coin used by [`Mode::Flap`]: [`FLAP_HEADS`] yields a healthy reading.
pub const FLAP_COIN: RangeInclusive<i64> = 0..=1;
pub const FLAP_HEADS: i64 = 0;
/// Profit/loss of a degraded flap reading, in cents.
pub const FLAP_DEGRADED_PNL_CENTS: RangeInclusive<i64> = -500..=1499;
pub const FLAP_DEGRADED_ERROR_COUNT: RangeInclusive<i64> = 0..=14;

/// Behavior profile of the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Mode {
    /// Healthy bot reporting jittered latency and live opportunities.
    #[default]
    Ok,

    /// Bot is down: zeroed readings with an elevated error count.
    Down,

    /// Unstable upstream: every reading is healthy or degraded
    /// on a fair coin flip.
    Flap,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Ok => "ok",
            Mode::Down => "down",
            Mode::Flap => "flap",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process wide simulator configuration,
/// immutable once the server is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorConfig {
    pub mode: Mode,
    pub base_latency_ms: u32,
    pub listen_port: u16,
}

impl SimulatorConfig {
    pub const DEFAULT_BASE_LATENCY_MS: u32 = 35;
    pub const DEFAULT_LISTEN_PORT: u16 = 8080;
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            base_latency_ms: Self::DEFAULT_BASE_LATENCY_MS,
            listen_port: Self::DEFAULT_LISTEN_PORT,
        }
    }
}

/// One synthetic metrics reading.
///
/// Serialized with single letter keys to keep the payload
/// of the polled endpoint compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 1 = healthy, 0 = down
    #[serde(rename = "s")]
    pub status: u8,
    #[serde(rename = "l")]
    pub latency_ms: i64,
    #[serde(rename = "a")]
    pub active_opportunities: i64,
    /// percentage × 100
    #[serde(rename = "b")]
    pub best_spread_bps: i64,
    #[serde(rename = "p")]
    pub pnl_cents: i64,
    #[serde(rename = "e")]
    pub error_count: i64,
    #[serde(rename = "ts")]
    pub timestamp_epoch_seconds: i64,
}

impl MetricsSnapshot {
    pub const STATUS_UP: u8 = 1;
    pub const STATUS_DOWN: u8 = 0;

    #[inline(always)]
    pub fn is_up(&self) -> bool {
        self.status == Self::STATUS_UP
    }

    /// Zeroed reading of a bot which is not operational.
    fn degraded(pnl_cents: i64, error_count: i64, timestamp_epoch_seconds: i64) -> Self {
        Self {
            status: Self::STATUS_DOWN,
            latency_ms: 0,
            active_opportunities: 0,
            best_spread_bps: 0,
            pnl_cents,
            error_count,
            timestamp_epoch_seconds,
        }
    }
}

/// Generate a fresh [`MetricsSnapshot`] for the configured [`Mode`].
///
/// The number and order of draws taken from `rng` is fixed per mode,
/// which allows a scripted [`SequenceSource`] to predict the output.
pub fn generate_snapshot<C, R>(config: &SimulatorConfig, clock: &C, rng: &mut R) -> MetricsSnapshot
where
    C: Clock + ?Sized,
    R: UniformSource + ?Sized,
{
    match config.mode {
        Mode::Ok => generate_ok_snapshot(config.base_latency_ms, clock, rng),
        Mode::Down => {
            let error_count = rng.uniform(DOWN_ERROR_COUNT);
            MetricsSnapshot::degraded(0, error_count, clock.now_epoch_seconds())
        }
        Mode::Flap => {
            if rng.uniform(FLAP_COIN) == FLAP_HEADS {
                generate_ok_snapshot(config.base_latency_ms, clock, rng)
            } else {
                let pnl_cents = rng.uniform(FLAP_DEGRADED_PNL_CENTS);
                let error_count = rng.uniform(FLAP_DEGRADED_ERROR_COUNT);
                MetricsSnapshot::degraded(pnl_cents, error_count, clock.now_epoch_seconds())
            }
        }
    }
}

fn generate_ok_snapshot<C, R>(base_latency_ms: u32, clock: &C, rng: &mut R) -> MetricsSnapshot
where
    C: Clock + ?Sized,
    R: UniformSource + ?Sized,
{
    // a small base latency combined with negative jitter
    // would otherwise produce a negative latency
    let latency_ms = (i64::from(base_latency_ms) + rng.uniform(OK_LATENCY_JITTER_MS)).max(0);

    MetricsSnapshot {
        status: MetricsSnapshot::STATUS_UP,
        latency_ms,
        active_opportunities: rng.uniform(OK_ACTIVE_OPPORTUNITIES),
        best_spread_bps: rng.uniform(OK_BEST_SPREAD_BPS),
        pnl_cents: rng.uniform(OK_PNL_CENTS),
        error_count: rng.uniform(OK_ERROR_COUNT),
        timestamp_epoch_seconds: clock.now_epoch_seconds(),
    }
}
