//! Support for command line argument parsing.
//!
//! See [crate] documentation for details on command line arguments and examples.

use std::error::Error;
use std::fmt::{Display, Debug};
use std::num::NonZero;
use std::time::Duration;
use beacon::{ConfigError, ScheduleConfig, WallClock};
use clap::Parser;

/// Largest UTC offset in use anywhere, UTC+14.
const MAX_UTC_OFFSET: u32 = 14 * 3600;

/// Parsed command line arguments.
#[derive(Parser, Debug)]
#[command(name = "timebeacon", version, about = "Low-frequency time-signal beacon")]
pub struct Arguments {
	/// Minutes to transmit after a power-on or manual reset
	#[arg(long, value_name = "MINUTES", default_value_t = 5)]
	pub boot_test_minutes: u64,
	/// First hour of the night transmit window
	#[arg(long, value_name = "HOUR", default_value_t = 0)]
	pub night_start: u8,
	/// First hour after the night transmit window
	#[arg(long, value_name = "HOUR", default_value_t = 5)]
	pub night_end: u8,
	/// Minutes transmitted at the top of every night hour
	#[arg(long, value_name = "MINUTES", default_value_t = 15)]
	pub transmit_minutes: u8,
	/// Hour of the daily wake from deep sleep
	#[arg(long, value_name = "HOUR", default_value_t = 23)]
	pub wake_hour: u8,
	/// Minute of the daily wake from deep sleep
	#[arg(long, value_name = "MINUTE", default_value_t = 50)]
	pub wake_minute: u8,
	/// Broadcast zone offset from UTC, in seconds
	#[arg(long, value_name = "SECONDS", default_value_t = 0, allow_negative_numbers = true)]
	pub utc_offset: i32,
	/// Manual drift correction, in signed seconds
	#[arg(long, value_name = "SECONDS", default_value_t = 0, allow_negative_numbers = true)]
	pub drift: i32,
	/// Minutes to sleep when trusted time is unavailable
	#[arg(long, value_name = "MINUTES", default_value_t = 60)]
	pub safety_sleep_minutes: u64,
	/// SNTP server, repeat for fallback tiers. Without any the system clock is trusted
	#[arg(long = "ntp", value_name = "SERVER")]
	pub ntp: Vec<String>,
	/// SNTP requests per tier
	#[arg(long, value_name = "COUNT", default_value = "4")]
	pub sync_attempts: NonZero<usize>,
	/// Print the frame for the current minute and exit
	#[arg(long)]
	pub preview: bool,
	/// Log filter, e.g. `debug` or `beacon=trace`. Defaults to RUST_LOG, then `info`
	#[arg(long, value_name = "FILTER")]
	pub log: Option<String>
}

/// The error type for converting arguments into configuration.
#[cfg_attr(test, derive(PartialEq))]
pub enum ArgumentsError {
	/// The schedule options are inconsistent. The underlying error is the payload.
	Schedule(ConfigError),
	/// The UTC offset is beyond +/-14 hours. The supplied offset is the payload.
	InvalidUtcOffset(i32)
}

impl Display for ArgumentsError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ArgumentsError::Schedule(e) => write!(f, "Invalid schedule: {}", e),
			ArgumentsError::InvalidUtcOffset(x) => write!(f, "Invalid UTC offset: {}", x)
		}
	}
}

impl Debug for ArgumentsError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		Display::fmt(self, f)
	}
}

impl Error for ArgumentsError {}

impl Arguments {
	/// The validated schedule.
	///
	/// # Errors
	///
	/// Returns [`ArgumentsError::Schedule`] if any schedule option is out of range.
	pub fn schedule(&self) -> Result<ScheduleConfig, ArgumentsError> {
		let config = ScheduleConfig {
			boot_test: Duration::from_secs(self.boot_test_minutes.saturating_mul(60)),
			night_start_hour: self.night_start,
			night_end_hour: self.night_end,
			transmit_minutes: self.transmit_minutes,
			wake_hour: self.wake_hour,
			wake_minute: self.wake_minute,
			safety_sleep: Duration::from_secs(self.safety_sleep_minutes.saturating_mul(60))
		};
		config.validate().map_err(ArgumentsError::Schedule)?;
		Ok(config)
	}

	/// The wall clock for the broadcast zone.
	///
	/// # Errors
	///
	/// Returns [`ArgumentsError::InvalidUtcOffset`] for offsets beyond +/-14 hours.
	pub fn wall_clock(&self) -> Result<WallClock, ArgumentsError> {
		if self.utc_offset.unsigned_abs() > MAX_UTC_OFFSET {
			return Err(ArgumentsError::InvalidUtcOffset(self.utc_offset));
		}
		Ok(WallClock::new(self.utc_offset, self.drift))
	}
}
