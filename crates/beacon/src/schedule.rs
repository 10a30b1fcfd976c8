//! Decide what the beacon does right now, and for how long.
//!
//! Every loop iteration the control loop classifies the current local time of day and device
//! uptime into an [`OperatingWindow`], then turns that into an [`Action`] with an exact duration:
//!
//! ```text
//! BootTest -> NightTransmit <-> NightIdle <-> PreMidnightHold -> DaytimeSuspend
//!     ^                                                              |
//!     +------------------- power-on / manual reset ------------------+
//! ```
//!
//! A scheduled wake from deep sleep skips [`OperatingWindow::BootTest`] entirely, so the carefully
//! timed pre-midnight wake lands straight in the schedule.
//!
//! Everything here is pure: time comes in as arguments.

use core::time::Duration;
use crate::ConfigError;
use crate::modulator::TICK_PERIOD;

const SECONDS_PER_HOUR: u32 = 3600;
const SECONDS_PER_DAY: u32 = 86400;

/// Local time of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeOfDay {
	/// Hours, ranged [0, 23].
	pub hour: u8,
	/// Minutes, ranged [0, 59].
	pub minute: u8,
	/// Seconds, ranged [0, 60]. 60 only during a leap second.
	pub second: u8
}

impl TimeOfDay {
	pub const fn new(hour: u8, minute: u8, second: u8) -> TimeOfDay {
		TimeOfDay { hour, minute, second }
	}

	/// Seconds since local midnight.
	#[inline]
	pub const fn seconds_of_day(&self) -> u32 {
		self.hour as u32 * SECONDS_PER_HOUR + self.minute as u32 * 60 + self.second as u32
	}
}

/// Schedule configuration, read-only for the core.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduleConfig {
	/// How long to transmit right after a power-on or manual reset, regardless of time of day.
	pub boot_test: Duration,
	/// First hour of the night window.
	pub night_start_hour: u8,
	/// First hour after the night window. May be less than `night_start_hour`, in which case the
	/// window wraps past midnight.
	pub night_end_hour: u8,
	/// Minutes transmitted at the start of every hour of the night window.
	pub transmit_minutes: u8,
	/// Hour of the daily wake from deep suspension.
	pub wake_hour: u8,
	/// Minute of the daily wake from deep suspension.
	pub wake_minute: u8,
	/// How long to suspend when trusted time is unavailable.
	pub safety_sleep: Duration
}

impl Default for ScheduleConfig {
	fn default() -> ScheduleConfig {
		ScheduleConfig {
			boot_test: Duration::from_secs(5 * 60),
			night_start_hour: 0,
			night_end_hour: 5,
			transmit_minutes: 15,
			wake_hour: 23,
			wake_minute: 50,
			safety_sleep: Duration::from_secs(60 * 60)
		}
	}
}

impl ScheduleConfig {
	/// Check every field is in range.
	///
	/// # Errors
	///
	/// Returns the first out-of-range field as a [`ConfigError`].
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (name, hour) in [
			("night start", self.night_start_hour),
			("night end", self.night_end_hour),
			("wake", self.wake_hour)
		] {
			if hour > 23 {
				return Err(ConfigError::InvalidHour(name, hour));
			}
		}
		if self.night_start_hour == self.night_end_hour {
			return Err(ConfigError::EmptyNightWindow);
		}
		// 60 means transmit for the whole hour
		if self.transmit_minutes > 60 {
			return Err(ConfigError::InvalidMinute("transmit", self.transmit_minutes));
		}
		if self.wake_minute > 59 {
			return Err(ConfigError::InvalidMinute("wake", self.wake_minute));
		}
		if self.safety_sleep < Duration::from_secs(1) {
			return Err(ConfigError::InvalidSafetySleep);
		}
		Ok(())
	}

	/// Whether `hour` falls in the night window `[night_start_hour, night_end_hour)`.
	pub fn in_night_window(&self, hour: u8) -> bool {
		if self.night_start_hour < self.night_end_hour {
			self.night_start_hour <= hour && hour < self.night_end_hour
		} else {
			hour >= self.night_start_hour || hour < self.night_end_hour
		}
	}

	/// The daily wake as a time of day.
	#[inline]
	pub fn wake_time(&self) -> TimeOfDay {
		TimeOfDay::new(self.wake_hour, self.wake_minute, 0)
	}
}

/// What the beacon should be doing at a given moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingWindow {
	/// Shortly after a manual or power-on reset: transmit so the install can be checked.
	BootTest,
	/// Start of a night hour: transmit.
	NightTransmit,
	/// Rest of a night hour: suspend, keeping the clock, until the top of the next hour.
	NightIdle,
	/// Just before midnight: suspend, keeping the clock, until midnight.
	PreMidnightHold,
	/// Outside the night window: deep suspension until the next daily wake.
	DaytimeSuspend
}

/// Classify a moment into an [`OperatingWindow`].
///
/// Rules are checked in order, first match wins:
/// 1. uptime below `boot_test` on a boot that was not a scheduled wake => `BootTest`
/// 2. on the wake hour, at or past the wake minute => `PreMidnightHold`
/// 3. in the night window, before `transmit_minutes` => `NightTransmit`, otherwise `NightIdle`
/// 4. otherwise => `DaytimeSuspend`
pub fn classify(config: &ScheduleConfig, now: TimeOfDay, uptime: Duration, scheduled_wake: bool)
	-> OperatingWindow
{
	if !scheduled_wake && uptime < config.boot_test {
		OperatingWindow::BootTest
	} else if now.hour == config.wake_hour && now.minute >= config.wake_minute {
		OperatingWindow::PreMidnightHold
	} else if config.in_night_window(now.hour) {
		if now.minute < config.transmit_minutes {
			OperatingWindow::NightTransmit
		} else {
			OperatingWindow::NightIdle
		}
	} else {
		OperatingWindow::DaytimeSuspend
	}
}

/// Seconds from `now` to the next occurrence of `target`, both measured within a repeating
/// `period`.
///
/// A target that is not strictly in the future rolls over to the next period, so the result is in
/// `[1, period]` for `now, target < period`.
///
/// # Examples
///
/// ```
/// # use beacon::schedule::seconds_until;
/// assert_eq!(seconds_until(100, 160, 3600), 60);
/// assert_eq!(seconds_until(160, 160, 3600), 3600);
/// assert_eq!(seconds_until(200, 160, 3600), 3560);
/// ```
#[inline]
pub const fn seconds_until(now: u32, target: u32, period: u32) -> u32 {
	if target > now {
		target - now
	} else {
		target + period - now
	}
}

/// Seconds until the top of the next hour.
pub fn seconds_to_next_hour(now: TimeOfDay) -> u32 {
	seconds_until(now.seconds_of_day() % SECONDS_PER_HOUR, 0, SECONDS_PER_HOUR)
}

/// Seconds until the next daily wake, today if it is still ahead, otherwise tomorrow.
pub fn seconds_to_daily_wake(config: &ScheduleConfig, now: TimeOfDay) -> u32 {
	seconds_until(now.seconds_of_day(), config.wake_time().seconds_of_day(), SECONDS_PER_DAY)
}

/// What the control loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
	/// Keep the carrier on and re-plan after `recheck`.
	Transmit { window: OperatingWindow, recheck: Duration },
	/// Stop the carrier and suspend, keeping the clock, for `seconds`.
	SleepClockPreserving { window: OperatingWindow, seconds: u32 },
	/// Stop the carrier and enter deep suspension for `seconds`.
	SleepDeep { window: OperatingWindow, seconds: u32 }
}

impl Action {
	pub fn window(&self) -> OperatingWindow {
		match *self {
			Action::Transmit { window, .. } => window,
			Action::SleepClockPreserving { window, .. } => window,
			Action::SleepDeep { window, .. } => window
		}
	}
}

/// Classify the moment and compute the matching [`Action`].
pub fn plan(config: &ScheduleConfig, now: TimeOfDay, uptime: Duration, scheduled_wake: bool) -> Action {
	let window = classify(config, now, uptime, scheduled_wake);
	match window {
		OperatingWindow::BootTest | OperatingWindow::NightTransmit => {
			Action::Transmit { window, recheck: TICK_PERIOD }
		},
		OperatingWindow::NightIdle | OperatingWindow::PreMidnightHold => {
			Action::SleepClockPreserving { window, seconds: seconds_to_next_hour(now) }
		},
		OperatingWindow::DaytimeSuspend => {
			Action::SleepDeep { window, seconds: seconds_to_daily_wake(config, now) }
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BOOTED: Duration = Duration::from_secs(3600);

	fn t(hour: u8, minute: u8, second: u8) -> TimeOfDay {
		TimeOfDay::new(hour, minute, second)
	}

	#[test]
	fn seconds_until_test() {
		assert_eq!(seconds_until(0, 1, 60), 1);
		assert_eq!(seconds_until(59, 0, 60), 1);
		assert_eq!(seconds_until(0, 0, 60), 60);
		assert_eq!(seconds_until(30, 29, 60), 59);
	}

	#[test]
	fn daily_wake_rollover_test() {
		let config = ScheduleConfig::default();
		// 24h minus 9m50s
		assert_eq!(seconds_to_daily_wake(&config, t(23, 59, 50)), 86400 - 590);
		assert_eq!(seconds_to_daily_wake(&config, t(23, 59, 50)), 85810);
		// Exactly on the wake instant rolls to tomorrow
		assert_eq!(seconds_to_daily_wake(&config, t(23, 50, 0)), 86400);
		assert_eq!(seconds_to_daily_wake(&config, t(5, 0, 0)), 67800);
		assert_eq!(seconds_to_daily_wake(&config, t(23, 49, 59)), 1);
	}

	#[test]
	fn next_hour_test() {
		assert_eq!(seconds_to_next_hour(t(2, 20, 0)), 2400);
		assert_eq!(seconds_to_next_hour(t(23, 50, 0)), 600);
		assert_eq!(seconds_to_next_hour(t(23, 59, 59)), 1);
		assert_eq!(seconds_to_next_hour(t(4, 0, 0)), 3600);
	}

	#[test]
	fn night_idle_test() {
		let config = ScheduleConfig::default();
		assert_eq!(
			plan(&config, t(2, 20, 0), BOOTED, true),
			Action::SleepClockPreserving { window: OperatingWindow::NightIdle, seconds: 2400 }
		);
	}

	#[test]
	fn classify_test() {
		let config = ScheduleConfig::default();
		let c = |h, m, s| classify(&config, t(h, m, s), BOOTED, false);
		assert_eq!(c(0, 0, 0), OperatingWindow::NightTransmit);
		assert_eq!(c(3, 14, 59), OperatingWindow::NightTransmit);
		assert_eq!(c(3, 15, 0), OperatingWindow::NightIdle);
		assert_eq!(c(4, 59, 59), OperatingWindow::NightIdle);
		assert_eq!(c(5, 0, 0), OperatingWindow::DaytimeSuspend);
		assert_eq!(c(12, 5, 0), OperatingWindow::DaytimeSuspend);
		assert_eq!(c(23, 49, 59), OperatingWindow::DaytimeSuspend);
		assert_eq!(c(23, 50, 0), OperatingWindow::PreMidnightHold);
		assert_eq!(c(23, 59, 59), OperatingWindow::PreMidnightHold);
	}

	#[test]
	fn boot_test_test() {
		let config = ScheduleConfig::default();
		let early = Duration::from_secs(60);
		// Manual reset in the afternoon still transmits
		assert_eq!(classify(&config, t(14, 0, 0), early, false), OperatingWindow::BootTest);
		assert_eq!(
			plan(&config, t(14, 0, 0), early, false),
			Action::Transmit { window: OperatingWindow::BootTest, recheck: TICK_PERIOD }
		);
		// Boot test beats pre-midnight hold
		assert_eq!(classify(&config, t(23, 55, 0), early, false), OperatingWindow::BootTest);
		assert_eq!(classify(&config, t(14, 0, 0), config.boot_test, false), OperatingWindow::DaytimeSuspend);
	}

	#[test]
	fn boot_test_suppressed_test() {
		let config = ScheduleConfig::default();
		for uptime in [0, 1, 60, 299] {
			for (h, m) in [(23, 50), (23, 59), (0, 0), (3, 30), (12, 0)] {
				let w = classify(&config, t(h, m, 0), Duration::from_secs(uptime), true);
				assert_ne!(w, OperatingWindow::BootTest, "{}:{} after {}s", h, m, uptime);
			}
		}
		// Scheduled wake at 23:50 lands in the hold and sleeps to midnight
		assert_eq!(
			plan(&config, t(23, 50, 0), Duration::ZERO, true),
			Action::SleepClockPreserving { window: OperatingWindow::PreMidnightHold, seconds: 600 }
		);
	}

	#[test]
	fn daytime_plan_test() {
		let config = ScheduleConfig::default();
		let a = plan(&config, t(5, 0, 0), BOOTED, false);
		assert_eq!(a, Action::SleepDeep { window: OperatingWindow::DaytimeSuspend, seconds: 67800 });
		assert_eq!(a.window(), OperatingWindow::DaytimeSuspend);
	}

	#[test]
	fn night_window_wrap_test() {
		let config = ScheduleConfig { night_start_hour: 22, night_end_hour: 3, ..Default::default() };
		assert!(config.in_night_window(22));
		assert!(config.in_night_window(23));
		assert!(config.in_night_window(0));
		assert!(config.in_night_window(2));
		assert!(!config.in_night_window(3));
		assert!(!config.in_night_window(21));

		// The pre-midnight hold still wins inside the window
		assert_eq!(classify(&config, t(23, 55, 0), BOOTED, true), OperatingWindow::PreMidnightHold);
		assert_eq!(classify(&config, t(23, 5, 0), BOOTED, true), OperatingWindow::NightTransmit);
		assert_eq!(classify(&config, t(22, 30, 0), BOOTED, true), OperatingWindow::NightIdle);
	}

	#[test]
	fn validate_test() {
		assert_eq!(ScheduleConfig::default().validate(), Ok(()));
		let d = ScheduleConfig::default();
		assert_eq!(
			ScheduleConfig { night_end_hour: 24, ..d }.validate(),
			Err(ConfigError::InvalidHour("night end", 24))
		);
		assert_eq!(
			ScheduleConfig { wake_hour: 30, ..d }.validate(),
			Err(ConfigError::InvalidHour("wake", 30))
		);
		assert_eq!(
			ScheduleConfig { night_start_hour: 5, ..d }.validate(),
			Err(ConfigError::EmptyNightWindow)
		);
		assert_eq!(
			ScheduleConfig { transmit_minutes: 61, ..d }.validate(),
			Err(ConfigError::InvalidMinute("transmit", 61))
		);
		assert_eq!(ScheduleConfig { transmit_minutes: 60, ..d }.validate(), Ok(()));
		assert_eq!(
			ScheduleConfig { wake_minute: 60, ..d }.validate(),
			Err(ConfigError::InvalidMinute("wake", 60))
		);
		assert_eq!(
			ScheduleConfig { safety_sleep: Duration::from_millis(10), ..d }.validate(),
			Err(ConfigError::InvalidSafetySleep)
		);
	}
}
