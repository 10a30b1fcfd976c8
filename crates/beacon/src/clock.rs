//! Wall-clock samples and the clock the control loop runs on.

use core::time::Duration;
use time::{TimeSpec, Tm};
use crate::schedule::TimeOfDay;

/// Local calendar time for one instant, derived from trusted time.
///
/// Samples are immutable and recomputed every loop iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WallClockSample {
	/// Local seconds since the Unix epoch (trusted UTC plus offset and drift).
	pub epoch: i64,
	/// Absolute Gregorian calendar year, e.g. 2024.
	pub year: u16,
	/// Month of the year, ranged [1, 12].
	pub month: u8,
	/// Day of the year, ranged [1, 366].
	pub yday: u16,
	/// Hours, ranged [0, 23].
	pub hour: u8,
	/// Minutes, ranged [0, 59].
	pub minute: u8,
	/// Seconds, ranged [0, 59].
	pub second: u8,
	/// Day of the week, ranged [0, 6] => [Sunday, Saturday].
	pub wday: u8
}

impl WallClockSample {
	/// Build a sample from local seconds since the epoch. Returns `None` before 1970.
	pub fn from_epoch(epoch: i64) -> Option<WallClockSample> {
		let tm = Tm::new(epoch)?;
		Some(WallClockSample {
			epoch,
			year: tm.year,
			month: tm.mon,
			yday: tm.yday,
			hour: tm.hour,
			minute: tm.min,
			second: tm.sec,
			wday: tm.wday
		})
	}

	/// Two-digit year, ranged [0, 99].
	#[inline]
	pub fn year_of_century(&self) -> u16 {
		self.year % 100
	}

	#[inline]
	pub fn time_of_day(&self) -> TimeOfDay {
		TimeOfDay::new(self.hour, self.minute, self.second)
	}

	/// The same instant with the second-of-minute replaced by `second`.
	#[inline]
	pub fn with_second(mut self, second: u8) -> WallClockSample {
		self.epoch += second as i64 - self.second as i64;
		self.second = second;
		self
	}
}

/// Converts trusted UTC time into local wall-clock samples.
///
/// The beacon broadcasts a single zone, so a fixed UTC offset is enough. `drift` is a small manual
/// correction for a clock known to run early or late.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WallClock {
	/// Offset from UTC, in seconds.
	pub utc_offset: i32,
	/// Manual drift correction, in signed seconds.
	pub drift: i32
}

impl WallClock {
	pub fn new(utc_offset: i32, drift: i32) -> WallClock {
		WallClock { utc_offset, drift }
	}

	/// Local wall-clock sample for trusted UTC time `trusted`.
	///
	/// Returns `None` if the corrected time is before the Unix epoch, which only happens when the
	/// time source is broken.
	pub fn sample(&self, trusted: TimeSpec) -> Option<WallClockSample> {
		WallClockSample::from_epoch(trusted.sec + self.utc_offset as i64 + self.drift as i64)
	}
}

/// The device clock the core runs on.
///
/// `now` must be the trusted wall clock (UTC), `uptime` the time since the device last booted, and
/// `delay` a timer-backed blocking wait.
pub trait Clock {
	fn now(&self) -> TimeSpec;
	fn uptime(&self) -> Duration;
	fn delay(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for &T {
	fn now(&self) -> TimeSpec {
		(**self).now()
	}

	fn uptime(&self) -> Duration {
		(**self).uptime()
	}

	fn delay(&self, duration: Duration) {
		(**self).delay(duration)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sample_test() {
		// Wed, Jul 04 2012 17:30:18 UTC
		let utc = TimeSpec { sec: 1341423018, nsec: 999 };
		let s = WallClock::default().sample(utc).unwrap();
		assert_eq!(s, WallClockSample {
			epoch: 1341423018,
			year: 2012,
			month: 7,
			yday: 186,
			hour: 17,
			minute: 30,
			second: 18,
			wday: 3
		});
		assert_eq!(s.year_of_century(), 12);
		assert_eq!(s.time_of_day(), TimeOfDay::new(17, 30, 18));
	}

	#[test]
	fn offset_and_drift_test() {
		// 04:30:18 UTC in UTC-5 with the clock 3s slow is 23:30:21 the previous day
		let utc = TimeSpec { sec: 1341376218, nsec: 0 };
		let s = WallClock::new(-5 * 3600, 3).sample(utc).unwrap();
		assert_eq!((s.hour, s.minute, s.second), (23, 30, 21));
		assert_eq!(s.yday, 185);
		assert_eq!(s.wday, 2);

		assert_eq!(WallClock::new(-3600, 0).sample(TimeSpec { sec: 10, nsec: 0 }), None);
	}

	#[test]
	fn with_second_test() {
		let s = WallClockSample::from_epoch(1341423018).unwrap();
		let t = s.with_second(59);
		assert_eq!(t.second, 59);
		assert_eq!(t, WallClockSample::from_epoch(1341423059).unwrap());
	}
}
