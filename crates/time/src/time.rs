//! Unix time with nanosecond granularity and its UTC calendar fields.
//!
//! The calendar conversion is pure integer arithmetic with no libc involvement, so it is thread
//! safe and works on `no_std` targets. Only [`now`] (feature `now`) touches the system.
//!
//! # Examples
//!
//! ```
//! # use time::time::Tm;
//! // Mon, Jun 17 2024 09:50:07 UTC
//! let date = Tm::new(1718617807).unwrap();
//! assert_eq!((date.year, date.mon, date.day), (2024, 6, 17));
//! assert_eq!((date.hour, date.min, date.sec), (9, 50, 7));
//! assert_eq!((date.wday, date.yday), (1, 169));
//! ```

use core::ops::{Add, AddAssign};
#[cfg(feature = "now")]
use core::mem::MaybeUninit;
#[cfg(feature = "now")]
use libc::{timespec, clock_gettime, CLOCK_REALTIME};

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: i64 = 1000000000;
/// Seconds per minute.
pub const SECONDS_PER_MINUTE: i64 = 60;
/// Seconds per hour.
pub const SECONDS_PER_HOUR: i64 = SECONDS_PER_MINUTE * 60;
/// Seconds per day.
pub const SECONDS_PER_DAY: i64 = SECONDS_PER_HOUR * 24;

/// Whole seconds, for offsetting a [`TimeSpec`].
///
/// ```
/// # use time::time::{Seconds, TimeSpec};
/// let t = TimeSpec { sec: 1735732800, nsec: 5 };
/// assert_eq!(t + Seconds(-10), TimeSpec { sec: 1735732790, nsec: 5 });
/// ```
#[repr(transparent)]
pub struct Seconds(pub i64);

/// Nanoseconds, for offsetting a [`TimeSpec`]. Carries into (or borrows from) whole seconds.
///
/// ```
/// # use time::time::{Nanoseconds, TimeSpec};
/// let t = TimeSpec { sec: 10, nsec: 999999999 };
/// assert_eq!(t + Nanoseconds(2), TimeSpec { sec: 11, nsec: 1 });
/// assert_eq!(t + Nanoseconds(-1000000000), TimeSpec { sec: 9, nsec: 999999999 });
/// ```
#[repr(transparent)]
pub struct Nanoseconds(pub i64);

/// Unix time with nanosecond granularity.
///
/// A `TimeSpec` also serves as a signed offset (e.g. a clock correction): `sec` carries the sign
/// and `nsec` is always a positive fraction on top, so -0.25s is `{ sec: -1, nsec: 750000000 }`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeSpec {
	/// Seconds since the Unix epoch
	pub sec: i64,
	/// Nanoseconds since the beginning of `sec`, ranging [0-999999999]
	pub nsec: i64
}

impl TimeSpec {
	/// Microseconds elapsed since the start of the current second, ranging [0-999999].
	#[inline(always)]
	pub fn subsec_micros(&self) -> u32 {
		(self.nsec / 1000) as u32
	}

	/// Nanoseconds remaining until the next whole second, ranging [1-1000000000].
	#[inline(always)]
	pub fn nanos_to_next_second(&self) -> i64 {
		NANOS_PER_SECOND - self.nsec
	}
}

#[cfg_attr(docsrs, doc(cfg(feature = "now")))]
#[cfg(feature = "now")]
impl From<timespec> for TimeSpec {
	fn from(value: timespec) -> Self {
		TimeSpec { sec: value.tv_sec, nsec: value.tv_nsec }
	}
}

impl Add<Seconds> for TimeSpec {
	type Output = Self;

	fn add(self, rhs: Seconds) -> Self::Output {
		TimeSpec { sec: self.sec + rhs.0, nsec: self.nsec }
	}
}

impl Add<Nanoseconds> for TimeSpec {
	type Output = Self;

	fn add(self, rhs: Nanoseconds) -> Self::Output {
		let total = self.nsec + rhs.0;
		TimeSpec {
			sec: self.sec + total.div_euclid(NANOS_PER_SECOND),
			nsec: total.rem_euclid(NANOS_PER_SECOND)
		}
	}
}

impl Add for TimeSpec {
	type Output = Self;

	/// Apply the signed offset `rhs`.
	fn add(self, rhs: TimeSpec) -> Self::Output {
		self + Seconds(rhs.sec) + Nanoseconds(rhs.nsec)
	}
}

impl<T> AddAssign<T> for TimeSpec where TimeSpec: Add<T, Output = TimeSpec> {
	fn add_assign(&mut self, rhs: T) {
		*self = *self + rhs;
	}
}

/// The current system time (`CLOCK_REALTIME`), or `None` if `clock_gettime` fails.
///
/// Thread safe.
///
/// ```
/// # use time::time::now;
/// assert!(now().unwrap().sec > 1700000000);
/// ```
#[cfg_attr(docsrs, doc(cfg(feature = "now")))]
#[cfg(feature = "now")]
pub fn now() -> Option<TimeSpec> {
	let mut time = MaybeUninit::<timespec>::uninit();
	// Safety: clock_gettime only writes to `time`, and fully initializes it when returning zero
	unsafe {
		match clock_gettime(CLOCK_REALTIME, time.as_mut_ptr()) {
			0 => Some(time.assume_init().into()),
			_ => None
		}
	}
}

/// Whether `year` (absolute, e.g. 2024) is a Gregorian leap year.
///
/// ```
/// # use time::time::is_leap_year;
/// assert!(!is_leap_year(1900));
/// assert!(is_leap_year(2000));
/// assert!(is_leap_year(2024));
/// ```
#[inline]
pub const fn is_leap_year(year: i64) -> bool {
	year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Days before the first of each month in a non-leap year.
const DAYS_BEFORE_MONTH: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Days per 400-year Gregorian cycle.
const DAYS_PER_CYCLE: i64 = 146097;

/// Days from 0000-03-01 to 1970-01-01.
const EPOCH_FROM_MARCH_0: i64 = 719468;

/// Civil date `(year, month, day)` for a day count since 1970-01-01.
///
/// Counts years from March so the leap day falls at the end of the year, which makes the month
/// lookup a linear function of the day within the year. Only valid for `days >= 0`.
///
/// http://howardhinnant.github.io/date_algorithms.html#civil_from_days
fn civil_from_days(days: i64) -> (i64, u8, u8) {
	let z = days + EPOCH_FROM_MARCH_0;
	let cycle = z / DAYS_PER_CYCLE;
	let day_of_cycle = z % DAYS_PER_CYCLE;
	let year_of_cycle = (day_of_cycle - day_of_cycle / 1460 + day_of_cycle / 36524
		- day_of_cycle / (DAYS_PER_CYCLE - 1)) / 365;
	let day_of_year = day_of_cycle - (365 * year_of_cycle + year_of_cycle / 4 - year_of_cycle / 100);
	let month_from_march = (5 * day_of_year + 2) / 153;
	let day = day_of_year - (153 * month_from_march + 2) / 5 + 1;
	let month = if month_from_march < 10 { month_from_march + 3 } else { month_from_march - 9 };
	let year = cycle * 400 + year_of_cycle + (month <= 2) as i64;
	(year, month as u8, day as u8)
}

/// UTC calendar fields of a Unix timestamp.
///
/// Unlike `libc::tm`, months and days of the year count from 1 and the year is absolute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tm {
	/// Seconds, ranged [0, 59]
	pub sec: u8,
	/// Minutes, ranged [0, 59]
	pub min: u8,
	/// Hours, ranged [0, 23]
	pub hour: u8,
	/// Day of the month, ranged [1, 31]
	pub day: u8,
	/// Month of the year, ranged [1, 12]
	pub mon: u8,
	/// Absolute Gregorian year, e.g. 2024
	pub year: u16,
	/// Day of the week, ranged [0, 6] => [Sunday, Saturday]
	pub wday: u8,
	/// Day of the year, ranged [1, 366]
	pub yday: u16
}

impl Tm {
	/// Calendar fields for `unixtimestamp`.
	///
	/// Returns `None` before the Unix epoch or past year 65535.
	pub fn new(unixtimestamp: i64) -> Option<Tm> {
		if unixtimestamp < 0 {
			return None;
		}
		let days = unixtimestamp / SECONDS_PER_DAY;
		let secs = unixtimestamp % SECONDS_PER_DAY;
		let (year, mon, day) = civil_from_days(days);
		let year = u16::try_from(year).ok()?;
		let leap_day = (mon > 2 && is_leap_year(year as i64)) as u16;

		Some(Tm {
			sec: (secs % SECONDS_PER_MINUTE) as u8,
			min: (secs % SECONDS_PER_HOUR / SECONDS_PER_MINUTE) as u8,
			hour: (secs / SECONDS_PER_HOUR) as u8,
			day,
			mon,
			year,
			// Jan 1, 1970 was a Thursday
			wday: ((days + 4) % 7) as u8,
			yday: DAYS_BEFORE_MONTH[mon as usize - 1] + day as u16 + leap_day
		})
	}

	/// Whether this date falls in a leap year.
	#[inline]
	pub fn is_leap_year(&self) -> bool {
		is_leap_year(self.year as i64)
	}
}
