//! Low-power suspension.
//!
//! Two depths are available: a clock-preserving sleep that keeps the time-base oscillator running
//! (used inside the night window, where the next second-boundary alignment depends on it) and a
//! deep suspension that may lose running state (used for the long daytime gap). Deep suspension
//! never returns: the device restarts its control flow from the top on wake, and
//! [`Power::reset_cause`] tells the next boot why it woke.

use core::time::Duration;
use tracing::{info, warn};

/// Why the device last (re)started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetCause {
	/// Power applied, or the reset button pressed.
	PowerOn,
	/// The deep suspension wake timer fired.
	DeepSleepTimer,
	/// A software-requested restart.
	Software,
	/// Watchdog reset.
	Watchdog,
	/// Anything the platform can't tell apart.
	Unknown
}

impl ResetCause {
	/// Whether this boot is the planned end of a deep suspension.
	#[inline]
	pub fn is_scheduled_wake(self) -> bool {
		matches!(self, ResetCause::DeepSleepTimer)
	}
}

/// Platform power management.
pub trait Power {
	/// The reason for the current boot.
	fn reset_cause(&self) -> ResetCause;
	/// Arm the wake timer and suspend with the time base running. Returns on wake.
	fn light_sleep(&mut self, duration: Duration);
	/// Arm the wake timer and enter the lowest-power state. The next boot reports
	/// [`ResetCause::DeepSleepTimer`].
	fn deep_sleep(&mut self, duration: Duration) -> !;
	/// Full device restart.
	fn restart(&mut self) -> !;
}

/// Sleep requests from the control loop.
///
/// Callers must stop the carrier before calling any of these.
pub struct SleepController<P> {
	power: P,
	safety: Duration
}

impl<P: Power> SleepController<P> {
	/// Create a controller whose [`safety_sleep`](SleepController::safety_sleep) lasts `safety`.
	pub fn new(power: P, safety: Duration) -> SleepController<P> {
		SleepController { power, safety }
	}

	pub fn reset_cause(&self) -> ResetCause {
		self.power.reset_cause()
	}

	/// Suspend for `seconds` keeping the clock. Does nothing for `seconds < 1`.
	pub fn sleep_clock_preserving(&mut self, seconds: u32) {
		if seconds < 1 {
			return;
		}
		let duration = Duration::from_secs(seconds as u64);
		info!("Entering light sleep for {:?}", duration);
		self.power.light_sleep(duration);
	}

	/// Enter deep suspension for `seconds` (at least one).
	pub fn sleep_deep(&mut self, seconds: u32) -> ! {
		let duration = Duration::from_secs(seconds.max(1) as u64);
		info!("Entering deep sleep for {:?}", duration);
		self.power.deep_sleep(duration)
	}

	/// Deep suspension for the configured safety interval, for when trusted time is unavailable.
	pub fn safety_sleep(&mut self) -> ! {
		warn!("No trusted time, entering safety sleep for {:?}", self.safety);
		self.power.deep_sleep(self.safety.max(Duration::from_secs(1)))
	}

	/// Restart the device.
	pub fn restart(&mut self) -> ! {
		warn!("Restarting");
		self.power.restart()
	}
}
