//! The control loop.
//!
//! [`Beacon::step`] is one iteration: sample trusted time, [`plan`] and act. While transmitting it
//! re-latches the current symbol every [`TICK_PERIOD`], a few milliseconds after each tick boundary,
//! so the symbol for a new second is in place long before the carrier can tell the difference (see
//! [`modulator`](crate::modulator)). Any sleep is preceded by stopping the modulator.
//!
//! Sleep durations are whole seconds counted from the *next* second boundary, so the device wakes
//! a fraction of a second before the boundary it planned for. The step that follows plans against
//! that upcoming second and phase alignment starts the carrier exactly on it, so the first second
//! of a window (and its frame marker) is transmitted.

use core::time::Duration;
use time::{Seconds, TimeSpec};
use tracing::{debug, error, info};
use crate::clock::{Clock, WallClock};
use crate::frame::{symbol_for, Symbol};
use crate::modulator::{CarrierOutput, Modulator, ModulatorHal};
use crate::schedule::{plan, Action, OperatingWindow, ScheduleConfig};
use crate::sleep::{Power, SleepController};

/// How long after a tick boundary the control loop wakes to re-latch.
pub const LATCH_MARGIN: Duration = Duration::from_millis(5);

/// The symbol for the second containing trusted time `t`.
///
/// A time the wall clock can't represent yields [`Symbol::Marker`].
pub fn symbol_at(wall: &WallClock, t: TimeSpec) -> Symbol {
	wall.sample(t).map_or(Symbol::Marker, |s| symbol_for(&s))
}

/// Time from `now` until `margin` past the next multiple of `period` within the second.
fn until_next_boundary(now: TimeSpec, period: Duration, margin: Duration) -> Duration {
	let period = (period.as_nanos() as i64).max(1);
	let into = now.nsec.rem_euclid(period);
	Duration::from_nanos((period - into) as u64) + margin
}

/// The beacon device.
pub struct Beacon<'k, O, H, C, P> {
	config: ScheduleConfig,
	wall: WallClock,
	modulator: Modulator<'k, O, H>,
	clock: C,
	sleep: SleepController<P>,
	scheduled_wake: bool,
	window: Option<OperatingWindow>
}

impl<'k, O, H, C, P> Beacon<'k, O, H, C, P>
where
	O: CarrierOutput,
	H: ModulatorHal,
	C: Clock,
	P: Power
{
	/// Assemble the beacon. The reset cause is read once, here.
	pub fn new(
		config: ScheduleConfig,
		wall: WallClock,
		modulator: Modulator<'k, O, H>,
		clock: C,
		sleep: SleepController<P>
	) -> Beacon<'k, O, H, C, P> {
		let cause = sleep.reset_cause();
		info!(?cause, "Beacon starting");
		Beacon {
			config,
			wall,
			modulator,
			clock,
			sleep,
			scheduled_wake: cause.is_scheduled_wake(),
			window: None
		}
	}

	/// The window chosen by the last [`step`](Beacon::step).
	pub fn window(&self) -> Option<OperatingWindow> {
		self.window
	}

	pub fn modulator(&self) -> &Modulator<'k, O, H> {
		&self.modulator
	}

	/// Run one loop iteration.
	///
	/// Returns after a short transmit wait or a clock-preserving sleep. Diverges into deep
	/// suspension or a restart when the schedule or a fault calls for it.
	pub fn step(&mut self) {
		let now = self.clock.now();
		let (Some(sample), Some(next)) = (self.wall.sample(now), self.wall.sample(now + Seconds(1))) else {
			error!(sec = now.sec, "Wall clock before the epoch");
			self.modulator.stop();
			self.sleep.safety_sleep()
		};

		// An idle carrier can only start at the next second, and every sleep is counted from it so
		// the wake lands just ahead of the target boundary
		let uptime = self.clock.uptime();
		let action = match plan(&self.config, sample.time_of_day(), uptime, self.scheduled_wake) {
			current @ Action::Transmit { .. } if self.modulator.is_running() => current,
			_ => plan(&self.config, next.time_of_day(), uptime, self.scheduled_wake)
		};
		if self.window != Some(action.window()) {
			info!(
				window = ?action.window(),
				"{:02}:{:02}:{:02} window changed",
				sample.hour, sample.minute, sample.second
			);
			self.window = Some(action.window());
		}

		match action {
			Action::Transmit { recheck, .. } => self.transmit(recheck),
			Action::SleepClockPreserving { seconds, .. } => {
				self.modulator.stop();
				self.sleep.sleep_clock_preserving(seconds);
			},
			Action::SleepDeep { seconds, .. } => {
				self.modulator.stop();
				self.sleep.sleep_deep(seconds)
			}
		}
	}

	/// Keep the carrier running with a fresh symbol, then wait for the next tick boundary.
	fn transmit(&mut self, recheck: Duration) {
		if !self.modulator.is_running() {
			let wall = self.wall;
			if let Err(e) = self.modulator.start(&self.clock, |t| symbol_at(&wall, t)) {
				error!("{}", e);
				self.sleep.restart();
			}
		}

		let now = self.clock.now();
		let symbol = symbol_at(&self.wall, now);
		self.modulator.latch(symbol);
		debug!(sec = now.sec, ?symbol, "Latched");
		self.clock.delay(until_next_boundary(now, recheck, LATCH_MARGIN));
	}

	/// Run forever.
	pub fn run(mut self) -> ! {
		loop {
			self.step();
		}
	}
}
