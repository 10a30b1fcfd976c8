//! Simulated device for unit tests.
//!
//! [`Rig`] implements every hardware trait the core uses and records the calls in order, so tests
//! can check sequencing (e.g. the carrier stops before a sleep). Time only moves when something
//! waits, plus a few microseconds per clock read so spin loops terminate. Deep sleep and restart
//! panic, standing in for "never returns".

extern crate std;

use core::cell::{Cell, RefCell};
use core::time::Duration;
use std::vec::Vec;
use time::{Nanoseconds, TimeSpec};
use crate::clock::Clock;
use crate::modulator::{CarrierOutput, ModulatorHal};
use crate::sleep::{Power, ResetCause};
use crate::HalError;

/// Time that passes on every [`Clock::now`] call.
const READ_COST: Duration = Duration::from_micros(50);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
	Duty(u8),
	Indicator(bool),
	Delay(Duration),
	AttachPwm,
	DetachPwm,
	AttachTicker(Duration),
	DetachTicker,
	LightSleep(Duration),
	DeepSleep(Duration),
	Restart
}

pub struct Rig {
	time: Cell<TimeSpec>,
	uptime: Cell<Duration>,
	reset_cause: Cell<ResetCause>,
	fail_pwm: Cell<bool>,
	fail_ticker: Cell<bool>,
	events: RefCell<Vec<Event>>
}

impl Rig {
	/// A rig at `sec` seconds past the epoch, exactly on the second, just powered on.
	pub fn new(sec: i64) -> Rig {
		Rig {
			time: Cell::new(TimeSpec { sec, nsec: 0 }),
			uptime: Cell::new(Duration::ZERO),
			reset_cause: Cell::new(ResetCause::PowerOn),
			fail_pwm: Cell::new(false),
			fail_ticker: Cell::new(false),
			events: RefCell::new(Vec::new())
		}
	}

	pub fn at_nanos(self, nsec: i64) -> Rig {
		self.time.set(TimeSpec { sec: self.time.get().sec, nsec });
		self
	}

	pub fn with_uptime(self, uptime: Duration) -> Rig {
		self.uptime.set(uptime);
		self
	}

	pub fn with_reset_cause(self, cause: ResetCause) -> Rig {
		self.reset_cause.set(cause);
		self
	}

	pub fn time(&self) -> TimeSpec {
		self.time.get()
	}

	pub fn fail_pwm(&self, fail: bool) {
		self.fail_pwm.set(fail);
	}

	pub fn fail_ticker(&self, fail: bool) {
		self.fail_ticker.set(fail);
	}

	pub fn take_events(&self) -> Vec<Event> {
		self.events.take()
	}

	fn push(&self, event: Event) {
		self.events.borrow_mut().push(event);
	}

	pub fn advance(&self, d: Duration) {
		self.time.set(self.time.get() + Nanoseconds(d.as_nanos() as i64));
		self.uptime.set(self.uptime.get() + d);
	}
}

impl Clock for Rig {
	fn now(&self) -> TimeSpec {
		let t = self.time.get();
		self.advance(READ_COST);
		t
	}

	fn uptime(&self) -> Duration {
		self.uptime.get()
	}

	fn delay(&self, duration: Duration) {
		self.push(Event::Delay(duration));
		self.advance(duration);
	}
}

impl CarrierOutput for Rig {
	fn set_duty(&self, duty: u8) {
		self.push(Event::Duty(duty));
	}

	fn set_indicator(&self, on: bool) {
		self.push(Event::Indicator(on));
	}
}

impl ModulatorHal for &Rig {
	fn attach_pwm(&mut self) -> Result<(), HalError> {
		self.push(Event::AttachPwm);
		if self.fail_pwm.get() { Err(HalError::Unavailable("pwm")) } else { Ok(()) }
	}

	fn detach_pwm(&mut self) {
		self.push(Event::DetachPwm);
	}

	fn attach_ticker(&mut self, period: Duration) -> Result<(), HalError> {
		self.push(Event::AttachTicker(period));
		if self.fail_ticker.get() { Err(HalError::Unavailable("ticker")) } else { Ok(()) }
	}

	fn detach_ticker(&mut self) {
		self.push(Event::DetachTicker);
	}
}

impl Power for &Rig {
	fn reset_cause(&self) -> ResetCause {
		self.reset_cause.get()
	}

	fn light_sleep(&mut self, duration: Duration) {
		self.push(Event::LightSleep(duration));
		self.advance(duration);
	}

	fn deep_sleep(&mut self, duration: Duration) -> ! {
		self.push(Event::DeepSleep(duration));
		panic!("deep sleep");
	}

	fn restart(&mut self) -> ! {
		self.push(Event::Restart);
		panic!("restart");
	}
}
