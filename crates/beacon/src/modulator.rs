//! Key the carrier from the current second's symbol.
//!
//! The modulator is split in two halves that run in different execution contexts:
//!
//! - [`Keyer`] holds everything the 100 ms periodic tick handler touches: the [`SymbolCell`], the
//!   subslot counter and the interrupt-safe [`CarrierOutput`]. [`Keyer::on_tick`] never blocks and
//!   never allocates, so it can run in a high-priority interrupt.
//! - [`Modulator`] owns the control-side lifecycle: attaching the PWM peripheral and the periodic
//!   ticker ([`ModulatorHal`]), phase alignment to the second boundary, and stopping.
//!
//! The only state shared between the two contexts is the symbol, a single atomic byte written once
//! per second by the control loop.
//!
//! # Polarity
//!
//! The carrier is ON from the start of each second and drops to OFF after 200 ms for a marker,
//! 500 ms for a one and 800 ms for a zero (see [`ON_SUBSLOTS`]). Every symbol is ON for the first
//! two subslots, which is what makes a late symbol update harmless: a tick that still reads the
//! previous second's symbol at subslot 0 or 1 drives exactly the same output as the fresh one.

use core::sync::atomic::{AtomicU8, Ordering};
use core::time::Duration;
use time::TimeSpec;
use tracing::{debug, info};
use crate::clock::Clock;
use crate::frame::Symbol;
use crate::{HalError, ModulatorError};

/// Period of the tick handler.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Ticks per second.
pub const SUBSLOTS_PER_SECOND: u8 = 10;

/// PWM duty (8-bit resolution) while the carrier is ON, i.e. 50%.
pub const CARRIER_ON_DUTY: u8 = 128;

/// PWM duty while the carrier is OFF.
pub const CARRIER_OFF_DUTY: u8 = 0;

/// Number of leading subslots the carrier is ON, indexed by [`Symbol`] discriminant.
///
/// `Zero` => 800 ms, `One` => 500 ms, `Marker` => 200 ms. The OFF remainder of each second
/// (200 / 500 / 800 ms) is the reduced-power duration the receiving clock decodes.
pub const ON_SUBSLOTS: [u8; 3] = [8, 5, 2];

/// How long before the second boundary phase alignment switches from a timer wait to spinning.
pub const SPIN_WINDOW: Duration = Duration::from_millis(2);

impl Symbol {
	/// Subslots the carrier stays ON for this symbol.
	#[inline(always)]
	pub const fn on_subslots(self) -> u8 {
		ON_SUBSLOTS[self as usize]
	}
}

/// Carrier ON/OFF state for `symbol` at `subslot`.
#[inline(always)]
pub const fn carrier_on(symbol: Symbol, subslot: u8) -> bool {
	subslot < symbol.on_subslots()
}

/// Single-writer, multiple-reader hand-off of the current symbol.
///
/// The symbol is stored as one byte, so a reader always sees either the previous or the current
/// symbol, never a partial write.
pub struct SymbolCell(AtomicU8);

impl SymbolCell {
	pub const fn new(symbol: Symbol) -> SymbolCell {
		SymbolCell(AtomicU8::new(symbol as u8))
	}

	#[inline(always)]
	pub fn store(&self, symbol: Symbol) {
		self.0.store(symbol as u8, Ordering::Release);
	}

	#[inline(always)]
	pub fn load(&self) -> Symbol {
		Symbol::from_u8(self.0.load(Ordering::Acquire))
	}
}

/// The output side of the carrier, driven from the tick handler.
///
/// Implementations must not block: they are called from interrupt context.
pub trait CarrierOutput {
	/// Set the carrier PWM duty, [`CARRIER_ON_DUTY`] or [`CARRIER_OFF_DUTY`].
	fn set_duty(&self, duty: u8);
	/// Mirror carrier state onto the visual status indicator.
	fn set_indicator(&self, on: bool);
}

impl<T: CarrierOutput + ?Sized> CarrierOutput for &T {
	fn set_duty(&self, duty: u8) {
		(**self).set_duty(duty)
	}

	fn set_indicator(&self, on: bool) {
		(**self).set_indicator(on)
	}
}

/// State owned by the periodic tick handler.
///
/// On firmware a `Keyer` is typically a `static`, with the timer interrupt calling
/// [`Keyer::on_tick`].
pub struct Keyer<O> {
	symbol: SymbolCell,
	subslot: AtomicU8,
	output: O
}

impl<O: CarrierOutput> Keyer<O> {
	pub const fn new(output: O) -> Keyer<O> {
		Keyer {
			symbol: SymbolCell::new(Symbol::Marker),
			subslot: AtomicU8::new(0),
			output
		}
	}

	/// Publish the symbol for the second currently elapsing.
	#[inline(always)]
	pub fn latch(&self, symbol: Symbol) {
		self.symbol.store(symbol);
	}

	#[inline(always)]
	pub fn symbol(&self) -> Symbol {
		self.symbol.load()
	}

	/// The subslot the next tick will drive.
	pub fn subslot(&self) -> u8 {
		self.subslot.load(Ordering::Relaxed) % SUBSLOTS_PER_SECOND
	}

	pub fn output(&self) -> &O {
		&self.output
	}

	/// Tick handler, called every [`TICK_PERIOD`].
	pub fn on_tick(&self) {
		let mut subslot = self.subslot.load(Ordering::Relaxed);
		if subslot >= SUBSLOTS_PER_SECOND {
			subslot = 0;
		}
		let on = carrier_on(self.symbol.load(), subslot);
		self.output.set_duty(if on { CARRIER_ON_DUTY } else { CARRIER_OFF_DUTY });
		self.output.set_indicator(on);
		self.subslot.store(subslot + 1, Ordering::Relaxed);
	}

	/// Restart the subslot counter so the next tick drives subslot 0.
	fn rewind(&self) {
		self.subslot.store(0, Ordering::Relaxed);
	}

	/// Force the carrier and indicator to idle.
	fn idle(&self) {
		self.output.set_duty(CARRIER_OFF_DUTY);
		self.output.set_indicator(false);
	}
}

/// Control-side peripherals behind the modulator.
///
/// The ticker is expected to already know which [`Keyer`] to call; attaching it starts periodic
/// calls to [`Keyer::on_tick`], with the first call one period after attaching.
pub trait ModulatorHal {
	fn attach_pwm(&mut self) -> Result<(), HalError>;
	fn detach_pwm(&mut self);
	fn attach_ticker(&mut self, period: Duration) -> Result<(), HalError>;
	fn detach_ticker(&mut self);
}

/// Block until the clock's second rolls over, returning the first time read in the new second.
///
/// The wait is timer-backed until [`SPIN_WINDOW`] before the boundary and spins from there, so
/// timer wake-up latency doesn't shift the start of transmission. Returns immediately if the clock
/// is already within the first microsecond of a second. Never blocks longer than one second.
pub fn align_to_second<C: Clock + ?Sized>(clock: &C) -> TimeSpec {
	let start = clock.now();
	if start.subsec_micros() == 0 {
		return start;
	}

	let target = start.sec + 1;
	let remaining = Duration::from_nanos(start.nanos_to_next_second() as u64);
	if remaining > SPIN_WINDOW {
		clock.delay(remaining - SPIN_WINDOW);
	}

	loop {
		let t = clock.now();
		if t.sec >= target {
			return t;
		}
		core::hint::spin_loop();
	}
}

/// Carrier modulator lifecycle.
///
/// # Examples
///
/// ```ignore
/// static KEYER: Keyer<Pwm> = Keyer::new(Pwm::new());
///
/// let mut modulator = Modulator::new(&KEYER, hal);
/// modulator.start(&clock, |t| symbol_at(t))?;
/// loop {
/// 	modulator.latch(symbol_at(clock.now()));
/// 	clock.delay(TICK_PERIOD);
/// }
/// ```
pub struct Modulator<'k, O, H> {
	keyer: &'k Keyer<O>,
	hal: H,
	running: bool
}

impl<'k, O: CarrierOutput, H: ModulatorHal> Modulator<'k, O, H> {
	pub fn new(keyer: &'k Keyer<O>, hal: H) -> Modulator<'k, O, H> {
		Modulator { keyer, hal, running: false }
	}

	#[inline]
	pub fn is_running(&self) -> bool {
		self.running
	}

	/// Start transmitting, aligned to the next second boundary.
	///
	/// `encode` is called once, right after alignment, with the time that starts the first second;
	/// its symbol is latched before the first tick. Does nothing if already running.
	///
	/// # Errors
	///
	/// Returns [`ModulatorError::PwmAttach`] if the PWM peripheral could not be attached and
	/// [`ModulatorError::TickerAttach`] if the periodic ticker could not be started. Both leave the
	/// modulator stopped with the carrier idle.
	pub fn start<C, F>(&mut self, clock: &C, encode: F) -> Result<(), ModulatorError>
	where
		C: Clock + ?Sized,
		F: FnOnce(TimeSpec) -> Symbol
	{
		if self.is_running() {
			return Ok(());
		}

		self.hal.attach_pwm().map_err(ModulatorError::PwmAttach)?;
		self.keyer.idle();

		let t = align_to_second(clock);
		self.keyer.latch(encode(t));
		self.keyer.rewind();
		// Subslot 0 is driven here, the ticker takes over from subslot 1
		self.keyer.on_tick();

		if let Err(e) = self.hal.attach_ticker(TICK_PERIOD) {
			self.keyer.idle();
			self.hal.detach_pwm();
			return Err(ModulatorError::TickerAttach(e));
		}

		self.running = true;
		info!(sec = t.sec, nsec = t.nsec, "Carrier started");
		Ok(())
	}

	/// Publish the symbol for the second currently elapsing.
	#[inline]
	pub fn latch(&self, symbol: Symbol) {
		self.keyer.latch(symbol);
	}

	/// Stop transmitting and leave the carrier idle. Does nothing if already stopped.
	pub fn stop(&mut self) {
		if !self.is_running() {
			return;
		}
		self.hal.detach_ticker();
		self.hal.detach_pwm();
		self.keyer.idle();
		self.running = false;
		debug!("Carrier stopped");
	}
}
