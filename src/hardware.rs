//! Host stand-ins for the beacon's peripherals.
//!
//! | Peripheral     | Host implementation                                                    |
//! | -------------- | ---------------------------------------------------------------------- |
//! | Carrier PWM    | [`AudioCarrier`]: a tone on the default audio output                   |
//! | 100 ms timer   | [`ThreadTicker`]: a thread with absolute deadlines                     |
//! | Status LED     | [`StatusLed`]: an atomic flag                                          |
//! | RTC            | [`HostClock`]: system time corrected by SNTP                           |
//! | Power          | [`HostPower`]: thread sleeps, deep sleep and restart re-exec           |
//!
//! The audio output radiates the carrier the same way the `timesignal` approach does: the audio
//! hardware leaks a weak RF field at the tone frequency and its harmonics. A 20 kHz tone puts its
//! third harmonic on 60 kHz.

use std::env;
use std::f32::consts::TAU;
use std::io;
use std::process::{self, Command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use beacon::modulator::CARRIER_ON_DUTY;
use beacon::{CarrierOutput, Clock, HalError, Keyer, ModulatorHal, Power, ResetCause};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use time::TimeSpec;
use tracing::{debug, error, info};

/// Output sample rate.
pub const SAMPLE_RATE: u32 = 48000;

/// Carrier tone frequency.
pub const TONE_HZ: u32 = 20000;

/// Samples in one repeat of the tone: 12 samples hold exactly 5 cycles of 20 kHz at 48 kHz.
const TONE_SAMPLES: usize = 12;

/// Environment variable carrying the reset cause across a re-exec.
pub const RESET_CAUSE_VAR: &str = "TIMEBEACON_RESET_CAUSE";

/// Status indicator.
pub struct StatusLed(AtomicBool);

impl StatusLed {
	pub const fn new() -> StatusLed {
		StatusLed(AtomicBool::new(false))
	}

	#[inline]
	pub fn set(&self, on: bool) {
		self.0.store(on, Ordering::Relaxed);
	}

	#[inline]
	pub fn is_on(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// Carrier duty and indicator, written by the tick thread and read by the audio callback.
pub struct CarrierLevel {
	duty: AtomicU8,
	led: StatusLed
}

impl CarrierLevel {
	pub const fn new() -> CarrierLevel {
		CarrierLevel { duty: AtomicU8::new(0), led: StatusLed::new() }
	}

	#[inline]
	pub fn duty(&self) -> u8 {
		self.duty.load(Ordering::Relaxed)
	}

	pub fn led(&self) -> &StatusLed {
		&self.led
	}

	/// Output amplitude for the current duty, ranged [0, 1].
	#[inline]
	pub fn amplitude(&self) -> f32 {
		(self.duty() as f32 / CARRIER_ON_DUTY as f32).min(1.0)
	}
}

impl CarrierOutput for CarrierLevel {
	fn set_duty(&self, duty: u8) {
		self.duty.store(duty, Ordering::Relaxed);
	}

	fn set_indicator(&self, on: bool) {
		self.led.set(on);
	}
}

/// One repeat of the carrier tone.
fn tone() -> [f32; TONE_SAMPLES] {
	core::array::from_fn(|i| (TAU * TONE_HZ as f32 * i as f32 / SAMPLE_RATE as f32).sin())
}

/// Error handler for audio streaming.
fn audio_error(error: cpal::StreamError) {
	error!("Error occured on the stream: {}", error);
}

/// The carrier "PWM": a tone on the default audio output, scaled by the current duty.
///
/// The stream must stay on the thread that created it.
pub struct AudioCarrier {
	level: &'static CarrierLevel,
	stream: Option<cpal::Stream>
}

impl AudioCarrier {
	pub fn new(level: &'static CarrierLevel) -> AudioCarrier {
		AudioCarrier { level, stream: None }
	}

	fn attach(&mut self) -> Result<(), HalError> {
		if self.stream.is_some() {
			return Ok(());
		}

		let host = cpal::default_host();
		let device = host.default_output_device().ok_or(HalError::Unavailable("audio output device"))?;
		let config = cpal::StreamConfig {
			channels: 1,
			sample_rate: cpal::SampleRate(SAMPLE_RATE),
			buffer_size: cpal::BufferSize::Fixed(1024)
		};

		let level = self.level;
		let tone = tone();
		let mut i = 0;
		let stream = device.build_output_stream(
			&config,
			move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
				let amplitude = level.amplitude();
				for v in data.iter_mut() {
					*v = amplitude * tone[i];
					i = (i + 1) % TONE_SAMPLES;
				}
			},
			audio_error,
			None
		).map_err(|e| {
			error!("Failed to build audio stream: {}", e);
			HalError::Failed("audio stream")
		})?;
		stream.play().map_err(|e| {
			error!("Failed to play audio stream: {}", e);
			HalError::Failed("audio stream")
		})?;

		debug!("Audio carrier attached");
		self.stream = Some(stream);
		Ok(())
	}

	fn detach(&mut self) {
		if self.stream.take().is_some() {
			debug!("Audio carrier detached");
		}
	}
}

/// The 100 ms periodic timer: a thread calling [`Keyer::on_tick`] on absolute deadlines, so
/// scheduling jitter doesn't accumulate.
pub struct ThreadTicker {
	keyer: &'static Keyer<CarrierLevel>,
	running: Option<(Arc<AtomicBool>, JoinHandle<()>)>
}

impl ThreadTicker {
	pub fn new(keyer: &'static Keyer<CarrierLevel>) -> ThreadTicker {
		ThreadTicker { keyer, running: None }
	}

	fn attach(&mut self, period: Duration) -> io::Result<()> {
		if self.running.is_some() {
			return Ok(());
		}

		let stop = Arc::new(AtomicBool::new(false));
		let flag = stop.clone();
		let keyer = self.keyer;
		let handle = thread::Builder::new().name(String::from("ticker")).spawn(move || {
			let mut deadline = Instant::now() + period;
			loop {
				let now = Instant::now();
				if deadline > now {
					thread::sleep(deadline - now);
				}
				if flag.load(Ordering::Acquire) {
					break;
				}
				keyer.on_tick();
				deadline += period;
			}
		})?;
		self.running = Some((stop, handle));
		Ok(())
	}

	fn detach(&mut self) {
		if let Some((stop, handle)) = self.running.take() {
			stop.store(true, Ordering::Release);
			if handle.join().is_err() {
				error!("Ticker thread panicked");
			}
		}
	}
}

/// Control-side peripherals of the host modulator.
pub struct HostHal {
	audio: AudioCarrier,
	ticker: ThreadTicker
}

impl HostHal {
	pub fn new(keyer: &'static Keyer<CarrierLevel>) -> HostHal {
		HostHal { audio: AudioCarrier::new(keyer.output()), ticker: ThreadTicker::new(keyer) }
	}
}

impl ModulatorHal for HostHal {
	fn attach_pwm(&mut self) -> Result<(), HalError> {
		self.audio.attach()
	}

	fn detach_pwm(&mut self) {
		self.audio.detach();
	}

	fn attach_ticker(&mut self, period: Duration) -> Result<(), HalError> {
		self.ticker.attach(period).map_err(|e| {
			error!("Failed to start ticker thread: {}", e);
			HalError::Failed("ticker thread")
		})
	}

	fn detach_ticker(&mut self) {
		self.ticker.detach();
	}
}

/// Time reported when the system clock can't be read. Before the epoch, so the control loop treats
/// it as untrusted.
const UNREADABLE: TimeSpec = TimeSpec { sec: -(1 << 40), nsec: 0 };

/// System time corrected by the SNTP offset, plus process uptime.
pub struct HostClock {
	offset: TimeSpec,
	boot: Instant
}

impl HostClock {
	pub fn new(offset: TimeSpec) -> HostClock {
		HostClock { offset, boot: Instant::now() }
	}
}

impl Clock for HostClock {
	fn now(&self) -> TimeSpec {
		time::now().map_or(UNREADABLE, |t| t + self.offset)
	}

	fn uptime(&self) -> Duration {
		self.boot.elapsed()
	}

	fn delay(&self, duration: Duration) {
		thread::sleep(duration);
	}
}

/// Decode a reset cause from [`RESET_CAUSE_VAR`]. Unset means a fresh start.
pub fn parse_reset_cause(value: Option<&str>) -> ResetCause {
	match value {
		None => ResetCause::PowerOn,
		Some("deep-sleep") => ResetCause::DeepSleepTimer,
		Some("software") => ResetCause::Software,
		Some(_) => ResetCause::Unknown
	}
}

/// Host power management.
///
/// There is no real deep sleep on a host, so one is emulated: sleep the thread, then replace the
/// process with a fresh copy of itself that reports [`ResetCause::DeepSleepTimer`]. That restarts
/// the control flow from the top and drops all running state, like the real thing.
pub struct HostPower {
	cause: ResetCause
}

impl HostPower {
	pub fn new(cause: ResetCause) -> HostPower {
		HostPower { cause }
	}

	/// Read the reset cause left by a previous incarnation.
	pub fn from_env() -> HostPower {
		let value = env::var(RESET_CAUSE_VAR).ok();
		HostPower::new(parse_reset_cause(value.as_deref()))
	}

	fn reexec(&self, cause: &str) -> ! {
		let err = match env::current_exe() {
			Ok(exe) => {
				let mut command = Command::new(exe);
				command.args(env::args_os().skip(1)).env(RESET_CAUSE_VAR, cause);
				relaunch(&mut command)
			},
			Err(e) => e
		};
		error!("Failed to restart: {}", err);
		process::exit(1)
	}
}

#[cfg(unix)]
fn relaunch(command: &mut Command) -> io::Error {
	use std::os::unix::process::CommandExt;
	command.exec()
}

#[cfg(not(unix))]
fn relaunch(command: &mut Command) -> io::Error {
	match command.spawn() {
		Ok(_) => process::exit(0),
		Err(e) => e
	}
}

impl Power for HostPower {
	fn reset_cause(&self) -> ResetCause {
		self.cause
	}

	fn light_sleep(&mut self, duration: Duration) {
		thread::sleep(duration);
	}

	fn deep_sleep(&mut self, duration: Duration) -> ! {
		thread::sleep(duration);
		info!("Deep sleep over, restarting");
		self.reexec("deep-sleep")
	}

	fn restart(&mut self) -> ! {
		self.reexec("software")
	}
}
