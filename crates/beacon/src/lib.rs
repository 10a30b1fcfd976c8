//! Core of a low-frequency time-signal beacon.
//!
//! The beacon turns trusted wall-clock time into a 60-symbol-per-minute amplitude-modulated frame
//! and keys a carrier with it, phase-aligned to second boundaries, for a short window every night.
//! The rest of the day the device is suspended. This crate holds everything that decides *what* to
//! transmit and *when*:
//!
//! | Module       | Role                                                                  |
//! | ------------ | --------------------------------------------------------------------- |
//! | [`codec`]    | BCD packing and parity                                                |
//! | [`frame`]    | Per-second frame encoder                                              |
//! | [`modulator`]| 100 ms carrier keying, symbol hand-off, phase alignment               |
//! | [`schedule`] | Operating windows and exact sleep deadlines                           |
//! | [`sleep`]    | Clock-preserving and deep suspension                                  |
//! | [`clock`]    | Wall-clock samples and the device clock                               |
//! | [`beacon`]   | The control loop tying the above together                             |
//!
//! Hardware is reached only through small traits ([`clock::Clock`], [`modulator::CarrierOutput`],
//! [`modulator::ModulatorHal`], [`sleep::Power`]), so the same core runs on a microcontroller or,
//! with the `timebeacon` binary, on a host using audio output as the carrier.
//!
//! This crate is `no_std` by default. Enabling feature `std` adds [`frame::render`] and lets
//! [`tracing`] reach a `std` subscriber.
//!
//! # Examples
//!
//! ```
//! # use beacon::clock::WallClockSample;
//! # use beacon::frame::{encode_minute, Symbol};
//! // Wed, Jul 04 2012 17:30:00
//! let sample = WallClockSample::from_epoch(1341423000).unwrap();
//! let frame = encode_minute(&sample);
//! assert_eq!(frame[0], Symbol::Marker);
//! assert_eq!(frame[59], Symbol::Marker);
//! ```

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "std")]
extern crate std;

use core::{error, fmt};

pub mod codec;
pub mod clock;
pub mod frame;
pub mod modulator;
pub mod schedule;
pub mod sleep;
pub mod beacon;

#[cfg(test)]
mod testing;

pub use beacon::Beacon;
pub use clock::{Clock, WallClock, WallClockSample};
pub use frame::Symbol;
pub use modulator::{CarrierOutput, Keyer, Modulator, ModulatorHal};
pub use schedule::{Action, OperatingWindow, ScheduleConfig, TimeOfDay};
pub use sleep::{Power, ResetCause, SleepController};

/// The error type for hardware abstraction calls.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum HalError {
	/// The peripheral is missing or already claimed. The peripheral name is provided in the
	/// payload.
	Unavailable(&'static str),
	/// The peripheral rejected the request. A description is provided in the payload.
	Failed(&'static str)
}

impl fmt::Display for HalError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HalError::Unavailable(x) => write!(f, "Peripheral unavailable: {}", x),
			HalError::Failed(x) => write!(f, "Peripheral failed: {}", x)
		}
	}
}

impl fmt::Debug for HalError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for HalError {}

/// The error type for starting the carrier modulator.
///
/// Both variants are fatal to the device: the control loop answers them with a restart.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ModulatorError {
	/// The PWM peripheral could not be attached to the carrier output.
	PwmAttach(HalError),
	/// The 100 ms periodic ticker could not be started.
	TickerAttach(HalError)
}

impl fmt::Display for ModulatorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ModulatorError::PwmAttach(x) => write!(f, "Failed to attach PWM: {}", x),
			ModulatorError::TickerAttach(x) => write!(f, "Failed to attach ticker: {}", x)
		}
	}
}

impl fmt::Debug for ModulatorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for ModulatorError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			ModulatorError::PwmAttach(x) | ModulatorError::TickerAttach(x) => Some(x)
		}
	}
}

/// The error type for validating a [`ScheduleConfig`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
	/// An hour field is outside [0, 23]. The field name and value are provided in the payload.
	InvalidHour(&'static str, u8),
	/// A minute field is outside [0, 59]. The field name and value are provided in the payload.
	InvalidMinute(&'static str, u8),
	/// The night window starts and ends on the same hour, so it is empty.
	EmptyNightWindow,
	/// The safety sleep is shorter than one second.
	InvalidSafetySleep
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::InvalidHour(n, x) => write!(f, "Invalid hour for {}: {}", n, x),
			ConfigError::InvalidMinute(n, x) => write!(f, "Invalid minute for {}: {}", n, x),
			ConfigError::EmptyNightWindow => write!(f, "Night window is empty"),
			ConfigError::InvalidSafetySleep => write!(f, "Safety sleep must be at least one second")
		}
	}
}

impl fmt::Debug for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for ConfigError {}
