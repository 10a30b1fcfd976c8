//! Run a low-frequency time-signal beacon on a host computer.
//!
//! The beacon synchronizes to [SNTP] servers, then transmits a 60-second amplitude-modulated time
//! frame for the first minutes of every hour of a nightly window, phase-aligned to second
//! boundaries. Between windows it sleeps. The carrier is a tone on the default audio output (see
//! [`hardware`]): radio-controlled clocks nearby pick up the stray RF the audio hardware emits.
//!
//! Outside the night window the process "deep sleeps" by sleeping and then replacing itself with a
//! fresh copy, so each night starts from a clean boot with freshly synchronized time, exactly like
//! the battery-powered device it models.
//!
//! [SNTP]: sntp
//!
//! # Command Line Arguments
//!
//! General form: `timebeacon [options...]`
//!
//! | Long form                | Argument      | Default     | Description                              |
//! | ------------------------ | ------------- | ----------- | ---------------------------------------- |
//! | `--boot-test-minutes`    | Integer       | 5           | Transmit time after a manual start       |
//! | `--night-start`          | Hour          | 0           | First hour of the night window           |
//! | `--night-end`            | Hour          | 5           | First hour after the night window        |
//! | `--transmit-minutes`     | Integer       | 15          | Minutes transmitted per night hour       |
//! | `--wake-hour`            | Hour          | 23          | Daily wake from deep sleep               |
//! | `--wake-minute`          | Minute        | 50          | Daily wake from deep sleep               |
//! | `--utc-offset`           | Seconds       | 0           | Broadcast zone offset from UTC           |
//! | `--drift`                | Seconds       | 0           | Manual clock correction                  |
//! | `--safety-sleep-minutes` | Integer       | 60          | Sleep when time can't be trusted         |
//! | `--ntp`                  | Hostname / IP | None        | SNTP server, repeat for fallback tiers   |
//! | `--sync-attempts`        | Integer > 0   | 4           | SNTP requests per tier                   |
//! | `--preview`              |               |             | Print this minute's frame and exit       |
//! | `--log`                  | Filter        | `RUST_LOG`  | Log filter, falls back to `info`         |
//!
//! # Examples
//!
//! Transmit US Eastern standard time, synchronized to two tiers of servers
//! ```sh
//! timebeacon --utc-offset -18000 --ntp time.nist.gov --ntp pool.ntp.org
//! ```
//!
//! Show the frame for the current minute
//! ```sh
//! timebeacon --preview
//! ```

use std::error::Error;
use std::process::ExitCode;

use beacon::frame::{encode_minute, render};
use beacon::{Beacon, Keyer, Modulator, SleepController};
use clap::Parser;
use time::TimeSpec;
use tracing::{error, info, warn};

use args::Arguments;
use hardware::{CarrierLevel, HostClock, HostHal, HostPower};

mod args;
mod hardware;
mod logging;

/// Tick handler state, shared by the ticker thread and the audio callback.
static KEYER: Keyer<CarrierLevel> = Keyer::new(CarrierLevel::new());

/// Print the frame for the current minute.
fn preview(args: &Arguments) -> Result<ExitCode, Box<dyn Error>> {
	let wall = args.wall_clock()?;
	let now = time::now().ok_or("Failed to get current system time")?;
	let sample = wall.sample(now).ok_or("System time is before 1970")?.with_second(0);
	println!(
		"{:04}, day {:03}  {:02}:{:02}  {}",
		sample.year, sample.yday, sample.hour, sample.minute, render(&encode_minute(&sample))
	);
	Ok(ExitCode::SUCCESS)
}

/// Synchronize, then run the beacon forever.
///
/// # Errors
///
/// Only configuration errors are returned. Every runtime failure becomes a restart or a safety
/// sleep.
fn run(args: Arguments) -> Result<ExitCode, Box<dyn Error>> {
	let config = args.schedule()?;
	let wall = args.wall_clock()?;
	let power = HostPower::from_env();
	info!(version = env!("CARGO_PKG_VERSION"), "timebeacon starting");

	let offset = if args.ntp.is_empty() {
		warn!("No SNTP servers configured, trusting the system clock");
		TimeSpec::default()
	} else {
		match sntp::sync(args.ntp.as_slice(), args.sync_attempts) {
			Ok(t) => {
				info!(offset = ?t.offset, error = ?t.error, "Trusted time acquired");
				t.offset
			},
			Err(e) => {
				error!("{}", e);
				SleepController::new(power, config.safety_sleep).safety_sleep()
			}
		}
	};

	let modulator = Modulator::new(&KEYER, HostHal::new(&KEYER));
	let sleep = SleepController::new(power, config.safety_sleep);
	Beacon::new(config, wall, modulator, HostClock::new(offset), sleep).run()
}

/// Main program entry point.
///
/// Parses input arguments and runs the beacon. See [`crate`] documentation for details.
fn main() -> ExitCode {
	let args = Arguments::parse();
	logging::init(args.log.as_deref());

	let result = if args.preview { preview(&args) } else { run(args) };
	result
		.inspect_err(|e| error!("{}", e))
		.unwrap_or(ExitCode::FAILURE)
}
