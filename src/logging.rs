//! Log output setup.

use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when neither `--log` nor `RUST_LOG` gives a usable one.
const LOG_LEVEL: &str = "info";

/// Pick the log filter: `--log` first, then `RUST_LOG`, then [`LOG_LEVEL`].
fn filter(arg: Option<&str>) -> EnvFilter {
	match arg {
		Some(f) => EnvFilter::try_new(f).map_err(Into::into),
		None => EnvFilter::try_from_default_env()
	}
	.or_else(|_| EnvFilter::try_new(LOG_LEVEL))
	.unwrap_or_else(|_| EnvFilter::new(LOG_LEVEL))
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(arg: Option<&str>) {
	fmt()
		.with_env_filter(filter(arg))
		.with_target(false)
		.with_level(true)
		.compact()
		.with_writer(std::io::stderr)
		.init();
}
