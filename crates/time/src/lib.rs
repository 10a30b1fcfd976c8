//! Unix timestamps and their UTC calendar fields.
//!
//! There is no timezone database here. A beacon broadcasts a single zone, so callers shift the
//! timestamp by a fixed offset and then split it into calendar fields with [`Tm::new`].
//!
//! Builds without `std`. The `now` feature adds [`now`], which reads `CLOCK_REALTIME` via `libc`.
//!
//! ```
//! # use time::{Tm, TimeSpec, Seconds};
//! // 2025-01-01 12:00:00 in UTC-5
//! let utc = TimeSpec { sec: 1735750800, nsec: 0 };
//! let local = Tm::new((utc + Seconds(-5 * 3600)).sec).unwrap();
//! assert_eq!((local.year, local.yday, local.hour), (2025, 1, 12));
//! ```

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "std")]
extern crate std;

pub mod time;

pub use time::*;
