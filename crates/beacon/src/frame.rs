//! Encode wall-clock time into the 60-second amplitude-modulated frame.
//!
//! Each second of the minute carries one [`Symbol`]. Which field (and which bit of that field's
//! BCD value) a second carries is fixed by [`LAYOUT`], so the symbol for any second can be computed
//! on its own without building the rest of the frame:
//!
//! | Seconds                      | Content                                        |
//! | ---------------------------- | ---------------------------------------------- |
//! | 0, 9, 19, 29, 39, 49, 59     | Frame / position markers                       |
//! | 1-8                          | Minute (40, 20, 10, *0*, 8, 4, 2, 1)           |
//! | 12-18                        | Hour (20, 10, *0*, 8, 4, 2, 1)                 |
//! | 22-33                        | Day of year (200, 100, *0*, 80 ... 10, M, 8 ... 1) |
//! | 36, 37                       | Parity of hour BCD, parity of minute BCD       |
//! | 41-48                        | Two-digit year (80, 40, 20, 10, 8, 4, 2, 1)    |
//! | 50-52                        | Weekday, 0 = Sunday (4, 2, 1)                  |
//! | everything else              | Reserved, always zero                          |
//!
//! # Examples
//!
//! ```
//! # use beacon::clock::WallClockSample;
//! # use beacon::frame::{symbol_for, Symbol};
//! // Wed, Jul 04 2012 17:30:00
//! let sample = WallClockSample::from_epoch(1341423000).unwrap();
//! assert_eq!(symbol_for(&sample), Symbol::Marker);
//! assert_eq!(symbol_for(&sample.with_second(2)), Symbol::One);  // minute 30 => 20 bit set
//! assert_eq!(symbol_for(&sample.with_second(1)), Symbol::Zero); // minute 30 => 40 bit clear
//! ```

use crate::clock::WallClockSample;
use crate::codec::{parity, to_bcd};

/// The modulation symbol for one second.
///
/// The discriminants are the encoding used when a symbol is handed to the carrier tick handler
/// through a single atomic byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Symbol {
	/// Binary zero.
	Zero = 0,
	/// Binary one.
	One = 1,
	/// Frame or position marker.
	Marker = 2
}

impl Symbol {
	/// Decode a symbol from its byte encoding. Unknown values decode as [`Symbol::Marker`].
	#[inline(always)]
	pub const fn from_u8(v: u8) -> Symbol {
		match v {
			0 => Symbol::Zero,
			1 => Symbol::One,
			_ => Symbol::Marker
		}
	}
}

/// What one second of the frame carries.
#[derive(Clone, Copy)]
enum Slot {
	Marker,
	/// Reserved or unused, always [`Symbol::Zero`].
	Zero,
	Minute(u16),
	Hour(u16),
	Yday(u16),
	Year(u16),
	Wday(u8),
	HourParity,
	MinuteParity
}

use Slot::*;

/// Per-second layout of the frame. The payload of each field slot is the mask applied to that
/// field's BCD value (or the raw weekday).
const LAYOUT: [Slot; 60] = [
	Marker,                                                          //  0
	Minute(0x40), Minute(0x20), Minute(0x10), Zero,                  //  1-4
	Minute(0x08), Minute(0x04), Minute(0x02), Minute(0x01),          //  5-8
	Marker,                                                          //  9
	Zero, Zero,                                                      // 10-11
	Hour(0x20), Hour(0x10), Zero,                                    // 12-14
	Hour(0x08), Hour(0x04), Hour(0x02), Hour(0x01),                  // 15-18
	Marker,                                                          // 19
	Zero, Zero,                                                      // 20-21
	Yday(0x200), Yday(0x100), Zero,                                  // 22-24
	Yday(0x80), Yday(0x40), Yday(0x20), Yday(0x10),                  // 25-28
	Marker,                                                          // 29
	Yday(0x08), Yday(0x04), Yday(0x02), Yday(0x01),                  // 30-33
	Zero, Zero,                                                      // 34-35
	HourParity, MinuteParity,                                        // 36-37
	Zero,                                                            // 38
	Marker,                                                          // 39
	Zero,                                                            // 40
	Year(0x80), Year(0x40), Year(0x20), Year(0x10),                  // 41-44
	Year(0x08), Year(0x04), Year(0x02), Year(0x01),                  // 45-48
	Marker,                                                          // 49
	Wday(0x4), Wday(0x2), Wday(0x1),                                 // 50-52
	Zero, Zero, Zero, Zero, Zero, Zero,                              // 53-58
	Marker                                                           // 59
];

#[inline(always)]
fn bit(value: u16, mask: u16) -> Symbol {
	if value & mask != 0 { Symbol::One } else { Symbol::Zero }
}

/// The symbol to transmit during the second described by `sample`.
///
/// Pure: only the fields of `sample` are read, never the system clock.
pub fn symbol_for(sample: &WallClockSample) -> Symbol {
	let Some(slot) = LAYOUT.get(sample.second as usize) else {
		// Leap second, hold the marker
		return Symbol::Marker;
	};
	match *slot {
		Marker => Symbol::Marker,
		Zero => Symbol::Zero,
		Minute(m) => bit(to_bcd(sample.minute as u16), m),
		Hour(m) => bit(to_bcd(sample.hour as u16), m),
		Yday(m) => bit(to_bcd(sample.yday), m),
		Year(m) => bit(to_bcd(sample.year_of_century()), m),
		Wday(m) => bit(sample.wday as u16, m as u16),
		HourParity => bit(parity(to_bcd(sample.hour as u16)) as u16, 1),
		MinuteParity => bit(parity(to_bcd(sample.minute as u16)) as u16, 1)
	}
}

/// All 60 symbols of the minute containing `sample`.
pub fn encode_minute(sample: &WallClockSample) -> [Symbol; 60] {
	let mut frame = [Symbol::Zero; 60];
	for (s, symbol) in frame.iter_mut().enumerate() {
		*symbol = symbol_for(&sample.with_second(s as u8));
	}
	frame
}

/// Pack a frame into a bit field, LSB first: bit `s` is set iff second `s` is [`Symbol::One`].
///
/// Markers are not represented; they sit at fixed positions.
pub fn pack(frame: &[Symbol; 60]) -> u64 {
	frame.iter()
		.enumerate()
		.filter(|&(_, &s)| s == Symbol::One)
		.fold(0, |acc, (i, _)| acc | 1 << i)
}

/// Render a frame as text: `M` for markers, `1` and `0` for data, grouped by ten seconds.
#[cfg(feature = "std")]
pub fn render(frame: &[Symbol; 60]) -> std::string::String {
	let mut out = std::string::String::with_capacity(66);
	for (i, s) in frame.iter().enumerate() {
		if i > 0 && i % 10 == 0 {
			out.push(' ');
		}
		out.push(match s {
			Symbol::Marker => 'M',
			Symbol::One => '1',
			Symbol::Zero => '0'
		});
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	const MARKERS: [u8; 7] = [0, 9, 19, 29, 39, 49, 59];

	fn sample(hour: u8, minute: u8, yday: u16, year: u16, wday: u8) -> WallClockSample {
		WallClockSample { epoch: 0, year, month: 1, yday, hour, minute, second: 0, wday }
	}

	/// Sum the masks of every second in `seconds` that carries a one.
	fn decode(frame: &[Symbol; 60], seconds: &[(usize, u16)]) -> u16 {
		seconds.iter()
			.filter(|&&(s, _)| frame[s] == Symbol::One)
			.map(|&(_, weight)| weight)
			.sum()
	}

	fn from_bcd(v: u16) -> u16 {
		(v >> 8) * 100 + ((v >> 4) & 0xF) * 10 + (v & 0xF)
	}

	#[test]
	fn markers_test() {
		for s in [sample(0, 0, 1, 2000, 0), sample(23, 59, 366, 2099, 6), sample(12, 34, 200, 2055, 3)] {
			let frame = encode_minute(&s);
			for (i, symbol) in frame.iter().enumerate() {
				assert_eq!(*symbol == Symbol::Marker, MARKERS.contains(&(i as u8)), "second {}", i);
			}
		}
	}

	#[test]
	fn reserved_zero_test() {
		// Values with every BCD bit set around the reserved positions
		let s = sample(19, 59, 399, 2099, 7);
		for second in [4, 14, 24] {
			assert_eq!(symbol_for(&s.with_second(second)), Symbol::Zero, "second {}", second);
		}
		let frame = encode_minute(&s);
		for second in [10, 11, 20, 21, 34, 35, 38, 40, 53, 54, 55, 56, 57, 58] {
			assert_eq!(frame[second], Symbol::Zero, "second {}", second);
		}
	}

	#[test]
	fn bcd_round_trip_test() {
		let frame = encode_minute(&sample(23, 59, 1, 2024, 0));
		let minute = decode(&frame, &[(1, 0x40), (2, 0x20), (3, 0x10), (5, 8), (6, 4), (7, 2), (8, 1)]);
		let hour = decode(&frame, &[(12, 0x20), (13, 0x10), (15, 8), (16, 4), (17, 2), (18, 1)]);
		assert_eq!(from_bcd(minute), 59);
		assert_eq!(from_bcd(hour), 23);
	}

	#[test]
	fn full_frame_test() {
		// Wed, Jul 04 2012 17:30 => minute 0x30, hour 0x17, day 0x186, year 0x12, weekday 3
		let s = WallClockSample::from_epoch(1341423000).unwrap();
		let frame = encode_minute(&s);
		assert_eq!(decode(&frame, &[(1, 0x40), (2, 0x20), (3, 0x10), (5, 8), (6, 4), (7, 2), (8, 1)]), 0x30);
		assert_eq!(decode(&frame, &[(12, 0x20), (13, 0x10), (15, 8), (16, 4), (17, 2), (18, 1)]), 0x17);
		assert_eq!(decode(&frame, &[(22, 0x200), (23, 0x100), (25, 0x80), (26, 0x40), (27, 0x20),
			(28, 0x10), (30, 8), (31, 4), (32, 2), (33, 1)]), 0x186);
		assert_eq!(decode(&frame, &[(41, 0x80), (42, 0x40), (43, 0x20), (44, 0x10), (45, 8),
			(46, 4), (47, 2), (48, 1)]), 0x12);
		assert_eq!(decode(&frame, &[(50, 4), (51, 2), (52, 1)]), 3);
		// Hour 0x17 has four bits set, minute 0x30 has two
		assert_eq!(frame[36], Symbol::Zero);
		assert_eq!(frame[37], Symbol::Zero);

		let expected: u64 = 1 << 2 | 1 << 3          // minute
			| 1 << 13 | 1 << 16 | 1 << 17 | 1 << 18       // hour
			| 1 << 23 | 1 << 25 | 1 << 31 | 1 << 32          // day of year
			| 1 << 44 | 1 << 47                           // year
			| 1 << 51 | 1 << 52;                          // weekday
		assert_eq!(pack(&frame), expected);
	}

	#[test]
	fn parity_test() {
		for hour in 0..24 {
			for minute in 0..60 {
				let s = sample(hour, minute, 100, 2024, 1);
				let hp = to_bcd(hour as u16).count_ones() % 2 == 1;
				let mp = to_bcd(minute as u16).count_ones() % 2 == 1;
				assert_eq!(symbol_for(&s.with_second(36)) == Symbol::One, hp, "hour {}", hour);
				assert_eq!(symbol_for(&s.with_second(37)) == Symbol::One, mp, "minute {}", minute);
			}
		}
	}

	#[test]
	fn deterministic_test() {
		let s = sample(7, 45, 45, 2031, 5);
		assert_eq!(encode_minute(&s), encode_minute(&s));
		// Out of range second (leap second) holds the marker
		assert_eq!(symbol_for(&s.with_second(60)), Symbol::Marker);
	}

	#[test]
	fn symbol_encoding_test() {
		for s in [Symbol::Zero, Symbol::One, Symbol::Marker] {
			assert_eq!(Symbol::from_u8(s as u8), s);
		}
		assert_eq!(Symbol::from_u8(0xFF), Symbol::Marker);
	}
}
