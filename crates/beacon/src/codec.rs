//! Binary-coded decimal and parity helpers.
//!
//! Time-signal fields are broadcast one decimal digit at a time, so every field is packed into
//! BCD before the frame encoder masks out individual bits.

/// Pack `value` into three BCD digits: hundreds in bits 8-11, tens in bits 4-7, units in 0-3.
///
/// `value` must be in `[0, 999]`. Every field the frame carries (hour, minute, two-digit year,
/// day of year) satisfies this.
///
/// # Examples
///
/// ```
/// # use beacon::codec::to_bcd;
/// assert_eq!(to_bcd(23), 0x23);
/// assert_eq!(to_bcd(366), 0x366);
/// ```
#[inline]
pub const fn to_bcd(value: u16) -> u16 {
	debug_assert!(value <= 999);
	(value / 100) << 8 | ((value / 10) % 10) << 4 | value % 10
}

/// The parity (0 or 1) of bits 0-7 of `value`, i.e. `1` iff an odd number of them are set.
///
/// # Examples
///
/// ```
/// # use beacon::codec::parity;
/// assert_eq!(parity(0x23), 1);
/// assert_eq!(parity(0x59), 0);
/// ```
#[inline]
pub const fn parity(value: u16) -> u8 {
	((value & 0xFF).count_ones() & 1) as u8
}
