//! Trusted wall-clock time from SNTP servers.
//!
//! The beacon must never broadcast a time it has not verified, so it only starts once this crate
//! has produced a [`TrustedTime`]. [`sync`] walks an ordered list of server tiers (e.g. a local
//! server, then a regional pool, then a global pool), querying each tier a configurable number of
//! times and keeping the response with the smallest error bound. The first tier that yields any
//! valid response wins; later tiers are only contacted if every earlier tier failed.
//!
//! # Examples
//!
//! ```no_run
//! # use std::num::NonZero;
//! match sntp::sync(&["time.google.com", "pool.ntp.org"], NonZero::new(4).unwrap()) {
//! 	Ok(t) => println!("Offset from system clock: {:?}", t.offset),
//! 	Err(e) => eprintln!("Time is not trustworthy: {e}")
//! }
//! ```

use std::{
	error, fmt, io,
	net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
	num::NonZero,
	time::Duration
};
use time::{now, TimeSpec, NANOS_PER_SECOND};
use tracing::{debug, info, warn};

/// Seconds from the NTP era 0 epoch (1900-01-01) to the Unix epoch (1970-01-01).
const NTP_UNIX_DELTA: i64 = 2208988800;

/// Size of an SNTP packet without extension fields or authenticator.
const PACKET_LEN: usize = 48;

/// Per-request socket timeout.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

/// A point in NTP time: unsigned 32.32 fixed point seconds since 1900 (era 0).
///
/// Era 0 ends in February 2036. Only differences between stamps taken within a few seconds of
/// each other are ever used, and those survive the wrap.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Stamp(u64);

impl Stamp {
	fn from_parts(sec: u32, frac: u32) -> Stamp {
		Stamp(((sec as u64) << 32) | frac as u64)
	}

	/// The 64-bit big endian field at `offset` in a packet.
	fn field(packet: &[u8], offset: usize) -> Stamp {
		let mut b = [0; 8];
		b.copy_from_slice(&packet[offset..offset + 8]);
		Stamp(u64::from_be_bytes(b))
	}

	/// The 32-bit big endian 16.16 field at `offset`, widened to 32.32.
	fn short_field(packet: &[u8], offset: usize) -> Stamp {
		let mut b = [0; 4];
		b.copy_from_slice(&packet[offset..offset + 4]);
		Stamp((u32::from_be_bytes(b) as u64) << 16)
	}

	fn from_unix(time: TimeSpec) -> Stamp {
		let frac = ((time.nsec as u64) << 32) / NANOS_PER_SECOND as u64;
		Stamp::from_parts((time.sec + NTP_UNIX_DELTA) as u32, frac as u32)
	}

	/// Signed interval from `earlier` to `self`.
	fn since(self, earlier: Stamp) -> Interval {
		Interval(self.0.wrapping_sub(earlier.0) as i64)
	}

	/// This stamp read as a non-negative interval, for root delay and dispersion.
	fn as_interval(self) -> Interval {
		Interval(self.0 as i64)
	}
}

/// A signed 32.32 fixed point interval between two [`Stamp`]s, good for +/-68 years.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Interval(i64);

impl Interval {
	/// Whole seconds, floored (-1.25 -> -2).
	fn whole(self) -> i64 {
		self.0 >> 32
	}

	/// Fraction above [`Interval::whole`], as 32-bit fixed point (-1.25 -> 0.75).
	fn frac(self) -> i64 {
		self.0 & 0xFFFF_FFFF
	}

	fn plus(self, other: Interval) -> Interval {
		Interval(self.0.wrapping_add(other.0))
	}

	fn minus(self, other: Interval) -> Interval {
		Interval(self.0.wrapping_sub(other.0))
	}

	fn half(self) -> Interval {
		Interval(self.0 / 2)
	}

	fn magnitude(self) -> Interval {
		Interval(self.0.wrapping_abs())
	}

	/// The interval as a signed [`TimeSpec`] offset.
	fn to_timespec(self) -> TimeSpec {
		TimeSpec { sec: self.whole(), nsec: (self.frac() * NANOS_PER_SECOND) >> 32 }
	}
}

/// Build a client request (version 4, mode 3) carrying `tx` as the transmit timestamp.
fn request(tx: Stamp) -> [u8; PACKET_LEN] {
	let mut packet = [0; PACKET_LEN];
	packet[0] = 0x23; // 0x4 (version) << 3 | 0x3 (client mode)
	packet[40..48].copy_from_slice(&tx.0.to_be_bytes());
	packet
}

/// The fields of a server reply this client uses.
#[derive(Debug, PartialEq)]
struct Reply {
	root_delay: Stamp,
	root_dispersion: Stamp,
	origin: Stamp,
	received: Stamp,
	transmitted: Stamp
}

impl Reply {
	/// Parse and validate a server reply to the request sent at `sent`.
	///
	/// # Errors
	///
	/// Returns [`io::ErrorKind::InvalidData`] if the packet is short, not a server reply, a
	/// kiss-of-death (stratum 0), or does not echo `sent` as its origin timestamp.
	fn parse(packet: &[u8], sent: Stamp) -> Result<Reply, io::Error> {
		if packet.len() < PACKET_LEN {
			return Err(invalid("Short reply from NTP server"));
		}
		if packet[0] & 0x7 != 4 {
			return Err(invalid("NTP reply is not in server mode"));
		}
		if packet[1] == 0 {
			return Err(invalid("NTP server sent kiss-of-death"));
		}
		let reply = Reply {
			root_delay: Stamp::short_field(packet, 4),
			root_dispersion: Stamp::short_field(packet, 8),
			origin: Stamp::field(packet, 24),
			received: Stamp::field(packet, 32),
			transmitted: Stamp::field(packet, 40)
		};
		if reply.origin != sent {
			return Err(invalid("NTP reply does not match request"));
		}
		Ok(reply)
	}

	/// Compute the clock offset and error bound given the local receive time `t4`.
	///
	/// Returns `(offset, error)`, where `offset` is added to local time to get server time.
	fn measure(&self, t4: Stamp) -> (Interval, Interval) {
		let (t1, t2, t3) = (self.origin, self.received, self.transmitted);
		let round_trip = t4.since(t1).minus(t3.since(t2));
		let offset = t2.since(t1).minus(t4.since(t3)).half();
		let error = round_trip
			.plus(self.root_delay.as_interval().half())
			.plus(self.root_dispersion.as_interval());
		(offset, error.magnitude())
	}
}

fn invalid(msg: &'static str) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn clock_error() -> io::Error {
	io::Error::new(io::ErrorKind::Other, "Failed to get current time")
}

/// Client sockets, opened on first use per address family and reused for every query.
#[derive(Default)]
struct Sockets {
	v4: Option<UdpSocket>,
	v6: Option<UdpSocket>
}

impl Sockets {
	fn for_peer(&mut self, peer: &SocketAddr) -> Result<&UdpSocket, io::Error> {
		let (slot, local) = match peer {
			SocketAddr::V4(_) => (&mut self.v4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
			SocketAddr::V6(_) => (&mut self.v6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
		};
		if slot.is_none() {
			*slot = Some(Sockets::open(local)?);
		}
		slot.as_ref().ok_or_else(|| io::Error::other("Socket not open"))
	}

	fn open(local: SocketAddr) -> Result<UdpSocket, io::Error> {
		let socket = UdpSocket::bind(local)?;
		socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;
		socket.set_write_timeout(Some(SOCKET_TIMEOUT))?;
		Ok(socket)
	}

	/// One request/reply exchange with `peer`, returning `(offset, error)`.
	fn query(&mut self, peer: &SocketAddr) -> Result<(Interval, Interval), io::Error> {
		let socket = self.for_peer(peer)?;
		socket.connect(peer)?;
		let sent = Stamp::from_unix(now().ok_or_else(clock_error)?);
		socket.send(&request(sent))?;
		let mut buf = [0; PACKET_LEN];
		let len = socket.recv(&mut buf)?;
		let arrived = Stamp::from_unix(now().ok_or_else(clock_error)?);
		Ok(Reply::parse(&buf[..len], sent)?.measure(arrived))
	}
}

/// Normalize an address for use by [`ToSocketAddrs::to_socket_addrs`].
///
/// Adds the default NTP port (123) if none is given. Supports domain names and IP addresses
/// (IPv4 and IPv6, bracketed or not).
fn normalize_address(addr: &str) -> Result<String, io::Error> {
	if addr.is_empty() {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty SNTP server address"));
	}

	match addr.find(':') {
		Some(i) => match addr[i+1..].rfind(':') {
			// More than one ':' means IPv6; a port can only follow a closing ']'
			Some(j) => match addr.rfind(']') {
				Some(k) if i + 1 + j > k => Ok(String::from(addr)),
				Some(_) => Ok(format!("{}:123", addr)),
				None => Ok(format!("[{}]:123", addr))
			},
			None => Ok(String::from(addr))
		},
		None => Ok(format!("{}:123", addr))
	}
}

/// The error type for [`sync`].
pub enum SyncError {
	/// No server tiers were configured.
	NoServers,
	/// Every tier failed. The payload holds the number of tiers tried and the last error seen.
	Exhausted(usize, io::Error)
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::NoServers => write!(f, "No SNTP servers configured"),
			SyncError::Exhausted(n, e) => write!(f, "All {} SNTP tiers failed, last error: {}", n, e)
		}
	}
}

impl fmt::Debug for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for SyncError {}

/// A verified correction to the local system clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrustedTime {
	/// Signed offset to add to the system clock.
	pub offset: TimeSpec,
	/// Estimated error bound (+/-) of `offset`.
	pub error: TimeSpec,
	/// The server that produced the best measurement.
	pub server: SocketAddr
}

/// Query one tier, keeping the lowest-error response out of `attempts` requests.
///
/// If the address resolves to multiple IPs, requests cycle through them.
fn sync_tier(sockets: &mut Sockets, server: &str, attempts: NonZero<usize>) -> Result<TrustedTime, io::Error> {
	let addrs: Vec<SocketAddr> = normalize_address(server)?.to_socket_addrs()?.collect();
	if addrs.is_empty() {
		return Err(io::Error::new(io::ErrorKind::NotFound, "Address did not resolve to any IPs"));
	}

	let mut best: Option<(Interval, Interval, SocketAddr)> = None;
	let mut last_error = None;
	for addr in addrs.iter().cycle().take(attempts.get()) {
		match sockets.query(addr) {
			Ok((t, e)) => {
				debug!(%addr, error = ?e.to_timespec(), "SNTP response");
				if best.is_none_or(|(_, be, _)| e < be) {
					best = Some((t, e, *addr));
				}
			}
			Err(e) => {
				debug!(%addr, "SNTP request failed: {}", e);
				last_error = Some(e);
			}
		}
	}

	match (best, last_error) {
		(Some((t, e, server)), _) => Ok(TrustedTime { offset: t.to_timespec(), error: e.to_timespec(), server }),
		(None, Some(e)) => Err(e),
		(None, None) => Err(io::Error::new(io::ErrorKind::Other, "No SNTP requests made"))
	}
}

/// Get a trusted time correction from the first tier of servers that answers.
///
/// Each entry of `tiers` is a hostname or IP, optionally with a port. `attempts` requests are made
/// per tier.
///
/// # Errors
///
/// Returns [`SyncError::NoServers`] if `tiers` is empty and [`SyncError::Exhausted`] if no tier
/// produced a valid response.
pub fn sync<S: AsRef<str>>(tiers: &[S], attempts: NonZero<usize>) -> Result<TrustedTime, SyncError> {
	let mut sockets = Sockets::default();
	let mut last_error = None;
	for (i, server) in tiers.iter().enumerate() {
		let server = server.as_ref();
		match sync_tier(&mut sockets, server, attempts) {
			Ok(t) => {
				info!(tier = i, server = %t.server, offset = ?t.offset, error = ?t.error, "Clock synchronized");
				return Ok(t);
			}
			Err(e) => {
				warn!(tier = i, server, "SNTP tier failed: {}", e);
				last_error = Some(e);
			}
		}
	}

	match last_error {
		Some(e) => Err(SyncError::Exhausted(tiers.len(), e)),
		None => Err(SyncError::NoServers)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;
	use time::Seconds;

	#[test]
	fn interval_test() {
		let a = Stamp::from_parts(0x12345678, 0x11223344);
		let b = Stamp::from_parts(0x09876543, 0x55555555);
		let d = a.since(b);
		assert_eq!((d.whole(), d.frac()), (0x08ACF134, 0xBBCCDDEF));
		let d = b.since(a);
		assert_eq!((d.whole(), d.frac()), (-0x8ACF135, 0x44332211));

		// 1.5s and 2.375s
		let a = Stamp::from_parts(1, 0x80000000);
		let b = Stamp::from_parts(2, 0x60000000);
		assert_eq!(b.since(a).to_timespec(), TimeSpec { sec: 0, nsec: 875000000 });
		assert_eq!(a.since(b).to_timespec(), TimeSpec { sec: -1, nsec: 125000000 });
		assert_eq!(a.since(b).magnitude(), b.since(a));

		// Differences survive the 2036 era rollover
		let before = Stamp::from_parts(u32::MAX, 0);
		let after = Stamp::from_parts(1, 0);
		assert_eq!(after.since(before).to_timespec(), TimeSpec { sec: 2, nsec: 0 });
	}

	#[test]
	fn stamp_from_unix_test() {
		let t = Stamp::from_unix(TimeSpec { sec: 0, nsec: 500000000 });
		assert_eq!(t, Stamp::from_parts(2208988800, 0x80000000));
		let t = Stamp::from_unix(TimeSpec { sec: 1700000000, nsec: 250000000 });
		assert_eq!(t, Stamp::from_parts(3908988800, 0x40000000));
	}

	#[test]
	fn reply_parse_test() {
		let sent = Stamp::from_parts(100, 0);
		let mut packet = [0u8; PACKET_LEN];
		packet[0] = 0x24; // version 4, server mode
		packet[1] = 2;
		packet[4..8].copy_from_slice(&0x00010000u32.to_be_bytes()); // 1s root delay
		packet[24..32].copy_from_slice(&sent.0.to_be_bytes());
		packet[32..40].copy_from_slice(&Stamp::from_parts(105, 0).0.to_be_bytes());
		packet[40..48].copy_from_slice(&Stamp::from_parts(105, 0).0.to_be_bytes());

		let reply = Reply::parse(&packet, sent).unwrap();
		assert_eq!(reply.root_delay, Stamp::from_parts(1, 0));

		// Server 5s ahead, 2s round trip
		let (offset, error) = reply.measure(Stamp::from_parts(102, 0));
		assert_eq!(offset.to_timespec(), TimeSpec { sec: 4, nsec: 0 });
		assert_eq!(error.to_timespec(), TimeSpec { sec: 2, nsec: 500000000 });

		assert!(Reply::parse(&packet[..47], sent).is_err());
		assert!(Reply::parse(&packet, Stamp::from_parts(101, 0)).is_err());
		packet[1] = 0;
		assert!(Reply::parse(&packet, sent).is_err());
		packet[1] = 2;
		packet[0] = 0x23;
		assert!(Reply::parse(&packet, sent).is_err());
	}

	#[test]
	fn normalize_address_test() {
		assert_eq!(normalize_address("time.google.com:321").unwrap(), "time.google.com:321");
		assert_eq!(normalize_address("time.google.com").unwrap(), "time.google.com:123");
		assert_eq!(normalize_address("127.0.0.1").unwrap(), "127.0.0.1:123");
		assert_eq!(normalize_address("[::1]:321").unwrap(), "[::1]:321");
		assert_eq!(normalize_address("::1").unwrap(), "[::1]:123");
		assert_eq!(normalize_address("[::1]").unwrap(), "[::1]:123");
		assert!(normalize_address("").is_err());
	}

	/// Answer one request per call with a server clock running `ahead` seconds fast.
	fn fake_server(ahead: i64, requests: usize) -> SocketAddr {
		let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
		let addr = socket.local_addr().unwrap();
		thread::spawn(move || {
			for _ in 0..requests {
				let mut buf = [0u8; PACKET_LEN];
				let Ok((_, peer)) = socket.recv_from(&mut buf) else { return };
				let server_time = Stamp::from_unix(now().unwrap() + Seconds(ahead));
				let mut reply = [0u8; PACKET_LEN];
				reply[0] = 0x24;
				reply[1] = 1;
				reply[24..32].copy_from_slice(&buf[40..48]);
				reply[32..40].copy_from_slice(&server_time.0.to_be_bytes());
				reply[40..48].copy_from_slice(&server_time.0.to_be_bytes());
				socket.send_to(&reply, peer).unwrap();
			}
		});
		addr
	}

	#[test]
	fn sync_falls_back_to_next_tier() {
		let addr = fake_server(5, 2).to_string();
		let t = sync(&["invalid address", addr.as_str()], NonZero::new(2).unwrap()).unwrap();
		assert_eq!(t.server.to_string(), addr);
		let ns = t.offset.sec * 1000000000 + t.offset.nsec;
		assert!((ns - 5000000000).abs() < 500000000, "offset {} ns", ns);
		// Loopback round trip with zero root delay and dispersion
		assert_eq!(t.error.sec, 0);
		assert!(t.error.nsec < 500000000, "error {} ns", t.error.nsec);
	}

	#[test]
	fn sync_errors() {
		let none: [&str; 0] = [];
		assert!(matches!(sync(&none, NonZero::new(1).unwrap()), Err(SyncError::NoServers)));
		assert!(matches!(
			sync(&["invalid address"], NonZero::new(1).unwrap()),
			Err(SyncError::Exhausted(1, _))
		));
	}
}
